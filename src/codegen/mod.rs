//! Code generation for client proxies
//!
//! Every generator in this module works against one [`GenerationContext`],
//! which owns the pass-scoped state (name registry, enum deferral set and the
//! output graph) and borrows everything else.

pub mod association;
pub mod entity;
pub mod hierarchy;
pub mod identity;
pub mod service;

#[cfg(test)]
pub(crate) mod eval;

use crate::descriptor::{
    AttributeDescriptor, DomainModel, EnumDescriptor, NamedKind, TypeName, TypeRef,
};
use crate::diagnostics::LogSink;
use crate::enums::EnumDeferralSet;
use crate::graph::{AttributeDecl, ClientType, Expr, GeneratedTypeGraph, Literal, TypeReference};
use crate::names::{self, NameRegistry};
use crate::options::GenerationOptions;
use crate::sharing::{PassResolver, ResolverError, ShareKind, SharedTypeResolver};
use crate::GeneratorError;
use hierarchy::Hierarchy;
use std::collections::BTreeSet;

/// Pass-scoped state shared by every generator
pub struct GenerationContext<'a> {
    /// Input descriptors
    pub model: &'a DomainModel,
    /// Options for this pass
    pub options: &'a GenerationOptions,
    /// Visibility and inheritance facts
    pub hierarchy: Hierarchy<'a>,
    /// Short-name table
    pub names: NameRegistry,
    /// Enums referenced so far
    pub enums: EnumDeferralSet,
    /// Output accumulated so far
    pub graph: GeneratedTypeGraph,
    /// Types whose generation was refused by an earlier check
    pub skipped: BTreeSet<TypeName>,
    /// Log sink
    pub log: &'a mut dyn LogSink,
    resolver: PassResolver<'a>,
}

impl<'a> GenerationContext<'a> {
    /// Start a pass
    pub fn new(
        model: &'a DomainModel,
        options: &'a GenerationOptions,
        resolver: &'a dyn SharedTypeResolver,
        log: &'a mut dyn LogSink,
    ) -> Self {
        Self {
            model,
            options,
            hierarchy: Hierarchy::new(model),
            names: NameRegistry::new(),
            enums: EnumDeferralSet::new(),
            graph: GeneratedTypeGraph::new(),
            skipped: BTreeSet::new(),
            log,
            resolver: PassResolver::new(resolver),
        }
    }

    /// The per-pass resolver memo
    pub fn resolver(&self) -> &PassResolver<'a> {
        &self.resolver
    }

    fn expected_or_fail(
        &mut self,
        subject: &str,
        result: Result<ShareKind, ResolverError>,
    ) -> Result<ShareKind, GeneratorError> {
        match result {
            Ok(kind) => Ok(kind),
            Err(e) if e.is_expected() => {
                self.log.log_warning(format!(
                    "Could not determine whether '{}' is shared with the client: {}",
                    subject, e
                ));
                Ok(ShareKind::NOT_SHARED)
            }
            Err(e) => Err(GeneratorError::Resolver(e)),
        }
    }

    /// Share kind of a type
    pub fn share_kind(&mut self, name: &TypeName) -> Result<ShareKind, GeneratorError> {
        let qualified = name.qualified();
        let result = self.resolver.classify(&qualified);
        self.expected_or_fail(&qualified, result)
    }

    /// Whether a type is already visible to the client
    pub fn is_shared(&mut self, name: &TypeName) -> Result<bool, GeneratorError> {
        Ok(self.share_kind(name)?.is_shared())
    }

    /// Whether a property is already visible to the client
    pub fn is_property_shared(
        &mut self,
        owner: &TypeName,
        property: &str,
    ) -> Result<bool, GeneratorError> {
        let qualified = owner.qualified();
        let result = self.resolver.classify_property(&qualified, property);
        let subject = format!("{}.{}", qualified, property);
        Ok(self.expected_or_fail(&subject, result)?.is_shared())
    }

    /// Whether a method overload is already visible to the client
    pub fn is_method_shared(
        &mut self,
        owner: &TypeName,
        method: &str,
        parameter_types: &[String],
    ) -> Result<bool, GeneratorError> {
        let qualified = owner.qualified();
        let result = self
            .resolver
            .classify_method(&qualified, method, parameter_types);
        let subject = format!("{}.{}", qualified, method);
        Ok(self.expected_or_fail(&subject, result)?.is_shared())
    }

    /// Drain the enum deferral set into the enums that must be generated
    ///
    /// Resolver failures of the expected kind are reported after resolution
    /// and count as "not shared".
    pub fn resolve_enums(&mut self) -> Result<Vec<&'a EnumDescriptor>, GeneratorError> {
        let enums = std::mem::take(&mut self.enums);
        let model: &'a DomainModel = self.model;
        let resolver = &self.resolver;
        let mut unresolved = Vec::new();

        let resolved = enums.resolve_all(
            model.catalog(),
            |name| {
                let qualified = name.qualified();
                match resolver.classify(&qualified) {
                    Ok(kind) => Ok(kind),
                    Err(e) if e.is_expected() => {
                        unresolved.push(format!(
                            "Could not determine whether '{}' is shared with the client: {}",
                            qualified, e
                        ));
                        Ok(ShareKind::NOT_SHARED)
                    }
                    Err(e) => Err(GeneratorError::Resolver(e)),
                }
            },
            &mut *self.log,
        );

        for warning in unresolved {
            self.log.log_warning(warning);
        }
        resolved
    }

    /// Client namespace for a server namespace
    pub fn client_namespace(&self, server_namespace: &str) -> String {
        names::client_namespace(server_namespace, self.options)
    }

    /// Client-side name of a server type
    pub fn client_name(&self, name: &TypeName) -> TypeName {
        TypeName::new(self.client_namespace(&name.namespace), name.name.clone())
    }

    /// Reference to a type as written from inside `scope`
    ///
    /// Shared types keep their server namespace. A short name already owned
    /// by another type in `scope` forces qualification.
    pub fn type_reference(&mut self, scope: &str, name: &TypeName, shared: bool) -> TypeReference {
        let client = if shared {
            name.clone()
        } else {
            self.client_name(name)
        };
        let conflict = self.names.register(scope, &client).is_conflict();
        TypeReference {
            qualified: self.options.use_fully_qualified_names || conflict,
            namespace: client.namespace,
            name: client.name,
        }
    }

    /// Map a descriptor type reference into client position
    ///
    /// Enum uses are registered for deferred generation.
    pub fn client_type(&mut self, scope: &str, ty: &TypeRef) -> Result<ClientType, GeneratorError> {
        Ok(match ty {
            TypeRef::Scalar(scalar) => ClientType::Scalar(*scalar),
            TypeRef::Nullable(inner) => {
                ClientType::Nullable(Box::new(self.client_type(scope, inner)?))
            }
            TypeRef::Collection(inner) => {
                ClientType::List(Box::new(self.client_type(scope, inner)?))
            }
            TypeRef::Named { name, kind } => {
                let shared = match kind {
                    NamedKind::Enum => {
                        self.enums.register_use(name);
                        self.is_shared(name)?
                    }
                    NamedKind::Other => true,
                    NamedKind::Entity | NamedKind::Complex => self.is_shared(name)?,
                };
                ClientType::Named(self.type_reference(scope, name, shared))
            }
        })
    }

    /// Client attributes for free-form server attributes
    ///
    /// Returns the attributes to emit and one comment per attribute that
    /// could not be generated because its type is not visible to the client.
    pub fn propagate_attributes<'d>(
        &mut self,
        scope: &str,
        attributes: impl IntoIterator<Item = &'d AttributeDescriptor>,
    ) -> Result<(Vec<AttributeDecl>, Vec<String>), GeneratorError> {
        let mut emitted = Vec::new();
        let mut comments = Vec::new();

        for attribute in attributes {
            if !self.is_shared(&attribute.type_name)? {
                comments.push(format!(
                    "Attribute '{}' was not generated: its type is not shared with the client project.",
                    attribute.type_name
                ));
                continue;
            }
            let mut decl = AttributeDecl {
                ty: self.type_reference(scope, &attribute.type_name, true),
                args: Vec::new(),
            };
            for argument in &attribute.arguments {
                decl = match argument.split_once('=') {
                    Some((name, value)) => decl.named(name.trim(), attribute_value(value)),
                    None => decl.arg(attribute_value(argument)),
                };
            }
            emitted.push(decl);
        }

        Ok((emitted, comments))
    }
}

/// Interpret a source-form attribute argument
fn attribute_value(raw: &str) -> Expr {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Expr::Literal(Literal::Int(value));
    }
    match raw {
        "true" => Expr::bool(true),
        "false" => Expr::bool(false),
        _ => Expr::str(raw.trim_matches('"')),
    }
}
