//! Generation orchestration
//!
//! This module drives a complete pass: it selects a generator, runs it over
//! the domain model and collects the log.

use crate::codegen::entity::{self, data_contract_namespace};
use crate::codegen::{service, GenerationContext};
use crate::descriptor::{DomainModel, TypeName};
use crate::diagnostics::{Diagnostics, LogEntry, LogSink};
use crate::graph::{
    AttributeDecl, ClientType, EnumMemberDecl, Expr, GeneratedTypeGraph, Member, MethodDecl,
    MethodKind, TypeDecl, TypeDeclKind,
};
use crate::names::Registration;
use crate::options::{GenerationOptions, DEFAULT_LANGUAGE};
use crate::render;
use crate::selection::{select_generator, GeneratorCandidate};
use crate::sharing::{ShareKind, SharedTypeResolver};
use crate::GeneratorError;

/// Runtime base class of the application-level context
pub const WEB_CONTEXT_BASE: &str = "WebContextBase";

/// A pluggable client code generator
pub trait ClientCodeGenerator {
    /// Produce source text for the model
    ///
    /// Returns `Ok(None)` when errors were logged and no output should be
    /// written. `Err` is reserved for failures that abort the pass.
    fn generate(
        &self,
        model: &DomainModel,
        options: &GenerationOptions,
        resolver: &dyn SharedTypeResolver,
        log: &mut dyn LogSink,
    ) -> Result<Option<String>, GeneratorError>;
}

/// The built-in generator
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClientCodeGenerator;

impl DefaultClientCodeGenerator {
    /// Fully qualified identity used for explicit selection
    pub const TYPE_NAME: &'static str = "domain_client_gen::generator::DefaultClientCodeGenerator";
    /// Logical name
    pub const NAME: &'static str = "Default";

    /// Selection candidate for the built-in generator
    pub fn candidate() -> GeneratorCandidate {
        GeneratorCandidate {
            type_name: Self::TYPE_NAME.to_string(),
            name: Self::NAME.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            is_default: true,
            factory: default_factory,
        }
    }
}

impl ClientCodeGenerator for DefaultClientCodeGenerator {
    fn generate(
        &self,
        model: &DomainModel,
        options: &GenerationOptions,
        resolver: &dyn SharedTypeResolver,
        log: &mut dyn LogSink,
    ) -> Result<Option<String>, GeneratorError> {
        let graph = build_graph(model, options, resolver, log)?;
        if log.has_errors() {
            return Ok(None);
        }
        render::render(&graph, options).map(Some)
    }
}

fn default_factory() -> Box<dyn ClientCodeGenerator> {
    Box::new(DefaultClientCodeGenerator)
}

/// Generators available without host registration
pub fn builtin_candidates() -> Vec<GeneratorCandidate> {
    vec![DefaultClientCodeGenerator::candidate()]
}

/// Result of a pass
#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    /// Generated source; `None` whenever an error was logged
    pub source: Option<String>,
    /// Whether any error was logged
    pub has_errors: bool,
    /// Everything the pass logged, in order
    pub log: Vec<LogEntry>,
}

/// Run a complete pass
///
/// Options are validated before anything else. A pass that logged an error
/// produces no source.
pub fn generate(
    model: &DomainModel,
    options: &GenerationOptions,
    resolver: &dyn SharedTypeResolver,
    candidates: &[GeneratorCandidate],
) -> Result<GenerationOutput, GeneratorError> {
    options.validate()?;

    let mut log = Diagnostics::new();
    let selected = select_generator(
        candidates,
        &options.language,
        options.generator_name.as_deref(),
        &mut log,
    );
    let source = match selected {
        Some(candidate) => {
            tracing::info!(generator = %candidate.type_name, language = %options.language, "generating client code");
            candidate
                .instantiate()
                .generate(model, options, resolver, &mut log)?
        }
        None => None,
    };

    let has_errors = log.has_errors();
    Ok(GenerationOutput {
        source: if has_errors { None } else { source },
        has_errors,
        log: log.into_entries(),
    })
}

/// Build the complete client graph for a model
///
/// Types are predeclared before anything is generated so that every
/// reference sees the final name registry. Enums come last, once every use
/// has been registered.
pub fn build_graph(
    model: &DomainModel,
    options: &GenerationOptions,
    resolver: &dyn SharedTypeResolver,
    log: &mut dyn LogSink,
) -> Result<GeneratedTypeGraph, GeneratorError> {
    let mut ctx = GenerationContext::new(model, options, resolver, log);

    let mut types: Vec<TypeName> = ctx.hierarchy.exposed_entities().cloned().collect();
    types.extend(ctx.hierarchy.exposed_complex_types().cloned());
    for name in &types {
        entity::predeclare(&mut ctx, name);
    }

    report_root_conflicts(&mut ctx)?;

    for name in &types {
        entity::generate_type(&mut ctx, name)?;
    }
    for service_descriptor in model.services() {
        service::generate(&mut ctx, service_descriptor)?;
    }
    if options.enable_application_level_context {
        generate_web_context(&mut ctx);
    }
    generate_enums(&mut ctx)?;

    tracing::debug!(types = ctx.graph.type_count(), "client graph built");
    let mut graph = ctx.graph;
    graph.normalize();
    Ok(graph)
}

fn report_root_conflicts(ctx: &mut GenerationContext<'_>) -> Result<(), GeneratorError> {
    for conflict in ctx.hierarchy.root_conflicts(ctx.model.services()) {
        let (first_service, first_root) = &conflict.first;
        let (second_service, second_root) = &conflict.second;
        ctx.log.log_error(format!(
            "Entity '{}' has root '{}' in service '{}' but root '{}' in service '{}'; services sharing an entity must expose the same hierarchy.",
            conflict.entity, first_root, first_service, second_root, second_service
        ));
        if ctx.share_kind(&conflict.entity)?.contains(ShareKind::SHARED_BY_REFERENCE) {
            ctx.log.log_error(format!(
                "Type '{}' cannot be both referenced as an existing type and require generation.",
                conflict.entity
            ));
        }
        ctx.skipped.insert(conflict.entity);
    }
    Ok(())
}

fn generate_web_context(ctx: &mut GenerationContext<'_>) {
    let namespace = match (&ctx.options.client_root_namespace, ctx.model.services().first()) {
        (Some(root), _) => root.clone(),
        (None, Some(first)) => ctx.client_namespace(&first.name.namespace),
        (None, None) => String::new(),
    };
    let web_context = TypeName::new(namespace.clone(), "WebContext");
    if let Registration::Conflict { existing } = ctx.names.register(&namespace, &web_context) {
        ctx.log.log_error(format!(
            "'{}' cannot be generated: the name is already used by '{}'.",
            web_context, existing
        ));
        return;
    }

    let mut decl = TypeDecl::class(web_context.name);
    decl.base = Some(ClientType::framework(WEB_CONTEXT_BASE));
    decl.comments
        .push("Application-level context shared by every domain context.".to_string());
    decl.members.push(Member::Method(MethodDecl {
        kind: MethodKind::Constructor,
        ..MethodDecl::new("new")
    }));
    ctx.graph.add_type(&namespace, decl);
}

fn generate_enums(ctx: &mut GenerationContext<'_>) -> Result<(), GeneratorError> {
    for descriptor in ctx.resolve_enums()? {
        let namespace = ctx.client_namespace(&descriptor.name.namespace);
        let client = TypeName::new(namespace.clone(), descriptor.name.name.clone());
        if let Registration::Conflict { existing } = ctx.names.register(&namespace, &client) {
            ctx.log.log_error(format!(
                "Enum '{}' cannot be generated: its client name '{}' is already used by '{}'.",
                descriptor.name, client, existing
            ));
            continue;
        }

        let mut attributes = vec![AttributeDecl::framework("DataContract").named(
            "Namespace",
            Expr::str(data_contract_namespace(&descriptor.name.namespace)),
        )];
        if descriptor.is_flags {
            attributes.push(AttributeDecl::framework("Flags"));
        }

        ctx.graph.add_type(
            &namespace,
            TypeDecl {
                attributes,
                kind: TypeDeclKind::Enum {
                    is_flags: descriptor.is_flags,
                    members: descriptor
                        .members
                        .iter()
                        .map(|m| EnumMemberDecl {
                            name: m.name.clone(),
                            value: m.value,
                        })
                        .collect(),
                },
                ..TypeDecl::class(client.name)
            },
        );
    }
    Ok(())
}
