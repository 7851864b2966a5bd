//! Inheritance flattening and visibility
//!
//! A type is *visible* when some service exposes it. The visible base of a
//! type is the nearest declared ancestor that is itself visible; a type
//! without one is a *root*. Members declared on invisible ancestors are
//! lifted onto their nearest visible descendant.

use crate::descriptor::{
    DomainModel, NamedKind, Polymorphism, PropertyDescriptor, ServiceDescriptor,
    TypeCatalog, TypeKind, TypeName, TypeRef,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Two services disagree about the root of an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootConflict {
    /// The entity
    pub entity: TypeName,
    /// First service and the root it implies
    pub first: (TypeName, TypeName),
    /// Conflicting service and the root it implies
    pub second: (TypeName, TypeName),
}

/// Visibility facts for one pass
#[derive(Debug, Clone)]
pub struct Hierarchy<'a> {
    catalog: &'a TypeCatalog,
    exposed_entities: BTreeSet<TypeName>,
    exposed_complex: BTreeSet<TypeName>,
}

impl<'a> Hierarchy<'a> {
    /// Collect exposed types across every service
    ///
    /// Complex types are exposed explicitly, or implicitly by appearing in a
    /// property of an exposed type or in an operation signature. Entities
    /// reached through an `Include` association are exposed as well.
    pub fn new(model: &'a DomainModel) -> Self {
        let catalog = model.catalog();
        let mut exposed_entities = BTreeSet::new();
        let mut pending: Vec<TypeName> = Vec::new();

        for service in model.services() {
            exposed_entities.extend(service.exposed_entities(catalog));
            pending.extend(service.complex_types.iter().cloned());
            for operation in &service.operations {
                let signature = operation
                    .parameters
                    .iter()
                    .map(|p| &p.ty)
                    .chain(operation.return_type.as_ref());
                pending.extend(complex_in(signature));
            }
        }

        for entity in &exposed_entities {
            pending.extend(complex_in(chain_properties(catalog, entity).map(|p| &p.ty)));
        }

        let mut exposed_complex = BTreeSet::new();
        while let Some(name) = pending.pop() {
            if !exposed_complex.insert(name.clone()) {
                continue;
            }
            pending.extend(complex_in(chain_properties(catalog, &name).map(|p| &p.ty)));
        }

        Self {
            catalog,
            exposed_entities,
            exposed_complex,
        }
    }

    /// The catalog this hierarchy was computed from
    pub fn catalog(&self) -> &'a TypeCatalog {
        self.catalog
    }

    /// Exposed entities, sorted by name
    pub fn exposed_entities(&self) -> impl Iterator<Item = &TypeName> {
        self.exposed_entities.iter()
    }

    /// Exposed complex types, sorted by name
    pub fn exposed_complex_types(&self) -> impl Iterator<Item = &TypeName> {
        self.exposed_complex.iter()
    }

    /// Whether any service exposes this entity
    pub fn is_exposed_entity(&self, name: &TypeName) -> bool {
        self.exposed_entities.contains(name)
    }

    /// Whether this type is visible at all
    pub fn is_visible(&self, name: &TypeName) -> bool {
        self.exposed_entities.contains(name) || self.exposed_complex.contains(name)
    }

    fn exposed_of_kind(&self, kind: TypeKind) -> &BTreeSet<TypeName> {
        match kind {
            TypeKind::Entity => &self.exposed_entities,
            TypeKind::Complex => &self.exposed_complex,
        }
    }

    /// Nearest declared ancestor that is visible
    pub fn visible_base(&self, name: &TypeName) -> Option<&'a TypeName> {
        let descriptor = self.catalog.get(name)?;
        visible_base_in(self.catalog, self.exposed_of_kind(descriptor.kind), name)
    }

    /// Least-derived visible type of the chain through `name`
    pub fn visible_root(&self, name: &TypeName) -> TypeName {
        let mut current = name.clone();
        while let Some(base) = self.visible_base(&current) {
            current = base.clone();
        }
        current
    }

    /// A visible type without a visible base
    pub fn is_root(&self, name: &TypeName) -> bool {
        self.visible_base(name).is_none()
    }

    /// Every exposed entity whose visible root is `root`, sorted by name
    pub fn exposed_descendants(&self, root: &TypeName) -> Vec<TypeName> {
        self.exposed_entities
            .iter()
            .filter(|e| *e != root && &self.visible_root(e) == root)
            .cloned()
            .collect()
    }

    /// Properties the client type for `name` declares itself
    ///
    /// Own properties come first, then properties lifted from invisible
    /// ancestors up to the visible base. A lifted property is dropped when a
    /// nearer declaration exists or the visible base chain already has it.
    /// The result is sorted by name.
    pub fn lifted_properties(&self, name: &TypeName) -> Vec<&'a PropertyDescriptor> {
        let Some(descriptor) = self.catalog.get(name) else {
            return Vec::new();
        };
        let visible_base = self.visible_base(name);

        let inherited: HashSet<&str> = visible_base
            .map(|base| chain_properties(self.catalog, base).map(|p| p.name.as_str()).collect())
            .unwrap_or_default();

        let mut seen: HashSet<&str> = HashSet::new();
        let mut properties: Vec<&'a PropertyDescriptor> = Vec::new();
        for property in &descriptor.properties {
            seen.insert(&property.name);
            properties.push(property);
        }

        let mut current = descriptor.base.as_ref();
        while let Some(ancestor) = current {
            if Some(ancestor) == visible_base {
                break;
            }
            let Some(ancestor) = self.catalog.get(ancestor) else {
                break;
            };
            for property in &ancestor.properties {
                if inherited.contains(property.name.as_str()) || !seen.insert(&property.name) {
                    continue;
                }
                properties.push(property);
            }
            current = ancestor.base.as_ref();
        }

        properties.sort_by(|a, b| a.name.cmp(&b.name));
        properties
    }

    /// Every property available on the client type, nearest declaration first
    pub fn all_visible_properties(&self, name: &TypeName) -> Vec<&'a PropertyDescriptor> {
        let mut seen = HashSet::new();
        chain_properties(self.catalog, name)
            .filter(|p| seen.insert(p.name.as_str()))
            .collect()
    }

    /// Find a property by name anywhere on the client type
    pub fn find_property(&self, owner: &TypeName, name: &str) -> Option<&'a PropertyDescriptor> {
        chain_properties(self.catalog, owner).find(|p| p.name == name)
    }

    /// Check whether emitting `property` would redeclare a polymorphic member
    /// inside the visible hierarchy
    ///
    /// Returns a description of the violation. Declarations on invisible
    /// ancestors are legal to lift.
    pub fn check_polymorphism(&self, property: &PropertyDescriptor) -> Result<(), String> {
        let declaring_visible = self.is_visible(&property.declaring_type);
        match &property.polymorphism {
            Polymorphism::None => Ok(()),
            Polymorphism::Virtual if declaring_visible => Err(format!(
                "Property '{}.{}' is virtual and cannot be generated on a visible type.",
                property.declaring_type, property.name
            )),
            Polymorphism::Virtual => Ok(()),
            Polymorphism::Override { base, sealed } => {
                if self.is_visible(base) {
                    Err(format!(
                        "Property '{}.{}' overrides a member of visible type '{}'.",
                        property.declaring_type, property.name, base
                    ))
                } else if !sealed && declaring_visible {
                    Err(format!(
                        "Property '{}.{}' is an unsealed override and cannot be generated on a visible type.",
                        property.declaring_type, property.name
                    ))
                } else {
                    Ok(())
                }
            }
            Polymorphism::Hides { base } if self.is_visible(base) => Err(format!(
                "Property '{}.{}' hides a member of visible type '{}'.",
                property.declaring_type, property.name, base
            )),
            Polymorphism::Hides { .. } => Ok(()),
        }
    }

    /// Root of `entity` as seen by one service alone
    pub fn service_root(&self, service: &ServiceDescriptor, entity: &TypeName) -> TypeName {
        let exposed = service.exposed_entities(self.catalog);
        let mut current = entity.clone();
        while let Some(base) = visible_base_in(self.catalog, &exposed, &current) {
            current = base.clone();
        }
        current
    }

    /// Entities whose root differs between services
    pub fn root_conflicts(&self, services: &[ServiceDescriptor]) -> Vec<RootConflict> {
        let mut first_seen: BTreeMap<TypeName, (TypeName, TypeName)> = BTreeMap::new();
        let mut conflicts = Vec::new();

        for service in services {
            for entity in service.exposed_entities(self.catalog) {
                let root = self.service_root(service, &entity);
                match first_seen.get(&entity) {
                    Some((_, first_root)) if *first_root == root => {}
                    Some(first) => {
                        if !conflicts.iter().any(|c: &RootConflict| c.entity == entity) {
                            conflicts.push(RootConflict {
                                entity: entity.clone(),
                                first: first.clone(),
                                second: (service.name.clone(), root),
                            });
                        }
                    }
                    None => {
                        first_seen.insert(entity, (service.name.clone(), root));
                    }
                }
            }
        }

        conflicts
    }
}

fn visible_base_in<'c>(
    catalog: &'c TypeCatalog,
    exposed: &BTreeSet<TypeName>,
    name: &TypeName,
) -> Option<&'c TypeName> {
    let mut current = catalog.get(name)?.base.as_ref();
    while let Some(base) = current {
        if exposed.contains(base) {
            return Some(base);
        }
        current = catalog.get(base).and_then(|d| d.base.as_ref());
    }
    None
}

/// Properties of `name` and all its declared ancestors, nearest first
fn chain_properties<'c>(
    catalog: &'c TypeCatalog,
    name: &TypeName,
) -> impl Iterator<Item = &'c PropertyDescriptor> {
    let mut chain = Vec::new();
    let mut current = catalog.get(name);
    while let Some(descriptor) = current {
        chain.push(descriptor);
        current = descriptor.base.as_ref().and_then(|b| catalog.get(b));
    }
    chain.into_iter().flat_map(|d| d.properties.iter())
}

fn complex_in<'t>(types: impl Iterator<Item = &'t TypeRef>) -> Vec<TypeName> {
    types
        .filter_map(|ty| match ty.named() {
            Some((name, NamedKind::Complex)) => Some(name.clone()),
            _ => None,
        })
        .collect()
}
