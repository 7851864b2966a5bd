//! Association (navigation property) generation
//!
//! A navigation property is either a singleton reference backed by an
//! `EntityRef` or a collection backed by an `EntityCollection`. Both ends of
//! a bidirectional relation are kept consistent by attach/detach glue that
//! updates the reverse member.

use super::hierarchy::Hierarchy;
use super::{entity, GenerationContext};
use crate::descriptor::{
    AssociationDescriptor, NamedKind, PropertyDescriptor, ScalarType, TypeDescriptor, TypeRef,
};
use crate::graph::{
    AttributeDecl, ClientType, Expr, FieldDecl, Member, MethodDecl, ParameterDecl, PropertyDecl,
    SetterDecl, Stmt, TypeDecl, Visibility,
};
use crate::GeneratorError;

/// How a navigation property holds its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationShape {
    /// Zero or one related entity
    Singleton,
    /// Any number of related entities
    Collection,
}

impl AssociationShape {
    /// Shape implied by a property type, `None` when it is not entity-typed
    pub fn of(ty: &TypeRef) -> Option<Self> {
        match (ty, ty.named()) {
            (_, Some((_, kind))) if kind != NamedKind::Entity => None,
            (_, None) => None,
            (TypeRef::Collection(_), _) => Some(Self::Collection),
            _ => Some(Self::Singleton),
        }
    }
}

/// Outcome of looking for the other end of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseEnd<'a> {
    /// A generatable reverse member
    Found(&'a PropertyDescriptor),
    /// A reverse member exists but cannot be generated
    Illegal(&'a PropertyDescriptor),
    /// No member on the target carries the association
    Absent,
}

impl<'a> ReverseEnd<'a> {
    /// The reverse member, when glue should be generated for it
    pub fn generatable(self) -> Option<&'a PropertyDescriptor> {
        match self {
            Self::Found(reverse) => Some(reverse),
            Self::Illegal(_) | Self::Absent => None,
        }
    }
}

/// Find the other end of a relation
///
/// The reverse end is a property on the target type carrying the same
/// association name with a different identity, so a self-referencing
/// association never pairs with itself. A candidate that cannot be
/// generated makes the relation one-directional.
pub fn find_reverse<'a>(
    hierarchy: &Hierarchy<'a>,
    property: &PropertyDescriptor,
    association: &AssociationDescriptor,
) -> ReverseEnd<'a> {
    let Some(candidate) = hierarchy
        .all_visible_properties(&association.target)
        .into_iter()
        .find(|p| {
            !p.same_identity(property)
                && p.association().map(|a| a.name.as_str()) == Some(association.name.as_str())
        })
    else {
        return ReverseEnd::Absent;
    };

    if candidate.is_excluded()
        || hierarchy.check_polymorphism(candidate).is_err()
        || AssociationShape::of(&candidate.ty).is_none()
    {
        return ReverseEnd::Illegal(candidate);
    }
    ReverseEnd::Found(candidate)
}

/// `FilterX` body: every other-side key equals the matching this-side key
pub fn filter_predicate(association: &AssociationDescriptor, entity: &str) -> Expr {
    Expr::And(
        association
            .this_key
            .iter()
            .zip(&association.other_key)
            .map(|(this_key, other_key)| {
                Expr::eq(
                    Expr::local(entity).property(other_key.clone()),
                    Expr::this_property(this_key.clone()),
                )
            })
            .collect(),
    )
}

fn filter_name(property: &str) -> String {
    format!("Filter{}", property)
}

/// Statements that make `target` reference `owner` through the reverse end
fn attach(reverse: &PropertyDescriptor, target: Expr) -> Stmt {
    match AssociationShape::of(&reverse.ty) {
        Some(AssociationShape::Collection) => Stmt::Expr(
            target
                .property(reverse.name.clone())
                .call("Add", vec![Expr::This]),
        ),
        _ => Stmt::set_property(target, reverse.name.clone(), Expr::This),
    }
}

/// Statements that make `target` forget `owner` through the reverse end
fn detach(reverse: &PropertyDescriptor, target: Expr) -> Stmt {
    match AssociationShape::of(&reverse.ty) {
        Some(AssociationShape::Collection) => Stmt::Expr(
            target
                .property(reverse.name.clone())
                .call("Remove", vec![Expr::This]),
        ),
        _ => Stmt::set_property(target, reverse.name.clone(), Expr::Null),
    }
}

/// Generate one navigation property on `decl`
pub fn generate(
    ctx: &mut GenerationContext<'_>,
    decl: &mut TypeDecl,
    owner: &TypeDescriptor,
    namespace: &str,
    property: &PropertyDescriptor,
    association: &AssociationDescriptor,
) -> Result<(), GeneratorError> {
    let Some(shape) = AssociationShape::of(&property.ty) else {
        ctx.log.log_error(format!(
            "Association property '{}.{}' must be an entity or a collection of entities.",
            owner.name, property.name
        ));
        return Ok(());
    };

    let external = property.is_external_reference();
    if !external && !ctx.hierarchy.is_exposed_entity(&association.target) {
        ctx.log.log_message(format!(
            "Association '{}.{}' is not generated because entity '{}' is not exposed.",
            owner.name, property.name, association.target
        ));
        return Ok(());
    }

    if association.this_key.is_empty() || association.this_key.len() != association.other_key.len()
    {
        ctx.log.log_error(format!(
            "Association '{}' on '{}.{}' must have the same non-zero number of keys on both sides.",
            association.name, owner.name, property.name
        ));
        return Ok(());
    }

    for key in &association.this_key {
        if ctx.hierarchy.find_property(&owner.name, key).is_none() {
            ctx.log.log_error(format!(
                "Association '{}' references key '{}' which does not exist on '{}'.",
                association.name, key, owner.name
            ));
            return Ok(());
        }
    }
    for key in &association.other_key {
        if ctx.hierarchy.find_property(&association.target, key).is_none() {
            ctx.log.log_error(format!(
                "Association '{}' references key '{}' which does not exist on '{}'.",
                association.name, key, association.target
            ));
            return Ok(());
        }
    }

    let reverse = if external {
        None
    } else {
        let reverse = find_reverse(&ctx.hierarchy, property, association);
        if reverse == ReverseEnd::Absent {
            ctx.log.log_warning(format!(
                "Association '{}' on '{}.{}' has no reverse member on '{}'.",
                association.name, owner.name, property.name, association.target
            ));
        }
        reverse.generatable()
    };

    let shared = ctx.is_shared(&association.target)?;
    let target = ClientType::Named(ctx.type_reference(namespace, &association.target, shared));
    let field = entity::field_name(&property.name);
    let filter = filter_name(&property.name);

    decl.members.push(Member::Method(MethodDecl {
        visibility: Visibility::Private,
        parameters: vec![ParameterDecl::new("entity", target.clone())],
        return_type: Some(ClientType::Scalar(ScalarType::Bool)),
        body: vec![Stmt::Return(Some(filter_predicate(association, "entity")))],
        ..MethodDecl::new(filter.clone())
    }));

    let mut association_attribute = AttributeDecl::framework("Association")
        .arg(Expr::str(association.name.clone()))
        .arg(Expr::str(association.this_key.join(",")))
        .arg(Expr::str(association.other_key.join(",")));
    if association.is_foreign_key {
        association_attribute = association_attribute.named("IsForeignKey", Expr::bool(true));
    }
    let mut attributes = vec![association_attribute];
    if external {
        attributes.push(AttributeDecl::framework("ExternalReference"));
    }

    let member = match shape {
        AssociationShape::Singleton => {
            let backing = ClientType::framework_generic("EntityRef", target.clone());
            decl.members.push(Member::Field(FieldDecl {
                name: field.clone(),
                ty: backing.clone(),
            }));
            let setter = singleton_setter(ctx, owner, namespace, property, association, reverse)?;
            PropertyDecl {
                name: property.name.clone(),
                ty: ClientType::Nullable(Box::new(target)),
                attributes,
                comments: Vec::new(),
                getter: vec![
                    lazy_init(
                        &field,
                        backing,
                        vec![
                            Expr::This,
                            Expr::str(property.name.clone()),
                            Expr::MethodRef(filter),
                        ],
                    ),
                    Stmt::Return(Some(Expr::this_field(field.clone()).property("Entity"))),
                ],
                setter: Some(SetterDecl {
                    visibility: Visibility::Public,
                    body: setter,
                }),
            }
        }
        AssociationShape::Collection => {
            let backing = ClientType::framework_generic("EntityCollection", target.clone());
            decl.members.push(Member::Field(FieldDecl {
                name: field.clone(),
                ty: backing.clone(),
            }));
            let mut args = vec![
                Expr::This,
                Expr::str(property.name.clone()),
                Expr::MethodRef(filter),
            ];
            if let Some(reverse) = reverse {
                let attach_name = format!("Attach{}", property.name);
                let detach_name = format!("Detach{}", property.name);
                decl.members.push(Member::Method(MethodDecl {
                    visibility: Visibility::Private,
                    parameters: vec![ParameterDecl::new("entity", target.clone())],
                    body: vec![attach(reverse, Expr::local("entity"))],
                    ..MethodDecl::new(attach_name.clone())
                }));
                decl.members.push(Member::Method(MethodDecl {
                    visibility: Visibility::Private,
                    parameters: vec![ParameterDecl::new("entity", target.clone())],
                    body: vec![detach(reverse, Expr::local("entity"))],
                    ..MethodDecl::new(detach_name.clone())
                }));
                args.push(Expr::MethodRef(attach_name));
                args.push(Expr::MethodRef(detach_name));
            }
            PropertyDecl {
                name: property.name.clone(),
                ty: backing.clone(),
                attributes,
                comments: Vec::new(),
                getter: vec![
                    lazy_init(&field, backing, args),
                    Stmt::Return(Some(Expr::this_field(field.clone()))),
                ],
                setter: None,
            }
        }
    };

    decl.members.push(Member::Property(member));
    Ok(())
}

fn lazy_init(field: &str, ty: ClientType, args: Vec<Expr>) -> Stmt {
    Stmt::when(
        Expr::is_null(Expr::this_field(field)),
        vec![Stmt::Assign(Expr::this_field(field), Expr::New(ty, args))],
    )
}

/// Setter for a singleton navigation property
///
/// Order inside the change check: validate, raise changing, detach the
/// previous entity, copy or reset foreign keys, attach the new entity,
/// assign the backing reference, raise changed.
fn singleton_setter(
    ctx: &mut GenerationContext<'_>,
    owner: &TypeDescriptor,
    namespace: &str,
    property: &PropertyDescriptor,
    association: &AssociationDescriptor,
    reverse: Option<&PropertyDescriptor>,
) -> Result<Vec<Stmt>, GeneratorError> {
    let name = property.name.clone();
    let field = entity::field_name(&name);
    let backing_entity = || Expr::this_field(field.clone());

    let mut changed = vec![
        Stmt::Expr(Expr::This.call(
            "ValidateProperty",
            vec![Expr::str(name.clone()), Expr::Value],
        )),
        Stmt::Expr(Expr::This.call("RaisePropertyChanging", vec![Expr::str(name.clone())])),
    ];

    let mut on_previous = vec![Stmt::set_property(backing_entity(), "Entity", Expr::Null)];
    if let Some(reverse) = reverse {
        on_previous.push(detach(reverse, Expr::local("previous")));
    }
    changed.push(Stmt::when(
        Expr::is_not_null(Expr::local("previous")),
        on_previous,
    ));

    if association.is_foreign_key {
        let mut copy = Vec::new();
        let mut reset = Vec::new();
        for (this_key, other_key) in association.this_key.iter().zip(&association.other_key) {
            copy.push(Stmt::set_property(
                Expr::This,
                this_key.clone(),
                Expr::Value.property(other_key.clone()),
            ));
            let key_type = match ctx.hierarchy.find_property(&owner.name, this_key) {
                Some(key) => ctx.client_type(namespace, &key.ty)?,
                None => ClientType::Object,
            };
            reset.push(Stmt::set_property(
                Expr::This,
                this_key.clone(),
                Expr::Default(key_type),
            ));
        }
        changed.push(Stmt::If {
            cond: Expr::is_not_null(Expr::Value),
            then: copy,
            otherwise: reset,
        });
    }

    if let Some(reverse) = reverse {
        changed.push(Stmt::when(
            Expr::is_not_null(Expr::Value),
            vec![attach(reverse, Expr::Value)],
        ));
    }

    changed.push(Stmt::set_property(backing_entity(), "Entity", Expr::Value));
    changed.push(Stmt::Expr(
        Expr::This.call("RaisePropertyChanged", vec![Expr::str(name.clone())]),
    ));

    Ok(vec![
        Stmt::Let("previous".to_string(), Expr::this_property(name)),
        Stmt::when(Expr::ne(Expr::local("previous"), Expr::Value), changed),
    ])
}
