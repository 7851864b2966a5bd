//! Entity and complex type generation
//!
//! One client class per visible type. Data properties get a backing field,
//! a getter and a notifying setter; navigation properties are handed to
//! [`association`](super::association).

use super::{association, identity, GenerationContext};
use crate::descriptor::{NamedKind, PropertyDescriptor, TypeDescriptor, TypeName};
use crate::graph::{
    AttributeDecl, ClientType, Expr, FieldDecl, Member, MethodDecl, ParameterDecl, PropertyDecl,
    SetterDecl, Stmt, TypeDecl, Visibility,
};
use crate::GeneratorError;

/// Runtime base class for entities
pub const ENTITY_BASE: &str = "Entity";
/// Runtime base class for complex types
pub const COMPLEX_BASE: &str = "ComplexObject";

/// Backing field name for a property
pub fn field_name(property: &str) -> String {
    format!("_{}", property)
}

/// Register the short name of a type about to be generated
///
/// Two generated types that share a client namespace and short name cannot
/// both be emitted; the second is reported and skipped.
pub fn predeclare(ctx: &mut GenerationContext<'_>, name: &TypeName) -> bool {
    let client = ctx.client_name(name);
    let registration = ctx.names.register(&client.namespace, &client);
    if let crate::names::Registration::Conflict { existing } = registration {
        ctx.log.log_error(format!(
            "Type '{}' cannot be generated: its client name '{}' is already used by '{}'.",
            name, client, existing
        ));
        ctx.skipped.insert(name.clone());
        return false;
    }
    true
}

/// Generate the client class for one entity or complex type
pub fn generate_type(ctx: &mut GenerationContext<'_>, name: &TypeName) -> Result<(), GeneratorError> {
    if ctx.skipped.contains(name) {
        return Ok(());
    }
    if ctx.is_shared(name)? {
        tracing::debug!(type_name = %name, "type already visible to the client");
        return Ok(());
    }
    let Some(descriptor) = ctx.hierarchy.catalog().get(name) else {
        return Ok(());
    };

    let namespace = ctx.client_namespace(&name.namespace);
    let mut decl = TypeDecl::class(name.name.clone());
    decl.is_abstract = descriptor.is_abstract;
    decl.attributes.push(
        AttributeDecl::framework("DataContract")
            .named("Namespace", Expr::str(data_contract_namespace(&name.namespace))),
    );

    if descriptor.is_entity() && ctx.hierarchy.is_root(name) {
        for known in ctx.hierarchy.exposed_descendants(name) {
            let shared = ctx.is_shared(&known)?;
            let reference = ctx.type_reference(&namespace, &known, shared);
            decl.attributes.push(
                AttributeDecl::framework("KnownType")
                    .arg(Expr::TypeOf(ClientType::Named(reference))),
            );
        }
    }

    let (attributes, comments) = ctx.propagate_attributes(&namespace, &descriptor.attributes)?;
    decl.attributes.extend(attributes);
    decl.comments.extend(comments);

    decl.base = Some(match ctx.hierarchy.visible_base(name) {
        Some(base) => {
            let shared = ctx.is_shared(base)?;
            ClientType::Named(ctx.type_reference(&namespace, base, shared))
        }
        None if descriptor.is_entity() => ClientType::framework(ENTITY_BASE),
        None => ClientType::framework(COMPLEX_BASE),
    });

    for property in ctx.hierarchy.lifted_properties(name) {
        generate_property(ctx, &mut decl, descriptor, &namespace, property)?;
    }

    decl.members
        .push(Member::Method(MethodDecl::hook("OnCreated", Vec::new())));

    if descriptor.is_entity() {
        identity::generate(ctx, &mut decl, descriptor)?;
    }

    ctx.graph.add_type(&namespace, decl);
    Ok(())
}

/// Data contract namespace for a server namespace
pub fn data_contract_namespace(server_namespace: &str) -> String {
    format!(
        "http://schemas.datacontract.org/2004/07/{}",
        server_namespace
    )
}

fn generate_property(
    ctx: &mut GenerationContext<'_>,
    decl: &mut TypeDecl,
    owner: &TypeDescriptor,
    namespace: &str,
    property: &PropertyDescriptor,
) -> Result<(), GeneratorError> {
    if property.is_excluded() {
        return Ok(());
    }

    if let Err(violation) = ctx.hierarchy.check_polymorphism(property) {
        ctx.log.log_error(violation);
        return Ok(());
    }

    if ctx.is_property_shared(&owner.name, &property.name)? {
        tracing::debug!(property = %property.name, owner = %owner.name, "property already visible to the client");
        return Ok(());
    }

    if let Some(descriptor) = property.association() {
        if !owner.is_entity() {
            ctx.log.log_error(format!(
                "Property '{}.{}' is an association, but '{}' is a complex type.",
                owner.name, property.name, owner.name
            ));
            return Ok(());
        }
        return association::generate(ctx, decl, owner, namespace, property, descriptor);
    }

    if property.is_key() && !property.ty.is_predefined() {
        ctx.log.log_error(format!(
            "Key property '{}.{}' must be of a predefined type, not '{}'.",
            owner.name, property.name, property.ty
        ));
        return Ok(());
    }

    match property.ty.named() {
        Some((target, NamedKind::Entity)) => {
            ctx.log.log_message(format!(
                "Property '{}.{}' of entity type '{}' is not an association and will not be generated.",
                owner.name, property.name, target
            ));
            return Ok(());
        }
        Some((target, NamedKind::Other)) => {
            if !ctx.is_shared(target)? {
                ctx.log.log_message(format!(
                    "Property '{}.{}' of type '{}' will not be generated: the type is not available to the client.",
                    owner.name, property.name, target
                ));
                return Ok(());
            }
        }
        _ => {}
    }

    let ty = ctx.client_type(namespace, &property.ty)?;
    let (custom, comments) = ctx.propagate_attributes(namespace, property.custom_attributes())?;

    let field = field_name(&property.name);
    decl.members.push(Member::Field(FieldDecl {
        name: field.clone(),
        ty: ty.clone(),
    }));

    let mut attributes = vec![AttributeDecl::framework("DataMember")];
    if property.is_key() {
        attributes.push(AttributeDecl::framework("Key"));
    }
    match property.editable() {
        Some((allow_edit, allow_initial_value)) => attributes.push(editable(allow_edit, allow_initial_value)),
        None if property.is_key() => attributes.push(editable(false, true)),
        None => {}
    }
    if property.is_read_only() {
        attributes.push(AttributeDecl::framework("ReadOnly").arg(Expr::bool(true)));
    }
    if property.is_roundtrip_original() {
        attributes.push(AttributeDecl::framework("RoundtripOriginal"));
    }
    attributes.extend(custom);

    decl.members.push(Member::Property(PropertyDecl {
        name: property.name.clone(),
        ty: ty.clone(),
        attributes,
        comments,
        getter: vec![Stmt::Return(Some(Expr::this_field(field.clone())))],
        setter: Some(SetterDecl {
            visibility: if property.is_read_only() {
                Visibility::Internal
            } else {
                Visibility::Public
            },
            body: setter_body(&property.name, &field, property.is_key()),
        }),
    }));

    decl.members.push(Member::Method(MethodDecl::hook(
        format!("On{}Changing", property.name),
        vec![ParameterDecl::new("value", ty)],
    )));
    decl.members.push(Member::Method(MethodDecl::hook(
        format!("On{}Changed", property.name),
        Vec::new(),
    )));

    Ok(())
}

fn editable(allow_edit: bool, allow_initial_value: bool) -> AttributeDecl {
    AttributeDecl::framework("Editable")
        .arg(Expr::bool(allow_edit))
        .named("AllowInitialValue", Expr::bool(allow_initial_value))
}

/// Notifying setter for a data property
///
/// Key members raise the property-change pair, other members the
/// data-member pair.
fn setter_body(property: &str, field: &str, is_key: bool) -> Vec<Stmt> {
    let (changing, changed) = if is_key {
        ("RaisePropertyChanging", "RaisePropertyChanged")
    } else {
        ("RaiseDataMemberChanging", "RaiseDataMemberChanged")
    };

    vec![Stmt::when(
        Expr::ne(Expr::this_field(field), Expr::Value),
        vec![
            Stmt::Expr(Expr::This.call(format!("On{}Changing", property), vec![Expr::Value])),
            Stmt::Expr(Expr::This.call(changing, vec![Expr::str(property)])),
            Stmt::Expr(Expr::This.call(
                "ValidateProperty",
                vec![Expr::str(property), Expr::Value],
            )),
            Stmt::Assign(Expr::this_field(field), Expr::Value),
            Stmt::Expr(Expr::This.call(changed, vec![Expr::str(property)])),
            Stmt::Expr(Expr::This.call(format!("On{}Changed", property), Vec::new())),
        ],
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::tests::{key_prop, scalar_prop};
    use crate::descriptor::{
        AttributeDescriptor, DomainModel, Polymorphism, PropertyAttribute, ScalarType,
        ServiceDescriptor, TypeCatalog, TypeRef,
    };
    use crate::diagnostics::{Diagnostics, LogSink};
    use crate::graph::TypeDeclKind;
    use crate::options::GenerationOptions;
    use crate::sharing::{NothingShared, ShareKind, SharedTypeSet};

    fn product_model(extra: Vec<PropertyDescriptor>) -> DomainModel {
        let product = TypeName::parse("Shop.Product");
        let mut descriptor = TypeDescriptor::entity(product.clone())
            .with_property(key_prop(&product, "ProductID", ScalarType::Int32))
            .with_property(scalar_prop(&product, "Name", ScalarType::String));
        for property in extra {
            descriptor = descriptor.with_property(property);
        }
        let catalog = TypeCatalog::new().with_type(descriptor);
        let service =
            ServiceDescriptor::new(TypeName::parse("Shop.CatalogService")).with_entity(product);
        DomainModel::new(catalog, vec![service]).unwrap()
    }

    #[test]
    fn test_generates_fields_properties_and_hooks() {
        let model = product_model(Vec::new());
        let options = GenerationOptions::new("Rust");
        let mut log = Diagnostics::new();
        let mut ctx = GenerationContext::new(&model, &options, &NothingShared, &mut log);
        let product = TypeName::parse("Shop.Product");
        assert!(predeclare(&mut ctx, &product));
        generate_type(&mut ctx, &product).unwrap();

        let decl = ctx.graph.find_type("Shop", "Product").unwrap();
        assert_eq!(decl.kind, TypeDeclKind::Class);
        assert_eq!(decl.base, Some(ClientType::framework(ENTITY_BASE)));
        assert!(decl.has_member("_ProductID"));
        assert!(decl.has_member("OnNameChanging"));
        assert!(decl.has_member("OnCreated"));
        assert!(decl.method("GetIdentity").is_some());

        let key = decl.property("ProductID").unwrap();
        let names: Vec<_> = key.attributes.iter().map(|a| a.ty.name.as_str()).collect();
        assert_eq!(names, vec!["DataMember", "Key", "Editable"]);
    }

    #[test]
    fn test_non_scalar_key_is_error() {
        let product = TypeName::parse("Shop.Product");
        let bad_key = PropertyDescriptor::new(
            "Code",
            TypeRef::complex(TypeName::parse("Shop.Code")),
            product.clone(),
        )
        .with_attribute(PropertyAttribute::Key);
        let model = product_model(vec![bad_key]);
        let options = GenerationOptions::new("Rust");
        let mut log = Diagnostics::new();
        {
            let mut ctx = GenerationContext::new(&model, &options, &NothingShared, &mut log);
            generate_type(&mut ctx, &product).unwrap();
            assert!(!ctx.graph.find_type("Shop", "Product").unwrap().has_member("Code"));
        }
        assert!(log.has_errors());
    }

    #[test]
    fn test_illegal_override_is_logged_and_skipped() {
        let product = TypeName::parse("Shop.Product");
        let virtual_prop = scalar_prop(&product, "Price", ScalarType::Decimal)
            .with_polymorphism(Polymorphism::Virtual);
        let model = product_model(vec![virtual_prop]);
        let options = GenerationOptions::new("Rust");
        let mut log = Diagnostics::new();
        {
            let mut ctx = GenerationContext::new(&model, &options, &NothingShared, &mut log);
            generate_type(&mut ctx, &product).unwrap();
            let decl = ctx.graph.find_type("Shop", "Product").unwrap();
            assert!(!decl.has_member("Price"));
            assert!(decl.has_member("Name"));
        }
        assert_eq!(log.errors().count(), 1);
    }

    #[test]
    fn test_excluded_and_shared_types_are_skipped() {
        let product = TypeName::parse("Shop.Product");
        let excluded = scalar_prop(&product, "Secret", ScalarType::String)
            .with_attribute(PropertyAttribute::Exclude);
        let model = product_model(vec![excluded]);
        let options = GenerationOptions::new("Rust");

        let mut log = Diagnostics::new();
        let mut ctx = GenerationContext::new(&model, &options, &NothingShared, &mut log);
        generate_type(&mut ctx, &product).unwrap();
        assert!(!ctx.graph.find_type("Shop", "Product").unwrap().has_member("Secret"));

        let shared = SharedTypeSet::new().with_type("Shop.Product", ShareKind::SHARED_BY_SOURCE);
        let mut log = Diagnostics::new();
        let mut ctx = GenerationContext::new(&model, &options, &shared, &mut log);
        generate_type(&mut ctx, &product).unwrap();
        assert_eq!(ctx.graph.type_count(), 0);
    }

    #[test]
    fn test_setter_raises_pair_around_assignment() {
        let body = setter_body("Name", "_Name", false);
        let Stmt::If { then, .. } = &body[0] else {
            panic!("setter must start with a change check");
        };
        let calls: Vec<_> = then
            .iter()
            .filter_map(|s| match s {
                Stmt::Expr(Expr::Call { method, .. }) => Some(method.as_str()),
                Stmt::Assign(..) => Some("="),
                _ => None,
            })
            .collect();
        assert_eq!(
            calls,
            vec![
                "OnNameChanging",
                "RaiseDataMemberChanging",
                "ValidateProperty",
                "=",
                "RaiseDataMemberChanged",
                "OnNameChanged"
            ]
        );
    }

    #[test]
    fn test_unshared_custom_attribute_commented() {
        let product = TypeName::parse("Shop.Product");
        let tagged = scalar_prop(&product, "Sku", ScalarType::String).with_attribute(
            PropertyAttribute::Custom(AttributeDescriptor::new(
                TypeName::parse("Server.Only.Audit"),
                Vec::new(),
            )),
        );
        let model = product_model(vec![tagged]);
        let options = GenerationOptions::new("Rust");
        let mut log = Diagnostics::new();
        let mut ctx = GenerationContext::new(&model, &options, &NothingShared, &mut log);
        generate_type(&mut ctx, &product).unwrap();
        let sku = ctx
            .graph
            .find_type("Shop", "Product")
            .unwrap()
            .property("Sku")
            .unwrap();
        assert_eq!(sku.comments.len(), 1);
        assert!(sku.attributes.iter().all(|a| a.ty.name != "Audit"));
    }
}
