//! Service context generation
//!
//! Each exposed service becomes a `<Name>Context` deriving from the runtime
//! `DomainContext`: entity sets for the roots it serves, query factories,
//! invoke wrappers and custom-operation wrappers. Custom operations also add
//! members to the bound entity.

use super::GenerationContext;
use crate::descriptor::{
    NamedKind, OperationDescriptor, OperationKind, ParameterDescriptor, ScalarType,
    ServiceDescriptor, TypeName, TypeRef,
};
use crate::graph::{
    ClientType, Expr, Member, MethodDecl, MethodKind, ParameterDecl, PropertyDecl, Stmt, TypeDecl,
};
use crate::names::{context_name, make_plural_name};
use crate::GeneratorError;
use std::collections::{BTreeSet, HashSet};

/// Runtime base class for contexts
pub const CONTEXT_BASE: &str = "DomainContext";

/// Generate the context for one service
pub fn generate(
    ctx: &mut GenerationContext<'_>,
    service: &ServiceDescriptor,
) -> Result<(), GeneratorError> {
    let namespace = ctx.client_namespace(&service.name.namespace);
    let name = context_name(&service.name.name);
    let context_type = TypeName::new(namespace.clone(), name.clone());
    if ctx.names.register(&namespace, &context_type).is_conflict() {
        ctx.log.log_error(format!(
            "Context '{}' for service '{}' conflicts with another generated type.",
            context_type, service.name
        ));
        return Ok(());
    }

    let mut decl = TypeDecl::class(name);
    decl.base = Some(ClientType::framework(CONTEXT_BASE));
    let (attributes, comments) = ctx.propagate_attributes(&namespace, &service.attributes)?;
    decl.attributes.extend(attributes);
    decl.comments.extend(comments);
    decl.comments.push(format!(
        "Client context for the '{}' service.",
        service.name.name
    ));

    decl.members.push(Member::Method(MethodDecl {
        kind: MethodKind::Constructor,
        body: vec![Stmt::Expr(Expr::This.call(
            "Initialize",
            vec![Expr::New(
                ClientType::framework("Uri"),
                vec![Expr::str(format!("{}.svc", service.name.name))],
            )],
        ))],
        ..MethodDecl::new("new")
    }));

    let mut members: HashSet<String> = HashSet::new();
    let roots = entity_set_roots(ctx, service);

    for root in &roots {
        let shared = ctx.is_shared(root)?;
        let entity = ClientType::Named(ctx.type_reference(&namespace, root, shared));
        let set_name = make_plural_name(&root.name);
        if !members.insert(set_name.clone()) {
            ctx.log.log_error(format!(
                "Entity set '{}' on '{}' collides with another member.",
                set_name, decl.name
            ));
            continue;
        }
        decl.members.push(Member::Property(PropertyDecl {
            name: set_name,
            ty: ClientType::framework_generic("EntitySet", entity.clone()),
            attributes: Vec::new(),
            comments: Vec::new(),
            getter: vec![Stmt::Return(Some(
                Expr::this_property("EntityContainer").call_generic(
                    "GetEntitySet",
                    vec![entity],
                    Vec::new(),
                ),
            ))],
            setter: None,
        }));
    }

    let mut container_body = vec![Stmt::Let(
        "container".to_string(),
        Expr::New(ClientType::framework("EntityContainer"), Vec::new()),
    )];
    for root in &roots {
        let shared = ctx.is_shared(root)?;
        let entity = ClientType::Named(ctx.type_reference(&namespace, root, shared));
        container_body.push(Stmt::Expr(Expr::local("container").call_generic(
            "CreateEntitySet",
            vec![entity],
            Vec::new(),
        )));
    }
    container_body.push(Stmt::Return(Some(Expr::local("container"))));
    decl.members.push(Member::Method(MethodDecl {
        return_type: Some(ClientType::framework("EntityContainer")),
        body: container_body,
        is_override: true,
        ..MethodDecl::new("CreateEntityContainer")
    }));
    members.insert("CreateEntityContainer".to_string());

    for operation in &service.operations {
        let generated = match operation.kind {
            OperationKind::Query => query(ctx, &namespace, service, operation)?,
            OperationKind::Invoke => invoke(ctx, &namespace, service, operation)?,
            OperationKind::Custom => custom(ctx, &namespace, service, operation)?,
        };
        let Some(method) = generated else {
            continue;
        };
        if !members.insert(method.name.clone()) {
            ctx.log.log_error(format!(
                "Operation '{}' on service '{}' generates member '{}', which is already defined.",
                operation.name, service.name, method.name
            ));
            continue;
        }
        decl.members.push(Member::Method(method));
    }

    ctx.graph.add_type(&namespace, decl);
    Ok(())
}

/// Roots of every entity the service exposes: queried, bound to a custom
/// operation, listed explicitly, or reached through an `Include` association
fn entity_set_roots(ctx: &GenerationContext<'_>, service: &ServiceDescriptor) -> BTreeSet<TypeName> {
    service
        .exposed_entities(ctx.model.catalog())
        .into_iter()
        .filter(|entity| !ctx.skipped.contains(entity))
        .map(|entity| ctx.hierarchy.visible_root(&entity))
        .collect()
}

/// Check that a parameter can be sent by the client
fn parameter_type_error(
    ctx: &mut GenerationContext<'_>,
    parameter: &ParameterDescriptor,
) -> Result<Option<String>, GeneratorError> {
    let Some((name, kind)) = parameter.ty.named() else {
        return Ok(None);
    };
    match kind {
        NamedKind::Enum => return Ok(None),
        NamedKind::Complex if ctx.hierarchy.is_visible(name) => return Ok(None),
        NamedKind::Entity => {
            return Ok(Some(format!(
                "parameter '{}' is entity type '{}'; entities cannot be passed to this operation",
                parameter.name, name
            )))
        }
        NamedKind::Complex | NamedKind::Other => {}
    }
    if ctx.is_shared(name)? {
        return Ok(None);
    }
    Ok(Some(format!(
        "parameter '{}' has type '{}' which is not available to the client",
        parameter.name, name
    )))
}

fn parameters(
    ctx: &mut GenerationContext<'_>,
    namespace: &str,
    service: &ServiceDescriptor,
    operation: &OperationDescriptor,
) -> Result<Option<Vec<ParameterDecl>>, GeneratorError> {
    let mut decls = Vec::new();
    for parameter in &operation.parameters {
        if let Some(problem) = parameter_type_error(ctx, parameter)? {
            ctx.log.log_error(format!(
                "Operation '{}' on service '{}' cannot be generated: {}.",
                operation.name, service.name, problem
            ));
            return Ok(None);
        }
        let ty = ctx.client_type(namespace, &parameter.ty)?;
        decls.push(ParameterDecl::new(parameter.name.clone(), ty));
    }
    Ok(Some(decls))
}

fn parameter_bag(parameters: &[ParameterDecl]) -> Expr {
    Expr::Parameters(
        parameters
            .iter()
            .map(|p| (p.name.clone(), Expr::local(p.name.clone())))
            .collect(),
    )
}

fn query(
    ctx: &mut GenerationContext<'_>,
    namespace: &str,
    service: &ServiceDescriptor,
    operation: &OperationDescriptor,
) -> Result<Option<MethodDecl>, GeneratorError> {
    let Some((entity, NamedKind::Entity)) = operation.return_type.as_ref().and_then(TypeRef::named)
    else {
        ctx.log.log_error(format!(
            "Query '{}' on service '{}' must return an entity or a collection of entities.",
            operation.name, service.name
        ));
        return Ok(None);
    };
    let Some(parameters) = parameters(ctx, namespace, service, operation)? else {
        return Ok(None);
    };

    let shared = ctx.is_shared(entity)?;
    let entity = ClientType::Named(ctx.type_reference(namespace, entity, shared));
    let body = vec![Stmt::Return(Some(Expr::This.call_generic(
        "CreateQuery",
        vec![entity.clone()],
        vec![
            Expr::str(operation.name.clone()),
            parameter_bag(&parameters),
            Expr::bool(operation.has_side_effects),
            Expr::bool(operation.is_composable),
        ],
    )))];

    Ok(Some(MethodDecl {
        parameters,
        return_type: Some(ClientType::framework_generic("EntityQuery", entity)),
        body,
        comments: vec![format!(
            "Query for the '{}' operation.",
            operation.name
        )],
        ..MethodDecl::new(format!("{}Query", operation.name))
    }))
}

fn invoke(
    ctx: &mut GenerationContext<'_>,
    namespace: &str,
    service: &ServiceDescriptor,
    operation: &OperationDescriptor,
) -> Result<Option<MethodDecl>, GeneratorError> {
    if let Some((name, NamedKind::Other)) = operation.return_type.as_ref().and_then(TypeRef::named) {
        if !ctx.is_shared(name)? {
            ctx.log.log_error(format!(
                "Operation '{}' on service '{}' returns '{}', which is not available to the client.",
                operation.name, service.name, name
            ));
            return Ok(None);
        }
    }
    let Some(parameters) = parameters(ctx, namespace, service, operation)? else {
        return Ok(None);
    };

    let (return_type, type_args) = match &operation.return_type {
        Some(returns) => {
            let returns = ctx.client_type(namespace, returns)?;
            (
                ClientType::framework_generic("InvokeOperation", returns.clone()),
                vec![returns],
            )
        }
        None => (ClientType::framework("InvokeOperation"), Vec::new()),
    };

    let body = vec![Stmt::Return(Some(Expr::This.call_generic(
        "InvokeOperation",
        type_args,
        vec![
            Expr::str(operation.name.clone()),
            parameter_bag(&parameters),
            Expr::bool(operation.has_side_effects),
        ],
    )))];

    Ok(Some(MethodDecl {
        parameters,
        return_type: Some(return_type),
        body,
        ..MethodDecl::new(operation.name.clone())
    }))
}

fn custom(
    ctx: &mut GenerationContext<'_>,
    namespace: &str,
    service: &ServiceDescriptor,
    operation: &OperationDescriptor,
) -> Result<Option<MethodDecl>, GeneratorError> {
    let Some(entity_name) = operation.entity.as_ref() else {
        ctx.log.log_error(format!(
            "Custom operation '{}' on service '{}' is not bound to an entity.",
            operation.name, service.name
        ));
        return Ok(None);
    };
    let Some(parameters) = parameters(ctx, namespace, service, operation)? else {
        return Ok(None);
    };

    let shared = ctx.is_shared(entity_name)?;
    let entity = ClientType::Named(ctx.type_reference(namespace, entity_name, shared));

    let parameter_types: Vec<String> = operation
        .parameters
        .iter()
        .map(|p| p.ty.to_string())
        .collect();
    let entity_side_shared =
        shared || ctx.is_method_shared(entity_name, &operation.name, &parameter_types)?;
    if !entity_side_shared && !ctx.skipped.contains(entity_name) {
        add_entity_members(ctx, entity_name, operation, &parameters);
    }

    let forwarded = parameters
        .iter()
        .map(|p| Expr::local(p.name.clone()))
        .collect();
    let mut context_parameters = vec![ParameterDecl::new("entity", entity)];
    context_parameters.extend(parameters);

    Ok(Some(MethodDecl {
        parameters: context_parameters,
        body: vec![Stmt::Expr(
            Expr::local("entity").call(operation.name.clone(), forwarded),
        )],
        ..MethodDecl::new(operation.name.clone())
    }))
}

/// Invoking method, guard and status check on the bound entity
fn add_entity_members(
    ctx: &mut GenerationContext<'_>,
    entity_name: &TypeName,
    operation: &OperationDescriptor,
    parameters: &[ParameterDecl],
) {
    let namespace = ctx.client_namespace(&entity_name.namespace);
    let Some(decl) = ctx.graph.find_type_mut(&namespace, &entity_name.name) else {
        return;
    };

    let guard = format!("Can{}", operation.name);
    let status = format!("Is{}Invoked", operation.name);
    if let Some(existing) = [&operation.name, &guard, &status]
        .into_iter()
        .find(|name| decl.has_member(name))
    {
        let message = format!(
            "Custom operation '{}' cannot be added to '{}': member '{}' already exists.",
            operation.name, entity_name, existing
        );
        ctx.log.log_error(message);
        return;
    }

    let mut invoke_args = vec![Expr::str(operation.name.clone())];
    invoke_args.extend(parameters.iter().map(|p| Expr::local(p.name.clone())));

    decl.members.push(Member::Method(MethodDecl {
        parameters: parameters.to_vec(),
        body: vec![Stmt::Expr(Expr::This.call("InvokeAction", invoke_args))],
        ..MethodDecl::new(operation.name.clone())
    }));
    decl.members.push(Member::Method(MethodDecl {
        return_type: Some(ClientType::Scalar(ScalarType::Bool)),
        body: vec![Stmt::Return(Some(Expr::This.call(
            "CanInvokeAction",
            vec![Expr::str(operation.name.clone())],
        )))],
        ..MethodDecl::new(guard)
    }));
    decl.members.push(Member::Method(MethodDecl {
        return_type: Some(ClientType::Scalar(ScalarType::Bool)),
        body: vec![Stmt::Return(Some(Expr::This.call(
            "IsActionInvoked",
            vec![Expr::str(operation.name.clone())],
        )))],
        ..MethodDecl::new(status)
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::entity;
    use crate::codegen::tests::{key_prop, order_customer_model};
    use crate::descriptor::{DomainModel, TypeCatalog, TypeDescriptor};
    use crate::diagnostics::{Diagnostics, LogSink};
    use crate::graph::GeneratedTypeGraph;
    use crate::options::GenerationOptions;
    use crate::sharing::NothingShared;

    fn catalog_service(operations: Vec<OperationDescriptor>) -> DomainModel {
        let product = TypeName::parse("Shop.Product");
        let catalog = TypeCatalog::new().with_type(
            TypeDescriptor::entity(product.clone())
                .with_property(key_prop(&product, "ProductID", ScalarType::Int32)),
        );
        let mut service = ServiceDescriptor::new(TypeName::parse("Shop.CatalogService"));
        for operation in operations {
            service = service.with_operation(operation);
        }
        DomainModel::new(catalog, vec![service]).unwrap()
    }

    fn run(model: &DomainModel) -> (GeneratedTypeGraph, Diagnostics) {
        let options = GenerationOptions::new("Rust");
        let mut log = Diagnostics::new();
        let graph = {
            let mut ctx = GenerationContext::new(model, &options, &NothingShared, &mut log);
            let entities: Vec<_> = ctx.hierarchy.exposed_entities().cloned().collect();
            for name in &entities {
                entity::generate_type(&mut ctx, name).unwrap();
            }
            for service in model.services() {
                generate(&mut ctx, service).unwrap();
            }
            ctx.graph
        };
        (graph, log)
    }

    fn products() -> TypeRef {
        TypeRef::collection(TypeRef::entity(TypeName::parse("Shop.Product")))
    }

    #[test]
    fn test_context_surface() {
        let product = TypeName::parse("Shop.Product");
        let model = catalog_service(vec![
            OperationDescriptor::query("GetProducts", products()).with_parameter(
                ParameterDescriptor::new("category", TypeRef::scalar(ScalarType::String)),
            ),
            OperationDescriptor::invoke("CountProducts", Some(TypeRef::scalar(ScalarType::Int32))),
            OperationDescriptor::custom("Discontinue", product),
        ]);
        let (graph, log) = run(&model);
        assert!(!log.has_errors(), "{:?}", log.entries());

        let context = graph.find_type("Shop", "CatalogContext").unwrap();
        assert_eq!(context.base, Some(ClientType::framework(CONTEXT_BASE)));
        assert!(context.property("Products").is_some());
        assert!(context.method("CreateEntityContainer").is_some());
        assert_eq!(
            context.method("GetProductsQuery").unwrap().parameters.len(),
            1
        );
        assert!(context.method("CountProducts").is_some());
        assert_eq!(context.method("Discontinue").unwrap().parameters[0].name, "entity");

        let constructor = context.method("new").unwrap();
        assert_eq!(constructor.kind, MethodKind::Constructor);

        let entity = graph.find_type("Shop", "Product").unwrap();
        assert!(entity.method("Discontinue").is_some());
        assert!(entity.method("CanDiscontinue").is_some());
        assert!(entity.method("IsDiscontinueInvoked").is_some());
    }

    #[test]
    fn test_query_must_return_entities() {
        let model = catalog_service(vec![OperationDescriptor::query(
            "GetNames",
            TypeRef::collection(TypeRef::scalar(ScalarType::String)),
        )]);
        let (graph, log) = run(&model);
        assert_eq!(log.errors().count(), 1);
        assert!(graph
            .find_type("Shop", "CatalogContext")
            .unwrap()
            .method("GetNamesQuery")
            .is_none());
    }

    #[test]
    fn test_member_collision_is_error() {
        let model = catalog_service(vec![
            OperationDescriptor::query("GetProducts", products()),
            OperationDescriptor::invoke("GetProductsQuery", None),
        ]);
        let (_, log) = run(&model);
        assert_eq!(log.errors().count(), 1);
        assert!(log.errors().next().unwrap().message.contains("GetProductsQuery"));
    }

    #[test]
    fn test_entity_parameter_rejected_on_invoke() {
        let model = catalog_service(vec![
            OperationDescriptor::query("GetProducts", products()),
            OperationDescriptor::invoke("Touch", None).with_parameter(ParameterDescriptor::new(
                "product",
                TypeRef::entity(TypeName::parse("Shop.Product")),
            )),
        ]);
        let (_, log) = run(&model);
        assert_eq!(log.errors().count(), 1);
    }

    #[test]
    fn test_entity_sets_use_roots() {
        let model = order_customer_model();
        let (graph, _) = run(&model);
        let context = graph.find_type("Shop", "OrderContext").unwrap();
        assert!(context.property("Orders").is_some());
        assert!(context.property("Customers").is_some());
    }
}
