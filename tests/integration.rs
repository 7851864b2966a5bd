//! Integration tests for domain-client-gen
//!
//! These tests exercise the full pipeline: request bytes in, rendered
//! client source and diagnostics out.

use domain_client_gen::descriptor::{
    AssociationDescriptor, DomainModel, PropertyAttribute, PropertyDescriptor, ScalarType,
    ServiceDescriptor, TypeCatalog, TypeDescriptor, TypeName, TypeRef,
};
use domain_client_gen::diagnostics::{LogEntry, Severity};
use domain_client_gen::generator::builtin_candidates;
use domain_client_gen::options::GenerationOptions;
use domain_client_gen::sharing::{NothingShared, ShareKind, SharedTypeSet};
use domain_client_gen::wire::{
    AssociationProto, AttributeKind, GenerationRequest, OperationKindProto, OperationProto,
    PropertyAttributeProto, PropertyProto, ServiceProto, SharedSymbol, TypeKindProto, TypeProto,
    TypeRefKind, TypeRefProto,
};
use domain_client_gen::{generate, generate_from_bytes, GeneratorError};
use prost::Message;

fn scalar(name: &str) -> TypeRefProto {
    TypeRefProto {
        kind: TypeRefKind::Scalar as i32,
        name: name.to_string(),
        element: None,
    }
}

fn entity_ref(name: &str) -> TypeRefProto {
    TypeRefProto {
        kind: TypeRefKind::Entity as i32,
        name: name.to_string(),
        element: None,
    }
}

fn collection(element: TypeRefProto) -> TypeRefProto {
    TypeRefProto {
        kind: TypeRefKind::Collection as i32,
        name: String::new(),
        element: Some(Box::new(element)),
    }
}

fn attribute(kind: AttributeKind) -> PropertyAttributeProto {
    PropertyAttributeProto {
        kind: kind as i32,
        ..Default::default()
    }
}

fn property(name: &str, ty: TypeRefProto, attributes: Vec<PropertyAttributeProto>) -> PropertyProto {
    PropertyProto {
        name: name.to_string(),
        ty: Some(ty),
        attributes,
        ..Default::default()
    }
}

fn association(name: &str, key: &str, is_foreign_key: bool, target: &str) -> PropertyAttributeProto {
    PropertyAttributeProto {
        kind: AttributeKind::Association as i32,
        association: Some(AssociationProto {
            name: name.to_string(),
            this_key: vec![key.to_string()],
            other_key: vec![key.to_string()],
            is_foreign_key,
            target: target.to_string(),
        }),
        ..Default::default()
    }
}

/// Order belongs to Customer; Customer has many Orders
fn shop_request() -> GenerationRequest {
    let order = TypeProto {
        name: "Shop.Order".to_string(),
        kind: TypeKindProto::Entity as i32,
        properties: vec![
            property("OrderID", scalar("int"), vec![attribute(AttributeKind::Key)]),
            property("CustomerID", scalar("int"), Vec::new()),
            property(
                "Customer",
                entity_ref("Shop.Customer"),
                vec![association("Customer_Order", "CustomerID", true, "Shop.Customer")],
            ),
        ],
        ..Default::default()
    };
    let customer = TypeProto {
        name: "Shop.Customer".to_string(),
        kind: TypeKindProto::Entity as i32,
        properties: vec![
            property("CustomerID", scalar("int"), vec![attribute(AttributeKind::Key)]),
            property("Name", scalar("string"), Vec::new()),
            property(
                "Orders",
                collection(entity_ref("Shop.Order")),
                vec![association("Customer_Order", "CustomerID", false, "Shop.Order")],
            ),
        ],
        ..Default::default()
    };
    let service = ServiceProto {
        name: "Shop.OrderService".to_string(),
        operations: vec![OperationProto {
            name: "GetOrders".to_string(),
            kind: OperationKindProto::Query as i32,
            return_type: Some(collection(entity_ref("Shop.Order"))),
            is_composable: true,
            ..Default::default()
        }],
        entity_types: vec!["Shop.Customer".to_string()],
        ..Default::default()
    };

    GenerationRequest {
        parameter: "language=Rust,file_name=shop_client.rs".to_string(),
        types: vec![order, customer],
        services: vec![service],
        ..Default::default()
    }
}

fn run(request: GenerationRequest) -> domain_client_gen::wire::GenerationResponse {
    generate_from_bytes(&request.encode_to_vec()).unwrap()
}

fn entries(response: &domain_client_gen::wire::GenerationResponse) -> Vec<LogEntry> {
    response.log.iter().map(LogEntry::from).collect()
}

#[test]
fn test_generate_entities_and_context() {
    let response = run(shop_request());
    assert!(!response.has_errors, "{:?}", entries(&response));
    assert!(response.error.is_none());

    let source = response.source.unwrap();
    assert!(source.starts_with("// Code generated by domain-client-gen. DO NOT EDIT."));
    assert!(source.contains("// File: shop_client.rs"));
    assert!(source.contains("pub mod shop"));
    assert!(source.contains("pub struct Order"));
    assert!(source.contains("pub struct Customer"));
    assert!(source.contains("pub struct OrderContext"));
    assert!(source.contains("pub fn order_id(&self) -> i32"));
}

#[test]
fn test_context_exposes_entity_sets_and_queries() {
    let source = run(shop_request()).source.unwrap();
    assert!(source.contains("fn orders("));
    assert!(source.contains("fn customers("));
    assert!(source.contains("fn get_orders_query("));
    assert!(source.contains("\"OrderService.svc\""));
}

#[test]
fn test_missing_reverse_is_warning_only() {
    let mut request = shop_request();
    request.types[1].properties.retain(|p| p.name != "Orders");

    let response = run(request);
    assert!(!response.has_errors);
    assert!(response.source.is_some());
    let warnings: Vec<LogEntry> = entries(&response)
        .into_iter()
        .filter(|e| e.severity == Severity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("Customer_Order"));
}

#[test]
fn test_excluded_property_is_not_generated() {
    let mut request = shop_request();
    request.types[1].properties.push(property(
        "Secret",
        scalar("string"),
        vec![attribute(AttributeKind::Exclude)],
    ));

    let source = run(request).source.unwrap();
    assert!(source.contains("pub fn name(&self)"));
    assert!(!source.contains("fn secret("));
}

#[test]
fn test_shared_entity_is_referenced_not_generated() {
    let mut request = shop_request();
    request.shared_types.push(SharedSymbol {
        type_name: "Shop.Customer".to_string(),
        shared_by_reference: true,
        ..Default::default()
    });

    let response = run(request);
    assert!(!response.has_errors, "{:?}", entries(&response));
    let source = response.source.unwrap();
    assert!(source.contains("pub struct Order"));
    assert!(!source.contains("pub struct Customer"));
}

#[test]
fn test_unknown_generator_name_suppresses_output() {
    let mut request = shop_request();
    request.parameter = "language=Rust,generator=Fancy".to_string();

    let response = run(request);
    assert!(response.has_errors);
    assert!(response.source.is_none());
    let errors: Vec<LogEntry> = entries(&response)
        .into_iter()
        .filter(|e| e.severity.is_error())
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("Fancy"));
}

#[test]
fn test_unsupported_language_logs_error() {
    let mut request = shop_request();
    request.parameter = "language=VB".to_string();

    let response = run(request);
    assert!(response.has_errors);
    assert!(response.source.is_none());
}

#[test]
fn test_missing_language_is_invalid_config() {
    let mut request = shop_request();
    request.parameter = String::new();

    let result = generate_from_bytes(&request.encode_to_vec());
    assert!(matches!(result, Err(GeneratorError::InvalidConfig(_))));
}

#[test]
fn test_dangling_type_reference_is_invalid_descriptor() {
    let mut request = shop_request();
    request.types[0]
        .properties
        .push(property("Invoice", entity_ref("Shop.Invoice"), Vec::new()));

    let result = generate_from_bytes(&request.encode_to_vec());
    assert!(matches!(result, Err(GeneratorError::InvalidDescriptor(_))));
}

#[test]
fn test_garbage_input_is_decode_error() {
    let result = generate_from_bytes(b"\x0a\xff\xff\xff");
    assert!(matches!(result, Err(GeneratorError::DecodeError(_))));
}

#[test]
fn test_web_context_generated_when_enabled() {
    let mut request = shop_request();
    request.parameter =
        "language=Rust,enable_application_level_context=true,server_root_namespace=Shop,client_root_namespace=Storefront"
            .to_string();

    let response = run(request);
    assert!(!response.has_errors, "{:?}", entries(&response));
    let source = response.source.unwrap();
    assert!(source.contains("pub mod storefront"));
    assert!(source.contains("pub struct WebContext"));
}

/// Builds the same shape through the descriptor API instead of the wire
fn library_model() -> DomainModel {
    let book = TypeName::parse("Library.Book");
    let catalog = TypeCatalog::new().with_type(
        TypeDescriptor::entity(book.clone())
            .with_property(
                PropertyDescriptor::new("Isbn", TypeRef::scalar(ScalarType::String), book.clone())
                    .with_attribute(PropertyAttribute::Key),
            )
            .with_property(PropertyDescriptor::new(
                "Title",
                TypeRef::scalar(ScalarType::String),
                book.clone(),
            )),
    );
    let service = ServiceDescriptor::new(TypeName::parse("Library.LendingService")).with_entity(book);
    DomainModel::new(catalog, vec![service]).unwrap()
}

#[test]
fn test_generate_with_descriptor_api() {
    let output = generate(
        &library_model(),
        &GenerationOptions::new("Rust"),
        &NothingShared,
        &builtin_candidates(),
    )
    .unwrap();
    assert!(!output.has_errors, "{:?}", output.log);
    let source = output.source.unwrap();
    assert!(source.contains("pub mod library"));
    assert!(source.contains("pub struct Book"));
    assert!(source.contains("pub struct LendingContext"));
}

#[test]
fn test_generation_is_deterministic() {
    let options = GenerationOptions::new("Rust");
    let first = generate(&library_model(), &options, &NothingShared, &builtin_candidates()).unwrap();
    let second = generate(&library_model(), &options, &NothingShared, &builtin_candidates()).unwrap();
    assert_eq!(first.source, second.source);
}

#[test]
fn test_association_to_unknown_entity_rejected() {
    let book = TypeName::parse("Library.Book");
    let catalog = TypeCatalog::new().with_type(
        TypeDescriptor::entity(book.clone()).with_property(
            PropertyDescriptor::new(
                "Author",
                TypeRef::entity(TypeName::parse("Library.Author")),
                book.clone(),
            )
            .with_attribute(PropertyAttribute::Association(AssociationDescriptor {
                name: "Author_Book".to_string(),
                this_key: vec!["AuthorId".to_string()],
                other_key: vec!["AuthorId".to_string()],
                is_foreign_key: true,
                target: TypeName::parse("Library.Author"),
            })),
        ),
    );
    let result = DomainModel::new(catalog, Vec::new());
    assert!(matches!(result, Err(GeneratorError::InvalidDescriptor(_))));
}

#[test]
fn test_shared_type_set_marks_property() {
    let shared = SharedTypeSet::new().with_property("Library.Book", "Title", ShareKind::SHARED_BY_SOURCE);
    let output = generate(&library_model(), &GenerationOptions::new("Rust"), &shared, &builtin_candidates())
        .unwrap();
    let source = output.source.unwrap();
    assert!(source.contains("pub fn isbn(&self)"));
    assert!(!source.contains("pub fn title(&self)"));
}
