//! Request and response messages for the generator process
//!
//! The host runs generation behind a process boundary: it writes one
//! [`GenerationRequest`] to the generator's stdin and reads one
//! [`GenerationResponse`] back. The response carries the full log so the
//! host can replay it into its own sink.

use crate::descriptor::{
    AssociationDescriptor, AttributeDescriptor, DomainModel, EnumDescriptor, EnumMember,
    NamedKind, OperationDescriptor, ParameterDescriptor, Polymorphism,
    PropertyAttribute, PropertyDescriptor, ScalarType, ServiceDescriptor, TypeCatalog,
    TypeDescriptor, TypeKind, TypeName, TypeRef,
};
use crate::diagnostics::{LogEntry, Severity};
use crate::options::GenerationOptions;
use crate::sharing::{ShareKind, SharedTypeSet};
use crate::GeneratorError;

/// Everything one generation pass needs
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GenerationRequest {
    /// Options in parameter form, e.g. `language=Rust`
    #[prost(string, tag = "1")]
    pub parameter: String,
    /// Entity and complex type descriptors, exposed or not
    #[prost(message, repeated, tag = "2")]
    pub types: Vec<TypeProto>,
    /// Enum descriptors
    #[prost(message, repeated, tag = "3")]
    pub enums: Vec<EnumProto>,
    /// Exposed services
    #[prost(message, repeated, tag = "4")]
    pub services: Vec<ServiceProto>,
    /// Types the client project already sees
    #[prost(message, repeated, tag = "5")]
    pub shared_types: Vec<SharedSymbol>,
    /// Properties the client project already sees
    #[prost(message, repeated, tag = "6")]
    pub shared_properties: Vec<SharedSymbol>,
    /// Methods the client project already sees
    #[prost(message, repeated, tag = "7")]
    pub shared_methods: Vec<SharedSymbol>,
}

/// Shape of a type reference
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TypeRefKind {
    /// Predefined scalar named by `name`
    Scalar = 0,
    /// Entity type
    Entity = 1,
    /// Complex type
    Complex = 2,
    /// Enum type
    Enum = 3,
    /// Any other named type
    Other = 4,
    /// Nullable `element`
    Nullable = 5,
    /// Collection of `element`
    Collection = 6,
}

/// A type reference
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TypeRefProto {
    /// Shape
    #[prost(enumeration = "TypeRefKind", tag = "1")]
    pub kind: i32,
    /// Scalar name or qualified type name
    #[prost(string, tag = "2")]
    pub name: String,
    /// Wrapped type for nullable and collection references
    #[prost(message, optional, boxed, tag = "3")]
    pub element: Option<Box<TypeRefProto>>,
}

/// A free-form attribute
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AttributeProto {
    /// Qualified attribute type
    #[prost(string, tag = "1")]
    pub type_name: String,
    /// Arguments in source form
    #[prost(string, repeated, tag = "2")]
    pub arguments: Vec<String>,
}

/// Association metadata
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AssociationProto {
    /// Association name
    #[prost(string, tag = "1")]
    pub name: String,
    /// Key members on this side
    #[prost(string, repeated, tag = "2")]
    pub this_key: Vec<String>,
    /// Key members on the other side
    #[prost(string, repeated, tag = "3")]
    pub other_key: Vec<String>,
    /// This side stores the foreign key
    #[prost(bool, tag = "4")]
    pub is_foreign_key: bool,
    /// Qualified target entity
    #[prost(string, tag = "5")]
    pub target: String,
}

/// Property attribute vocabulary
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AttributeKind {
    /// Key member
    Key = 0,
    /// Navigation property; `association` is set
    Association = 1,
    /// Excluded from the client
    Exclude = 2,
    /// Included explicitly
    Include = 3,
    /// Association target outside this pass
    ExternalReference = 4,
    /// Read-only
    ReadOnly = 5,
    /// Editable; see `allow_edit` and `allow_initial_value`
    Editable = 6,
    /// Original value round-trips
    RoundtripOriginal = 7,
    /// Serialized data member
    DataMember = 8,
    /// Free-form; `custom` is set
    Custom = 9,
}

/// One property attribute
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PropertyAttributeProto {
    /// Attribute kind
    #[prost(enumeration = "AttributeKind", tag = "1")]
    pub kind: i32,
    /// Set for `Association`
    #[prost(message, optional, tag = "2")]
    pub association: Option<AssociationProto>,
    /// For `Editable`
    #[prost(bool, tag = "3")]
    pub allow_edit: bool,
    /// For `Editable`
    #[prost(bool, tag = "4")]
    pub allow_initial_value: bool,
    /// Set for `Custom`
    #[prost(message, optional, tag = "5")]
    pub custom: Option<AttributeProto>,
}

/// Polymorphic shape of a property
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PolymorphismKind {
    /// Plain
    None = 0,
    /// Virtual, not sealed
    Virtual = 1,
    /// Overrides `polymorphism_base`
    Override = 2,
    /// Hides a member of `polymorphism_base`
    Hides = 3,
}

/// A property
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PropertyProto {
    /// Property name
    #[prost(string, tag = "1")]
    pub name: String,
    /// Declared type
    #[prost(message, optional, tag = "2")]
    pub ty: Option<TypeRefProto>,
    /// Declaring type; defaults to the owning type
    #[prost(string, tag = "3")]
    pub declaring_type: String,
    /// Attributes
    #[prost(message, repeated, tag = "4")]
    pub attributes: Vec<PropertyAttributeProto>,
    /// Polymorphic shape
    #[prost(enumeration = "PolymorphismKind", tag = "5")]
    pub polymorphism: i32,
    /// Base type for overrides and hiding
    #[prost(string, tag = "6")]
    pub polymorphism_base: String,
    /// Override is sealed
    #[prost(bool, tag = "7")]
    pub sealed: bool,
}

/// Entity or complex
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TypeKindProto {
    /// Entity
    Entity = 0,
    /// Complex type
    Complex = 1,
}

/// An entity or complex type
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TypeProto {
    /// Qualified name
    #[prost(string, tag = "1")]
    pub name: String,
    /// Entity or complex
    #[prost(enumeration = "TypeKindProto", tag = "2")]
    pub kind: i32,
    /// Qualified declared base type, empty for none
    #[prost(string, tag = "3")]
    pub base: String,
    /// Properties declared on this type
    #[prost(message, repeated, tag = "4")]
    pub properties: Vec<PropertyProto>,
    /// Class-level attributes
    #[prost(message, repeated, tag = "5")]
    pub attributes: Vec<AttributeProto>,
    /// Abstract type
    #[prost(bool, tag = "6")]
    pub is_abstract: bool,
    /// Explicit key member order
    #[prost(string, repeated, tag = "7")]
    pub key_members: Vec<String>,
}

/// An enum member
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnumMemberProto {
    /// Member name
    #[prost(string, tag = "1")]
    pub name: String,
    /// Value
    #[prost(int64, tag = "2")]
    pub value: i64,
}

/// An enum type
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnumProto {
    /// Qualified name
    #[prost(string, tag = "1")]
    pub name: String,
    /// Members in declaration order
    #[prost(message, repeated, tag = "2")]
    pub members: Vec<EnumMemberProto>,
    /// Bit-flag enum
    #[prost(bool, tag = "3")]
    pub is_flags: bool,
    /// Not public
    #[prost(bool, tag = "4")]
    pub is_non_public: bool,
    /// Nested in another type
    #[prost(bool, tag = "5")]
    pub is_nested: bool,
    /// Defined in a system assembly
    #[prost(bool, tag = "6")]
    pub is_system: bool,
}

/// Operation kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OperationKindProto {
    /// Query
    Query = 0,
    /// Invoke
    Invoke = 1,
    /// Entity-bound custom operation
    Custom = 2,
}

/// An operation parameter
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ParameterProto {
    /// Name
    #[prost(string, tag = "1")]
    pub name: String,
    /// Type
    #[prost(message, optional, tag = "2")]
    pub ty: Option<TypeRefProto>,
    /// Attributes
    #[prost(message, repeated, tag = "3")]
    pub attributes: Vec<AttributeProto>,
}

/// A service operation
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OperationProto {
    /// Name
    #[prost(string, tag = "1")]
    pub name: String,
    /// Kind
    #[prost(enumeration = "OperationKindProto", tag = "2")]
    pub kind: i32,
    /// Parameters
    #[prost(message, repeated, tag = "3")]
    pub parameters: Vec<ParameterProto>,
    /// Return type, absent for void
    #[prost(message, optional, tag = "4")]
    pub return_type: Option<TypeRefProto>,
    /// Bound entity for custom operations
    #[prost(string, tag = "5")]
    pub entity: String,
    /// Query has side effects
    #[prost(bool, tag = "6")]
    pub has_side_effects: bool,
    /// Query is composable
    #[prost(bool, tag = "7")]
    pub is_composable: bool,
}

/// An exposed service
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceProto {
    /// Qualified name
    #[prost(string, tag = "1")]
    pub name: String,
    /// Operations
    #[prost(message, repeated, tag = "2")]
    pub operations: Vec<OperationProto>,
    /// Entities exposed explicitly
    #[prost(string, repeated, tag = "3")]
    pub entity_types: Vec<String>,
    /// Complex types exposed explicitly
    #[prost(string, repeated, tag = "4")]
    pub complex_types: Vec<String>,
    /// Class-level attributes
    #[prost(message, repeated, tag = "5")]
    pub attributes: Vec<AttributeProto>,
}

/// A symbol the client project already sees
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SharedSymbol {
    /// Qualified type name
    #[prost(string, tag = "1")]
    pub type_name: String,
    /// Property or method name; empty for types
    #[prost(string, tag = "2")]
    pub member: String,
    /// Method parameter type names
    #[prost(string, repeated, tag = "3")]
    pub parameter_types: Vec<String>,
    /// Visible through shared source
    #[prost(bool, tag = "4")]
    pub shared_by_source: bool,
    /// Visible through a referenced binary
    #[prost(bool, tag = "5")]
    pub shared_by_reference: bool,
}

/// Log severities on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SeverityProto {
    /// Message
    Message = 0,
    /// Warning
    Warning = 1,
    /// Error
    Error = 2,
    /// Exception
    Exception = 3,
}

/// One log entry
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogEntryProto {
    /// Severity
    #[prost(enumeration = "SeverityProto", tag = "1")]
    pub severity: i32,
    /// Message
    #[prost(string, tag = "2")]
    pub message: String,
    /// Exception detail
    #[prost(string, optional, tag = "3")]
    pub detail: Option<String>,
}

/// Result of a pass
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GenerationResponse {
    /// Generated source, absent when the pass logged errors
    #[prost(string, optional, tag = "1")]
    pub source: Option<String>,
    /// Everything the pass logged, in order
    #[prost(message, repeated, tag = "2")]
    pub log: Vec<LogEntryProto>,
    /// At least one error was logged
    #[prost(bool, tag = "3")]
    pub has_errors: bool,
    /// Set when the pass aborted
    #[prost(string, optional, tag = "4")]
    pub error: Option<String>,
}

impl From<&LogEntry> for LogEntryProto {
    fn from(entry: &LogEntry) -> Self {
        let severity = match entry.severity {
            Severity::Message => SeverityProto::Message,
            Severity::Warning => SeverityProto::Warning,
            Severity::Error => SeverityProto::Error,
            Severity::Exception => SeverityProto::Exception,
        };
        Self {
            severity: severity as i32,
            message: entry.message.clone(),
            detail: entry.detail.clone(),
        }
    }
}

impl From<&LogEntryProto> for LogEntry {
    fn from(entry: &LogEntryProto) -> Self {
        let severity = match entry.severity() {
            SeverityProto::Message => Severity::Message,
            SeverityProto::Warning => Severity::Warning,
            SeverityProto::Error => Severity::Error,
            SeverityProto::Exception => Severity::Exception,
        };
        Self {
            severity,
            message: entry.message.clone(),
            detail: entry.detail.clone(),
        }
    }
}

/// A request decoded into the descriptor model
#[derive(Debug, Clone)]
pub struct DecodedRequest {
    /// Validated descriptors
    pub model: DomainModel,
    /// Parsed options
    pub options: GenerationOptions,
    /// The host's shared-type knowledge
    pub shared: SharedTypeSet,
}

fn invalid(message: String) -> GeneratorError {
    GeneratorError::InvalidDescriptor(message)
}

fn enum_value<T: TryFrom<i32>>(value: i32, what: &str) -> Result<T, GeneratorError> {
    T::try_from(value).map_err(|_| invalid(format!("unknown {} value {}", what, value)))
}

fn type_name(name: &str, what: &str) -> Result<TypeName, GeneratorError> {
    if name.trim().is_empty() {
        return Err(invalid(format!("{} has an empty type name", what)));
    }
    Ok(TypeName::parse(name))
}

fn optional_type_name(name: &str) -> Option<TypeName> {
    if name.is_empty() {
        None
    } else {
        Some(TypeName::parse(name))
    }
}

impl TryFrom<&TypeRefProto> for TypeRef {
    type Error = GeneratorError;

    fn try_from(proto: &TypeRefProto) -> Result<Self, Self::Error> {
        let named = |kind| -> Result<TypeRef, GeneratorError> {
            Ok(TypeRef::Named {
                name: type_name(&proto.name, "type reference")?,
                kind,
            })
        };
        let element = || -> Result<TypeRef, GeneratorError> {
            match &proto.element {
                Some(element) => TypeRef::try_from(element.as_ref()),
                None => Err(invalid(format!(
                    "wrapper type reference '{}' has no element",
                    proto.name
                ))),
            }
        };

        match enum_value::<TypeRefKind>(proto.kind, "type reference kind")? {
            TypeRefKind::Scalar => ScalarType::from_name(&proto.name)
                .map(TypeRef::Scalar)
                .ok_or_else(|| invalid(format!("'{}' is not a predefined type", proto.name))),
            TypeRefKind::Entity => named(NamedKind::Entity),
            TypeRefKind::Complex => named(NamedKind::Complex),
            TypeRefKind::Enum => named(NamedKind::Enum),
            TypeRefKind::Other => named(NamedKind::Other),
            TypeRefKind::Nullable => Ok(TypeRef::nullable(element()?)),
            TypeRefKind::Collection => Ok(TypeRef::collection(element()?)),
        }
    }
}

fn required_type(ty: &Option<TypeRefProto>, what: &str) -> Result<TypeRef, GeneratorError> {
    match ty {
        Some(ty) => TypeRef::try_from(ty),
        None => Err(invalid(format!("{} has no type", what))),
    }
}

impl TryFrom<&AttributeProto> for AttributeDescriptor {
    type Error = GeneratorError;

    fn try_from(proto: &AttributeProto) -> Result<Self, Self::Error> {
        Ok(AttributeDescriptor::new(
            type_name(&proto.type_name, "attribute")?,
            proto.arguments.clone(),
        ))
    }
}

fn attributes(protos: &[AttributeProto]) -> Result<Vec<AttributeDescriptor>, GeneratorError> {
    protos.iter().map(AttributeDescriptor::try_from).collect()
}

fn property_attribute(
    proto: &PropertyAttributeProto,
    property: &str,
) -> Result<PropertyAttribute, GeneratorError> {
    Ok(match enum_value::<AttributeKind>(proto.kind, "attribute kind")? {
        AttributeKind::Key => PropertyAttribute::Key,
        AttributeKind::Association => {
            let association = proto.association.as_ref().ok_or_else(|| {
                invalid(format!("association attribute on '{}' has no association", property))
            })?;
            if association.this_key.len() != association.other_key.len() {
                return Err(invalid(format!(
                    "association '{}' on '{}' has {} this-side keys but {} other-side keys",
                    association.name,
                    property,
                    association.this_key.len(),
                    association.other_key.len()
                )));
            }
            PropertyAttribute::Association(AssociationDescriptor {
                name: association.name.clone(),
                this_key: association.this_key.clone(),
                other_key: association.other_key.clone(),
                is_foreign_key: association.is_foreign_key,
                target: type_name(&association.target, "association target")?,
            })
        }
        AttributeKind::Exclude => PropertyAttribute::Exclude,
        AttributeKind::Include => PropertyAttribute::Include,
        AttributeKind::ExternalReference => PropertyAttribute::ExternalReference,
        AttributeKind::ReadOnly => PropertyAttribute::ReadOnly,
        AttributeKind::Editable => PropertyAttribute::Editable {
            allow_edit: proto.allow_edit,
            allow_initial_value: proto.allow_initial_value,
        },
        AttributeKind::RoundtripOriginal => PropertyAttribute::RoundtripOriginal,
        AttributeKind::DataMember => PropertyAttribute::DataMember,
        AttributeKind::Custom => match &proto.custom {
            Some(custom) => PropertyAttribute::Custom(custom.try_into()?),
            None => {
                return Err(invalid(format!(
                    "custom attribute on '{}' has no attribute",
                    property
                )))
            }
        },
    })
}

fn property(proto: &PropertyProto, owner: &TypeName) -> Result<PropertyDescriptor, GeneratorError> {
    let declaring_type = optional_type_name(&proto.declaring_type).unwrap_or_else(|| owner.clone());
    let polymorphism = match enum_value::<PolymorphismKind>(proto.polymorphism, "polymorphism")? {
        PolymorphismKind::None => Polymorphism::None,
        PolymorphismKind::Virtual => Polymorphism::Virtual,
        PolymorphismKind::Override => Polymorphism::Override {
            base: type_name(&proto.polymorphism_base, "overridden property base")?,
            sealed: proto.sealed,
        },
        PolymorphismKind::Hides => Polymorphism::Hides {
            base: type_name(&proto.polymorphism_base, "hidden property base")?,
        },
    };

    let mut descriptor = PropertyDescriptor::new(
        proto.name.clone(),
        required_type(&proto.ty, &format!("property '{}.{}'", owner, proto.name))?,
        declaring_type,
    )
    .with_polymorphism(polymorphism);
    for attribute in &proto.attributes {
        descriptor = descriptor.with_attribute(property_attribute(attribute, &proto.name)?);
    }
    Ok(descriptor)
}

impl TryFrom<&TypeProto> for TypeDescriptor {
    type Error = GeneratorError;

    fn try_from(proto: &TypeProto) -> Result<Self, Self::Error> {
        let name = type_name(&proto.name, "type")?;
        let mut descriptor = match enum_value::<TypeKindProto>(proto.kind, "type kind")? {
            TypeKindProto::Entity => TypeDescriptor::entity(name.clone()),
            TypeKindProto::Complex => TypeDescriptor::complex(name.clone()),
        }
        .with_abstract(proto.is_abstract)
        .with_key_members(proto.key_members.clone());

        if let Some(base) = optional_type_name(&proto.base) {
            descriptor = descriptor.with_base(base);
        }
        for attribute in attributes(&proto.attributes)? {
            descriptor = descriptor.with_attribute(attribute);
        }
        for p in &proto.properties {
            descriptor = descriptor.with_property(property(p, &name)?);
        }
        Ok(descriptor)
    }
}

impl TryFrom<&EnumProto> for EnumDescriptor {
    type Error = GeneratorError;

    fn try_from(proto: &EnumProto) -> Result<Self, Self::Error> {
        let members = proto
            .members
            .iter()
            .map(|m| EnumMember {
                name: m.name.clone(),
                value: m.value,
            })
            .collect();
        let mut descriptor = EnumDescriptor::new(type_name(&proto.name, "enum")?, members);
        descriptor.is_flags = proto.is_flags;
        descriptor.is_public = !proto.is_non_public;
        descriptor.is_nested = proto.is_nested;
        descriptor.is_system = proto.is_system;
        Ok(descriptor)
    }
}

impl TryFrom<&OperationProto> for OperationDescriptor {
    type Error = GeneratorError;

    fn try_from(proto: &OperationProto) -> Result<Self, Self::Error> {
        let return_type = proto.return_type.as_ref().map(TypeRef::try_from).transpose()?;
        let mut operation = match enum_value::<OperationKindProto>(proto.kind, "operation kind")? {
            OperationKindProto::Query => {
                let returns = return_type.ok_or_else(|| {
                    invalid(format!("query '{}' has no return type", proto.name))
                })?;
                let mut query = OperationDescriptor::query(proto.name.clone(), returns);
                query.has_side_effects = proto.has_side_effects;
                query.is_composable = proto.is_composable;
                query
            }
            OperationKindProto::Invoke => {
                let mut invoke = OperationDescriptor::invoke(proto.name.clone(), return_type);
                invoke.has_side_effects = proto.has_side_effects;
                invoke
            }
            OperationKindProto::Custom => OperationDescriptor::custom(
                proto.name.clone(),
                type_name(&proto.entity, &format!("custom operation '{}'", proto.name))?,
            ),
        };

        for parameter in &proto.parameters {
            let mut descriptor = ParameterDescriptor::new(
                parameter.name.clone(),
                required_type(
                    &parameter.ty,
                    &format!("parameter '{}' of '{}'", parameter.name, proto.name),
                )?,
            );
            descriptor.attributes = attributes(&parameter.attributes)?;
            operation = operation.with_parameter(descriptor);
        }
        Ok(operation)
    }
}

impl TryFrom<&ServiceProto> for ServiceDescriptor {
    type Error = GeneratorError;

    fn try_from(proto: &ServiceProto) -> Result<Self, Self::Error> {
        let mut service = ServiceDescriptor::new(type_name(&proto.name, "service")?);
        for operation in &proto.operations {
            service = service.with_operation(operation.try_into()?);
        }
        for entity in &proto.entity_types {
            service = service.with_entity(type_name(entity, "exposed entity")?);
        }
        for complex in &proto.complex_types {
            service = service.with_complex_type(type_name(complex, "exposed complex type")?);
        }
        service.attributes = attributes(&proto.attributes)?;
        Ok(service)
    }
}

fn share_kind(symbol: &SharedSymbol) -> ShareKind {
    let mut kind = ShareKind::NOT_SHARED;
    kind.set(ShareKind::SHARED_BY_SOURCE, symbol.shared_by_source);
    kind.set(ShareKind::SHARED_BY_REFERENCE, symbol.shared_by_reference);
    kind
}

/// Every named entity or complex reference must resolve in the catalog
fn check_type_ref(
    catalog: &TypeCatalog,
    ty: &TypeRef,
    site: &dyn Fn() -> String,
) -> Result<(), GeneratorError> {
    let Some((name, kind)) = ty.named() else {
        return Ok(());
    };
    let expected = match kind {
        NamedKind::Entity => TypeKind::Entity,
        NamedKind::Complex => TypeKind::Complex,
        NamedKind::Enum | NamedKind::Other => return Ok(()),
    };
    match catalog.get(name) {
        Some(descriptor) if descriptor.kind == expected => Ok(()),
        Some(_) => Err(invalid(format!(
            "{} refers to '{}' as {:?}, but it is declared otherwise",
            site(),
            name,
            expected
        ))),
        None => Err(invalid(format!("{} refers to unknown type '{}'", site(), name))),
    }
}

fn check_references(model: &DomainModel) -> Result<(), GeneratorError> {
    let catalog = model.catalog();
    for descriptor in catalog.types() {
        if let Some(base) = &descriptor.base {
            if catalog.get(base).is_none() {
                return Err(invalid(format!(
                    "type '{}' derives from unknown type '{}'",
                    descriptor.name, base
                )));
            }
        }
        for property in &descriptor.properties {
            check_type_ref(catalog, &property.ty, &|| {
                format!("property '{}.{}'", descriptor.name, property.name)
            })?;
        }
    }

    for service in model.services() {
        for operation in &service.operations {
            let site = || format!("operation '{}.{}'", service.name, operation.name);
            if let Some(returns) = &operation.return_type {
                check_type_ref(catalog, returns, &site)?;
            }
            for parameter in &operation.parameters {
                check_type_ref(catalog, &parameter.ty, &site)?;
            }
        }
    }
    Ok(())
}

impl TryFrom<GenerationRequest> for DecodedRequest {
    type Error = GeneratorError;

    fn try_from(request: GenerationRequest) -> Result<Self, Self::Error> {
        let options = GenerationOptions::parse_parameter(&request.parameter)?;

        let mut catalog = TypeCatalog::new();
        for proto in &request.types {
            catalog.insert_type(proto.try_into()?);
        }
        for proto in &request.enums {
            catalog.insert_enum(proto.try_into()?);
        }
        let services = request
            .services
            .iter()
            .map(ServiceDescriptor::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let model = DomainModel::new(catalog, services)?;
        check_references(&model)?;

        let mut shared = SharedTypeSet::new();
        for symbol in &request.shared_types {
            shared.add_type(symbol.type_name.clone(), share_kind(symbol));
        }
        for symbol in &request.shared_properties {
            shared.add_property(symbol.type_name.clone(), symbol.member.clone(), share_kind(symbol));
        }
        for symbol in &request.shared_methods {
            shared.add_method(
                symbol.type_name.clone(),
                symbol.member.clone(),
                symbol.parameter_types.clone(),
                share_kind(symbol),
            );
        }

        tracing::debug!(
            types = request.types.len(),
            enums = request.enums.len(),
            services = request.services.len(),
            "decoded generation request"
        );
        Ok(Self {
            model,
            options,
            shared,
        })
    }
}

/// Decode request bytes into the descriptor model
pub fn decode_request(bytes: &[u8]) -> Result<DecodedRequest, GeneratorError> {
    use prost::Message;

    let request = GenerationRequest::decode(bytes)
        .map_err(|e| GeneratorError::DecodeError(e.to_string()))?;
    DecodedRequest::try_from(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::OperationKind;
    use crate::sharing::SharedTypeResolver;
    use prost::Message;

    fn named(kind: TypeRefKind, name: &str) -> TypeRefProto {
        TypeRefProto {
            kind: kind as i32,
            name: name.to_string(),
            element: None,
        }
    }

    fn wrapped(kind: TypeRefKind, element: TypeRefProto) -> TypeRefProto {
        TypeRefProto {
            kind: kind as i32,
            name: String::new(),
            element: Some(Box::new(element)),
        }
    }

    fn key_property(name: &str) -> PropertyProto {
        PropertyProto {
            name: name.to_string(),
            ty: Some(named(TypeRefKind::Scalar, "int")),
            attributes: vec![PropertyAttributeProto {
                kind: AttributeKind::Key as i32,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn product_request() -> GenerationRequest {
        GenerationRequest {
            parameter: "language=Rust".to_string(),
            types: vec![TypeProto {
                name: "Shop.Product".to_string(),
                kind: TypeKindProto::Entity as i32,
                properties: vec![
                    key_property("ProductID"),
                    PropertyProto {
                        name: "Color".to_string(),
                        ty: Some(wrapped(
                            TypeRefKind::Nullable,
                            named(TypeRefKind::Enum, "Shop.Color"),
                        )),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            enums: vec![EnumProto {
                name: "Shop.Color".to_string(),
                members: vec![EnumMemberProto {
                    name: "Red".to_string(),
                    value: 1,
                }],
                is_non_public: true,
                ..Default::default()
            }],
            services: vec![ServiceProto {
                name: "Shop.ProductService".to_string(),
                operations: vec![OperationProto {
                    name: "GetProducts".to_string(),
                    kind: OperationKindProto::Query as i32,
                    return_type: Some(wrapped(
                        TypeRefKind::Collection,
                        named(TypeRefKind::Entity, "Shop.Product"),
                    )),
                    is_composable: true,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            shared_types: vec![SharedSymbol {
                type_name: "Shop.Audit".to_string(),
                shared_by_reference: true,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_builds_model() {
        let bytes = product_request().encode_to_vec();
        let decoded = decode_request(&bytes).unwrap();

        assert_eq!(decoded.options.language, "Rust");
        let product = decoded.model.catalog().get(&TypeName::parse("Shop.Product")).unwrap();
        assert!(product.is_entity());
        assert!(product.property("ProductID").unwrap().is_key());
        assert_eq!(
            product.property("Color").unwrap().ty,
            TypeRef::nullable(TypeRef::enumeration(TypeName::parse("Shop.Color")))
        );
        let color = decoded.model.catalog().get_enum(&TypeName::parse("Shop.Color")).unwrap();
        assert!(!color.is_public);

        let query = &decoded.model.services()[0].operations[0];
        assert_eq!(query.kind, OperationKind::Query);
        assert!(query.is_composable);
        assert_eq!(
            decoded.shared.classify("Shop.Audit").unwrap(),
            ShareKind::SHARED_BY_REFERENCE
        );
    }

    #[test]
    fn test_dangling_reference_is_invalid_descriptor() {
        let mut request = product_request();
        request.types[0].properties.push(PropertyProto {
            name: "Supplier".to_string(),
            ty: Some(named(TypeRefKind::Entity, "Shop.Supplier")),
            ..Default::default()
        });
        let result = DecodedRequest::try_from(request);
        assert!(matches!(result, Err(GeneratorError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_unknown_scalar_is_invalid_descriptor() {
        let mut request = product_request();
        request.types[0].properties[0].ty = Some(named(TypeRefKind::Scalar, "Widget"));
        assert!(matches!(
            DecodedRequest::try_from(request),
            Err(GeneratorError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_mismatched_association_keys_rejected() {
        let mut request = product_request();
        request.types[0].properties.push(PropertyProto {
            name: "Self".to_string(),
            ty: Some(named(TypeRefKind::Entity, "Shop.Product")),
            attributes: vec![PropertyAttributeProto {
                kind: AttributeKind::Association as i32,
                association: Some(AssociationProto {
                    name: "Product_Product".to_string(),
                    this_key: vec!["ProductID".to_string()],
                    other_key: Vec::new(),
                    is_foreign_key: true,
                    target: "Shop.Product".to_string(),
                }),
                ..Default::default()
            }],
            ..Default::default()
        });
        assert!(matches!(
            DecodedRequest::try_from(request),
            Err(GeneratorError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_garbage_bytes_are_decode_error() {
        let result = decode_request(&[0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(GeneratorError::DecodeError(_))));
    }

    #[test]
    fn test_log_entry_round_trip_keeps_detail() {
        let entry = LogEntry {
            severity: Severity::Exception,
            message: "resolver failed".to_string(),
            detail: Some("trace".to_string()),
        };
        let proto = LogEntryProto::from(&entry);
        assert_eq!(LogEntry::from(&proto), entry);
    }
}
