//! Server-side descriptor model
//!
//! These types are the read-only snapshot produced by upstream metadata
//! analysis. A [`DomainModel`] is built once per generation pass and is never
//! mutated afterwards; every generator only borrows it.

use crate::GeneratorError;
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// A fully-qualified type name split into namespace and short name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName {
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Short type name
    pub name: String,
}

impl TypeName {
    /// Create a type name from its parts
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a dotted qualified name; the last segment is the short name
    pub fn parse(qualified: &str) -> Self {
        match qualified.rsplit_once('.') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::new("", qualified),
        }
    }

    /// The dotted qualified form
    pub fn qualified(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}.{}", self.namespace, self.name)
        }
    }
}

/// Predefined scalar types that every client runtime understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// Boolean
    Bool,
    /// Unsigned 8-bit integer
    Byte,
    /// Signed 16-bit integer
    Int16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 16-bit integer
    UInt16,
    /// Unsigned 32-bit integer
    UInt32,
    /// Unsigned 64-bit integer
    UInt64,
    /// 32-bit float
    Single,
    /// 64-bit float
    Double,
    /// Fixed-point decimal
    Decimal,
    /// Single character
    Char,
    /// Text
    String,
    /// 128-bit unique identifier
    Guid,
    /// Date and time
    DateTime,
    /// Date and time with offset
    DateTimeOffset,
    /// Time interval
    TimeSpan,
    /// Uniform resource identifier
    Uri,
    /// Raw bytes
    Binary,
}

/// Lookup table for scalar names as they appear in descriptors
static SCALAR_NAMES: Lazy<HashMap<&'static str, ScalarType>> = Lazy::new(|| {
    use ScalarType as S;
    let entries: &[(&[&str], ScalarType)] = &[
        (&["bool", "Boolean", "System.Boolean"], S::Bool),
        (&["byte", "Byte", "System.Byte"], S::Byte),
        (&["short", "Int16", "System.Int16"], S::Int16),
        (&["int", "Int32", "System.Int32"], S::Int32),
        (&["long", "Int64", "System.Int64"], S::Int64),
        (&["ushort", "UInt16", "System.UInt16"], S::UInt16),
        (&["uint", "UInt32", "System.UInt32"], S::UInt32),
        (&["ulong", "UInt64", "System.UInt64"], S::UInt64),
        (&["float", "Single", "System.Single"], S::Single),
        (&["double", "Double", "System.Double"], S::Double),
        (&["decimal", "Decimal", "System.Decimal"], S::Decimal),
        (&["char", "Char", "System.Char"], S::Char),
        (&["string", "String", "System.String"], S::String),
        (&["Guid", "System.Guid"], S::Guid),
        (&["DateTime", "System.DateTime"], S::DateTime),
        (&["DateTimeOffset", "System.DateTimeOffset"], S::DateTimeOffset),
        (&["TimeSpan", "System.TimeSpan"], S::TimeSpan),
        (&["Uri", "System.Uri"], S::Uri),
        (&["byte[]", "Binary", "System.Byte[]"], S::Binary),
    ];

    let mut map = HashMap::new();
    for (aliases, scalar) in entries {
        for alias in *aliases {
            map.insert(*alias, *scalar);
        }
    }
    map
});

impl ScalarType {
    /// Resolve a scalar from any of its descriptor spellings
    pub fn from_name(name: &str) -> Option<Self> {
        SCALAR_NAMES.get(name.trim()).copied()
    }

    /// Canonical descriptor name
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "Boolean",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Single => "Single",
            Self::Double => "Double",
            Self::Decimal => "Decimal",
            Self::Char => "Char",
            Self::String => "String",
            Self::Guid => "Guid",
            Self::DateTime => "DateTime",
            Self::DateTimeOffset => "DateTimeOffset",
            Self::TimeSpan => "TimeSpan",
            Self::Uri => "Uri",
            Self::Binary => "Binary",
        }
    }

    /// Reference-typed scalars can hold null without a nullable wrapper
    pub fn is_reference(self) -> bool {
        matches!(self, Self::String | Self::Uri | Self::Binary)
    }
}

/// What a named type reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKind {
    /// An entity type
    Entity,
    /// A complex (identity-less) type
    Complex,
    /// An enum type
    Enum,
    /// Anything else; only usable when already shared with the client
    Other,
}

/// A reference to a type from a property, parameter or return position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A predefined scalar
    Scalar(ScalarType),
    /// A named type
    Named {
        /// Qualified name
        name: TypeName,
        /// What the name refers to
        kind: NamedKind,
    },
    /// Nullable wrapper around a value type
    Nullable(Box<TypeRef>),
    /// Enumerable of the inner type
    Collection(Box<TypeRef>),
}

impl TypeRef {
    /// Shorthand for a scalar reference
    pub fn scalar(scalar: ScalarType) -> Self {
        Self::Scalar(scalar)
    }

    /// Shorthand for an entity reference
    pub fn entity(name: TypeName) -> Self {
        Self::Named {
            name,
            kind: NamedKind::Entity,
        }
    }

    /// Shorthand for a complex type reference
    pub fn complex(name: TypeName) -> Self {
        Self::Named {
            name,
            kind: NamedKind::Complex,
        }
    }

    /// Shorthand for an enum reference
    pub fn enumeration(name: TypeName) -> Self {
        Self::Named {
            name,
            kind: NamedKind::Enum,
        }
    }

    /// Wrap in a nullable
    pub fn nullable(inner: TypeRef) -> Self {
        Self::Nullable(Box::new(inner))
    }

    /// Wrap in a collection
    pub fn collection(inner: TypeRef) -> Self {
        Self::Collection(Box::new(inner))
    }

    /// Strip a nullable wrapper, if any
    pub fn unwrap_nullable(&self) -> &TypeRef {
        match self {
            Self::Nullable(inner) => inner,
            other => other,
        }
    }

    /// The element type of a collection, or the type itself
    pub fn element_type(&self) -> &TypeRef {
        match self {
            Self::Collection(inner) => inner,
            other => other,
        }
    }

    /// True when this is an enumerable
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }

    /// Named type after unwrapping collection and nullable wrappers
    pub fn named(&self) -> Option<(&TypeName, NamedKind)> {
        match self.element_type().unwrap_nullable() {
            Self::Named { name, kind } => Some((name, *kind)),
            _ => None,
        }
    }

    /// Scalar type after unwrapping nullability
    pub fn as_scalar(&self) -> Option<ScalarType> {
        match self.unwrap_nullable() {
            Self::Scalar(scalar) => Some(*scalar),
            _ => None,
        }
    }

    /// Whether the type is a predefined scalar (optionally nullable)
    pub fn is_predefined(&self) -> bool {
        self.as_scalar().is_some()
    }

    /// Whether a value of this type may be null
    pub fn is_nullable_or_reference(&self) -> bool {
        match self {
            Self::Nullable(_) | Self::Collection(_) => true,
            Self::Scalar(scalar) => scalar.is_reference(),
            Self::Named { kind, .. } => *kind != NamedKind::Enum,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(scalar) => f.write_str(scalar.name()),
            Self::Named { name, .. } => write!(f, "{}", name),
            Self::Nullable(inner) => write!(f, "{}?", inner),
            Self::Collection(inner) => write!(f, "IEnumerable<{}>", inner),
        }
    }
}

/// A free-form attribute as declared on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    /// The attribute's type
    pub type_name: TypeName,
    /// Positional and named arguments in source form
    pub arguments: Vec<String>,
}

impl AttributeDescriptor {
    /// Create an attribute with the given arguments
    pub fn new(type_name: TypeName, arguments: Vec<String>) -> Self {
        Self {
            type_name,
            arguments,
        }
    }
}

/// Association metadata attached to a navigation property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDescriptor {
    /// Association name, shared by both ends of the relation
    pub name: String,
    /// Key members on the declaring side
    pub this_key: Vec<String>,
    /// Key members on the target side, positionally matching `this_key`
    pub other_key: Vec<String>,
    /// Whether this side stores the foreign key
    pub is_foreign_key: bool,
    /// Target element type
    pub target: TypeName,
}

/// Property-level attribute vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyAttribute {
    /// Member participates in entity identity
    Key,
    /// Navigation property
    Association(AssociationDescriptor),
    /// Never projected to the client
    Exclude,
    /// Projected even where it would otherwise be omitted
    Include,
    /// Association whose target lives outside this pass
    ExternalReference,
    /// Read-only on the client
    ReadOnly,
    /// Editability constraints
    Editable {
        /// Whether the value may be edited
        allow_edit: bool,
        /// Whether an initial value may be supplied
        allow_initial_value: bool,
    },
    /// Original value is sent back on update
    RoundtripOriginal,
    /// Serialized data member
    DataMember,
    /// Any other attribute
    Custom(AttributeDescriptor),
}

/// How a property participates in polymorphism
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Polymorphism {
    /// Plain member
    #[default]
    None,
    /// Virtual and not sealed
    Virtual,
    /// Overrides a member declared on `base`
    Override {
        /// Type declaring the overridden member
        base: TypeName,
        /// Whether the override is sealed
        sealed: bool,
    },
    /// Hides a same-named member declared on `base`
    Hides {
        /// Type declaring the hidden member
        base: TypeName,
    },
}

/// A property on an entity or complex type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Property name
    pub name: String,
    /// Declared type
    pub ty: TypeRef,
    /// Type that declares the property
    pub declaring_type: TypeName,
    /// Attributes from the closed vocabulary
    pub attributes: Vec<PropertyAttribute>,
    /// Polymorphic shape of the declaration
    pub polymorphism: Polymorphism,
}

impl PropertyDescriptor {
    /// Create a plain property
    pub fn new(name: impl Into<String>, ty: TypeRef, declaring_type: TypeName) -> Self {
        Self {
            name: name.into(),
            ty,
            declaring_type,
            attributes: Vec::new(),
            polymorphism: Polymorphism::None,
        }
    }

    /// Add an attribute
    pub fn with_attribute(mut self, attribute: PropertyAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Set the polymorphic shape
    pub fn with_polymorphism(mut self, polymorphism: Polymorphism) -> Self {
        self.polymorphism = polymorphism;
        self
    }

    fn has(&self, predicate: impl Fn(&PropertyAttribute) -> bool) -> bool {
        self.attributes.iter().any(predicate)
    }

    /// Tagged with Key
    pub fn is_key(&self) -> bool {
        self.has(|a| matches!(a, PropertyAttribute::Key))
    }

    /// Tagged with Exclude
    pub fn is_excluded(&self) -> bool {
        self.has(|a| matches!(a, PropertyAttribute::Exclude))
    }

    /// Tagged with Include
    pub fn is_included(&self) -> bool {
        self.has(|a| matches!(a, PropertyAttribute::Include))
    }

    /// Tagged with ExternalReference
    pub fn is_external_reference(&self) -> bool {
        self.has(|a| matches!(a, PropertyAttribute::ExternalReference))
    }

    /// Tagged with ReadOnly, or Editable without edit permission
    pub fn is_read_only(&self) -> bool {
        self.has(|a| {
            matches!(
                a,
                PropertyAttribute::ReadOnly
                    | PropertyAttribute::Editable {
                        allow_edit: false,
                        ..
                    }
            )
        })
    }

    /// Tagged with RoundtripOriginal
    pub fn is_roundtrip_original(&self) -> bool {
        self.has(|a| matches!(a, PropertyAttribute::RoundtripOriginal))
    }

    /// Explicit editability, if declared
    pub fn editable(&self) -> Option<(bool, bool)> {
        self.attributes.iter().find_map(|a| match a {
            PropertyAttribute::Editable {
                allow_edit,
                allow_initial_value,
            } => Some((*allow_edit, *allow_initial_value)),
            _ => None,
        })
    }

    /// Association metadata, if the property is a navigation property
    pub fn association(&self) -> Option<&AssociationDescriptor> {
        self.attributes.iter().find_map(|a| match a {
            PropertyAttribute::Association(association) => Some(association),
            _ => None,
        })
    }

    /// Free-form attributes
    pub fn custom_attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes.iter().filter_map(|a| match a {
            PropertyAttribute::Custom(attribute) => Some(attribute),
            _ => None,
        })
    }

    /// Same declaration: same declaring type and same name
    pub fn same_identity(&self, other: &PropertyDescriptor) -> bool {
        self.declaring_type == other.declaring_type && self.name == other.name
    }
}

/// Entity or complex type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Type with identity
    Entity,
    /// Type without identity
    Complex,
}

/// An entity or complex type descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Qualified name
    pub name: TypeName,
    /// Entity or complex
    pub kind: TypeKind,
    /// Declared base type, if any
    pub base: Option<TypeName>,
    /// Properties, kept sorted by name
    pub properties: Vec<PropertyDescriptor>,
    /// Class-level attributes
    pub attributes: Vec<AttributeDescriptor>,
    /// Abstract class
    pub is_abstract: bool,
    /// Ordered key members; empty means "the Key-tagged properties"
    pub key_members: Vec<String>,
}

impl TypeDescriptor {
    fn new(name: TypeName, kind: TypeKind) -> Self {
        Self {
            name,
            kind,
            base: None,
            properties: Vec::new(),
            attributes: Vec::new(),
            is_abstract: false,
            key_members: Vec::new(),
        }
    }

    /// An entity type with no members
    pub fn entity(name: TypeName) -> Self {
        Self::new(name, TypeKind::Entity)
    }

    /// A complex type with no members
    pub fn complex(name: TypeName) -> Self {
        Self::new(name, TypeKind::Complex)
    }

    /// Set the declared base
    pub fn with_base(mut self, base: TypeName) -> Self {
        self.base = Some(base);
        self
    }

    /// Add a property declared on this type
    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self.sort_properties();
        self
    }

    /// Add a class-level attribute
    pub fn with_attribute(mut self, attribute: AttributeDescriptor) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Mark abstract
    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    /// Set the ordered key members
    pub fn with_key_members(mut self, keys: Vec<String>) -> Self {
        self.key_members = keys;
        self
    }

    /// True for entity types
    pub fn is_entity(&self) -> bool {
        self.kind == TypeKind::Entity
    }

    /// Property declared directly on this type
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub(crate) fn sort_properties(&mut self) {
        self.properties.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

/// One enum member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    /// Member name
    pub name: String,
    /// Underlying value
    pub value: i64,
}

/// An enum type descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    /// Qualified name
    pub name: TypeName,
    /// Members in declaration order
    pub members: Vec<EnumMember>,
    /// Bit-flag enum
    pub is_flags: bool,
    /// Publicly visible
    pub is_public: bool,
    /// Nested inside another type
    pub is_nested: bool,
    /// Declared in a system/platform assembly
    pub is_system: bool,
}

impl EnumDescriptor {
    /// A public, top-level enum
    pub fn new(name: TypeName, members: Vec<EnumMember>) -> Self {
        Self {
            name,
            members,
            is_flags: false,
            is_public: true,
            is_nested: false,
            is_system: false,
        }
    }
}

/// Operation kinds exposed by a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Returns entities
    Query,
    /// Arbitrary remote call
    Invoke,
    /// Entity-bound custom update
    Custom,
}

/// An operation parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    /// Parameter name
    pub name: String,
    /// Declared type
    pub ty: TypeRef,
    /// Parameter attributes
    pub attributes: Vec<AttributeDescriptor>,
}

impl ParameterDescriptor {
    /// Create a parameter without attributes
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            attributes: Vec::new(),
        }
    }
}

/// A service operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Operation name
    pub name: String,
    /// Operation kind
    pub kind: OperationKind,
    /// Ordered parameters
    pub parameters: Vec<ParameterDescriptor>,
    /// Return type, `None` for void
    pub return_type: Option<TypeRef>,
    /// Entity a custom operation is bound to
    pub entity: Option<TypeName>,
    /// Query has side effects (sent as a POST)
    pub has_side_effects: bool,
    /// Query results may be further composed on the client
    pub is_composable: bool,
}

impl OperationDescriptor {
    fn new(name: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parameters: Vec::new(),
            return_type: None,
            entity: None,
            has_side_effects: false,
            is_composable: kind == OperationKind::Query,
        }
    }

    /// A composable, side-effect free query
    pub fn query(name: impl Into<String>, returns: TypeRef) -> Self {
        Self {
            return_type: Some(returns),
            ..Self::new(name, OperationKind::Query)
        }
    }

    /// An invoke operation
    pub fn invoke(name: impl Into<String>, returns: Option<TypeRef>) -> Self {
        Self {
            return_type: returns,
            ..Self::new(name, OperationKind::Invoke)
        }
    }

    /// A custom operation bound to `entity`
    pub fn custom(name: impl Into<String>, entity: TypeName) -> Self {
        Self {
            entity: Some(entity),
            ..Self::new(name, OperationKind::Custom)
        }
    }

    /// Add a parameter
    pub fn with_parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }
}

/// An exposed service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Qualified service name
    pub name: TypeName,
    /// Operations
    pub operations: Vec<OperationDescriptor>,
    /// Explicitly exposed entity types
    pub entity_types: Vec<TypeName>,
    /// Explicitly exposed complex types
    pub complex_types: Vec<TypeName>,
    /// Class-level attributes
    pub attributes: Vec<AttributeDescriptor>,
}

impl ServiceDescriptor {
    /// A service with nothing exposed yet
    pub fn new(name: TypeName) -> Self {
        Self {
            name,
            operations: Vec::new(),
            entity_types: Vec::new(),
            complex_types: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Add an operation
    pub fn with_operation(mut self, operation: OperationDescriptor) -> Self {
        self.operations.push(operation);
        self
    }

    /// Expose an entity type
    pub fn with_entity(mut self, entity: TypeName) -> Self {
        self.entity_types.push(entity);
        self
    }

    /// Expose a complex type
    pub fn with_complex_type(mut self, complex: TypeName) -> Self {
        self.complex_types.push(complex);
        self
    }

    /// Entities this service exposes: the explicit list plus every entity a
    /// query returns or a custom operation binds to, sorted and de-duplicated
    ///
    /// Targets of `Include` associations on an exposed entity (or any of its
    /// ancestors) are exposed too, transitively.
    pub fn exposed_entities(&self, catalog: &TypeCatalog) -> BTreeSet<TypeName> {
        let mut exposed: BTreeSet<TypeName> = self.entity_types.iter().cloned().collect();
        for operation in &self.operations {
            match operation.kind {
                OperationKind::Query => {
                    if let Some((name, NamedKind::Entity)) =
                        operation.return_type.as_ref().and_then(TypeRef::named)
                    {
                        exposed.insert(name.clone());
                    }
                }
                OperationKind::Custom => {
                    if let Some(entity) = &operation.entity {
                        exposed.insert(entity.clone());
                    }
                }
                OperationKind::Invoke => {}
            }
        }

        let mut pending: Vec<TypeName> = exposed.iter().cloned().collect();
        while let Some(entity) = pending.pop() {
            for target in catalog.included_targets(&entity) {
                if exposed.insert(target.clone()) {
                    pending.push(target);
                }
            }
        }
        exposed
    }
}

/// Every type and enum descriptor known to a pass
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: BTreeMap<TypeName, TypeDescriptor>,
    enums: BTreeMap<TypeName, EnumDescriptor>,
}

impl TypeCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity or complex type
    pub fn insert_type(&mut self, mut descriptor: TypeDescriptor) {
        descriptor.sort_properties();
        self.types.insert(descriptor.name.clone(), descriptor);
    }

    /// Insert an enum
    pub fn insert_enum(&mut self, descriptor: EnumDescriptor) {
        self.enums.insert(descriptor.name.clone(), descriptor);
    }

    /// Builder form of [`insert_type`](Self::insert_type)
    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.insert_type(descriptor);
        self
    }

    /// Builder form of [`insert_enum`](Self::insert_enum)
    pub fn with_enum(mut self, descriptor: EnumDescriptor) -> Self {
        self.insert_enum(descriptor);
        self
    }

    /// Look up a type
    pub fn get(&self, name: &TypeName) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    /// Look up an enum
    pub fn get_enum(&self, name: &TypeName) -> Option<&EnumDescriptor> {
        self.enums.get(name)
    }

    /// All types, ordered by name
    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    /// Targets of the `Include` associations declared on `name` or its bases
    pub fn included_targets(&self, name: &TypeName) -> Vec<TypeName> {
        let mut targets = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = self.get(name);
        while let Some(descriptor) = current {
            if !seen.insert(&descriptor.name) {
                break;
            }
            for property in &descriptor.properties {
                if !property.is_included() || property.is_excluded() {
                    continue;
                }
                if let Some(association) = property.association() {
                    targets.push(association.target.clone());
                }
            }
            current = descriptor.base.as_ref().and_then(|base| self.get(base));
        }
        targets
    }
}

/// The complete, validated input of one generation pass
#[derive(Debug, Clone)]
pub struct DomainModel {
    catalog: TypeCatalog,
    services: Vec<ServiceDescriptor>,
}

impl DomainModel {
    /// Validate and freeze the descriptors
    ///
    /// Rejects dangling references to exposed types, base-type cycles and
    /// association targets that are not entities in the catalog.
    pub fn new(
        catalog: TypeCatalog,
        services: Vec<ServiceDescriptor>,
    ) -> Result<Self, GeneratorError> {
        let model = Self { catalog, services };
        model.validate()?;
        Ok(model)
    }

    /// The catalog
    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Services in declaration order
    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    fn validate(&self) -> Result<(), GeneratorError> {
        for service in &self.services {
            for entity in service.exposed_entities(&self.catalog) {
                self.expect_kind(&entity, TypeKind::Entity, &service.name)?;
            }
            for complex in &service.complex_types {
                self.expect_kind(complex, TypeKind::Complex, &service.name)?;
            }
        }

        for descriptor in self.catalog.types() {
            let mut seen = BTreeSet::new();
            seen.insert(&descriptor.name);
            let mut current = descriptor.base.as_ref();
            while let Some(base) = current {
                if !seen.insert(base) {
                    return Err(GeneratorError::InvalidDescriptor(format!(
                        "type '{}' has a cyclic base type chain through '{}'",
                        descriptor.name, base
                    )));
                }
                current = self.catalog.get(base).and_then(|b| b.base.as_ref());
            }

            for property in &descriptor.properties {
                if let Some(association) = property.association() {
                    match self.catalog.get(&association.target) {
                        Some(target) if target.is_entity() => {}
                        _ => {
                            return Err(GeneratorError::InvalidDescriptor(format!(
                                "association '{}' on '{}.{}' targets unknown entity '{}'",
                                association.name,
                                descriptor.name,
                                property.name,
                                association.target
                            )))
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn expect_kind(
        &self,
        name: &TypeName,
        kind: TypeKind,
        service: &TypeName,
    ) -> Result<(), GeneratorError> {
        match self.catalog.get(name) {
            Some(descriptor) if descriptor.kind == kind => Ok(()),
            Some(_) => Err(GeneratorError::InvalidDescriptor(format!(
                "service '{}' exposes '{}' as {:?}, but it is declared otherwise",
                service, name, kind
            ))),
            None => Err(GeneratorError::InvalidDescriptor(format!(
                "service '{}' references unknown type '{}'",
                service, name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_name_parse() {
        let name = TypeName::parse("Acme.Sales.Order");
        assert_eq!(name.namespace, "Acme.Sales");
        assert_eq!(name.name, "Order");
        assert_eq!(name.to_string(), "Acme.Sales.Order");

        let global = TypeName::parse("Order");
        assert_eq!(global.namespace, "");
        assert_eq!(global.qualified(), "Order");
    }

    #[test]
    fn test_scalar_aliases() {
        assert_eq!(ScalarType::from_name("int"), Some(ScalarType::Int32));
        assert_eq!(ScalarType::from_name("System.Int32"), Some(ScalarType::Int32));
        assert_eq!(ScalarType::from_name("byte[]"), Some(ScalarType::Binary));
        assert_eq!(ScalarType::from_name("Widget"), None);
    }

    #[test]
    fn test_nullable_or_reference() {
        assert!(!TypeRef::scalar(ScalarType::Int32).is_nullable_or_reference());
        assert!(TypeRef::scalar(ScalarType::String).is_nullable_or_reference());
        assert!(TypeRef::nullable(TypeRef::scalar(ScalarType::Int32)).is_nullable_or_reference());
        assert!(!TypeRef::enumeration(TypeName::parse("A.Color")).is_nullable_or_reference());
    }

    #[test]
    fn test_properties_sorted_on_insert() {
        let name = TypeName::parse("A.Product");
        let catalog = TypeCatalog::new().with_type(
            TypeDescriptor::entity(name.clone())
                .with_property(PropertyDescriptor::new(
                    "Zeta",
                    TypeRef::scalar(ScalarType::Int32),
                    name.clone(),
                ))
                .with_property(PropertyDescriptor::new(
                    "Alpha",
                    TypeRef::scalar(ScalarType::Int32),
                    name.clone(),
                )),
        );
        let names: Vec<_> = catalog
            .get(&name)
            .unwrap()
            .properties
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_cyclic_base_rejected() {
        let a = TypeName::parse("A.A");
        let b = TypeName::parse("A.B");
        let catalog = TypeCatalog::new()
            .with_type(TypeDescriptor::entity(a.clone()).with_base(b.clone()))
            .with_type(TypeDescriptor::entity(b).with_base(a));
        let err = DomainModel::new(catalog, Vec::new()).unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_unknown_exposed_type_rejected() {
        let service = ServiceDescriptor::new(TypeName::parse("A.CatalogService"))
            .with_entity(TypeName::parse("A.Missing"));
        let err = DomainModel::new(TypeCatalog::new(), vec![service]).unwrap_err();
        assert!(err.to_string().contains("A.Missing"));
    }

    #[test]
    fn test_exposed_entities_include_query_results() {
        let product = TypeName::parse("A.Product");
        let service = ServiceDescriptor::new(TypeName::parse("A.CatalogService")).with_operation(
            OperationDescriptor::query(
                "GetProducts",
                TypeRef::collection(TypeRef::entity(product.clone())),
            ),
        );
        assert!(service.exposed_entities(&TypeCatalog::new()).contains(&product));
    }

    #[test]
    fn test_include_exposes_targets_transitively() {
        let line = TypeName::parse("A.OrderLine");
        let order = TypeName::parse("A.Order");
        let customer = TypeName::parse("A.Customer");
        let include = |name: &str, owner: &TypeName, target: &TypeName| {
            PropertyDescriptor::new(name, TypeRef::entity(target.clone()), owner.clone())
                .with_attribute(PropertyAttribute::Association(AssociationDescriptor {
                    name: format!("{}_{}", owner.name, target.name),
                    this_key: vec![format!("{}ID", target.name)],
                    other_key: vec![format!("{}ID", target.name)],
                    is_foreign_key: true,
                    target: target.clone(),
                }))
                .with_attribute(PropertyAttribute::Include)
        };
        let catalog = TypeCatalog::new()
            .with_type(TypeDescriptor::entity(line.clone()).with_property(include("Order", &line, &order)))
            .with_type(
                TypeDescriptor::entity(order.clone()).with_property(include("Customer", &order, &customer)),
            )
            .with_type(TypeDescriptor::entity(customer.clone()));
        let service = ServiceDescriptor::new(TypeName::parse("A.LineService")).with_entity(line.clone());
        assert_eq!(
            service.exposed_entities(&catalog),
            BTreeSet::from([customer, line, order])
        );
    }
}
