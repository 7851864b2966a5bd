//! Generated type graph
//!
//! The language-neutral output of a pass: namespaces holding ordered type
//! declarations holding ordered members. Method bodies are a small closed
//! statement/expression language. Renderers turn the graph into source text.

use crate::descriptor::ScalarType;
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// Namespace of the client runtime types every generated file relies on
pub const FRAMEWORK_NAMESPACE: &str = "DomainClient";

/// Runtime types that generated code names by their short name
pub const FRAMEWORK_TYPES: &[&str] = &[
    "ComplexObject",
    "DomainContext",
    "Entity",
    "EntityCollection",
    "EntityContainer",
    "EntityKey",
    "EntityQuery",
    "EntityRef",
    "EntitySet",
    "InvokeOperation",
    "Uri",
    "WebContextBase",
];

/// A reference to a named client type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeReference {
    /// Client namespace
    pub namespace: String,
    /// Short name
    pub name: String,
    /// Must be written fully qualified
    pub qualified: bool,
}

impl TypeReference {
    /// Unqualified reference
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            qualified: false,
        }
    }

    /// Reference to a client runtime type
    pub fn framework(name: impl Into<String>) -> Self {
        Self::new(FRAMEWORK_NAMESPACE, name)
    }
}

/// A type in client position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientType {
    /// Predefined scalar
    Scalar(ScalarType),
    /// Named type
    Named(TypeReference),
    /// Generic instantiation of a named type
    Generic(TypeReference, Vec<ClientType>),
    /// Nullable wrapper
    Nullable(Box<ClientType>),
    /// Ordered list
    List(Box<ClientType>),
    /// Opaque identity value
    Object,
}

impl ClientType {
    /// Named framework type
    pub fn framework(name: &str) -> Self {
        Self::Named(TypeReference::framework(name))
    }

    /// Generic framework type over one argument
    pub fn framework_generic(name: &str, argument: ClientType) -> Self {
        Self::Generic(TypeReference::framework(name), vec![argument])
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// String literal
    Str(String),
    /// Boolean literal
    Bool(bool),
    /// Integer literal
    Int(i64),
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// The current instance
    This,
    /// The implicit setter value
    Value,
    /// Null reference
    Null,
    /// A literal
    Literal(Literal),
    /// Default value of a type
    Default(ClientType),
    /// Local variable or parameter
    Local(String),
    /// Backing field access
    Field(Box<Expr>, String),
    /// Property read
    Property(Box<Expr>, String),
    /// Instance method call
    Call {
        /// Receiver
        target: Box<Expr>,
        /// Method name
        method: String,
        /// Generic arguments
        type_args: Vec<ClientType>,
        /// Arguments
        args: Vec<Expr>,
    },
    /// Static method call
    StaticCall {
        /// Declaring type
        ty: ClientType,
        /// Method name
        method: String,
        /// Arguments
        args: Vec<Expr>,
    },
    /// Construct an instance
    New(ClientType, Vec<Expr>),
    /// Reference to a method of the enclosing type
    MethodRef(String),
    /// A type used as a value (attribute arguments)
    TypeOf(ClientType),
    /// Named parameter bag
    Parameters(Vec<(String, Expr)>),
    /// Equality
    Eq(Box<Expr>, Box<Expr>),
    /// Inequality
    Ne(Box<Expr>, Box<Expr>),
    /// Conjunction; empty is true
    And(Vec<Expr>),
    /// Disjunction; empty is false
    Or(Vec<Expr>),
    /// Null test
    IsNull(Box<Expr>),
    /// Non-null test
    IsNotNull(Box<Expr>),
}

impl Expr {
    /// String literal
    pub fn str(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Str(value.into()))
    }

    /// Boolean literal
    pub fn bool(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    /// Local variable
    pub fn local(name: impl Into<String>) -> Self {
        Self::Local(name.into())
    }

    /// `self.<field>`
    pub fn this_field(name: impl Into<String>) -> Self {
        Self::Field(Box::new(Self::This), name.into())
    }

    /// `self.<property>`
    pub fn this_property(name: impl Into<String>) -> Self {
        Self::Property(Box::new(Self::This), name.into())
    }

    /// Property read on this expression
    pub fn property(self, name: impl Into<String>) -> Self {
        Self::Property(Box::new(self), name.into())
    }

    /// Method call on this expression
    pub fn call(self, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            target: Box::new(self),
            method: method.into(),
            type_args: Vec::new(),
            args,
        }
    }

    /// Generic method call on this expression
    pub fn call_generic(
        self,
        method: impl Into<String>,
        type_args: Vec<ClientType>,
        args: Vec<Expr>,
    ) -> Self {
        Self::Call {
            target: Box::new(self),
            method: method.into(),
            type_args,
            args,
        }
    }

    /// `a == b`
    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::Eq(Box::new(left), Box::new(right))
    }

    /// `a != b`
    pub fn ne(left: Expr, right: Expr) -> Self {
        Self::Ne(Box::new(left), Box::new(right))
    }

    /// Null test
    pub fn is_null(inner: Expr) -> Self {
        Self::IsNull(Box::new(inner))
    }

    /// Non-null test
    pub fn is_not_null(inner: Expr) -> Self {
        Self::IsNotNull(Box::new(inner))
    }
}

/// Statements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `let name = value`
    Let(String, Expr),
    /// Field or local assignment
    Assign(Expr, Expr),
    /// Property write
    SetProperty {
        /// Receiver
        target: Expr,
        /// Property name
        property: String,
        /// New value
        value: Expr,
    },
    /// Expression statement
    Expr(Expr),
    /// Conditional
    If {
        /// Condition
        cond: Expr,
        /// Taken branch
        then: Vec<Stmt>,
        /// Other branch
        otherwise: Vec<Stmt>,
    },
    /// Return
    Return(Option<Expr>),
}

impl Stmt {
    /// `if cond { then }`
    pub fn when(cond: Expr, then: Vec<Stmt>) -> Self {
        Self::If {
            cond,
            then,
            otherwise: Vec::new(),
        }
    }

    /// Property write
    pub fn set_property(target: Expr, property: impl Into<String>, value: Expr) -> Self {
        Self::SetProperty {
            target,
            property: property.into(),
            value,
        }
    }
}

/// Member visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Public
    #[default]
    Public,
    /// Visible inside the generated assembly only
    Internal,
    /// Private to the type
    Private,
}

/// Attribute argument, positional when `name` is `None`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeArg {
    /// Argument name
    pub name: Option<String>,
    /// Argument value
    pub value: Expr,
}

/// An attribute on a type or member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    /// Attribute type
    pub ty: TypeReference,
    /// Arguments
    pub args: Vec<AttributeArg>,
}

impl AttributeDecl {
    /// Attribute from the client runtime
    pub fn framework(name: &str) -> Self {
        Self {
            ty: TypeReference::framework(name),
            args: Vec::new(),
        }
    }

    /// Add a positional argument
    pub fn arg(mut self, value: Expr) -> Self {
        self.args.push(AttributeArg { name: None, value });
        self
    }

    /// Add a named argument
    pub fn named(mut self, name: impl Into<String>, value: Expr) -> Self {
        self.args.push(AttributeArg {
            name: Some(name.into()),
            value,
        });
        self
    }
}

/// A backing field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: ClientType,
}

/// A property setter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetterDecl {
    /// Setter visibility
    pub visibility: Visibility,
    /// Setter body; the new value is [`Expr::Value`]
    pub body: Vec<Stmt>,
}

/// A property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDecl {
    /// Property name
    pub name: String,
    /// Property type
    pub ty: ClientType,
    /// Attributes
    pub attributes: Vec<AttributeDecl>,
    /// Doc or explanatory comments
    pub comments: Vec<String>,
    /// Getter body
    pub getter: Vec<Stmt>,
    /// Setter, absent for read-only properties
    pub setter: Option<SetterDecl>,
}

/// What kind of method a declaration is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodKind {
    /// Ordinary method with a body
    #[default]
    Regular,
    /// Constructor
    Constructor,
    /// Extension hook the client may implement; no body
    Hook,
}

/// A method parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDecl {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: ClientType,
}

impl ParameterDecl {
    /// Create a parameter
    pub fn new(name: impl Into<String>, ty: ClientType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A method
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// Kind
    pub kind: MethodKind,
    /// Visibility
    pub visibility: Visibility,
    /// Parameters
    pub parameters: Vec<ParameterDecl>,
    /// Return type, `None` for unit
    pub return_type: Option<ClientType>,
    /// Body
    pub body: Vec<Stmt>,
    /// Overrides a runtime base member
    pub is_override: bool,
    /// Attributes
    pub attributes: Vec<AttributeDecl>,
    /// Doc comments
    pub comments: Vec<String>,
}

impl MethodDecl {
    /// Public regular method
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Hook declaration
    pub fn hook(name: impl Into<String>, parameters: Vec<ParameterDecl>) -> Self {
        Self {
            name: name.into(),
            kind: MethodKind::Hook,
            visibility: Visibility::Private,
            parameters,
            ..Default::default()
        }
    }
}

/// A member of a type, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    /// Backing field
    Field(FieldDecl),
    /// Property
    Property(PropertyDecl),
    /// Method
    Method(MethodDecl),
}

impl Member {
    /// Member name
    pub fn name(&self) -> &str {
        match self {
            Self::Field(f) => &f.name,
            Self::Property(p) => &p.name,
            Self::Method(m) => &m.name,
        }
    }
}

/// One enum member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMemberDecl {
    /// Member name
    pub name: String,
    /// Value
    pub value: i64,
}

/// Class or enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDeclKind {
    /// Class with members
    Class,
    /// Enum
    Enum {
        /// Bit-flag enum
        is_flags: bool,
        /// Members in declaration order
        members: Vec<EnumMemberDecl>,
    },
}

/// A generated type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    /// Short name
    pub name: String,
    /// Class or enum
    pub kind: TypeDeclKind,
    /// Base type
    pub base: Option<ClientType>,
    /// Abstract class
    pub is_abstract: bool,
    /// Attributes
    pub attributes: Vec<AttributeDecl>,
    /// Doc comments
    pub comments: Vec<String>,
    /// Members in declaration order
    pub members: Vec<Member>,
}

impl TypeDecl {
    /// Empty class
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeDeclKind::Class,
            base: None,
            is_abstract: false,
            attributes: Vec::new(),
            comments: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Whether a member with this name exists
    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name() == name)
    }

    /// Find a method
    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.members.iter().find_map(|m| match m {
            Member::Method(method) if method.name == name => Some(method),
            _ => None,
        })
    }

    /// Find a property
    pub fn property(&self, name: &str) -> Option<&PropertyDecl> {
        self.members.iter().find_map(|m| match m {
            Member::Property(property) if property.name == name => Some(property),
            _ => None,
        })
    }

    /// Iterate properties
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Property(p) => Some(p),
            _ => None,
        })
    }

    /// Find an attribute by short name
    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|a| a.ty.name == name)
    }
}

/// A namespace
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamespaceDecl {
    /// Namespace name
    pub name: String,
    /// Namespaces imported for unqualified references, sorted
    pub imports: Vec<String>,
    /// Types in declaration order
    pub types: Vec<TypeDecl>,
}

/// The whole output of a pass
#[derive(Debug, Clone, Default)]
pub struct GeneratedTypeGraph {
    namespaces: IndexMap<String, NamespaceDecl>,
}

impl GeneratedTypeGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a type to a namespace, creating the namespace on first use
    pub fn add_type(&mut self, namespace: &str, decl: TypeDecl) {
        self.namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| NamespaceDecl {
                name: namespace.to_string(),
                ..Default::default()
            })
            .types
            .push(decl);
    }

    /// Namespaces in creation order
    pub fn namespaces(&self) -> impl Iterator<Item = &NamespaceDecl> {
        self.namespaces.values()
    }

    /// Find a namespace
    pub fn namespace(&self, name: &str) -> Option<&NamespaceDecl> {
        self.namespaces.get(name)
    }

    /// Find a type
    pub fn find_type(&self, namespace: &str, name: &str) -> Option<&TypeDecl> {
        self.namespaces
            .get(namespace)
            .and_then(|ns| ns.types.iter().find(|t| t.name == name))
    }

    /// Find a type for amendment
    pub fn find_type_mut(&mut self, namespace: &str, name: &str) -> Option<&mut TypeDecl> {
        self.namespaces
            .get_mut(namespace)
            .and_then(|ns| ns.types.iter_mut().find(|t| t.name == name))
    }

    /// Total number of type declarations
    pub fn type_count(&self) -> usize {
        self.namespaces.values().map(|ns| ns.types.len()).sum()
    }

    /// Final pass: drop empty namespaces and compute sorted imports
    ///
    /// Every unqualified reference to a type outside the namespace adds its
    /// namespace to the imports. Qualified references never do.
    pub fn normalize(&mut self) {
        self.namespaces.retain(|_, ns| !ns.types.is_empty());

        for ns in self.namespaces.values_mut() {
            let mut collector = ImportCollector::default();
            for decl in &ns.types {
                collector.visit_type(decl);
            }
            collector.namespaces.remove(&ns.name);
            ns.imports = collector.namespaces.into_iter().collect();
        }
    }
}

/// Read-only traversal over the graph
///
/// Every `visit_*` method defaults to the matching `walk_*` function, so an
/// implementation only overrides the nodes it cares about.
pub trait Visitor {
    /// Visit a namespace
    fn visit_namespace(&mut self, ns: &NamespaceDecl) {
        walk_namespace(self, ns);
    }

    /// Visit a type declaration
    fn visit_type(&mut self, decl: &TypeDecl) {
        walk_type(self, decl);
    }

    /// Visit a field
    fn visit_field(&mut self, field: &FieldDecl) {
        self.visit_client_type(&field.ty);
    }

    /// Visit a property
    fn visit_property(&mut self, property: &PropertyDecl) {
        walk_property(self, property);
    }

    /// Visit a method
    fn visit_method(&mut self, method: &MethodDecl) {
        walk_method(self, method);
    }

    /// Visit an attribute
    fn visit_attribute(&mut self, attribute: &AttributeDecl) {
        self.visit_type_reference(&attribute.ty);
        for arg in &attribute.args {
            self.visit_expr(&arg.value);
        }
    }

    /// Visit a statement
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    /// Visit an expression
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    /// Visit a client type
    fn visit_client_type(&mut self, ty: &ClientType) {
        walk_client_type(self, ty);
    }

    /// Visit a named type reference
    fn visit_type_reference(&mut self, _reference: &TypeReference) {}
}

/// Walk a namespace's types
pub fn walk_namespace<V: Visitor + ?Sized>(v: &mut V, ns: &NamespaceDecl) {
    for decl in &ns.types {
        v.visit_type(decl);
    }
}

/// Walk a type's base, attributes and members
pub fn walk_type<V: Visitor + ?Sized>(v: &mut V, decl: &TypeDecl) {
    if let Some(base) = &decl.base {
        v.visit_client_type(base);
    }
    for attribute in &decl.attributes {
        v.visit_attribute(attribute);
    }
    for member in &decl.members {
        match member {
            Member::Field(field) => v.visit_field(field),
            Member::Property(property) => v.visit_property(property),
            Member::Method(method) => v.visit_method(method),
        }
    }
}

/// Walk a property
pub fn walk_property<V: Visitor + ?Sized>(v: &mut V, property: &PropertyDecl) {
    v.visit_client_type(&property.ty);
    for attribute in &property.attributes {
        v.visit_attribute(attribute);
    }
    for stmt in &property.getter {
        v.visit_stmt(stmt);
    }
    if let Some(setter) = &property.setter {
        for stmt in &setter.body {
            v.visit_stmt(stmt);
        }
    }
}

/// Walk a method
pub fn walk_method<V: Visitor + ?Sized>(v: &mut V, method: &MethodDecl) {
    for attribute in &method.attributes {
        v.visit_attribute(attribute);
    }
    for parameter in &method.parameters {
        v.visit_client_type(&parameter.ty);
    }
    if let Some(ty) = &method.return_type {
        v.visit_client_type(ty);
    }
    for stmt in &method.body {
        v.visit_stmt(stmt);
    }
}

/// Walk a statement
pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::Let(_, value) | Stmt::Expr(value) => v.visit_expr(value),
        Stmt::Assign(target, value) => {
            v.visit_expr(target);
            v.visit_expr(value);
        }
        Stmt::SetProperty { target, value, .. } => {
            v.visit_expr(target);
            v.visit_expr(value);
        }
        Stmt::If {
            cond,
            then,
            otherwise,
        } => {
            v.visit_expr(cond);
            for stmt in then.iter().chain(otherwise) {
                v.visit_stmt(stmt);
            }
        }
        Stmt::Return(value) => {
            if let Some(value) = value {
                v.visit_expr(value);
            }
        }
    }
}

/// Walk an expression
pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    match expr {
        Expr::This
        | Expr::Value
        | Expr::Null
        | Expr::Literal(_)
        | Expr::Local(_)
        | Expr::MethodRef(_) => {}
        Expr::Default(ty) | Expr::TypeOf(ty) => v.visit_client_type(ty),
        Expr::Field(target, _) | Expr::Property(target, _) => v.visit_expr(target),
        Expr::Call {
            target,
            type_args,
            args,
            ..
        } => {
            v.visit_expr(target);
            for ty in type_args {
                v.visit_client_type(ty);
            }
            for arg in args {
                v.visit_expr(arg);
            }
        }
        Expr::StaticCall { ty, args, .. } | Expr::New(ty, args) => {
            v.visit_client_type(ty);
            for arg in args {
                v.visit_expr(arg);
            }
        }
        Expr::Parameters(pairs) => {
            for (_, value) in pairs {
                v.visit_expr(value);
            }
        }
        Expr::Eq(left, right) | Expr::Ne(left, right) => {
            v.visit_expr(left);
            v.visit_expr(right);
        }
        Expr::And(items) | Expr::Or(items) => {
            for item in items {
                v.visit_expr(item);
            }
        }
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => v.visit_expr(inner),
    }
}

/// Walk a client type
pub fn walk_client_type<V: Visitor + ?Sized>(v: &mut V, ty: &ClientType) {
    match ty {
        ClientType::Scalar(_) | ClientType::Object => {}
        ClientType::Named(reference) => v.visit_type_reference(reference),
        ClientType::Generic(reference, args) => {
            v.visit_type_reference(reference);
            for arg in args {
                v.visit_client_type(arg);
            }
        }
        ClientType::Nullable(inner) | ClientType::List(inner) => v.visit_client_type(inner),
    }
}

#[derive(Default)]
struct ImportCollector {
    namespaces: BTreeSet<String>,
}

impl Visitor for ImportCollector {
    fn visit_type_reference(&mut self, reference: &TypeReference) {
        if !reference.qualified && !reference.namespace.is_empty() {
            self.namespaces.insert(reference.namespace.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_with_field(name: &str, field_ty: ClientType) -> TypeDecl {
        let mut decl = TypeDecl::class(name);
        decl.members.push(Member::Field(FieldDecl {
            name: "_value".to_string(),
            ty: field_ty,
        }));
        decl
    }

    #[test]
    fn test_normalize_collects_sorted_imports() {
        let mut graph = GeneratedTypeGraph::new();
        let mut decl = class_with_field(
            "Order",
            ClientType::Named(TypeReference::new("Shop.Client.Sales", "Customer")),
        );
        decl.base = Some(ClientType::framework("Entity"));
        graph.add_type("Shop.Client", decl);
        graph.normalize();

        let ns = graph.namespace("Shop.Client").unwrap();
        assert_eq!(
            ns.imports,
            vec![FRAMEWORK_NAMESPACE.to_string(), "Shop.Client.Sales".to_string()]
        );
    }

    #[test]
    fn test_normalize_skips_own_and_qualified() {
        let mut graph = GeneratedTypeGraph::new();
        let mut qualified = TypeReference::new("Other", "Customer");
        qualified.qualified = true;
        graph.add_type(
            "Shop",
            class_with_field("A", ClientType::Named(TypeReference::new("Shop", "B"))),
        );
        graph.add_type(
            "Shop",
            class_with_field("B", ClientType::Named(qualified)),
        );
        graph.normalize();
        assert!(graph.namespace("Shop").unwrap().imports.is_empty());
    }

    #[test]
    fn test_normalize_drops_empty_namespaces() {
        let mut graph = GeneratedTypeGraph::new();
        graph.add_type("Shop", TypeDecl::class("A"));
        graph.namespaces.get_mut("Shop").unwrap().types.clear();
        graph.normalize();
        assert_eq!(graph.namespaces().count(), 0);
    }

    #[test]
    fn test_find_type_mut() {
        let mut graph = GeneratedTypeGraph::new();
        graph.add_type("Shop", TypeDecl::class("Order"));
        graph
            .find_type_mut("Shop", "Order")
            .unwrap()
            .members
            .push(Member::Method(MethodDecl::new("Ship")));
        assert!(graph.find_type("Shop", "Order").unwrap().has_member("Ship"));
        assert_eq!(graph.type_count(), 1);
    }
}
