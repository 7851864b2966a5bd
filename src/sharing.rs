//! Type-sharing resolution
//!
//! The host project decides whether a server type, property or method is
//! already visible to the client, either because its source file is linked
//! into the client project or because the client references a binary that
//! defines it. The generator only queries that knowledge through
//! [`SharedTypeResolver`].

use bitflags::bitflags;
use std::cell::RefCell;
use std::collections::HashMap;
use thiserror::Error;

bitflags! {
    /// How a symbol is already visible to the client
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShareKind: u8 {
        /// Source file is shared with the client project
        const SHARED_BY_SOURCE    = 0b01;
        /// Defined in a binary the client project references
        const SHARED_BY_REFERENCE = 0b10;
    }
}

impl ShareKind {
    /// Not visible to the client
    pub const NOT_SHARED: ShareKind = ShareKind::empty();

    /// Either flag is set
    pub fn is_shared(self) -> bool {
        !self.is_empty()
    }
}

/// Failures reported by a resolver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// A referenced file does not exist
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// A referenced file is locked by another process
    #[error("file is locked: {0}")]
    FileLocked(String),

    /// A referenced binary could not be read
    #[error("bad image format: {0}")]
    BadImageFormat(String),

    /// The host refused access
    #[error("security restriction: {0}")]
    Security(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl ResolverError {
    /// Known failure modes that mean "nothing available" rather than a bug
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// Oracle answering "is this already visible to the client?"
pub trait SharedTypeResolver {
    /// Classify a type by qualified name
    fn classify(&self, type_name: &str) -> Result<ShareKind, ResolverError>;

    /// Classify a property of a type
    fn classify_property(&self, type_name: &str, property: &str)
        -> Result<ShareKind, ResolverError>;

    /// Classify a method of a type by name and parameter type names
    fn classify_method(
        &self,
        type_name: &str,
        method: &str,
        parameter_types: &[String],
    ) -> Result<ShareKind, ResolverError>;
}

/// Resolver for hosts that share nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NothingShared;

impl SharedTypeResolver for NothingShared {
    fn classify(&self, _type_name: &str) -> Result<ShareKind, ResolverError> {
        Ok(ShareKind::NOT_SHARED)
    }

    fn classify_property(&self, _: &str, _: &str) -> Result<ShareKind, ResolverError> {
        Ok(ShareKind::NOT_SHARED)
    }

    fn classify_method(&self, _: &str, _: &str, _: &[String]) -> Result<ShareKind, ResolverError> {
        Ok(ShareKind::NOT_SHARED)
    }
}

/// Resolver backed by lists the host computed up front
///
/// Properties and methods that have no explicit entry inherit the
/// classification of their declaring type.
#[derive(Debug, Clone, Default)]
pub struct SharedTypeSet {
    types: HashMap<String, ShareKind>,
    properties: HashMap<(String, String), ShareKind>,
    methods: HashMap<(String, String, Vec<String>), ShareKind>,
}

impl SharedTypeSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a type as shared
    pub fn with_type(mut self, type_name: impl Into<String>, kind: ShareKind) -> Self {
        self.add_type(type_name, kind);
        self
    }

    /// Mark a property as shared
    pub fn with_property(
        mut self,
        type_name: impl Into<String>,
        property: impl Into<String>,
        kind: ShareKind,
    ) -> Self {
        self.add_property(type_name, property, kind);
        self
    }

    /// Mark a type as shared
    pub fn add_type(&mut self, type_name: impl Into<String>, kind: ShareKind) {
        *self.types.entry(type_name.into()).or_default() |= kind;
    }

    /// Mark a property as shared
    pub fn add_property(
        &mut self,
        type_name: impl Into<String>,
        property: impl Into<String>,
        kind: ShareKind,
    ) {
        *self
            .properties
            .entry((type_name.into(), property.into()))
            .or_default() |= kind;
    }

    /// Mark a method overload as shared
    pub fn add_method(
        &mut self,
        type_name: impl Into<String>,
        method: impl Into<String>,
        parameter_types: Vec<String>,
        kind: ShareKind,
    ) {
        *self
            .methods
            .entry((type_name.into(), method.into(), parameter_types))
            .or_default() |= kind;
    }

    fn type_kind(&self, type_name: &str) -> ShareKind {
        self.types.get(type_name).copied().unwrap_or_default()
    }
}

impl SharedTypeResolver for SharedTypeSet {
    fn classify(&self, type_name: &str) -> Result<ShareKind, ResolverError> {
        Ok(self.type_kind(type_name))
    }

    fn classify_property(
        &self,
        type_name: &str,
        property: &str,
    ) -> Result<ShareKind, ResolverError> {
        let explicit = self
            .properties
            .get(&(type_name.to_string(), property.to_string()))
            .copied()
            .unwrap_or_default();
        Ok(explicit | self.type_kind(type_name))
    }

    fn classify_method(
        &self,
        type_name: &str,
        method: &str,
        parameter_types: &[String],
    ) -> Result<ShareKind, ResolverError> {
        let explicit = self
            .methods
            .get(&(
                type_name.to_string(),
                method.to_string(),
                parameter_types.to_vec(),
            ))
            .copied()
            .unwrap_or_default();
        Ok(explicit | self.type_kind(type_name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Query {
    Type(String),
    Property(String, String),
    Method(String, String, Vec<String>),
}

/// Per-pass memo in front of the host resolver
///
/// Created at pass start and dropped at pass end, so answers never leak
/// into the next build. Only successful answers are remembered.
pub struct PassResolver<'a> {
    inner: &'a dyn SharedTypeResolver,
    memo: RefCell<HashMap<Query, ShareKind>>,
}

impl<'a> PassResolver<'a> {
    /// Wrap a host resolver
    pub fn new(inner: &'a dyn SharedTypeResolver) -> Self {
        Self {
            inner,
            memo: RefCell::new(HashMap::new()),
        }
    }

    fn cached(
        &self,
        query: Query,
        resolve: impl FnOnce() -> Result<ShareKind, ResolverError>,
    ) -> Result<ShareKind, ResolverError> {
        if let Some(kind) = self.memo.borrow().get(&query) {
            return Ok(*kind);
        }
        let kind = resolve()?;
        self.memo.borrow_mut().insert(query, kind);
        Ok(kind)
    }

    /// Classify a type
    pub fn classify(&self, type_name: &str) -> Result<ShareKind, ResolverError> {
        self.cached(Query::Type(type_name.to_string()), || {
            self.inner.classify(type_name)
        })
    }

    /// Classify a property
    pub fn classify_property(
        &self,
        type_name: &str,
        property: &str,
    ) -> Result<ShareKind, ResolverError> {
        self.cached(
            Query::Property(type_name.to_string(), property.to_string()),
            || self.inner.classify_property(type_name, property),
        )
    }

    /// Classify a method
    pub fn classify_method(
        &self,
        type_name: &str,
        method: &str,
        parameter_types: &[String],
    ) -> Result<ShareKind, ResolverError> {
        self.cached(
            Query::Method(
                type_name.to_string(),
                method.to_string(),
                parameter_types.to_vec(),
            ),
            || {
                self.inner
                    .classify_method(type_name, method, parameter_types)
            },
        )
    }
}
