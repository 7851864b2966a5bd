//! Client-side naming
//!
//! The [`NameRegistry`] tracks, per namespace scope, which fully-qualified
//! type every short name stands for. A second type wanting the same short
//! name in the same scope must be written fully qualified. Every scope starts
//! out owning the runtime's short names.

use crate::descriptor::TypeName;
use crate::graph::{FRAMEWORK_NAMESPACE, FRAMEWORK_TYPES};
use crate::options::GenerationOptions;
use once_cell::sync::Lazy;
use std::collections::HashMap;

static FRAMEWORK_SCOPE: Lazy<HashMap<String, TypeName>> = Lazy::new(|| {
    FRAMEWORK_TYPES
        .iter()
        .map(|name| (name.to_string(), TypeName::new(FRAMEWORK_NAMESPACE, *name)))
        .collect()
});

/// Outcome of registering a short name in a scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// First use of the short name in this scope
    Added,
    /// Same type registered before; nothing changed
    Existing,
    /// Short name already taken by a different type
    Conflict {
        /// The type that owns the short name
        existing: TypeName,
    },
}

impl Registration {
    /// Whether references must be qualified
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Per-namespace short-name table for one pass
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    scopes: HashMap<String, HashMap<String, TypeName>>,
}

impl NameRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` as visible by its short name inside `scope`
    pub fn register(&mut self, scope: &str, name: &TypeName) -> Registration {
        let table = self
            .scopes
            .entry(scope.to_string())
            .or_insert_with(|| (*FRAMEWORK_SCOPE).clone());
        match table.get(&name.name) {
            Some(existing) if existing == name => Registration::Existing,
            Some(existing) => Registration::Conflict {
                existing: existing.clone(),
            },
            None => {
                table.insert(name.name.clone(), name.clone());
                Registration::Added
            }
        }
    }

    /// Owner of a short name in a scope
    pub fn lookup(&self, scope: &str, short_name: &str) -> Option<&TypeName> {
        self.scopes
            .get(scope)
            .unwrap_or(&*FRAMEWORK_SCOPE)
            .get(short_name)
    }
}

/// Rewrite a server namespace into its client counterpart
pub fn client_namespace(server_namespace: &str, options: &GenerationOptions) -> String {
    let (Some(server_root), Some(client_root)) = (
        options.server_root_namespace.as_deref(),
        options.client_root_namespace.as_deref(),
    ) else {
        return server_namespace.to_string();
    };

    if server_namespace == server_root {
        client_root.to_string()
    } else if let Some(rest) = server_namespace
        .strip_prefix(server_root)
        .and_then(|rest| rest.strip_prefix('.'))
    {
        format!("{}.{}", client_root, rest)
    } else {
        server_namespace.to_string()
    }
}

/// Client context name for a service: `CatalogService` becomes `CatalogContext`
pub fn context_name(service_name: &str) -> String {
    match service_name.strip_suffix("Service") {
        Some(stem) if !stem.is_empty() => format!("{}Context", stem),
        _ => format!("{}Context", service_name),
    }
}

/// English plural used for entity set accessors
pub fn make_plural_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with('y') {
        let before = lower.chars().rev().nth(1);
        if matches!(before, Some(c) if !"aeiou".contains(c)) {
            return format!("{}ies", &name[..name.len() - 1]);
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        return format!("{}es", name);
    }
    format!("{}s", name)
}
