//! Deferred enum generation
//!
//! Enums are not generated when first seen. Every property, parameter or
//! return type that resolves to an enum registers it here; at the end of the
//! pass the set is resolved once, in first-registration order.

use crate::descriptor::{EnumDescriptor, TypeCatalog, TypeName};
use crate::diagnostics::LogSink;
use crate::sharing::ShareKind;
use crate::GeneratorError;
use indexmap::IndexSet;

/// Enums referenced during one pass, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct EnumDeferralSet {
    registered: IndexSet<TypeName>,
}

impl EnumDeferralSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a use of `enum_type`; returns false if it was already known
    pub fn register_use(&mut self, enum_type: &TypeName) -> bool {
        self.registered.insert(enum_type.clone())
    }

    /// Registered enums in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &TypeName> {
        self.registered.iter()
    }

    /// Number of distinct enums registered
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    /// No enum registered
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Decide which registered enums must be generated
    ///
    /// Shared enums are skipped silently. Enums that cannot be exposed
    /// (non-public, nested, or from a system assembly) are skipped with a
    /// warning. The returned descriptors keep registration order.
    pub fn resolve_all<'c>(
        &self,
        catalog: &'c TypeCatalog,
        mut classify: impl FnMut(&TypeName) -> Result<ShareKind, GeneratorError>,
        log: &mut dyn LogSink,
    ) -> Result<Vec<&'c EnumDescriptor>, GeneratorError> {
        let mut to_generate = Vec::new();

        for name in &self.registered {
            if classify(name)?.is_shared() {
                tracing::debug!(enum_type = %name, "enum already visible to the client");
                continue;
            }

            let Some(descriptor) = catalog.get_enum(name) else {
                log.log_warning(format!(
                    "Enum type '{}' is referenced but has no descriptor; it will not be generated.",
                    name
                ));
                continue;
            };

            if !descriptor.is_public || descriptor.is_nested {
                log.log_warning(format!(
                    "Enum type '{}' cannot be generated because it is not a public top-level type.",
                    name
                ));
                continue;
            }

            if descriptor.is_system {
                log.log_warning(format!(
                    "Enum type '{}' is defined in a system assembly and will not be generated.",
                    name
                ));
                continue;
            }

            to_generate.push(descriptor);
        }

        Ok(to_generate)
    }
}
