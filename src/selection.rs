//! Choosing the code generator for a pass
//!
//! Candidates are keyed by output language and logical name. Precedence:
//! an explicit name always wins, then a lone candidate, then a unique
//! custom generator, then the built-in default with a warning.

use crate::diagnostics::LogSink;
use crate::generator::ClientCodeGenerator;
use std::fmt;

/// A generator implementation available to the pass
#[derive(Clone)]
pub struct GeneratorCandidate {
    /// Fully qualified name of the implementing type
    pub type_name: String,
    /// Logical name used by explicit requests
    pub name: String,
    /// Output language
    pub language: String,
    /// Whether this is the built-in default generator
    pub is_default: bool,
    /// Creates a fresh generator
    pub factory: fn() -> Box<dyn ClientCodeGenerator>,
}

impl GeneratorCandidate {
    /// Create a generator instance
    pub fn instantiate(&self) -> Box<dyn ClientCodeGenerator> {
        (self.factory)()
    }

    fn speaks(&self, language: &str) -> bool {
        self.language.eq_ignore_ascii_case(language)
    }
}

impl fmt::Debug for GeneratorCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorCandidate")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("language", &self.language)
            .field("is_default", &self.is_default)
            .finish()
    }
}

/// Pick the generator for `language`
///
/// Returns `None` after logging an error when no generator can be chosen.
pub fn select_generator<'c>(
    candidates: &'c [GeneratorCandidate],
    language: &str,
    explicit: Option<&str>,
    log: &mut dyn LogSink,
) -> Option<&'c GeneratorCandidate> {
    if let Some(requested) = explicit {
        if let Some(candidate) = candidates.iter().find(|c| c.type_name == requested) {
            if candidate.speaks(language) {
                return Some(candidate);
            }
            tracing::debug!(
                generator = requested,
                language = %candidate.language,
                "named generator does not target the requested language"
            );
        }
    }

    let matches: Vec<&GeneratorCandidate> =
        candidates.iter().filter(|c| c.speaks(language)).collect();
    let default = matches.iter().copied().find(|c| c.is_default);

    if let Some(requested) = explicit {
        let named: Vec<&GeneratorCandidate> = matches
            .iter()
            .copied()
            .filter(|c| c.name.eq_ignore_ascii_case(requested))
            .collect();
        return match named.as_slice() {
            [single] => Some(*single),
            [] => {
                let hint = match default {
                    Some(d) => format!(" Omit the generator name to use the default generator '{}'.", d.name),
                    None => String::new(),
                };
                log.log_error(format!(
                    "No code generator named '{}' is available for language '{}'.{}",
                    requested, language, hint
                ));
                None
            }
            _ => {
                let mut type_names: Vec<&str> = named.iter().map(|c| c.type_name.as_str()).collect();
                type_names.sort_unstable();
                log.log_error(format!(
                    "More than one code generator named '{}' is available for language '{}': {}.",
                    requested,
                    language,
                    type_names.join(", ")
                ));
                None
            }
        };
    }

    if let [single] = matches.as_slice() {
        return Some(*single);
    }

    let mut custom: Vec<&GeneratorCandidate> =
        matches.iter().copied().filter(|c| !c.is_default).collect();
    match custom.len() {
        0 => {}
        1 => return Some(custom[0]),
        _ => {
            custom.sort_by(|a, b| a.name.cmp(&b.name));
            let names: Vec<&str> = custom.iter().map(|c| c.name.as_str()).collect();
            log.log_warning(format!(
                "Multiple code generators are available for language '{}': {}. Using the default generator; name one explicitly to override.",
                language,
                names.join(", ")
            ));
        }
    }

    if default.is_none() {
        log.log_error(format!(
            "No default code generator is available for language '{}'.",
            language
        ));
    }
    default
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DomainModel;
    use crate::diagnostics::{Diagnostics, Severity};
    use crate::options::GenerationOptions;
    use crate::sharing::SharedTypeResolver;
    use crate::GeneratorError;

    struct Silent;

    impl ClientCodeGenerator for Silent {
        fn generate(
            &self,
            _model: &DomainModel,
            _options: &GenerationOptions,
            _resolver: &dyn SharedTypeResolver,
            _log: &mut dyn LogSink,
        ) -> Result<Option<String>, GeneratorError> {
            Ok(None)
        }
    }

    fn silent() -> Box<dyn ClientCodeGenerator> {
        Box::new(Silent)
    }

    fn candidate(name: &str, language: &str, is_default: bool) -> GeneratorCandidate {
        GeneratorCandidate {
            type_name: format!("Gen.{}", name),
            name: name.to_string(),
            language: language.to_string(),
            is_default,
            factory: silent,
        }
    }

    #[test]
    fn test_unique_custom_beats_default() {
        let candidates = vec![candidate("DefaultGen", "C#", true), candidate("CustomGen", "C#", false)];
        let mut log = Diagnostics::new();
        let chosen = select_generator(&candidates, "C#", None, &mut log).unwrap();
        assert_eq!(chosen.name, "CustomGen");
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_ambiguous_custom_falls_back_with_one_warning() {
        let candidates = vec![
            candidate("DefaultGen", "C#", true),
            candidate("CustomB", "C#", false),
            candidate("CustomA", "C#", false),
        ];
        let mut log = Diagnostics::new();
        let chosen = select_generator(&candidates, "C#", None, &mut log).unwrap();
        assert_eq!(chosen.name, "DefaultGen");
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.entries()[0].severity, Severity::Warning);
        assert!(log.entries()[0].message.contains("CustomA, CustomB"));
    }

    #[test]
    fn test_explicit_name_without_match_is_one_error() {
        let candidates = vec![candidate("DefaultGen", "C#", true), candidate("CustomGen", "C#", false)];
        let mut log = Diagnostics::new();
        assert!(select_generator(&candidates, "C#", Some("Missing"), &mut log).is_none());
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.errors().count(), 1);
        assert!(log.entries()[0].message.contains("DefaultGen"));
    }

    #[test]
    fn test_explicit_name_with_duplicates_lists_sorted_types() {
        let mut second = candidate("Twin", "C#", false);
        second.type_name = "A.Twin".to_string();
        let candidates = vec![candidate("Twin", "C#", false), second];
        let mut log = Diagnostics::new();
        assert!(select_generator(&candidates, "C#", Some("twin"), &mut log).is_none());
        assert!(log.entries()[0].message.contains("A.Twin, Gen.Twin"));
    }

    #[test]
    fn test_explicit_name_wins_over_unique_custom() {
        let candidates = vec![candidate("DefaultGen", "C#", true), candidate("CustomGen", "C#", false)];
        let mut log = Diagnostics::new();
        let chosen = select_generator(&candidates, "c#", Some("DefaultGen"), &mut log).unwrap();
        assert!(chosen.is_default);
    }

    #[test]
    fn test_type_name_with_wrong_language_falls_through() {
        let candidates = vec![candidate("DefaultGen", "C#", true), candidate("VbGen", "VB", false)];
        let mut log = Diagnostics::new();
        assert!(select_generator(&candidates, "C#", Some("Gen.VbGen"), &mut log).is_none());
        assert_eq!(log.errors().count(), 1);

        let chosen = select_generator(&candidates, "VB", Some("Gen.VbGen"), &mut log).unwrap();
        assert_eq!(chosen.name, "VbGen");
    }

    #[test]
    fn test_language_filter_leaves_single_candidate() {
        let candidates = vec![candidate("DefaultGen", "C#", true), candidate("RustGen", "Rust", false)];
        let mut log = Diagnostics::new();
        let chosen = select_generator(&candidates, "rust", None, &mut log).unwrap();
        assert_eq!(chosen.name, "RustGen");
    }

    #[test]
    fn test_no_candidate_for_language_is_error() {
        let candidates = vec![candidate("DefaultGen", "C#", true)];
        let mut log = Diagnostics::new();
        assert!(select_generator(&candidates, "Rust", None, &mut log).is_none());
        assert!(log.has_errors());
    }
}
