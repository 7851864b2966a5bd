//! Options parsing for a generation pass
//!
//! Options travel the same way protoc plugin parameters do: a single
//! comma-separated string of `key=value` (or `key: value`) pairs, e.g.
//!
//! ```text
//! language=Rust, use_fully_qualified_names=true, client_root_namespace="Acme.Client"
//! ```
//!
//! Unknown keys are ignored so that hosts can pass extra settings through.

use crate::GeneratorError;

/// Name of the language handled by the built-in generator
pub const DEFAULT_LANGUAGE: &str = "Rust";

/// Configuration record for one generation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Output language; required and non-empty
    pub language: String,
    /// Emit every type reference fully qualified
    pub use_fully_qualified_names: bool,
    /// Emit the application-level `WebContext`
    pub enable_application_level_context: bool,
    /// Client namespace replacing `server_root_namespace`
    pub client_root_namespace: Option<String>,
    /// Server namespace prefix to rewrite
    pub server_root_namespace: Option<String>,
    /// Explicitly requested generator, by logical name or full identity
    pub generator_name: Option<String>,
    /// Output file name, used in the generated header only
    pub generated_file_name: Option<String>,
}

impl GenerationOptions {
    /// Options for `language` with everything else defaulted
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Default::default()
        }
    }

    /// Set the client root namespace
    pub fn with_client_root_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.client_root_namespace = Some(namespace.into());
        self
    }

    /// Set the server root namespace
    pub fn with_server_root_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.server_root_namespace = Some(namespace.into());
        self
    }

    /// Request a specific generator
    pub fn with_generator_name(mut self, name: impl Into<String>) -> Self {
        self.generator_name = Some(name.into());
        self
    }

    /// Parse a plugin parameter string
    pub fn parse_parameter(parameter: &str) -> Result<Self, GeneratorError> {
        let mut options = Self::default();

        for part in split_parameter_parts(parameter) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .or_else(|| part.split_once(':'))
                .map(|(k, v)| (k.trim(), v.trim()))
                .unwrap_or((part, "true"));

            match key {
                "language" => options.language = parse_quoted_string(value),
                "use_fully_qualified_names" | "fully_qualified" => {
                    options.use_fully_qualified_names = parse_bool(key, value)?
                }
                "enable_application_level_context" | "application_context" => {
                    options.enable_application_level_context = parse_bool(key, value)?
                }
                "client_root_namespace" => {
                    options.client_root_namespace = non_empty(parse_quoted_string(value))
                }
                "server_root_namespace" => {
                    options.server_root_namespace = non_empty(parse_quoted_string(value))
                }
                "generator" | "generator_name" => {
                    options.generator_name = non_empty(parse_quoted_string(value))
                }
                "file_name" | "generated_file_name" => {
                    options.generated_file_name = non_empty(parse_quoted_string(value))
                }
                _ => {}
            }
        }

        Ok(options)
    }

    /// Check preconditions before any generation work starts
    pub fn validate(&self) -> Result<(), GeneratorError> {
        if self.language.trim().is_empty() {
            return Err(GeneratorError::InvalidConfig(
                "the 'language' option is required and must not be empty".to_string(),
            ));
        }
        if self.client_root_namespace.is_some() != self.server_root_namespace.is_some() {
            tracing::debug!(
                client = ?self.client_root_namespace,
                server = ?self.server_root_namespace,
                "only one root namespace configured; namespaces are not rewritten"
            );
        }
        Ok(())
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, GeneratorError> {
    match parse_quoted_string(value).to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(GeneratorError::InvalidConfig(format!(
            "option '{}' expects a boolean, got '{}'",
            key, other
        ))),
    }
}

/// Split parameter string on top-level commas (not inside quotes)
fn split_parameter_parts(parameter: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;

    for (i, c) in parameter.char_indices() {
        match c {
            '"' | '\'' if quote == Some(c) => quote = None,
            '"' | '\'' if quote.is_none() => quote = Some(c),
            ',' if quote.is_none() => {
                parts.push(&parameter[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if start < parameter.len() {
        parts.push(&parameter[start..]);
    }

    parts
}

/// Parse a quoted string value, removing quotes
fn parse_quoted_string(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quoted_string() {
        assert_eq!(parse_quoted_string("\"hello\""), "hello");
        assert_eq!(parse_quoted_string("'world'"), "world");
        assert_eq!(parse_quoted_string("unquoted"), "unquoted");
        assert_eq!(parse_quoted_string("\""), "\"");
    }

    #[test]
    fn test_split_parameter_parts_respects_quotes() {
        let parts = split_parameter_parts("language=Rust, client_root_namespace=\"A,B\"");
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_parse_parameter() {
        let options = GenerationOptions::parse_parameter(
            "language=Rust,use_fully_qualified_names=true,client_root_namespace=\"Acme.Client\",server_root_namespace=Acme.Server,generator=Custom",
        )
        .unwrap();
        assert_eq!(options.language, "Rust");
        assert!(options.use_fully_qualified_names);
        assert!(!options.enable_application_level_context);
        assert_eq!(options.client_root_namespace.as_deref(), Some("Acme.Client"));
        assert_eq!(options.server_root_namespace.as_deref(), Some("Acme.Server"));
        assert_eq!(options.generator_name.as_deref(), Some("Custom"));
    }

    #[test]
    fn test_bare_flag_means_true() {
        let options =
            GenerationOptions::parse_parameter("language: Rust, application_context").unwrap();
        assert!(options.enable_application_level_context);
    }

    #[test]
    fn test_bad_bool_rejected() {
        let err = GenerationOptions::parse_parameter("language=Rust,fully_qualified=maybe")
            .unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_language_is_precondition_violation() {
        let options = GenerationOptions::parse_parameter("use_fully_qualified_names=false").unwrap();
        assert!(matches!(
            options.validate(),
            Err(GeneratorError::InvalidConfig(_))
        ));
        assert!(GenerationOptions::new(DEFAULT_LANGUAGE).validate().is_ok());
    }
}
