//! domain-client-gen library
//!
//! This crate turns server-side domain service descriptors into strongly
//! typed client proxies: entity classes with change notification and
//! association glue, complex types, enums and one context per service.

#![deny(missing_docs)]

pub mod codegen;
pub mod descriptor;
pub mod diagnostics;
pub mod enums;
pub mod generator;
pub mod graph;
pub mod names;
pub mod options;
pub mod render;
pub mod selection;
pub mod sharing;
pub mod wire;

use thiserror::Error;

pub use generator::{generate, GenerationOutput};
pub use sharing::ResolverError;

/// Errors that abort a generation pass
///
/// Problems with individual types are logged instead and only fail the
/// pass through the error count.
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Invalid options or parameter string
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Descriptors that violate the model's structural rules
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Unexpected failure from the shared-type resolver
    #[error("Shared type resolution failed: {0}")]
    Resolver(#[from] ResolverError),

    /// General code generation failure
    #[error("Code generation failed: {0}")]
    CodeGenError(String),

    /// Failed to decode a request message
    #[error("Decode error: {0}")]
    DecodeError(String),
}

/// Run a pass over an encoded [`wire::GenerationRequest`]
///
/// The request's shared-type lists act as the resolver and only the built-in
/// generators are candidates.
pub fn generate_from_bytes(bytes: &[u8]) -> Result<wire::GenerationResponse, GeneratorError> {
    let decoded = wire::decode_request(bytes)?;
    let output = generate(
        &decoded.model,
        &decoded.options,
        &decoded.shared,
        &generator::builtin_candidates(),
    )?;

    Ok(wire::GenerationResponse {
        source: output.source,
        log: output.log.iter().map(wire::LogEntryProto::from).collect(),
        has_errors: output.has_errors,
        error: None,
    })
}
