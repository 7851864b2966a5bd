//! domain-client-gen - client proxy generator process
//!
//! This binary reads a GenerationRequest from stdin and writes a
//! GenerationResponse to stdout. Tracing goes to stderr and is controlled
//! by `RUST_LOG`.

use domain_client_gen::wire::GenerationResponse;
use prost::Message;
use std::io::{self, Read, Write};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("domain-client-gen: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    io::stdin().read_to_end(&mut buf)?;

    let response = domain_client_gen::generate_from_bytes(&buf).unwrap_or_else(|e| {
        tracing::error!(error = %e, "generation aborted");
        GenerationResponse {
            error: Some(e.to_string()),
            ..Default::default()
        }
    });

    tracing::debug!(
        entries = response.log.len(),
        has_errors = response.has_errors,
        bytes = response.source.as_ref().map_or(0, String::len),
        "generation finished"
    );

    let mut out = Vec::new();
    response.encode(&mut out)?;
    io::stdout().write_all(&out)?;

    Ok(())
}
