//! Rendering the client graph into source text
//!
//! The graph is language neutral; a renderer is picked by the `language`
//! option. Only Rust output ships with the crate.

pub mod rust;

use crate::graph::GeneratedTypeGraph;
use crate::options::GenerationOptions;
use crate::GeneratorError;

/// Header placed above every generated file
pub fn banner(options: &GenerationOptions) -> String {
    let mut header = String::from("// Code generated by domain-client-gen. DO NOT EDIT.\n");
    if let Some(file) = &options.generated_file_name {
        header.push_str(&format!("// File: {}\n", file));
    }
    header.push_str("// Changes to this file are lost when the code is regenerated.\n\n");
    header
}

/// Render `graph` in the configured language
pub fn render(graph: &GeneratedTypeGraph, options: &GenerationOptions) -> Result<String, GeneratorError> {
    if !options.language.eq_ignore_ascii_case(rust::LANGUAGE) {
        return Err(GeneratorError::CodeGenError(format!(
            "no renderer for language '{}'",
            options.language
        )));
    }
    let body = rust::render(graph)?;
    Ok(format!("{}{}", banner(options), body))
}
