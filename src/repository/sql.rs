//! SQL statement registry.
//!
//! All SQL lives in `queries.sql`, split into `-- name:` sections and
//! embedded at compile time. Call sites look statements up by name so the
//! query text stays reviewable in one place.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{PipelineError, PipelineResult};

const QUERIES: &str = include_str!("queries.sql");

static REGISTRY: OnceLock<HashMap<String, String>> = OnceLock::new();

fn registry() -> &'static HashMap<String, String> {
    REGISTRY.get_or_init(|| parse_sections(QUERIES))
}

fn parse_sections(raw: &str) -> HashMap<String, String> {
    let mut sections = HashMap::new();
    let mut current_name: Option<String> = None;
    let mut buffer = String::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix("-- name:") {
            if let Some(previous) = current_name.take() {
                sections.insert(previous, buffer.trim().to_string());
            }
            current_name = Some(name.trim().to_string());
            buffer = String::new();
        } else if current_name.is_some() {
            buffer.push_str(line);
            buffer.push('\n');
        }
    }
    if let Some(previous) = current_name {
        sections.insert(previous, buffer.trim().to_string());
    }
    sections
}

/// Look up a statement by section name.
pub fn statement(name: &str) -> PipelineResult<&'static str> {
    registry()
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| PipelineError::Config(format!("unknown SQL statement '{name}'")))
}
