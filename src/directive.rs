//! Parsing of the single-line directive the model must answer with.

use crate::error::{AgentError, Result};

pub const FUNCTION_CALL_PREFIX: &str = "FUNCTION_CALL:";
pub const FINAL_ANSWER_PREFIX: &str = "FINAL_ANSWER:";

/// The instruction extracted from one model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Call { name: String, raw_args: Vec<String> },
    Final { value: String },
}

/// Picks the directive out of a model response.
///
/// The first line starting with `FUNCTION_CALL:` wins, so commentary around it
/// is ignored. Without such a line the whole trimmed response must itself be a
/// directive.
pub fn parse(response: &str) -> Result<Directive> {
    let response = response.trim();
    let candidate = response
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with(FUNCTION_CALL_PREFIX))
        .unwrap_or(response);

    if candidate.starts_with(FUNCTION_CALL_PREFIX) {
        let (_, info) = candidate.split_once(':').unwrap_or((candidate, ""));
        let mut parts = info.split('|').map(|part| part.trim().to_string());
        let name = parts.next().unwrap_or_default();
        let raw_args: Vec<String> = parts.collect();
        tracing::debug!(%name, ?raw_args, "parsed function call");
        return Ok(Directive::Call { name, raw_args });
    }

    if let Some(value) = candidate.strip_prefix(FINAL_ANSWER_PREFIX) {
        return Ok(Directive::Final {
            value: value.trim().to_string(),
        });
    }

    Err(AgentError::MalformedDirective(candidate.to_string()))
}
