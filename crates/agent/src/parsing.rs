use std::sync::OnceLock;

use railsql_core::flows::RoutingIntent;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingParseError {
    #[error("routing reply contains no JSON object")]
    MissingObject,
    #[error("routing reply is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("unknown routing label `{0}`")]
    UnknownLabel(String),
}

#[derive(Debug, Deserialize)]
struct RoutingReply {
    next_step: String,
}

fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(?:\w+)?\s*(.*?)```").ok()).as_ref()
}

/// Content of the first fenced block, or the whole reply, trimmed.
pub fn extract_fenced(reply: &str) -> String {
    fence_pattern()
        .and_then(|pattern| pattern.captures(reply))
        .and_then(|captures| captures.get(1))
        .map_or(reply, |body| body.as_str())
        .trim()
        .to_string()
}

/// Reads `{'next_step': 'query' | 'interpret' | 'stop'}` out of a model reply.
/// Single quotes are accepted and surrounding prose or fences are ignored.
pub fn parse_routing_reply(reply: &str) -> Result<RoutingIntent, RoutingParseError> {
    let normalized = extract_fenced(reply).replace('\'', "\"");
    let start = normalized.find('{').ok_or(RoutingParseError::MissingObject)?;
    let end = normalized.rfind('}').ok_or(RoutingParseError::MissingObject)?;
    if end < start {
        return Err(RoutingParseError::MissingObject);
    }

    let parsed: RoutingReply = serde_json::from_str(&normalized[start..=end])
        .map_err(|error| RoutingParseError::InvalidJson(error.to_string()))?;
    RoutingIntent::from_label(&parsed.next_step)
        .ok_or(RoutingParseError::UnknownLabel(parsed.next_step))
}
