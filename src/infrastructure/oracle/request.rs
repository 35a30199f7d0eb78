//! The `ReasoningOracle` boundary (spec.md §6): opaque to the core, given a
//! structured prompt and returning free text the core must parse.

use async_trait::async_trait;
use crate::domain::errors::OracleError;

#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub json_mode: bool,
}

#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn respond(&self, request: OracleRequest) -> Result<String, OracleError>;
}

/// Parses a JSON object out of possibly-fenced oracle text (spec.md §6).
/// Tries the whole string first, then strips a ```...``` / ```json...```
/// fence if present, then falls back to the first `{...}` span.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        return Some(value);
    }

    let stripped = strip_code_fence(text);
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(stripped.trim()) {
        return Some(value);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<serde_json::Value>(&text[start..=end]).ok()
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches(['\n', '\r']);
        if let Some(end) = rest.rfind("```") {
            return &rest[..end];
        }
        return rest;
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_json() {
        let v = extract_json(r#"{"action":"BUY"}"#).unwrap();
        assert_eq!(v["action"], "BUY");
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "```json\n{\"action\":\"SELL\"}\n```";
        let v = extract_json(text).unwrap();
        assert_eq!(v["action"], "SELL");
    }

    #[test]
    fn extracts_embedded_json() {
        let text = "Here is my answer: {\"action\":\"HOLD\", \"confidence\": 0.5} — hope that helps";
        let v = extract_json(text).unwrap();
        assert_eq!(v["action"], "HOLD");
    }

    #[test]
    fn unparseable_text_yields_none() {
        assert!(extract_json("I refuse to answer in JSON").is_none());
    }
}
