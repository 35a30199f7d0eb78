//! A deterministic, non-LLM `ReasoningOracle` used when `ORACLE_ENABLED=false`
//! (SPEC_FULL.md §6). Always answers; never calls out over the network.

use super::request::{OracleRequest, ReasoningOracle};
use crate::domain::errors::OracleError;
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct RuleBasedOracle;

#[async_trait]
impl ReasoningOracle for RuleBasedOracle {
    async fn respond(&self, request: OracleRequest) -> Result<String, OracleError> {
        let symbol = extract_symbol(&request.user_prompt).unwrap_or_else(|| "UNKNOWN".to_string());
        let body = serde_json::json!({
            "action": "HOLD",
            "symbol": symbol,
            "confidence": 0.5,
            "reasoning": "rule-based oracle default: insufficient signal to deviate from HOLD",
        });
        Ok(body.to_string())
    }
}

/// An oracle that is always unavailable, used to exercise the fallback path.
#[derive(Debug, Default)]
pub struct NullOracle;

#[async_trait]
impl ReasoningOracle for NullOracle {
    async fn respond(&self, _request: OracleRequest) -> Result<String, OracleError> {
        Err(OracleError::Disabled)
    }
}

fn extract_symbol(prompt: &str) -> Option<String> {
    prompt
        .split_whitespace()
        .find(|tok| tok.len() >= 2 && tok.len() <= 6 && tok.chars().all(|c| c.is_ascii_uppercase()))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rule_based_oracle_always_answers() {
        let oracle = RuleBasedOracle;
        let response = oracle
            .respond(OracleRequest {
                system_prompt: "you are a trader".into(),
                user_prompt: "What do you think about ACME?".into(),
                json_mode: true,
            })
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["action"], "HOLD");
        assert_eq!(value["symbol"], "ACME");
    }

    #[tokio::test]
    async fn null_oracle_is_always_disabled() {
        let oracle = NullOracle;
        let err = oracle
            .respond(OracleRequest {
                system_prompt: String::new(),
                user_prompt: String::new(),
                json_mode: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Disabled));
    }
}
