//! Canonical agent signal and the untrusted oracle payload it is built from.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

impl Action {
    /// Parses an action token case-insensitively. `REBALANCE` maps to `HOLD`
    /// at the normalizer layer (spec.md §4.3). Anything else is rejected.
    pub fn parse(token: &str) -> Option<Action> {
        match token.to_ascii_uppercase().as_str() {
            "BUY" => Some(Action::Buy),
            "SELL" => Some(Action::Sell),
            "HOLD" => Some(Action::Hold),
            "REBALANCE" => Some(Action::Hold),
            _ => None,
        }
    }
}

/// Untrusted, free-form payload parsed out of a `ReasoningOracle` response.
/// Field presence is optional by design; `SignalNormalizer` is the only
/// producer of canonical `AgentSignal`s from this shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAgentResponse {
    pub action: Option<String>,
    pub side: Option<String>,
    pub symbol: Option<String>,
    pub allocation_percent: Option<f64>,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub win_rate: Option<f64>,
}

/// Canonical, validated signal produced by `SignalNormalizer`. In-memory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSignal {
    pub agent_id: String,
    pub action: Action,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub symbol: String,
    /// In `[0, 100]`.
    pub allocation_percent: f64,
    pub reasoning: String,
    /// In `[0, 1]`.
    pub win_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RejectedReason {
    pub code: RejectionCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionCode {
    UnknownAction,
    SymbolNotAllowed,
    EmptyReasoning,
}
