//! The `Agent` aggregate: a single deliberating trading agent.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Maximum number of memory entries retained per agent (oldest dropped first).
pub const MAX_MEMORY_ENTRIES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Manager,
    RiskManager,
    Trader,
    Analyst,
    Research,
    Advisor,
    Arbitrage,
    General,
    Macro,
    Risk,
    Sentiment,
    Technical,
    /// An LLM-assigned custom token that didn't map to a known role.
    Custom(String),
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer).map_err(D::Error::custom)?;
        Ok(Role::parse(&s))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Manager => write!(f, "manager"),
            Role::RiskManager => write!(f, "riskmanager"),
            Role::Trader => write!(f, "trader"),
            Role::Analyst => write!(f, "analyst"),
            Role::Research => write!(f, "research"),
            Role::Advisor => write!(f, "advisor"),
            Role::Arbitrage => write!(f, "arbitrage"),
            Role::General => write!(f, "general"),
            Role::Macro => write!(f, "macro"),
            Role::Risk => write!(f, "risk"),
            Role::Sentiment => write!(f, "sentiment"),
            Role::Technical => write!(f, "technical"),
            Role::Custom(s) => write!(f, "{s}"),
        }
    }
}

impl Role {
    /// Parses a free-form role token, case-insensitively, falling back to `Custom`.
    pub fn parse(token: &str) -> Role {
        match token.to_ascii_lowercase().as_str() {
            "manager" => Role::Manager,
            "riskmanager" => Role::RiskManager,
            "trader" => Role::Trader,
            "analyst" => Role::Analyst,
            "research" => Role::Research,
            "advisor" => Role::Advisor,
            "arbitrage" => Role::Arbitrage,
            "general" => Role::General,
            "macro" => Role::Macro,
            "risk" => Role::Risk,
            "sentiment" => Role::Sentiment,
            "technical" => Role::Technical,
            other => Role::Custom(other.to_string()),
        }
    }

    pub fn is_manager(&self) -> bool {
        matches!(self, Role::Manager)
    }

    /// Roles the `DiscussionEngine` treats as argument-generating participants
    /// (research-like roles that get a per-role oracle adapter in `collectArguments`).
    pub fn is_discussion_participant(&self) -> bool {
        !self.is_manager()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStyle {
    Rapid,
    Balanced,
    Cautious,
    Studious,
    Deliberate,
    Precise,
    Analytical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Active,
    Processing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub risk_tolerance: RiskTolerance,
    pub decision_style: DecisionStyle,
}

/// Preference weights, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub risk: f64,
    pub profit: f64,
    pub speed: f64,
    pub accuracy: f64,
}

impl Preferences {
    pub fn clamp(self) -> Self {
        Self {
            risk: self.risk.clamp(0.0, 1.0),
            profit: self.profit.clamp(0.0, 1.0),
            speed: self.speed.clamp(0.0, 1.0),
            accuracy: self.accuracy.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Performance {
    pub pnl: f64,
    /// Win rate in `[0, 1]`. `None` means no trades have settled yet.
    pub win_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub kind: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn creation(purpose: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: "creation".to_string(),
            content: purpose.to_string(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub sector_id: Option<uuid::Uuid>,
    /// In `[-100, 100]`.
    pub confidence: f64,
    /// In `[0, 100]`.
    pub morale: f64,
    pub status: AgentStatus,
    pub personality: Personality,
    pub preferences: Preferences,
    pub memory: Vec<MemoryEntry>,
    pub performance: Performance,
    pub created_at: DateTime<Utc>,
    /// Forward-compatible metadata; no triggering code exists for a refinement
    /// cycle in this engine. Never mutated by engine logic.
    pub needs_refinement: bool,
    pub active_refinement_cycles: u32,
}

impl Agent {
    pub fn push_memory(&mut self, entry: MemoryEntry) {
        self.memory.push(entry);
        if self.memory.len() > MAX_MEMORY_ENTRIES {
            let overflow = self.memory.len() - MAX_MEMORY_ENTRIES;
            self.memory.drain(0..overflow);
        }
    }

    pub fn clamp_invariants(&mut self) {
        self.confidence = self.confidence.clamp(-100.0, 100.0);
        self.morale = self.morale.clamp(0.0, 100.0);
        self.preferences = self.preferences.clamp();
    }

    /// Validates the stable-id shape required by the data model: 1-32 chars,
    /// uppercase with underscores.
    pub fn is_valid_id(id: &str) -> bool {
        !id.is_empty()
            && id.len() <= 32
            && id
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit())
    }
}
