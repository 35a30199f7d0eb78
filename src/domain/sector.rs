//! The `Sector` aggregate: a market segment with its own price series and member agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bound on the number of samples kept in a sector's in-memory/ persisted price ring.
pub const PRICE_HISTORY_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SectorPerformance {
    pub total_pl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sector {
    pub id: uuid::Uuid,
    pub name: String,
    pub symbol: String,
    pub current_price: f64,
    /// In `[0, 1]`.
    pub volatility: f64,
    /// In `[0, 100]`.
    pub risk_score: f64,
    pub balance: f64,
    pub performance: SectorPerformance,
    /// Id of the currently open (non-terminal) discussion, if any.
    pub discussion: Option<uuid::Uuid>,
    /// Bounded ring of recent price samples, oldest first.
    pub price_history: Vec<PricePoint>,
    /// Mirror of agent ids assigned to this sector. `AgentRegistry` is the
    /// source of truth; this mirror is rewritten on every mutating operation.
    pub agents: Vec<String>,
    pub active_agents: usize,
    pub created_at: DateTime<Utc>,
}

impl Sector {
    pub fn new(name: String, symbol: Option<String>, now: DateTime<Utc>) -> Self {
        let symbol = symbol.unwrap_or_else(|| derive_symbol(&name));
        Self {
            id: uuid::Uuid::new_v4(),
            name,
            symbol,
            current_price: 0.0,
            volatility: 0.1,
            risk_score: 0.0,
            balance: 0.0,
            performance: SectorPerformance::default(),
            discussion: None,
            price_history: Vec::new(),
            agents: Vec::new(),
            active_agents: 0,
            created_at: now,
        }
    }

    pub fn push_price(&mut self, point: PricePoint) {
        self.current_price = point.price.max(0.01);
        self.price_history.push(point);
        if self.price_history.len() > PRICE_HISTORY_CAPACITY {
            let overflow = self.price_history.len() - PRICE_HISTORY_CAPACITY;
            self.price_history.drain(0..overflow);
        }
    }

    pub fn clamp_invariants(&mut self) {
        self.current_price = self.current_price.max(0.01);
        self.volatility = self.volatility.clamp(0.0, 1.0);
        self.risk_score = self.risk_score.clamp(0.0, 100.0);
        self.balance = self.balance.max(0.0);
    }

    pub fn has_open_discussion(&self) -> bool {
        self.discussion.is_some()
    }
}

/// Default symbol derivation: first 4 chars of the sector name, upper-cased.
fn derive_symbol(name: &str) -> String {
    let upper: String = name.chars().filter(|c| c.is_alphanumeric()).collect();
    upper.to_ascii_uppercase().chars().take(4).collect()
}
