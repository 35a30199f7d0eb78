//! Periodic per-sector driver (spec.md §4.6): advances price and
//! volatility, recomputes risk score and agent confidences, and asks the
//! `ManagerController` to open a discussion when the sector is ready.

use crate::application::agent_registry::AgentRegistry;
use crate::application::manager_controller::ManagerController;
use crate::application::sector_registry::SectorRegistry;
use crate::domain::agent::Role;
use crate::domain::discussion::PriceHistoryRecord;
use crate::domain::errors::EngineResult;
use crate::domain::sector::{PricePoint, Sector};
use crate::infrastructure::persistence::{DocumentName, PersistenceStore};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::info;

const NOISE_RANGE: f64 = 0.02;
const VOLATILITY_WALK: f64 = 0.01;

pub struct SectorTicker {
    store: Arc<PersistenceStore>,
    agents: Arc<AgentRegistry>,
    sectors: Arc<SectorRegistry>,
    manager: Arc<ManagerController>,
    readiness_threshold: f64,
}

pub struct TickOutcome {
    pub sector: Sector,
    pub discussion_ready: bool,
}

impl SectorTicker {
    pub fn new(
        store: Arc<PersistenceStore>,
        agents: Arc<AgentRegistry>,
        sectors: Arc<SectorRegistry>,
        manager: Arc<ManagerController>,
        readiness_threshold: f64,
    ) -> Self {
        Self {
            store,
            agents,
            sectors,
            manager,
            readiness_threshold,
        }
    }

    pub async fn tick_all(&self) -> EngineResult<Vec<TickOutcome>> {
        let mut outcomes = Vec::new();
        for sector in self.sectors.list().await? {
            outcomes.push(self.tick_sector(sector.id).await?);
        }
        Ok(outcomes)
    }

    pub async fn tick_sector(&self, sector_id: uuid::Uuid) -> EngineResult<TickOutcome> {
        let mut sector = self.sectors.get(sector_id).await?;
        let mut roster = self.agents.list_for_sector(sector_id).await?;

        sector.agents = roster.iter().map(|a| a.id.clone()).collect();
        sector.active_agents = sector.agents.len();

        sector.volatility = random_walk(sector.volatility, VOLATILITY_WALK).clamp(0.0, 1.0);

        let previous_price = if sector.current_price > 0.0 { sector.current_price } else { 100.0 };
        let manager_impact = self.manager_impact(sector_id).await;
        let trend = trend_factor(&sector);
        let noise = rand::rng().random_range(-NOISE_RANGE..NOISE_RANGE);
        let new_price = (previous_price * (1.0 + manager_impact * 0.001 + noise + trend)).max(0.01);

        let change_percent = if previous_price > 0.0 {
            ((new_price - previous_price) / previous_price) * 100.0
        } else {
            0.0
        };

        sector.push_price(PricePoint { price: new_price, timestamp: Utc::now() });
        sector.risk_score = (sector.volatility * 100.0 * 0.6 + change_percent.abs() * 4.0).clamp(0.0, 100.0);

        for agent in roster.iter_mut() {
            let delta = confidence_drift(&agent.role);
            agent.confidence = (agent.confidence + delta).clamp(-100.0, 100.0);
        }

        let discussion_ready = !roster.is_empty()
            && roster
                .iter()
                .filter(|a| !a.role.is_manager())
                .all(|a| a.confidence >= self.readiness_threshold);

        self.sectors.save(sector.clone()).await?;
        self.agents.save_agents(roster).await?;
        self.record_price_history(sector_id, new_price).await;

        if discussion_ready || sector.balance > 0.0 {
            self.manager.maybe_open_discussion(&sector, discussion_ready).await?;
        }

        info!(sector_id = %sector_id, price = new_price, discussion_ready, "ticked sector");
        Ok(TickOutcome { sector, discussion_ready })
    }

    /// Derives manager impact in `{-1, 0, +1}` from the sector's most recent
    /// committed execution (spec.md §Glossary: "manager impact").
    async fn manager_impact(&self, sector_id: uuid::Uuid) -> f64 {
        let logs: Vec<crate::domain::discussion::ExecutionLog> =
            match self.store.read(DocumentName::ExecutionLogs).await {
                Ok(l) => l,
                Err(_) => return 0.0,
            };
        logs.into_iter()
            .filter(|l| l.sector_id == sector_id)
            .max_by_key(|l| l.timestamp)
            .map(|l| match l.action {
                crate::domain::signal::Action::Buy => 1.0,
                crate::domain::signal::Action::Sell => -1.0,
                crate::domain::signal::Action::Hold => 0.0,
            })
            .unwrap_or(0.0)
    }

    async fn record_price_history(&self, sector_id: uuid::Uuid, price: f64) {
        let record = PriceHistoryRecord { sector_id, price, timestamp: Utc::now() };
        let _ = self
            .store
            .atomic_update(DocumentName::PriceHistory, move |mut records: Vec<PriceHistoryRecord>| {
                records.push(record);
                records
            })
            .await;
    }
}

fn random_walk(previous: f64, step: f64) -> f64 {
    previous + rand::rng().random_range(-step..step)
}

/// Decaying average of recent percent changes, scaled down so it nudges
/// rather than dominates the price model.
fn trend_factor(sector: &Sector) -> f64 {
    let window: Vec<f64> = sector
        .price_history
        .iter()
        .rev()
        .take(5)
        .map(|p| p.price)
        .collect();
    if window.len() < 2 {
        return 0.0;
    }
    let mut changes = Vec::new();
    for pair in window.windows(2) {
        if pair[1] > 0.0 {
            changes.push((pair[0] - pair[1]) / pair[1]);
        }
    }
    if changes.is_empty() {
        return 0.0;
    }
    (changes.iter().sum::<f64>() / changes.len() as f64) * 0.1
}

/// Researcher-like roles drift +1..+5; analyst-like roles drift -2..+3;
/// everything else is unaffected by the tick.
fn confidence_drift(role: &Role) -> f64 {
    match role {
        Role::Research | Role::Advisor => rand::rng().random_range(1.0..5.0),
        Role::Analyst | Role::Technical | Role::Macro => rand::rng().random_range(-2.0..3.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::comms_bus::CommsBus;
    use crate::application::discussion_engine::DiscussionEngine;
    use crate::infrastructure::oracle::{NullOracle, OracleClient};
    use std::time::Duration;

    fn ticker() -> (SectorTicker, Arc<SectorRegistry>, Arc<AgentRegistry>) {
        let dir = std::env::temp_dir().join(format!("sector_ticker_test_{}", uuid::Uuid::new_v4()));
        let store = Arc::new(PersistenceStore::new(dir));
        let oracle = Arc::new(OracleClient::new(Arc::new(NullOracle), Duration::from_millis(20), 0));
        let agents = Arc::new(AgentRegistry::new(store.clone(), oracle.clone(), 200, 12));
        let sectors = Arc::new(SectorRegistry::new(store.clone()));
        let discussion_engine = Arc::new(DiscussionEngine::new(store.clone(), agents.clone(), sectors.clone(), oracle, 0.5, 1));
        let comms = Arc::new(CommsBus::new(store.clone()));
        let manager = Arc::new(ManagerController::new(discussion_engine, comms, Duration::from_secs(60)));
        (SectorTicker::new(store, agents.clone(), sectors.clone(), manager, 65.0), sectors, agents)
    }

    #[tokio::test]
    async fn tick_keeps_price_positive_and_bounds_risk_score() {
        let (ticker, sectors, _agents) = ticker();
        let sector = sectors.create_sector("Energy".into(), None).await.unwrap();
        let outcome = ticker.tick_sector(sector.id).await.unwrap();
        assert!(outcome.sector.current_price >= 0.01);
        assert!(outcome.sector.risk_score >= 0.0 && outcome.sector.risk_score <= 100.0);
    }

    #[tokio::test]
    async fn readiness_holds_when_all_non_managers_meet_threshold() {
        let (ticker, sectors, agents) = ticker();
        let sector = sectors.create_sector("Metals".into(), None).await.unwrap();
        for _ in 0..3 {
            let agent = agents.create_agent("trader", Some(sector.id), Some(Role::Trader)).await.unwrap();
            agents
                .update_agent(
                    &agent.id,
                    crate::application::agent_registry::AgentPatch {
                        confidence: Some(90.0),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        let outcome = ticker.tick_sector(sector.id).await.unwrap();
        assert!(outcome.discussion_ready);
    }
}
