//! The `DiscussionRoom` state machine driver (spec.md §4.5):
//! `startDiscussion` / `collectArguments` / `produceDecision` /
//! `closeDiscussion` / `archiveDiscussion`.

use crate::application::agent_registry::AgentRegistry;
use crate::application::consensus_adjuster::ConsensusConfidenceAdjuster;
use crate::application::fallback_signal::{generate_agent_signal, MarketContext};
use crate::application::sector_registry::SectorRegistry;
use crate::application::signal_normalizer::{NormalizationContext, SignalNormalizer};
use crate::application::voting_engine::VotingEngine;
use crate::domain::discussion::{CloseReason, DiscussionDecision, DiscussionRoom, DiscussionStatus, Message, Proposal};
use crate::domain::errors::{EngineError, EngineResult, IllegalStateTransitionError, NotFoundError};
use crate::domain::signal::{Action, AgentSignal, RawAgentResponse};
use crate::infrastructure::oracle::{extract_json, OracleClient, OracleRequest};
use crate::infrastructure::persistence::{DocumentName, PersistenceStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

pub struct DiscussionEngine {
    store: Arc<PersistenceStore>,
    agents: Arc<AgentRegistry>,
    sectors: Arc<SectorRegistry>,
    oracle: Arc<OracleClient>,
    voting_engine: VotingEngine,
    max_rounds: u32,
}

impl DiscussionEngine {
    pub fn new(
        store: Arc<PersistenceStore>,
        agents: Arc<AgentRegistry>,
        sectors: Arc<SectorRegistry>,
        oracle: Arc<OracleClient>,
        conflict_threshold: f64,
        max_rounds: u32,
    ) -> Self {
        Self {
            store,
            agents,
            sectors,
            oracle,
            voting_engine: VotingEngine::new(conflict_threshold),
            max_rounds,
        }
    }

    /// Idempotent: an existing non-terminal discussion for the sector is
    /// returned unchanged rather than creating a duplicate.
    pub async fn start_discussion(
        &self,
        sector_id: uuid::Uuid,
        title: String,
        agent_ids: Option<Vec<String>>,
    ) -> EngineResult<DiscussionRoom> {
        if let Some(existing) = self.find_open_discussion(sector_id).await? {
            return Ok(existing);
        }

        let participant_ids = match agent_ids {
            Some(ids) => ids,
            None => self
                .agents
                .list_for_sector(sector_id)
                .await?
                .into_iter()
                .filter(|a| a.role.is_discussion_participant())
                .map(|a| a.id)
                .collect(),
        };

        let mut room = DiscussionRoom::new(sector_id, title, participant_ids, Utc::now());
        self.persist_new_room(&room).await?;

        if let Ok(mut sector) = self.sectors.get(sector_id).await {
            sector.discussion = Some(room.id);
            let _ = self.sectors.save(sector).await;
        }

        for _ in 0..self.max_rounds {
            room = self.collect_arguments(room.id).await?;
            if room.status != DiscussionStatus::Created && room.status != DiscussionStatus::InProgress {
                break;
            }
            room.snapshot_round();
            self.persist_room(&room).await?;
        }

        info!(discussion_id = %room.id, sector_id = %sector_id, "started discussion");
        Ok(room)
    }

    /// For each participant, consults its oracle adapter for a
    /// `RawAgentResponse`, falling back to the deterministic policy on any
    /// failure, normalizes, and appends a message.
    pub async fn collect_arguments(&self, discussion_id: uuid::Uuid) -> EngineResult<DiscussionRoom> {
        let mut room = self.get_room(discussion_id).await?;
        let sector = self.sectors.get(room.sector_id).await?;

        for agent_id in room.agent_ids.clone() {
            let agent = match self.agents.get(&agent_id).await {
                Ok(a) => a,
                Err(_) => continue,
            };
            if !agent.role.is_discussion_participant() {
                continue;
            }

            let raw = self.consult_role_adapter(&agent.role.to_string(), &sector.name, &room.title).await;
            let ctx = NormalizationContext {
                sector_risk_profile: sector.risk_score,
                last_confidence: ((agent.confidence + 100.0) / 2.0).clamp(0.0, 100.0),
                confidence_delta: 2.0,
                allowed_symbols: &[],
            };

            let signal = match raw.and_then(|r| SignalNormalizer::normalize(&agent.id, &r, ctx).ok()) {
                Some(s) => s,
                None => generate_agent_signal(
                    &agent,
                    &sector.symbol,
                    MarketContext {
                        change_percent: sector_change_percent(&sector),
                        volatility: sector.volatility,
                        symbol_hint: 0.0,
                    },
                ),
            };

            let message = Message {
                id: uuid::Uuid::new_v4(),
                discussion_id: room.id,
                agent_id: agent.id.clone(),
                agent_name: agent.name.clone(),
                role: agent.role.to_string(),
                content: signal.reasoning.clone(),
                timestamp: Utc::now(),
                proposal: Some(Proposal {
                    action: signal.action,
                    confidence: signal.confidence,
                    allocation_percent: signal.allocation_percent,
                }),
                analysis: None,
            };
            room.record_message(message, Utc::now())?;
        }

        self.persist_room(&room).await?;
        Ok(room)
    }

    /// Adds a user-submitted message; unlike `collectArguments`, content
    /// must pass non-empty validation.
    pub async fn add_discussion_message(
        &self,
        discussion_id: uuid::Uuid,
        agent_id: &str,
        content: &str,
        role: &str,
    ) -> EngineResult<DiscussionRoom> {
        if content.trim().is_empty() {
            return Err(IllegalStateTransitionError::Precondition {
                id: discussion_id,
                reason: "message content must be non-empty".to_string(),
            }
            .into());
        }
        let mut room = self.get_room(discussion_id).await?;
        let agent_name = self.agents.get(agent_id).await.map(|a| a.name).unwrap_or_else(|_| agent_id.to_string());
        let message = Message {
            id: uuid::Uuid::new_v4(),
            discussion_id: room.id,
            agent_id: agent_id.to_string(),
            agent_name,
            role: role.to_string(),
            content: content.trim().to_string(),
            timestamp: Utc::now(),
            proposal: None,
            analysis: None,
        };
        room.record_message(message, Utc::now())?;
        self.persist_room(&room).await?;
        Ok(room)
    }

    pub async fn produce_decision(&self, discussion_id: uuid::Uuid) -> EngineResult<DiscussionRoom> {
        let mut room = self.get_room(discussion_id).await?;
        if room.messages.is_empty() {
            room = self.collect_arguments(discussion_id).await?;
        }

        let signals = self.signals_from_latest_round(&room).await;
        let decision = self.voting_engine.decide(&signals);
        room.set_decision(decision, Utc::now())?;
        self.persist_room(&room).await?;

        let mut sector_agents = self.agents.list_for_sector(room.sector_id).await?;
        ConsensusConfidenceAdjuster::apply(&mut sector_agents, &signals);
        self.agents.save_agents(sector_agents).await?;

        let decision = room.final_decision.clone().expect("set_decision just succeeded");
        self.append_execution_log(&room, &decision).await;

        info!(discussion_id = %room.id, action = %decision.action, "produced decision");
        Ok(room)
    }

    /// Gives the persisted `executionLogs` table a real producer: every
    /// committed decision is logged here (SPEC_FULL.md §3 supplement).
    async fn append_execution_log(&self, room: &DiscussionRoom, decision: &DiscussionDecision) {
        let log = crate::domain::discussion::ExecutionLog {
            id: uuid::Uuid::new_v4(),
            sector_id: room.sector_id,
            action: decision.action,
            amount: decision.confidence,
            timestamp: Utc::now(),
            checklist_id: decision.selected_agent.clone(),
            results: vec![decision.rationale.clone()],
        };
        let result = self
            .store
            .atomic_update(DocumentName::ExecutionLogs, move |mut logs: Vec<crate::domain::discussion::ExecutionLog>| {
                logs.push(log);
                logs
            })
            .await;
        if result.is_err() {
            warn!(discussion_id = %room.id, "failed to append execution log");
        }
    }

    pub async fn close_discussion(&self, discussion_id: uuid::Uuid) -> EngineResult<DiscussionRoom> {
        let mut room = self.get_room(discussion_id).await?;
        if room.final_decision.is_none() {
            room = self.produce_decision(discussion_id).await?;
        }
        room.close(CloseReason::Decided, Utc::now())?;
        self.persist_room(&room).await?;

        if let Ok(mut sector) = self.sectors.get(room.sector_id).await {
            if sector.discussion == Some(room.id) {
                sector.discussion = None;
                let _ = self.sectors.save(sector).await;
            }
        }
        Ok(room)
    }

    pub async fn archive_discussion(&self, discussion_id: uuid::Uuid) -> EngineResult<DiscussionRoom> {
        let mut room = self.get_room(discussion_id).await?;
        if room.status != DiscussionStatus::Closed {
            room = self.close_discussion(discussion_id).await?;
        }
        room.archive(Utc::now())?;
        self.persist_room(&room).await?;
        Ok(room)
    }

    pub async fn delete_discussion(&self, discussion_id: uuid::Uuid) -> EngineResult<()> {
        self.store
            .atomic_update(DocumentName::Discussions, move |rooms: Vec<DiscussionRoom>| {
                rooms.into_iter().filter(|r| r.id != discussion_id).collect()
            })
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }

    pub async fn get_room(&self, discussion_id: uuid::Uuid) -> EngineResult<DiscussionRoom> {
        let rooms: Vec<DiscussionRoom> = self.store.read(DocumentName::Discussions).await.map_err(EngineError::from)?;
        rooms
            .into_iter()
            .find(|r| r.id == discussion_id)
            .ok_or_else(|| NotFoundError::Discussion(discussion_id).into())
    }

    pub async fn find_open_discussion(&self, sector_id: uuid::Uuid) -> EngineResult<Option<DiscussionRoom>> {
        let rooms: Vec<DiscussionRoom> = self.store.read(DocumentName::Discussions).await.map_err(EngineError::from)?;
        Ok(rooms.into_iter().find(|r| r.sector_id == sector_id && r.status.is_non_terminal()))
    }

    /// Most recently created discussion for a sector, terminal or not. Used
    /// by `ManagerController` to evaluate the balance-driven debounce window.
    pub async fn most_recent_discussion_for_sector(&self, sector_id: uuid::Uuid) -> EngineResult<Option<DiscussionRoom>> {
        let rooms: Vec<DiscussionRoom> = self.store.read(DocumentName::Discussions).await.map_err(EngineError::from)?;
        Ok(rooms
            .into_iter()
            .filter(|r| r.sector_id == sector_id)
            .max_by_key(|r| r.created_at))
    }

    pub async fn list_closed(&self) -> EngineResult<Vec<DiscussionRoom>> {
        let rooms: Vec<DiscussionRoom> = self.store.read(DocumentName::Discussions).await.map_err(EngineError::from)?;
        Ok(rooms.into_iter().filter(|r| r.status == DiscussionStatus::Closed).collect())
    }

    pub async fn list_open_in_progress(&self) -> EngineResult<Vec<DiscussionRoom>> {
        let rooms: Vec<DiscussionRoom> = self.store.read(DocumentName::Discussions).await.map_err(EngineError::from)?;
        Ok(rooms
            .into_iter()
            .filter(|r| matches!(r.status, DiscussionStatus::Created | DiscussionStatus::InProgress))
            .collect())
    }

    /// Forces a decision for a stalled room (used by `DiscussionWatchdog`
    /// only), falling back to HOLD/conflictScore=1.0 when no signals exist.
    pub async fn force_resolve_stalled(&self, discussion_id: uuid::Uuid) -> EngineResult<DiscussionRoom> {
        let mut room = self.get_room(discussion_id).await?;
        let signals = self.signals_from_latest_round(&room).await;
        let decision = if signals.is_empty() {
            DiscussionDecision {
                action: Action::Hold,
                confidence: 0.0,
                rationale: "watchdog: no signals collected before stall threshold".to_string(),
                vote_breakdown: crate::domain::discussion::VoteBreakdown { buy: 0, sell: 0, hold: 0 },
                conflict_score: 1.0,
                selected_agent: None,
            }
        } else {
            self.voting_engine.decide(&signals)
        };
        room.force_close_stalled(decision, Utc::now());
        self.persist_room(&room).await?;

        if let Ok(mut sector) = self.sectors.get(room.sector_id).await {
            if sector.discussion == Some(room.id) {
                sector.discussion = None;
                let _ = self.sectors.save(sector).await;
            }
        }

        warn!(discussion_id = %room.id, "watchdog force-resolved a stalled discussion");
        Ok(room)
    }

    /// One signal per participant: with `max_rounds > 1` the same agent can
    /// have a proposal in every round's message, so this keeps only the most
    /// recently recorded proposal per `agent_id` rather than counting every
    /// round's message as a separate vote.
    async fn signals_from_latest_round(&self, room: &DiscussionRoom) -> Vec<AgentSignal> {
        let mut latest_by_agent: std::collections::HashMap<String, &crate::domain::discussion::Message> =
            std::collections::HashMap::new();
        for message in &room.messages {
            if message.proposal.is_some() {
                latest_by_agent.insert(message.agent_id.clone(), message);
            }
        }

        let mut signals = Vec::new();
        for message in room.messages.iter().filter(|m| latest_by_agent.get(&m.agent_id).map(|latest| latest.id) == Some(m.id)) {
            let Some(proposal) = &message.proposal else { continue };
            let win_rate = self
                .agents
                .get(&message.agent_id)
                .await
                .ok()
                .and_then(|a| a.performance.win_rate)
                .unwrap_or(0.5);
            signals.push(AgentSignal {
                agent_id: message.agent_id.clone(),
                action: proposal.action,
                confidence: proposal.confidence,
                symbol: String::new(),
                allocation_percent: proposal.allocation_percent,
                reasoning: message.content.clone(),
                win_rate,
            });
        }
        signals
    }

    async fn consult_role_adapter(&self, role: &str, sector_name: &str, title: &str) -> Option<RawAgentResponse> {
        let request = OracleRequest {
            system_prompt: format!("You are a {role} participating in a trading discussion."),
            user_prompt: format!("Sector: {sector_name}. Topic: {title}. Respond with action/confidence/reasoning."),
            json_mode: true,
        };
        let text = self.oracle.call(request).await.ok()?;
        let value = extract_json(&text)?;
        serde_json::from_value(value).ok()
    }

    async fn persist_new_room(&self, room: &DiscussionRoom) -> EngineResult<()> {
        let room_clone = room.clone();
        self.store
            .atomic_update(DocumentName::Discussions, move |mut rooms: Vec<DiscussionRoom>| {
                rooms.push(room_clone);
                rooms
            })
            .await
            .map_err(EngineError::from)?;
        self.mirror_into_debates(room).await;
        Ok(())
    }

    async fn persist_room(&self, room: &DiscussionRoom) -> EngineResult<()> {
        let room_clone = room.clone();
        self.store
            .atomic_update(DocumentName::Discussions, move |mut rooms: Vec<DiscussionRoom>| {
                if let Some(slot) = rooms.iter_mut().find(|r| r.id == room_clone.id) {
                    *slot = room_clone;
                } else {
                    rooms.push(room_clone);
                }
                rooms
            })
            .await
            .map_err(EngineError::from)?;
        self.mirror_into_debates(room).await;
        Ok(())
    }

    /// Writes the legacy `debates` mirror, same shape minus decision fields
    /// (spec.md §9 Open Questions). Never read back by engine logic.
    async fn mirror_into_debates(&self, room: &DiscussionRoom) {
        let mut legacy = room.clone();
        legacy.final_decision = None;
        legacy.decided_at = None;
        legacy.discussion_closed_at = None;
        legacy.close_reason = None;
        let result = self
            .store
            .atomic_update(DocumentName::Debates, move |mut rooms: Vec<DiscussionRoom>| {
                if let Some(slot) = rooms.iter_mut().find(|r| r.id == legacy.id) {
                    *slot = legacy;
                } else {
                    rooms.push(legacy);
                }
                rooms
            })
            .await;
        if result.is_err() {
            warn!(discussion_id = %room.id, "failed to mirror discussion into legacy debates store");
        }
    }
}

fn sector_change_percent(sector: &crate::domain::sector::Sector) -> f64 {
    let history = &sector.price_history;
    if history.len() < 2 {
        return 0.0;
    }
    let previous = history[history.len() - 2].price;
    if previous <= 0.0 {
        return 0.0;
    }
    ((sector.current_price - previous) / previous) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::oracle::{NullOracle, OracleClient};
    use std::time::Duration;

    fn engine_with_temp_store() -> DiscussionEngine {
        let dir = std::env::temp_dir().join(format!("discussion_engine_test_{}", uuid::Uuid::new_v4()));
        let store = Arc::new(PersistenceStore::new(dir));
        let oracle = Arc::new(OracleClient::new(Arc::new(NullOracle), Duration::from_millis(50), 0));
        let agents = Arc::new(AgentRegistry::new(store.clone(), oracle.clone(), 200, 12));
        let sectors = Arc::new(SectorRegistry::new(store.clone()));
        DiscussionEngine::new(store, agents, sectors, oracle, 0.5, 3)
    }

    #[tokio::test]
    async fn oracle_outage_falls_back_and_still_decides() {
        let engine = engine_with_temp_store();
        let sector = engine.sectors.create_sector("Energy".into(), None).await.unwrap();
        let agent = engine
            .agents
            .create_agent("trend trader", Some(sector.id), Some(crate::domain::agent::Role::Trader))
            .await
            .unwrap();

        let room = engine
            .start_discussion(sector.id, "Outlook".into(), Some(vec![agent.id.clone()]))
            .await
            .unwrap();
        assert!(matches!(room.status, DiscussionStatus::Decided | DiscussionStatus::InProgress));

        let decided = engine.produce_decision(room.id).await.unwrap();
        assert_eq!(decided.status, DiscussionStatus::Decided);
    }

    #[tokio::test]
    async fn multi_round_discussion_counts_each_agent_once() {
        let engine = engine_with_temp_store();
        let sector = engine.sectors.create_sector("Energy".into(), None).await.unwrap();
        let agent = engine
            .agents
            .create_agent("trend trader", Some(sector.id), Some(crate::domain::agent::Role::Trader))
            .await
            .unwrap();

        // `engine_with_temp_store` sets max_rounds = 3, so `start_discussion`
        // runs `collect_arguments` up to three times for this single agent.
        let room = engine
            .start_discussion(sector.id, "Outlook".into(), Some(vec![agent.id.clone()]))
            .await
            .unwrap();
        assert!(room.messages.len() >= 2, "expected more than one round of messages for this fixture");

        let decided = engine.produce_decision(room.id).await.unwrap();
        let breakdown = &decided.final_decision.as_ref().unwrap().vote_breakdown;
        assert_eq!(breakdown.buy + breakdown.sell + breakdown.hold, 1, "one agent's vote must count once, not once per round");
    }

    #[tokio::test]
    async fn starting_a_second_discussion_returns_the_existing_one() {
        let engine = engine_with_temp_store();
        let sector = engine.sectors.create_sector("Metals".into(), None).await.unwrap();
        let first = engine.start_discussion(sector.id, "A".into(), Some(vec![])).await.unwrap();
        let second = engine.start_discussion(sector.id, "B".into(), Some(vec![])).await.unwrap();
        assert_eq!(first.id, second.id);
    }
}
