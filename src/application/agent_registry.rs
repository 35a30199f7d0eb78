//! Agent CRUD, the role template table, and capacity enforcement (spec.md §4.2, §Glossary).

use crate::domain::agent::{
    Agent, AgentStatus, DecisionStyle, MemoryEntry, Personality, Preferences, RiskTolerance, Role,
};
use crate::domain::errors::{CapacityExceededError, EngineError, EngineResult, NotFoundError};
use crate::infrastructure::oracle::{extract_json, OracleClient, OracleRequest};
use crate::infrastructure::persistence::{AtomicUpdateError, DocumentName, PersistenceStore};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

/// Fixed personality/preference defaults per role token. Reproduced in full
/// from the glossary: `trader` skews high-risk/rapid, `riskmanager` skews
/// low-risk/cautious, `research` skews maximum-accuracy/studious.
pub struct RoleTemplate {
    pub personality: Personality,
    pub preferences: Preferences,
    pub initial_confidence: f64,
}

pub fn role_template(role: &Role) -> RoleTemplate {
    let (risk_tolerance, decision_style, preferences, initial_confidence) = match role {
        Role::Manager => (
            RiskTolerance::Medium,
            DecisionStyle::Balanced,
            Preferences { risk: 0.5, profit: 0.5, speed: 0.5, accuracy: 0.5 },
            0.0,
        ),
        Role::RiskManager => (
            RiskTolerance::Low,
            DecisionStyle::Cautious,
            Preferences { risk: 0.1, profit: 0.3, speed: 0.2, accuracy: 0.9 },
            -10.0,
        ),
        Role::Trader => (
            RiskTolerance::High,
            DecisionStyle::Rapid,
            Preferences { risk: 0.9, profit: 0.8, speed: 0.9, accuracy: 0.4 },
            10.0,
        ),
        Role::Analyst => (
            RiskTolerance::Medium,
            DecisionStyle::Precise,
            Preferences { risk: 0.3, profit: 0.5, speed: 0.3, accuracy: 0.9 },
            0.0,
        ),
        Role::Research => (
            RiskTolerance::Low,
            DecisionStyle::Studious,
            Preferences { risk: 0.2, profit: 0.4, speed: 0.1, accuracy: 1.0 },
            0.0,
        ),
        Role::Advisor => (
            RiskTolerance::Medium,
            DecisionStyle::Deliberate,
            Preferences { risk: 0.4, profit: 0.5, speed: 0.3, accuracy: 0.8 },
            0.0,
        ),
        Role::Arbitrage => (
            RiskTolerance::High,
            DecisionStyle::Rapid,
            Preferences { risk: 0.8, profit: 0.9, speed: 1.0, accuracy: 0.6 },
            5.0,
        ),
        Role::General => (
            RiskTolerance::Medium,
            DecisionStyle::Balanced,
            Preferences { risk: 0.5, profit: 0.5, speed: 0.5, accuracy: 0.5 },
            0.0,
        ),
        Role::Macro => (
            RiskTolerance::Medium,
            DecisionStyle::Analytical,
            Preferences { risk: 0.4, profit: 0.6, speed: 0.2, accuracy: 0.8 },
            0.0,
        ),
        Role::Risk => (
            RiskTolerance::Low,
            DecisionStyle::Cautious,
            Preferences { risk: 0.1, profit: 0.3, speed: 0.2, accuracy: 0.8 },
            -5.0,
        ),
        Role::Sentiment => (
            RiskTolerance::Medium,
            DecisionStyle::Rapid,
            Preferences { risk: 0.5, profit: 0.6, speed: 0.8, accuracy: 0.5 },
            5.0,
        ),
        Role::Technical => (
            RiskTolerance::Medium,
            DecisionStyle::Precise,
            Preferences { risk: 0.4, profit: 0.5, speed: 0.6, accuracy: 0.8 },
            0.0,
        ),
        Role::Custom(_) => (
            RiskTolerance::Medium,
            DecisionStyle::Balanced,
            Preferences { risk: 0.5, profit: 0.5, speed: 0.5, accuracy: 0.5 },
            0.0,
        ),
    };
    RoleTemplate {
        personality: Personality { risk_tolerance, decision_style },
        preferences,
        initial_confidence,
    }
}

/// Oracle-supplied profile hint (spec.md §4.2: `createAgent` asks the oracle
/// for `{style, riskTolerance, initialConfidence}` in addition to identity).
/// Any field left absent or unparseable falls back to `role_template`.
#[derive(Debug, Default, Clone)]
struct ProfileHint {
    decision_style: Option<DecisionStyle>,
    risk_tolerance: Option<RiskTolerance>,
    initial_confidence: Option<f64>,
}

/// A field-level patch applied by `update_agent`. `None` leaves the field unchanged.
#[derive(Debug, Default, Clone)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub sector_id: Option<Option<uuid::Uuid>>,
    pub confidence: Option<f64>,
    pub morale: Option<f64>,
    pub status: Option<AgentStatus>,
}

pub struct AgentRegistry {
    store: Arc<PersistenceStore>,
    oracle: Arc<OracleClient>,
    max_total_agents: usize,
    max_agents_per_sector: usize,
}

impl AgentRegistry {
    pub fn new(
        store: Arc<PersistenceStore>,
        oracle: Arc<OracleClient>,
        max_total_agents: usize,
        max_agents_per_sector: usize,
    ) -> Self {
        Self {
            store,
            oracle,
            max_total_agents,
            max_agents_per_sector,
        }
    }

    /// Creates an agent. Asks the oracle for a compact id/purpose and a
    /// profile hint; falls back to a deterministic derivation on any oracle
    /// failure (the oracle boundary never blocks agent creation).
    pub async fn create_agent(
        &self,
        description: &str,
        sector_id: Option<uuid::Uuid>,
        role_override: Option<Role>,
    ) -> EngineResult<Agent> {
        let (id, purpose, role, hint) = self.consult_oracle_for_identity(description, role_override).await;
        let template = role_template(&role);
        let now = Utc::now();

        let personality = Personality {
            risk_tolerance: hint.risk_tolerance.unwrap_or(template.personality.risk_tolerance),
            decision_style: hint.decision_style.unwrap_or(template.personality.decision_style),
        };
        let initial_confidence = hint.initial_confidence.unwrap_or(template.initial_confidence).clamp(-100.0, 100.0);

        let agent = Agent {
            id: id.clone(),
            name: purpose.clone(),
            role,
            sector_id,
            confidence: initial_confidence,
            morale: 50.0,
            status: AgentStatus::Idle,
            personality,
            preferences: template.preferences,
            memory: vec![MemoryEntry::creation(&purpose, now)],
            performance: Default::default(),
            created_at: now,
            needs_refinement: false,
            active_refinement_cycles: 0,
        };

        let max_total = self.max_total_agents;
        let max_per_sector = self.max_agents_per_sector;
        let candidate = agent.clone();
        let result = self
            .store
            .atomic_try_update(DocumentName::Agents, move |mut agents: Vec<Agent>| {
                if agents.len() >= max_total {
                    return Err(CapacityExceededError::TotalAgents {
                        current: agents.len(),
                        max: max_total,
                    });
                }
                if let Some(sid) = candidate.sector_id {
                    let sector_count = agents.iter().filter(|a| a.sector_id == Some(sid)).count();
                    if sector_count >= max_per_sector {
                        return Err(CapacityExceededError::SectorAgents {
                            sector_id: sid,
                            current: sector_count,
                            max: max_per_sector,
                        });
                    }
                }
                agents.retain(|a| a.id != candidate.id);
                agents.push(candidate);
                Ok(agents)
            })
            .await;

        match result {
            Ok(_) => {}
            Err(AtomicUpdateError::Rejected(e)) => return Err(EngineError::from(e)),
            Err(AtomicUpdateError::Storage(e)) => return Err(EngineError::from(e)),
        }

        if let Some(sid) = agent.sector_id {
            self.mirror_into_sector(sid, &agent.id, true).await;
        }

        info!(agent_id = %agent.id, role = %agent.role, "created agent");
        Ok(agent)
    }

    async fn consult_oracle_for_identity(
        &self,
        description: &str,
        role_override: Option<Role>,
    ) -> (String, String, Role, ProfileHint) {
        let prompt = OracleRequest {
            system_prompt: "Assign a compact agent identity and profile: \
                {id, purpose, style, riskTolerance, initialConfidence}."
                .to_string(),
            user_prompt: description.to_string(),
            json_mode: true,
        };
        let from_oracle = self.oracle.call(prompt).await.ok().and_then(|text| extract_json(&text));

        let id = from_oracle
            .as_ref()
            .and_then(|v| v.get("id"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .filter(|s| Agent::is_valid_id(s))
            .unwrap_or_else(|| generate_agent_id(description));

        let purpose = from_oracle
            .as_ref()
            .and_then(|v| v.get("purpose"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| description.to_string());

        let role = role_override.unwrap_or(Role::General);
        let hint = from_oracle.as_ref().map(parse_profile_hint).unwrap_or_default();
        (id, purpose, role, hint)
    }

    pub async fn update_agent(&self, id: &str, patch: AgentPatch) -> EngineResult<Agent> {
        let id = id.to_string();
        let lookup_id = id.clone();
        let patch2 = patch.clone();
        let agents = self
            .store
            .atomic_update(DocumentName::Agents, move |mut agents: Vec<Agent>| {
                if let Some(agent) = agents.iter_mut().find(|a| a.id == id) {
                    if let Some(name) = patch2.name {
                        agent.name = name;
                    }
                    if let Some(role) = patch2.role {
                        agent.role = role;
                    }
                    if let Some(sector_id) = patch2.sector_id {
                        agent.sector_id = sector_id;
                    }
                    if let Some(confidence) = patch2.confidence {
                        agent.confidence = confidence;
                    }
                    if let Some(morale) = patch2.morale {
                        agent.morale = morale;
                    }
                    if let Some(status) = patch2.status {
                        agent.status = status;
                    }
                    agent.clamp_invariants();
                }
                agents
            })
            .await?;

        agents
            .into_iter()
            .find(|a| a.id == lookup_id)
            .ok_or_else(|| NotFoundError::Agent(lookup_id.clone()).into())
    }

    pub async fn delete_agent(&self, id: &str) -> EngineResult<()> {
        let target = id.to_string();
        let removed_sector: Arc<std::sync::Mutex<Option<uuid::Uuid>>> = Arc::new(std::sync::Mutex::new(None));
        let removed_sector2 = removed_sector.clone();
        let target2 = target.clone();
        self.store
            .atomic_update(DocumentName::Agents, move |agents: Vec<Agent>| {
                let mut kept = Vec::with_capacity(agents.len());
                for a in agents {
                    if a.id == target2 {
                        *removed_sector2.lock().unwrap() = a.sector_id;
                    } else {
                        kept.push(a);
                    }
                }
                kept
            })
            .await?;

        if let Some(sid) = *removed_sector.lock().unwrap() {
            self.mirror_into_sector(sid, &target, false).await;
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> EngineResult<Agent> {
        let agents: Vec<Agent> = self.store.read(DocumentName::Agents).await.map_err(EngineError::from)?;
        agents
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| NotFoundError::Agent(id.to_string()).into())
    }

    pub async fn list_for_sector(&self, sector_id: uuid::Uuid) -> EngineResult<Vec<Agent>> {
        let agents: Vec<Agent> = self.store.read(DocumentName::Agents).await.map_err(EngineError::from)?;
        Ok(agents.into_iter().filter(|a| a.sector_id == Some(sector_id)).collect())
    }

    pub async fn save_agents(&self, updated: Vec<Agent>) -> EngineResult<()> {
        self.store
            .atomic_update(DocumentName::Agents, move |mut agents: Vec<Agent>| {
                for u in updated {
                    if let Some(slot) = agents.iter_mut().find(|a| a.id == u.id) {
                        *slot = u;
                    } else {
                        agents.push(u);
                    }
                }
                let mut seen = std::collections::HashSet::new();
                agents.retain(|a| seen.insert(a.id.clone()));
                agents
            })
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }

    /// Keeps `Sector.agents`/`active_agents` consistent with `AgentRegistry`
    /// membership (spec.md §3 invariant). A missing sector is logged, not fatal.
    async fn mirror_into_sector(&self, sector_id: uuid::Uuid, agent_id: &str, present: bool) {
        let agent_id = agent_id.to_string();
        let result = self
            .store
            .atomic_update(
                DocumentName::Sectors,
                move |mut sectors: Vec<crate::domain::sector::Sector>| {
                    if let Some(sector) = sectors.iter_mut().find(|s| s.id == sector_id) {
                        if present {
                            if !sector.agents.contains(&agent_id) {
                                sector.agents.push(agent_id.clone());
                            }
                        } else {
                            sector.agents.retain(|a| a != &agent_id);
                        }
                        sector.active_agents = sector.agents.len();
                    }
                    sectors
                },
            )
            .await;
        if result.is_err() {
            warn!(sector_id = %sector_id, "failed to mirror agent membership into sector");
        }
    }
}

/// Parses the `{style, riskTolerance, initialConfidence}` profile hint out of
/// the same oracle response used for identity. Any field that's missing or
/// doesn't match a known token is left `None` and falls back to `role_template`.
fn parse_profile_hint(value: &serde_json::Value) -> ProfileHint {
    let decision_style = value
        .get("style")
        .and_then(|v| v.as_str())
        .and_then(|s| serde_json::from_value::<DecisionStyle>(serde_json::Value::String(s.to_ascii_lowercase())).ok());

    let risk_tolerance = value
        .get("riskTolerance")
        .and_then(|v| v.as_str())
        .and_then(|s| serde_json::from_value::<RiskTolerance>(serde_json::Value::String(s.to_ascii_lowercase())).ok());

    let initial_confidence = value.get("initialConfidence").and_then(|v| v.as_f64()).map(|c| c.clamp(-100.0, 100.0));

    ProfileHint {
        decision_style,
        risk_tolerance,
        initial_confidence,
    }
}

fn generate_agent_id(description: &str) -> String {
    let slug: String = description
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(16)
        .collect::<String>()
        .to_ascii_uppercase();
    let suffix: u32 = rand::rng().random_range(1000..9999);
    let base = if slug.is_empty() { "AGENT".to_string() } else { slug };
    format!("{base}_{suffix}")
}
