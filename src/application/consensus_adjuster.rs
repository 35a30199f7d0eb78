//! `ConsensusConfidenceAdjuster` (spec.md §4.5.2): after a decision, update
//! each agent's confidence. Non-managers take their signal's confidence
//! (rescaled); managers average the sector's non-manager confidences.
//!
//! Resolves the Open Question in spec.md §9 (the 0-1 / -100..100 confidence
//! scale boundary) at this exact step: `agent.confidence = clamp(100 *
//! signal.confidence, -100, 100)`.

use crate::domain::agent::Agent;
use crate::domain::signal::AgentSignal;

pub struct ConsensusConfidenceAdjuster;

impl ConsensusConfidenceAdjuster {
    /// `agents` are the sector's full roster (managers and non-managers);
    /// `signals` are the normalized signals collected this round, keyed by
    /// `agent_id`. Mutates `agents` in place.
    pub fn apply(agents: &mut [Agent], signals: &[AgentSignal]) {
        let mut non_manager_confidences = Vec::new();

        for agent in agents.iter_mut() {
            if agent.role.is_manager() {
                continue;
            }
            if let Some(signal) = signals.iter().find(|s| s.agent_id == agent.id) {
                agent.confidence = (100.0 * signal.confidence).clamp(-100.0, 100.0);
            }
            non_manager_confidences.push(agent.confidence);
        }

        let mean = if non_manager_confidences.is_empty() {
            None
        } else {
            Some(non_manager_confidences.iter().sum::<f64>() / non_manager_confidences.len() as f64)
        };

        for agent in agents.iter_mut() {
            if !agent.role.is_manager() {
                continue;
            }
            agent.confidence = match mean {
                Some(m) => m.clamp(-100.0, 100.0),
                None => agent.confidence.clamp(-100.0, 100.0),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentStatus, DecisionStyle, MemoryEntry, Performance, Personality, Preferences, Role};
    use crate::domain::signal::Action;
    use chrono::Utc;

    fn agent(id: &str, role: Role) -> Agent {
        Agent {
            id: id.to_string(),
            name: id.to_string(),
            role,
            sector_id: None,
            confidence: 0.0,
            morale: 50.0,
            status: AgentStatus::Idle,
            personality: Personality { risk_tolerance: crate::domain::agent::RiskTolerance::Medium, decision_style: DecisionStyle::Balanced },
            preferences: Preferences { risk: 0.5, profit: 0.5, speed: 0.5, accuracy: 0.5 },
            memory: vec![MemoryEntry::creation("test", Utc::now())],
            performance: Performance::default(),
            created_at: Utc::now(),
            needs_refinement: false,
            active_refinement_cycles: 0,
        }
    }

    fn signal(agent_id: &str, confidence: f64) -> AgentSignal {
        AgentSignal {
            agent_id: agent_id.to_string(),
            action: Action::Buy,
            confidence,
            symbol: "ACME".into(),
            allocation_percent: 20.0,
            reasoning: "test".into(),
            win_rate: 0.5,
        }
    }

    #[test]
    fn non_manager_confidence_rescaled_from_signal() {
        let mut agents = vec![agent("A1", Role::Trader)];
        let signals = vec![signal("A1", 0.8)];
        ConsensusConfidenceAdjuster::apply(&mut agents, &signals);
        assert_eq!(agents[0].confidence, 80.0);
    }

    #[test]
    fn manager_confidence_is_mean_of_non_managers() {
        let mut agents = vec![agent("A1", Role::Trader), agent("A2", Role::Analyst), agent("MGR", Role::Manager)];
        let signals = vec![signal("A1", 0.6), signal("A2", 1.0)];
        ConsensusConfidenceAdjuster::apply(&mut agents, &signals);
        let manager = agents.iter().find(|a| a.id == "MGR").unwrap();
        assert_eq!(manager.confidence, 80.0);
    }

    #[test]
    fn manager_falls_back_to_own_confidence_with_no_non_managers() {
        let mut agents = vec![agent("MGR", Role::Manager)];
        agents[0].confidence = 42.0;
        ConsensusConfidenceAdjuster::apply(&mut agents, &[]);
        assert_eq!(agents[0].confidence, 42.0);
    }
}
