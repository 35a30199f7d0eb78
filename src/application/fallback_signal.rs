//! Deterministic `generateAgentSignal` policy (spec.md §4.5.1), used whenever
//! the oracle adapter fails or is disabled. Never calls out, always answers.

use crate::domain::agent::{Agent, RiskTolerance};
use crate::domain::signal::{Action, AgentSignal};

/// Market context the fallback policy reasons over.
#[derive(Debug, Clone, Copy)]
pub struct MarketContext {
    pub change_percent: f64,
    pub volatility: f64,
    pub symbol_hint: f64,
}

pub fn generate_agent_signal(agent: &Agent, symbol: &str, market: MarketContext) -> AgentSignal {
    let win_rate = agent.performance.win_rate.unwrap_or(0.5);
    let mut confidence = base_confidence_from_win_rate(win_rate);
    confidence += risk_tolerance_adjustment(agent.personality.risk_tolerance);

    let aggressive = matches!(agent.personality.risk_tolerance, RiskTolerance::High);
    let (action, action_confidence_delta) = action_from_change_percent(market.change_percent, aggressive);
    confidence += action_confidence_delta;

    if market.volatility > 0.05 {
        confidence -= 0.1;
    }

    confidence = confidence.clamp(0.1, 0.95);

    AgentSignal {
        agent_id: agent.id.clone(),
        action,
        confidence,
        symbol: symbol.to_string(),
        allocation_percent: 15.0 + market.symbol_hint.clamp(-5.0, 5.0),
        reasoning: format!(
            "fallback policy: winRate={win_rate:.2}, changePercent={:.2}, volatility={:.2}",
            market.change_percent, market.volatility
        ),
        win_rate,
    }
}

fn base_confidence_from_win_rate(win_rate: f64) -> f64 {
    if win_rate > 0.6 {
        0.7
    } else if win_rate > 0.4 {
        0.6
    } else if win_rate < 0.3 {
        0.3
    } else {
        0.5
    }
}

fn risk_tolerance_adjustment(risk_tolerance: RiskTolerance) -> f64 {
    match risk_tolerance {
        RiskTolerance::High => 0.1,
        RiskTolerance::Low => -0.1,
        RiskTolerance::Medium => 0.0,
    }
}

fn action_from_change_percent(change_percent: f64, aggressive: bool) -> (Action, f64) {
    if change_percent > 3.0 {
        if aggressive {
            (Action::Buy, 0.2)
        } else {
            (Action::Hold, 0.0)
        }
    } else if change_percent < -3.0 {
        if aggressive {
            (Action::Sell, 0.2)
        } else {
            (Action::Sell, 0.15)
        }
    } else {
        (Action::Hold, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentStatus, DecisionStyle, MemoryEntry, Performance, Personality, Preferences, Role};
    use chrono::Utc;

    fn agent(risk_tolerance: RiskTolerance, win_rate: Option<f64>) -> Agent {
        Agent {
            id: "A1".into(),
            name: "Test".into(),
            role: Role::Trader,
            sector_id: None,
            confidence: 0.0,
            morale: 50.0,
            status: AgentStatus::Idle,
            personality: Personality { risk_tolerance, decision_style: DecisionStyle::Balanced },
            preferences: Preferences { risk: 0.5, profit: 0.5, speed: 0.5, accuracy: 0.5 },
            memory: vec![MemoryEntry::creation("test", Utc::now())],
            performance: Performance { pnl: 0.0, win_rate },
            created_at: Utc::now(),
            needs_refinement: false,
            active_refinement_cycles: 0,
        }
    }

    #[test]
    fn aggressive_agent_buys_on_strong_upswing() {
        let a = agent(RiskTolerance::High, Some(0.7));
        let signal = generate_agent_signal(&a, "ACME", MarketContext { change_percent: 5.0, volatility: 0.01, symbol_hint: 0.0 });
        assert_eq!(signal.action, Action::Buy);
    }

    #[test]
    fn conservative_agent_holds_on_strong_upswing() {
        let a = agent(RiskTolerance::Low, Some(0.7));
        let signal = generate_agent_signal(&a, "ACME", MarketContext { change_percent: 5.0, volatility: 0.01, symbol_hint: 0.0 });
        assert_eq!(signal.action, Action::Hold);
    }

    #[test]
    fn confidence_always_bounded() {
        let a = agent(RiskTolerance::High, Some(0.9));
        let signal = generate_agent_signal(&a, "ACME", MarketContext { change_percent: 10.0, volatility: 0.2, symbol_hint: 0.0 });
        assert!(signal.confidence >= 0.1 && signal.confidence <= 0.95);
    }

    #[test]
    fn high_volatility_reduces_confidence() {
        let a = agent(RiskTolerance::Medium, Some(0.5));
        let calm = generate_agent_signal(&a, "ACME", MarketContext { change_percent: 0.0, volatility: 0.01, symbol_hint: 0.0 });
        let volatile = generate_agent_signal(&a, "ACME", MarketContext { change_percent: 0.0, volatility: 0.2, symbol_hint: 0.0 });
        assert!(volatile.confidence < calm.confidence);
    }
}
