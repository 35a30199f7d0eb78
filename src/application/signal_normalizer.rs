//! Turns an untrusted `RawAgentResponse` into a canonical `AgentSignal`
//! (spec.md §4.3). The only producer of canonical signals; everything
//! downstream trusts its output unconditionally.

use crate::domain::signal::{Action, AgentSignal, RawAgentResponse, RejectedReason, RejectionCode};

/// Defaults the normalizer falls back on when the oracle omits a field.
#[derive(Debug, Clone, Copy)]
pub struct NormalizationContext<'a> {
    /// Sector risk profile in `[0, 100]`.
    pub sector_risk_profile: f64,
    /// Agent's last known confidence in `[0, 100]`.
    pub last_confidence: f64,
    pub confidence_delta: f64,
    pub allowed_symbols: &'a [String],
}

impl<'a> Default for NormalizationContext<'a> {
    fn default() -> Self {
        Self {
            sector_risk_profile: 50.0,
            last_confidence: 50.0,
            confidence_delta: 2.0,
            allowed_symbols: &[],
        }
    }
}

pub struct SignalNormalizer;

impl SignalNormalizer {
    pub fn normalize(
        agent_id: &str,
        raw: &RawAgentResponse,
        ctx: NormalizationContext,
    ) -> Result<AgentSignal, RejectedReason> {
        let action_token = raw.action.as_deref().or(raw.side.as_deref());
        let action = match action_token.and_then(Action::parse) {
            Some(a) => a,
            None => return Err(RejectedReason { code: RejectionCode::UnknownAction }),
        };

        let symbol = raw
            .symbol
            .as_deref()
            .map(|s| s.trim().to_ascii_uppercase())
            .unwrap_or_default();
        if !ctx.allowed_symbols.is_empty() && !ctx.allowed_symbols.iter().any(|s| s == &symbol) {
            return Err(RejectedReason { code: RejectionCode::SymbolNotAllowed });
        }

        let allocation_percent = match raw.allocation_percent {
            Some(v) => v.clamp(0.0, 100.0),
            None => default_allocation_percent(ctx.sector_risk_profile),
        };

        let confidence_0_100 = match raw.confidence {
            Some(v) => v.clamp(0.0, 100.0),
            None => (ctx.last_confidence + ctx.confidence_delta).clamp(0.0, 100.0),
        };

        let reasoning = raw.reasoning.as_deref().unwrap_or("").trim().to_string();
        if reasoning.is_empty() {
            return Err(RejectedReason { code: RejectionCode::EmptyReasoning });
        }

        let win_rate = raw.win_rate.unwrap_or(0.5).clamp(0.0, 1.0);

        Ok(AgentSignal {
            agent_id: agent_id.to_string(),
            action,
            confidence: confidence_0_100 / 100.0,
            symbol,
            allocation_percent,
            reasoning,
            win_rate,
        })
    }
}

/// Monotone piecewise-linear mapping of sector risk profile to a default
/// allocation percent: 0-33 -> 10-15%, 33-66 -> 15-25%, 66-100 -> 20-30%.
fn default_allocation_percent(risk_profile: f64) -> f64 {
    let risk_profile = risk_profile.clamp(0.0, 100.0);
    if risk_profile <= 33.0 {
        lerp(risk_profile, 0.0, 33.0, 10.0, 15.0)
    } else if risk_profile <= 66.0 {
        lerp(risk_profile, 33.0, 66.0, 15.0, 25.0)
    } else {
        lerp(risk_profile, 66.0, 100.0, 20.0, 30.0)
    }
}

fn lerp(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    if (x1 - x0).abs() < f64::EPSILON {
        return y0;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}
