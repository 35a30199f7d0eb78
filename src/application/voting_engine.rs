//! Converts a bag of `AgentSignal`s into a single `DiscussionDecision`
//! (spec.md §4.4): tally, weight, detect conflict, resolve, select.

use crate::domain::discussion::{DiscussionDecision, VoteBreakdown};
use crate::domain::signal::{Action, AgentSignal};
use std::collections::HashMap;

pub struct VotingEngine {
    conflict_threshold: f64,
}

impl VotingEngine {
    pub fn new(conflict_threshold: f64) -> Self {
        Self { conflict_threshold }
    }

    /// Deterministic given a fixed insertion order in `signals` (tie-breaks
    /// use only count, summed confidence, and lexical action order).
    pub fn decide(&self, signals: &[AgentSignal]) -> DiscussionDecision {
        if signals.is_empty() {
            return DiscussionDecision {
                action: Action::Hold,
                confidence: 0.0,
                rationale: "no signals available".to_string(),
                vote_breakdown: VoteBreakdown { buy: 0, sell: 0, hold: 0 },
                conflict_score: 1.0,
                selected_agent: None,
            };
        }

        let breakdown = tally(signals);
        let winner = majority_action(signals);

        let weighted = weighted_confidence_per_action(signals);
        let winner_confidence = weighted.get(&winner).copied().unwrap_or(0.0);

        let mut ranked: Vec<(Action, f64)> = weighted.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let runner_up_confidence = ranked
            .iter()
            .find(|(action, _)| *action != winner)
            .map(|(_, c)| *c)
            .unwrap_or(0.0);

        let conflict_score = if winner_confidence > 0.0 {
            (runner_up_confidence / winner_confidence).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let needs_review = conflict_score >= self.conflict_threshold;
        let (final_action, final_confidence, rationale) = if needs_review {
            resolve_conflict(signals, winner)
        } else {
            (winner, winner_confidence, format!("{winner} majority with low conflict"))
        };

        let selected_agent = select_agent(signals, final_action);

        DiscussionDecision {
            action: final_action,
            confidence: final_confidence.clamp(0.0, 1.0),
            rationale,
            vote_breakdown: breakdown,
            conflict_score,
            selected_agent,
        }
    }
}

fn tally(signals: &[AgentSignal]) -> VoteBreakdown {
    let mut breakdown = VoteBreakdown { buy: 0, sell: 0, hold: 0 };
    for s in signals {
        match s.action {
            Action::Buy => breakdown.buy += 1,
            Action::Sell => breakdown.sell += 1,
            Action::Hold => breakdown.hold += 1,
        }
    }
    breakdown
}

/// Majority action by vote count; ties broken by higher summed confidence,
/// further ties by lexical order (BUY < HOLD < SELL).
fn majority_action(signals: &[AgentSignal]) -> Action {
    let mut counts: HashMap<Action, usize> = HashMap::new();
    let mut summed_confidence: HashMap<Action, f64> = HashMap::new();
    for s in signals {
        *counts.entry(s.action).or_insert(0) += 1;
        *summed_confidence.entry(s.action).or_insert(0.0) += s.confidence;
    }

    let mut actions: Vec<Action> = counts.keys().copied().collect();
    actions.sort_by_key(|a| lexical_rank(*a));

    actions
        .into_iter()
        .max_by(|a, b| {
            counts[a]
                .cmp(&counts[b])
                .then_with(|| {
                    summed_confidence[a]
                        .partial_cmp(&summed_confidence[b])
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| lexical_rank(*b).cmp(&lexical_rank(*a)))
        })
        .unwrap_or(Action::Hold)
}

fn lexical_rank(action: Action) -> u8 {
    match action {
        Action::Buy => 0,
        Action::Hold => 1,
        Action::Sell => 2,
    }
}

/// `w = 0.5 + 1.5 * winRate`, clamped to `[0.5, 2.0]` when winRate is known.
fn weight(signal: &AgentSignal) -> f64 {
    (0.5 + 1.5 * signal.win_rate).clamp(0.5, 2.0)
}

/// Weighted arithmetic mean of confidence per action, clamped to `[0, 1]`.
fn weighted_confidence_per_action(signals: &[AgentSignal]) -> HashMap<Action, f64> {
    let mut weighted_sum: HashMap<Action, f64> = HashMap::new();
    let mut weight_sum: HashMap<Action, f64> = HashMap::new();
    for s in signals {
        let w = weight(s);
        *weighted_sum.entry(s.action).or_insert(0.0) += w * s.confidence;
        *weight_sum.entry(s.action).or_insert(0.0) += w;
    }
    weighted_sum
        .into_iter()
        .map(|(action, sum)| {
            let denom = weight_sum.get(&action).copied().unwrap_or(1.0);
            (action, (sum / denom).clamp(0.0, 1.0))
        })
        .collect()
}

/// Partitions signals by action, picks the cluster with the highest average
/// winRate (ties by higher weighted confidence).
fn resolve_conflict(signals: &[AgentSignal], _tallied_winner: Action) -> (Action, f64, String) {
    let weighted = weighted_confidence_per_action(signals);
    let mut avg_win_rate: HashMap<Action, f64> = HashMap::new();
    let mut counts: HashMap<Action, usize> = HashMap::new();
    for s in signals {
        *avg_win_rate.entry(s.action).or_insert(0.0) += s.win_rate;
        *counts.entry(s.action).or_insert(0) += 1;
    }
    for (action, sum) in avg_win_rate.iter_mut() {
        if let Some(n) = counts.get(action) {
            *sum /= *n as f64;
        }
    }

    let best = avg_win_rate
        .iter()
        .max_by(|(a_action, a_rate), (b_action, b_rate)| {
            a_rate
                .partial_cmp(b_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let a_conf = weighted.get(a_action).copied().unwrap_or(0.0);
                    let b_conf = weighted.get(b_action).copied().unwrap_or(0.0);
                    a_conf.partial_cmp(&b_conf).unwrap_or(std::cmp::Ordering::Equal)
                })
        })
        .map(|(action, _)| *action)
        .unwrap_or(Action::Hold);

    let confidence = weighted.get(&best).copied().unwrap_or(0.0);
    (best, confidence, format!("conflict resolved in favor of {best} by higher average win rate"))
}

/// Signal supporting the final action with the highest `confidence * (1 + winRate)`.
/// On a tie, keeps the earliest-inserted signal: `Iterator::max_by` would
/// otherwise return the *last* equal-scoring element (spec.md §8 Scenario 1
/// requires the first).
fn select_agent(signals: &[AgentSignal], action: Action) -> Option<String> {
    let mut best: Option<(usize, f64, &AgentSignal)> = None;
    for (index, s) in signals.iter().enumerate() {
        if s.action != action {
            continue;
        }
        let score = s.confidence * (1.0 + s.win_rate);
        match &best {
            Some((_, best_score, _)) if score <= *best_score => {}
            _ => best = Some((index, score, s)),
        }
    }
    best.map(|(_, _, s)| s.agent_id.clone())
}
