//! The `DiscussionRoom` state machine and its messages/decisions.

use crate::domain::errors::IllegalStateTransitionError;
use crate::domain::signal::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiscussionStatus {
    Created,
    InProgress,
    Decided,
    Closed,
    Archived,
}

impl DiscussionStatus {
    /// The single legal next state, or `None` if terminal.
    fn next(self) -> Option<DiscussionStatus> {
        match self {
            DiscussionStatus::Created => Some(DiscussionStatus::InProgress),
            DiscussionStatus::InProgress => Some(DiscussionStatus::Decided),
            DiscussionStatus::Decided => Some(DiscussionStatus::Closed),
            DiscussionStatus::Closed => Some(DiscussionStatus::Archived),
            DiscussionStatus::Archived => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DiscussionStatus::Archived)
    }

    /// A discussion with this status suppresses creation of a new one for
    /// the same sector (spec.md: "idempotent: existing non-terminal
    /// discussion suppresses creation").
    pub fn is_non_terminal(self) -> bool {
        !matches!(self, DiscussionStatus::Closed | DiscussionStatus::Archived)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub action: Action,
    pub confidence: f64,
    pub allocation_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: uuid::Uuid,
    pub discussion_id: uuid::Uuid,
    pub agent_id: String,
    pub agent_name: String,
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub proposal: Option<Proposal>,
    pub analysis: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteBreakdown {
    pub buy: usize,
    pub sell: usize,
    pub hold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionDecision {
    pub action: Action,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub rationale: String,
    pub vote_breakdown: VoteBreakdown,
    /// In `[0, 1]`.
    pub conflict_score: f64,
    pub selected_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CloseReason {
    Decided,
    Stalled,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round: u32,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionRoom {
    pub id: uuid::Uuid,
    pub sector_id: uuid::Uuid,
    pub title: String,
    pub agent_ids: Vec<String>,
    pub messages: Vec<Message>,
    pub messages_count: usize,
    pub status: DiscussionStatus,
    pub current_round: u32,
    pub round_history: Vec<RoundSnapshot>,
    pub final_decision: Option<DiscussionDecision>,
    pub decided_at: Option<DateTime<Utc>>,
    pub discussion_closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscussionRoom {
    pub fn new(
        sector_id: uuid::Uuid,
        title: String,
        agent_ids: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            sector_id,
            title,
            agent_ids,
            messages: Vec::new(),
            messages_count: 0,
            status: DiscussionStatus::Created,
            current_round: 1,
            round_history: Vec::new(),
            final_decision: None,
            decided_at: None,
            discussion_closed_at: None,
            close_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn advance_to(
        &mut self,
        target: DiscussionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), IllegalStateTransitionError> {
        match self.status.next() {
            Some(next) if next == target => {
                self.status = target;
                self.updated_at = now;
                Ok(())
            }
            _ => Err(IllegalStateTransitionError::Forward {
                id: self.id,
                from: self.status,
                to: target,
            }),
        }
    }

    /// Appends a message and, if this is the first message, transitions
    /// CREATED -> IN_PROGRESS.
    pub fn record_message(
        &mut self,
        message: Message,
        now: DateTime<Utc>,
    ) -> Result<(), IllegalStateTransitionError> {
        self.messages.push(message);
        self.messages_count = self.messages.len();
        self.updated_at = now;
        if self.status == DiscussionStatus::Created {
            self.advance_to(DiscussionStatus::InProgress, now)?;
        }
        Ok(())
    }

    pub fn snapshot_round(&mut self) {
        self.round_history.push(RoundSnapshot {
            round: self.current_round,
            messages: self.messages.clone(),
        });
        self.current_round += 1;
    }

    pub fn set_decision(
        &mut self,
        decision: DiscussionDecision,
        now: DateTime<Utc>,
    ) -> Result<(), IllegalStateTransitionError> {
        if self.final_decision.is_some() {
            return Err(IllegalStateTransitionError::Precondition {
                id: self.id,
                reason: "finalDecision is immutable once set".to_string(),
            });
        }
        if self.messages.is_empty() {
            return Err(IllegalStateTransitionError::Precondition {
                id: self.id,
                reason: "cannot decide with zero recorded messages".to_string(),
            });
        }
        self.final_decision = Some(decision);
        self.decided_at = Some(now);
        self.advance_to(DiscussionStatus::Decided, now)
    }

    pub fn close(
        &mut self,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Result<(), IllegalStateTransitionError> {
        if self.final_decision.is_none() {
            return Err(IllegalStateTransitionError::Precondition {
                id: self.id,
                reason: "cannot close before a decision is set".to_string(),
            });
        }
        self.close_reason = Some(reason);
        self.discussion_closed_at = Some(now);
        self.advance_to(DiscussionStatus::Closed, now)
    }

    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<(), IllegalStateTransitionError> {
        self.advance_to(DiscussionStatus::Archived, now)
    }

    pub fn time_in_closed(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.discussion_closed_at.map(|closed| now - closed)
    }

    /// Watchdog-only path (spec.md §4.8): forces a stalled room straight to
    /// CLOSED with the supplied decision, skipping the "≥1 message" and
    /// immutability preconditions `set_decision`/`close` enforce for the
    /// normal path. A room that stalled in CREATED is first advanced to
    /// IN_PROGRESS with no message, since the watchdog only ever inspects
    /// non-terminal rooms and CLOSED must always be reached via DECIDED.
    pub fn force_close_stalled(&mut self, decision: DiscussionDecision, now: DateTime<Utc>) {
        if self.status == DiscussionStatus::Created {
            self.status = DiscussionStatus::InProgress;
        }
        self.final_decision = Some(decision);
        self.decided_at = Some(now);
        self.status = DiscussionStatus::Decided;
        self.close_reason = Some(CloseReason::Stalled);
        self.discussion_closed_at = Some(now);
        self.status = DiscussionStatus::Closed;
        self.updated_at = now;
    }
}

/// `{sectorId, price, timestamp}` rows of the `priceHistory` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistoryRecord {
    pub sector_id: uuid::Uuid,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// `{id, sectorId, action, amount, timestamp, checklistId, results[]}` rows of
/// the `executionLogs` document (spec.md §6 table; producers specified in
/// SPEC_FULL.md §3 supplement).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: uuid::Uuid,
    pub sector_id: uuid::Uuid,
    pub action: Action,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub checklist_id: Option<String>,
    pub results: Vec<String>,
}

/// Breaks down a `VoteBreakdown` into per-action tallies, used by the voting engine.
pub fn empty_tally() -> HashMap<Action, usize> {
    let mut m = HashMap::new();
    m.insert(Action::Buy, 0);
    m.insert(Action::Sell, 0);
    m.insert(Action::Hold, 0);
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> DiscussionRoom {
        DiscussionRoom::new(uuid::Uuid::new_v4(), "Energy outlook".into(), vec!["A".into()], Utc::now())
    }

    #[test]
    fn first_message_advances_created_to_in_progress() {
        let mut r = room();
        let msg = Message {
            id: uuid::Uuid::new_v4(),
            discussion_id: r.id,
            agent_id: "A".into(),
            agent_name: "Agent A".into(),
            role: "trader".into(),
            content: "buy".into(),
            timestamp: Utc::now(),
            proposal: None,
            analysis: None,
        };
        r.record_message(msg, Utc::now()).unwrap();
        assert_eq!(r.status, DiscussionStatus::InProgress);
        assert_eq!(r.messages_count, 1);
    }

    #[test]
    fn cannot_decide_without_messages() {
        let mut r = room();
        let decision = DiscussionDecision {
            action: Action::Hold,
            confidence: 0.0,
            rationale: "none".into(),
            vote_breakdown: VoteBreakdown { buy: 0, sell: 0, hold: 0 },
            conflict_score: 1.0,
            selected_agent: None,
        };
        assert!(r.set_decision(decision, Utc::now()).is_err());
    }

    #[test]
    fn transitions_only_go_forward() {
        let mut r = room();
        let msg = Message {
            id: uuid::Uuid::new_v4(),
            discussion_id: r.id,
            agent_id: "A".into(),
            agent_name: "Agent A".into(),
            role: "trader".into(),
            content: "buy".into(),
            timestamp: Utc::now(),
            proposal: None,
            analysis: None,
        };
        r.record_message(msg, Utc::now()).unwrap();
        let decision = DiscussionDecision {
            action: Action::Buy,
            confidence: 0.8,
            rationale: "consensus".into(),
            vote_breakdown: VoteBreakdown { buy: 1, sell: 0, hold: 0 },
            conflict_score: 0.0,
            selected_agent: Some("A".into()),
        };
        r.set_decision(decision, Utc::now()).unwrap();
        assert_eq!(r.status, DiscussionStatus::Decided);
        r.close(CloseReason::Decided, Utc::now()).unwrap();
        assert_eq!(r.status, DiscussionStatus::Closed);
        r.archive(Utc::now()).unwrap();
        assert_eq!(r.status, DiscussionStatus::Archived);
        // Archived is terminal: trying to archive again fails.
        assert!(r.archive(Utc::now()).is_err());
    }

    #[test]
    fn force_close_stalled_reaches_closed_with_no_messages() {
        let mut r = room();
        assert_eq!(r.status, DiscussionStatus::Created);
        let decision = DiscussionDecision {
            action: Action::Hold,
            confidence: 0.0,
            rationale: "stalled".into(),
            vote_breakdown: VoteBreakdown { buy: 0, sell: 0, hold: 0 },
            conflict_score: 1.0,
            selected_agent: None,
        };
        r.force_close_stalled(decision, Utc::now());
        assert_eq!(r.status, DiscussionStatus::Closed);
        assert_eq!(r.close_reason, Some(CloseReason::Stalled));
        assert!(r.final_decision.is_some());
    }
}
