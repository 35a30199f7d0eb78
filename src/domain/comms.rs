//! Cross-sector messages routed through the `CommsBus`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    Broadcast,
    Manager(String),
}

impl Recipient {
    pub fn matches(&self, candidate: &Recipient) -> bool {
        matches!(self, Recipient::Broadcast) || self == candidate
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossSectorMessage {
    pub id: uuid::Uuid,
    pub from: String,
    pub to: Recipient,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl CrossSectorMessage {
    pub fn new(from: String, to: Recipient, kind: String, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            from,
            to,
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn addressed_to(&self, recipient: &str) -> bool {
        match &self.to {
            Recipient::Broadcast => true,
            Recipient::Manager(id) => id == recipient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_matches_any_recipient() {
        let msg = CrossSectorMessage::new(
            "MGR_A".into(),
            Recipient::Broadcast,
            "alert".into(),
            serde_json::json!({"note": "hi"}),
        );
        assert!(msg.addressed_to("MGR_B"));
    }

    #[test]
    fn direct_message_only_matches_its_manager() {
        let msg = CrossSectorMessage::new(
            "MGR_A".into(),
            Recipient::Manager("MGR_B".into()),
            "alert".into(),
            serde_json::json!({}),
        );
        assert!(msg.addressed_to("MGR_B"));
        assert!(!msg.addressed_to("MGR_C"));
    }
}
