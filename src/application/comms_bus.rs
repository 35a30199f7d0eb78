//! Cross-sector message bus (spec.md §4.7, detailed in SPEC_FULL.md §4.2–4.8
//! supplement): a durable append-only log backed by `PersistenceStore`, plus
//! best-effort in-memory fan-out to live subscribers.

use crate::domain::comms::{CrossSectorMessage, Recipient};
use crate::domain::errors::{EngineError, EngineResult};
use crate::infrastructure::persistence::{DocumentName, PersistenceStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

pub struct CommsBus {
    store: Arc<PersistenceStore>,
    subscribers: Mutex<HashMap<String, mpsc::Sender<CrossSectorMessage>>>,
}

impl CommsBus {
    pub fn new(store: Arc<PersistenceStore>) -> Self {
        Self {
            store,
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Appends to the durable `comms` document and best-effort notifies any
    /// live subscriber whose address matches. A full/dropped subscriber
    /// channel never fails the publish — the durable log is authoritative.
    pub async fn publish(&self, message: CrossSectorMessage) -> EngineResult<()> {
        let to_persist = message.clone();
        self.store
            .atomic_update(DocumentName::Comms, move |mut messages: Vec<CrossSectorMessage>| {
                messages.push(to_persist);
                messages
            })
            .await
            .map_err(EngineError::from)?;

        let subscribers = self.subscribers.lock().await;
        for (manager_id, sender) in subscribers.iter() {
            if message.addressed_to(manager_id) {
                let _ = sender.try_send(message.clone());
            }
        }
        Ok(())
    }

    /// Registers a live, non-destructive listener for `manager_id`. Returns
    /// the receiving half; the bus keeps only the sender.
    pub async fn subscribe(&self, manager_id: &str) -> mpsc::Receiver<CrossSectorMessage> {
        let (tx, rx) = mpsc::channel(64);
        self.subscribers.lock().await.insert(manager_id.to_string(), tx);
        rx
    }

    /// Destructive: removes and returns all messages addressed to
    /// `recipient` (a manager id, or an explicit broadcast target),
    /// rewriting the durable log without them.
    pub async fn drain(&self, recipient: &str) -> EngineResult<Vec<CrossSectorMessage>> {
        let recipient = recipient.to_string();
        let recipient_for_closure = recipient.clone();
        let drained: Arc<std::sync::Mutex<Vec<CrossSectorMessage>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let drained2 = drained.clone();
        self.store
            .atomic_update(DocumentName::Comms, move |messages: Vec<CrossSectorMessage>| {
                let (matched, remaining): (Vec<_>, Vec<_>) =
                    messages.into_iter().partition(|m| m.addressed_to(&recipient_for_closure));
                *drained2.lock().unwrap() = matched;
                remaining
            })
            .await
            .map_err(EngineError::from)?;
        let result = drained.lock().unwrap().clone();
        debug!(recipient = %recipient, count = result.len(), "drained comms messages");
        Ok(result)
    }

    pub fn broadcast_recipient() -> Recipient {
        Recipient::Broadcast
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_bus() -> CommsBus {
        let dir = std::env::temp_dir().join(format!("comms_bus_test_{}", uuid::Uuid::new_v4()));
        CommsBus::new(Arc::new(PersistenceStore::new(dir)))
    }

    #[tokio::test]
    async fn publish_then_drain_is_destructive() {
        let bus = temp_bus();
        bus.publish(CrossSectorMessage::new(
            "MGR_A".into(),
            Recipient::Manager("MGR_B".into()),
            "alert".into(),
            serde_json::json!({"note": "volatility spike"}),
        ))
        .await
        .unwrap();

        let drained = bus.drain("MGR_B").await.unwrap();
        assert_eq!(drained.len(), 1);
        let second_drain = bus.drain("MGR_B").await.unwrap();
        assert!(second_drain.is_empty());
    }

    #[tokio::test]
    async fn broadcast_is_drained_by_any_recipient() {
        let bus = temp_bus();
        bus.publish(CrossSectorMessage::new("MGR_A".into(), Recipient::Broadcast, "alert".into(), serde_json::json!({})))
            .await
            .unwrap();
        let drained = bus.drain("MGR_Z").await.unwrap();
        assert_eq!(drained.len(), 1);
    }

    #[tokio::test]
    async fn subscriber_receives_live_fanout() {
        let bus = temp_bus();
        let mut rx = bus.subscribe("MGR_B").await;
        bus.publish(CrossSectorMessage::new(
            "MGR_A".into(),
            Recipient::Manager("MGR_B".into()),
            "alert".into(),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
        let received = rx.try_recv().unwrap();
        assert_eq!(received.from, "MGR_A");
    }
}
