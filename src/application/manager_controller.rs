//! Per-sector discussion creation policy and cross-sector messaging
//! ownership (spec.md §4.7).

use crate::application::comms_bus::CommsBus;
use crate::application::discussion_engine::DiscussionEngine;
use crate::domain::comms::{CrossSectorMessage, Recipient};
use crate::domain::discussion::DiscussionRoom;
use crate::domain::errors::EngineResult;
use crate::domain::sector::Sector;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::info;

pub struct ManagerController {
    discussion_engine: Arc<DiscussionEngine>,
    comms: Arc<CommsBus>,
    debounce_window: ChronoDuration,
}

impl ManagerController {
    pub fn new(discussion_engine: Arc<DiscussionEngine>, comms: Arc<CommsBus>, debounce_window: std::time::Duration) -> Self {
        Self {
            discussion_engine,
            comms,
            debounce_window: ChronoDuration::from_std(debounce_window).unwrap_or(ChronoDuration::seconds(60)),
        }
    }

    /// Opens a discussion when `discussion_ready` holds, or when the sector
    /// has a positive balance and none was created within the debounce
    /// window. `start_discussion` itself is idempotent against an existing
    /// non-terminal room, so this never creates a duplicate.
    pub async fn maybe_open_discussion(&self, sector: &Sector, discussion_ready: bool) -> EngineResult<Option<DiscussionRoom>> {
        if sector.has_open_discussion() {
            return Ok(None);
        }

        let balance_triggered = if sector.balance > 0.0 {
            match self.discussion_engine.most_recent_discussion_for_sector(sector.id).await? {
                Some(last) => Utc::now() - last.created_at >= self.debounce_window,
                None => true,
            }
        } else {
            false
        };

        if !discussion_ready && !balance_triggered {
            return Ok(None);
        }

        let title = format!("{} sector deliberation", sector.name);
        let room = self.discussion_engine.start_discussion(sector.id, title, None).await?;

        self.comms
            .publish(CrossSectorMessage::new(
                format!("MANAGER_{}", sector.symbol),
                Recipient::Broadcast,
                "discussion_opened".to_string(),
                serde_json::json!({"sectorId": sector.id, "discussionId": room.id}),
            ))
            .await?;

        info!(sector_id = %sector.id, discussion_ready, balance_triggered, "manager opened discussion");
        Ok(Some(room))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::agent_registry::AgentRegistry;
    use crate::application::sector_registry::SectorRegistry;
    use crate::infrastructure::oracle::{NullOracle, OracleClient};
    use crate::infrastructure::persistence::PersistenceStore;
    use std::time::Duration;

    fn controller() -> (ManagerController, Arc<SectorRegistry>) {
        let dir = std::env::temp_dir().join(format!("manager_controller_test_{}", uuid::Uuid::new_v4()));
        let store = Arc::new(PersistenceStore::new(dir));
        let oracle = Arc::new(OracleClient::new(Arc::new(NullOracle), Duration::from_millis(20), 0));
        let agents = Arc::new(AgentRegistry::new(store.clone(), oracle.clone(), 200, 12));
        let sectors = Arc::new(SectorRegistry::new(store.clone()));
        let discussion_engine = Arc::new(DiscussionEngine::new(store.clone(), agents, sectors.clone(), oracle, 0.5, 1));
        let comms = Arc::new(CommsBus::new(store));
        (ManagerController::new(discussion_engine, comms, Duration::from_secs(60)), sectors)
    }

    #[tokio::test]
    async fn readiness_triggers_a_discussion() {
        let (controller, sectors) = controller();
        let sector = sectors.create_sector("Energy".into(), None).await.unwrap();
        let room = controller.maybe_open_discussion(&sector, true).await.unwrap();
        assert!(room.is_some());
    }

    #[tokio::test]
    async fn no_readiness_and_zero_balance_does_not_trigger() {
        let (controller, sectors) = controller();
        let sector = sectors.create_sector("Energy".into(), None).await.unwrap();
        let room = controller.maybe_open_discussion(&sector, false).await.unwrap();
        assert!(room.is_none());
    }

    #[tokio::test]
    async fn positive_balance_triggers_when_no_prior_discussion() {
        let (controller, sectors) = controller();
        let mut sector = sectors.create_sector("Energy".into(), None).await.unwrap();
        sector.balance = 500.0;
        sectors.save(sector.clone()).await.unwrap();
        let room = controller.maybe_open_discussion(&sector, false).await.unwrap();
        assert!(room.is_some());
    }
}
