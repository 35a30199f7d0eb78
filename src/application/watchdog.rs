//! Periodic liveness sweep (spec.md §4.8): force-resolves discussions that
//! stalled past STALL_THRESHOLD, and archives rooms that have sat CLOSED
//! past ARCHIVE_DELAY.

use crate::application::discussion_engine::DiscussionEngine;
use crate::domain::errors::EngineResult;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{error, warn};

pub struct DiscussionWatchdog {
    discussion_engine: Arc<DiscussionEngine>,
    stall_threshold: ChronoDuration,
    archive_delay: ChronoDuration,
}

impl DiscussionWatchdog {
    pub fn new(discussion_engine: Arc<DiscussionEngine>, stall_threshold: std::time::Duration, archive_delay: std::time::Duration) -> Self {
        Self {
            discussion_engine,
            stall_threshold: ChronoDuration::from_std(stall_threshold).unwrap_or(ChronoDuration::seconds(30)),
            archive_delay: ChronoDuration::from_std(archive_delay).unwrap_or(ChronoDuration::seconds(60)),
        }
    }

    pub async fn sweep(&self) -> EngineResult<()> {
        let now = Utc::now();

        for room in self.discussion_engine.list_open_in_progress().await? {
            if now - room.updated_at >= self.stall_threshold {
                if let Err(e) = self.discussion_engine.force_resolve_stalled(room.id).await {
                    error!(discussion_id = %room.id, error = %e, "watchdog failed to force-resolve stalled discussion");
                } else {
                    warn!(discussion_id = %room.id, "force-resolved stalled discussion");
                }
            }
        }

        for room in self.discussion_engine.list_closed().await? {
            if room.time_in_closed(now).map(|d| d >= self.archive_delay).unwrap_or(false) {
                if let Err(e) = self.discussion_engine.archive_discussion(room.id).await {
                    error!(discussion_id = %room.id, error = %e, "watchdog failed to archive discussion");
                }
            }
        }

        Ok(())
    }
}
