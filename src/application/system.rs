//! `SystemOrchestrator`: starts/stops the three periodic drivers and
//! exposes the inbound control operations of spec.md §6.

use crate::application::agent_registry::{AgentPatch, AgentRegistry};
use crate::application::comms_bus::CommsBus;
use crate::application::discussion_engine::DiscussionEngine;
use crate::application::manager_controller::ManagerController;
use crate::application::sector_registry::{SectorPatch, SectorRegistry};
use crate::application::sector_ticker::{SectorTicker, TickOutcome};
use crate::application::watchdog::DiscussionWatchdog;
use crate::config::{EngineConfig, SystemMode};
use crate::domain::agent::{Agent, Role};
use crate::domain::discussion::DiscussionRoom;
use crate::domain::errors::EngineResult;
use crate::domain::sector::Sector;
use crate::infrastructure::oracle::{OracleClient, ReasoningOracle};
use crate::infrastructure::persistence::PersistenceStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Non-reentrant guard shared by all three drivers: a tick/sweep that begins
/// must complete before the next one fires (spec.md §5).
struct DriverGuard {
    in_progress: AtomicBool,
}

impl DriverGuard {
    fn new() -> Self {
        Self { in_progress: AtomicBool::new(false) }
    }

    /// Returns `true` if this caller won the right to run; `false` means a
    /// prior iteration is still in flight and this tick should be skipped.
    fn try_enter(&self) -> bool {
        self.in_progress.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }

    fn exit(&self) {
        self.in_progress.store(false, Ordering::SeqCst);
    }
}

pub struct SystemOrchestrator {
    config: EngineConfig,
    store: Arc<PersistenceStore>,
    agents: Arc<AgentRegistry>,
    sectors: Arc<SectorRegistry>,
    discussions: Arc<DiscussionEngine>,
    ticker: Arc<SectorTicker>,
    watchdog: Arc<DiscussionWatchdog>,
    comms: Arc<CommsBus>,
    mode: std::sync::Mutex<SystemMode>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl SystemOrchestrator {
    pub fn new(config: EngineConfig, oracle: Arc<dyn ReasoningOracle>) -> Self {
        let store = Arc::new(PersistenceStore::new(config.storage_dir.clone()));
        let oracle_client = Arc::new(OracleClient::new(oracle, std::time::Duration::from_secs(10), 2));

        let agents = Arc::new(AgentRegistry::new(
            store.clone(),
            oracle_client.clone(),
            config.max_total_agents,
            config.max_agents_per_sector,
        ));
        let sectors = Arc::new(SectorRegistry::new(store.clone()));
        let discussions = Arc::new(DiscussionEngine::new(
            store.clone(),
            agents.clone(),
            sectors.clone(),
            oracle_client,
            config.conflict_threshold,
            config.max_rounds,
        ));
        let comms = Arc::new(CommsBus::new(store.clone()));
        let manager = Arc::new(ManagerController::new(discussions.clone(), comms.clone(), config.debounce_window));
        let ticker = Arc::new(SectorTicker::new(store.clone(), agents.clone(), sectors.clone(), manager, config.readiness_threshold));
        let watchdog = Arc::new(DiscussionWatchdog::new(discussions.clone(), config.stall_threshold, config.archive_delay));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            store,
            agents,
            sectors,
            discussions,
            ticker,
            watchdog,
            comms,
            mode: std::sync::Mutex::new(SystemMode::Simulation),
            shutdown_tx,
            shutdown_rx,
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Spawns the three periodic drivers. Idempotent per call: calling
    /// `start` twice without `stop` spawns a second independent set of
    /// tasks, so callers should pair it with `stop`.
    pub fn start(self: &Arc<Self>) {
        self.spawn_driver("sector_ticker", self.config.tick_interval, {
            let this = self.clone();
            move || {
                let this = this.clone();
                async move {
                    if let Err(e) = this.ticker.tick_all().await {
                        warn!(error = %e, "sector ticker iteration failed");
                    }
                }
            }
        });

        self.spawn_driver("discussion_lifecycle", self.config.lifecycle_interval, {
            let this = self.clone();
            move || {
                let this = this.clone();
                async move {
                    if let Err(e) = this.run_lifecycle_iteration().await {
                        warn!(error = %e, "discussion lifecycle iteration failed");
                    }
                }
            }
        });

        self.spawn_driver("discussion_watchdog", self.config.watchdog_interval, {
            let this = self.clone();
            move || {
                let this = this.clone();
                async move {
                    if let Err(e) = this.watchdog.sweep().await {
                        warn!(error = %e, "watchdog sweep failed");
                    }
                }
            }
        });

        info!("system orchestrator started");
    }

    fn spawn_driver<F, Fut>(&self, name: &'static str, interval: std::time::Duration, mut make_iteration: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let guard = Arc::new(DriverGuard::new());
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !guard.try_enter() {
                            continue;
                        }
                        make_iteration().await;
                        guard.exit();
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(driver = name, "driver stopped");
        });
        self.tasks.lock().unwrap().push(handle);
    }

    /// Advances every open discussion by one round of argument collection,
    /// producing a decision once readiness criteria elsewhere have been met.
    async fn run_lifecycle_iteration(&self) -> EngineResult<()> {
        for room in self.discussions.list_open_in_progress().await? {
            self.discussions.collect_arguments(room.id).await?;
        }
        Ok(())
    }

    /// Signals all drivers to stop after completing their current
    /// iteration's persistence step, then awaits their shutdown.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        info!("system orchestrator stopped");
    }

    pub fn get_system_mode(&self) -> SystemMode {
        *self.mode.lock().unwrap()
    }

    pub fn set_system_mode(&self, mode: SystemMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub async fn create_sector(&self, name: String, symbol: Option<String>) -> EngineResult<Sector> {
        self.sectors.create_sector(name, symbol).await
    }

    pub async fn update_sector(&self, id: uuid::Uuid, patch: SectorPatch) -> EngineResult<Sector> {
        self.sectors.update_sector(id, patch).await
    }

    pub async fn create_agent(&self, description: &str, sector_id: Option<uuid::Uuid>, role_override: Option<Role>) -> EngineResult<Agent> {
        self.agents.create_agent(description, sector_id, role_override).await
    }

    pub async fn update_agent(&self, id: &str, patch: AgentPatch) -> EngineResult<Agent> {
        self.agents.update_agent(id, patch).await
    }

    pub async fn delete_agent(&self, id: &str) -> EngineResult<()> {
        self.agents.delete_agent(id).await
    }

    pub async fn tick_sector(&self, id: uuid::Uuid) -> EngineResult<TickOutcome> {
        self.ticker.tick_sector(id).await
    }

    pub async fn start_discussion(&self, sector_id: uuid::Uuid, title: String, agent_ids: Option<Vec<String>>) -> EngineResult<DiscussionRoom> {
        self.discussions.start_discussion(sector_id, title, agent_ids).await
    }

    pub async fn add_discussion_message(&self, discussion_id: uuid::Uuid, agent_id: &str, content: &str, role: &str) -> EngineResult<DiscussionRoom> {
        self.discussions.add_discussion_message(discussion_id, agent_id, content, role).await
    }

    pub async fn produce_decision(&self, discussion_id: uuid::Uuid) -> EngineResult<DiscussionRoom> {
        self.discussions.produce_decision(discussion_id).await
    }

    pub async fn close_discussion(&self, discussion_id: uuid::Uuid) -> EngineResult<DiscussionRoom> {
        self.discussions.close_discussion(discussion_id).await
    }

    pub async fn archive_discussion(&self, discussion_id: uuid::Uuid) -> EngineResult<DiscussionRoom> {
        self.discussions.archive_discussion(discussion_id).await
    }

    pub async fn delete_discussion(&self, discussion_id: uuid::Uuid) -> EngineResult<()> {
        self.discussions.delete_discussion(discussion_id).await
    }

    pub fn comms(&self) -> Arc<CommsBus> {
        self.comms.clone()
    }

    pub fn store(&self) -> Arc<PersistenceStore> {
        self.store.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::oracle::RuleBasedOracle;

    #[tokio::test]
    async fn start_and_stop_drivers_without_panicking() {
        let dir = std::env::temp_dir().join(format!("orchestrator_test_{}", uuid::Uuid::new_v4()));
        let mut config = EngineConfig::default();
        config.storage_dir = dir.to_string_lossy().to_string();
        config.tick_interval = std::time::Duration::from_millis(10);
        config.lifecycle_interval = std::time::Duration::from_millis(10);
        config.watchdog_interval = std::time::Duration::from_millis(10);

        let orchestrator = Arc::new(SystemOrchestrator::new(config, Arc::new(RuleBasedOracle)));
        orchestrator.start();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn mode_defaults_to_simulation_and_is_settable() {
        let dir = std::env::temp_dir().join(format!("orchestrator_mode_test_{}", uuid::Uuid::new_v4()));
        let mut config = EngineConfig::default();
        config.storage_dir = dir.to_string_lossy().to_string();
        let orchestrator = SystemOrchestrator::new(config, Arc::new(RuleBasedOracle));
        assert_eq!(orchestrator.get_system_mode(), SystemMode::Simulation);
        orchestrator.set_system_mode(SystemMode::Realtime);
        assert_eq!(orchestrator.get_system_mode(), SystemMode::Realtime);
    }
}
