use sector_engine::application::agent_registry::AgentRegistry;
use sector_engine::application::comms_bus::CommsBus;
use sector_engine::application::discussion_engine::DiscussionEngine;
use sector_engine::application::manager_controller::ManagerController;
use sector_engine::application::sector_registry::SectorRegistry;
use sector_engine::application::sector_ticker::SectorTicker;
use sector_engine::application::voting_engine::VotingEngine;
use sector_engine::application::watchdog::DiscussionWatchdog;
use sector_engine::domain::agent::Role;
use sector_engine::domain::discussion::DiscussionStatus;
use sector_engine::domain::errors::EngineError;
use sector_engine::domain::signal::{Action, AgentSignal};
use sector_engine::infrastructure::oracle::{NullOracle, OracleClient};
use sector_engine::infrastructure::persistence::PersistenceStore;
use std::sync::Arc;
use std::time::Duration;

fn temp_store() -> Arc<PersistenceStore> {
    let dir = std::env::temp_dir().join(format!("e2e_scenario_{}", uuid::Uuid::new_v4()));
    Arc::new(PersistenceStore::new(dir))
}

fn signal(agent_id: &str, action: Action, confidence: f64, win_rate: f64) -> AgentSignal {
    AgentSignal {
        agent_id: agent_id.to_string(),
        action,
        confidence,
        symbol: "ACME".to_string(),
        allocation_percent: 10.0,
        reasoning: "scenario fixture".to_string(),
        win_rate,
    }
}

/// Scenario 1: unanimous BUY.
#[test]
fn unanimous_buy_resolves_with_zero_conflict() {
    let engine = VotingEngine::new(0.5);
    let signals = vec![
        signal("a1", Action::Buy, 0.8, 0.6),
        signal("a2", Action::Buy, 0.8, 0.6),
        signal("a3", Action::Buy, 0.8, 0.6),
    ];
    let decision = engine.decide(&signals);
    assert_eq!(decision.action, Action::Buy);
    assert!((decision.confidence - 0.8).abs() < 1e-6);
    assert_eq!(decision.conflict_score, 0.0);
    assert_eq!(decision.selected_agent.as_deref(), Some("a1"));
}

/// Scenario 2: high conflict, tied tally, resolved by higher-average-win-rate
/// cluster. The spec's worked conflict_score value depends on an ambiguous
/// sum-vs-mean reading (see DESIGN.md); this asserts only the unambiguous
/// claims: winning action and conflict_score above the threshold.
#[test]
fn high_conflict_resolves_to_buy_cluster() {
    let engine = VotingEngine::new(0.5);
    let signals = vec![
        signal("a1", Action::Buy, 0.9, 0.8),
        signal("a2", Action::Buy, 0.9, 0.8),
        signal("a3", Action::Sell, 0.85, 0.2),
        signal("a4", Action::Sell, 0.85, 0.2),
    ];
    let decision = engine.decide(&signals);
    assert_eq!(decision.action, Action::Buy);
    assert!(decision.conflict_score >= 0.5);
}

/// Scenario 3: readiness triggers a discussion; a subsequent tick finds the
/// existing non-terminal discussion rather than creating a second one.
#[tokio::test]
async fn readiness_triggers_discussion_and_is_idempotent_on_next_tick() {
    let store = temp_store();
    let oracle = Arc::new(OracleClient::new(Arc::new(NullOracle), Duration::from_millis(20), 0));
    let agents = Arc::new(AgentRegistry::new(store.clone(), oracle.clone(), 200, 12));
    let sectors = Arc::new(SectorRegistry::new(store.clone()));
    let discussions = Arc::new(DiscussionEngine::new(store.clone(), agents.clone(), sectors.clone(), oracle, 0.5, 1));
    let comms = Arc::new(CommsBus::new(store.clone()));
    let manager = Arc::new(ManagerController::new(discussions.clone(), comms, Duration::from_secs(60)));
    let ticker = SectorTicker::new(store.clone(), agents.clone(), sectors.clone(), manager, 65.0);

    let sector = sectors.create_sector("Energy".to_string(), None).await.unwrap();
    for confidence in [70.0, 66.0, 80.0] {
        let agent = agents.create_agent("trader", Some(sector.id), Some(Role::Trader)).await.unwrap();
        agents
            .update_agent(
                &agent.id,
                sector_engine::application::agent_registry::AgentPatch {
                    confidence: Some(confidence),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let first_outcome = ticker.tick_sector(sector.id).await.unwrap();
    assert!(first_outcome.discussion_ready);
    let open_rooms_after_first = discussions.list_open_in_progress().await.unwrap();
    assert_eq!(open_rooms_after_first.len(), 1);

    let second_outcome = ticker.tick_sector(sector.id).await.unwrap();
    assert!(second_outcome.discussion_ready);
    let open_rooms_after_second = discussions.list_open_in_progress().await.unwrap();
    assert_eq!(open_rooms_after_second.len(), 1);
    assert_eq!(open_rooms_after_first[0].id, open_rooms_after_second[0].id);
}

/// Scenario 4: oracle outage, collectArguments falls back to
/// generateAgentSignal, and produceDecision still terminates with a
/// DECIDED room.
#[tokio::test]
async fn oracle_outage_still_reaches_a_decision() {
    let store = temp_store();
    let oracle = Arc::new(OracleClient::new(Arc::new(NullOracle), Duration::from_millis(20), 0));
    let agents = Arc::new(AgentRegistry::new(store.clone(), oracle.clone(), 200, 12));
    let sectors = Arc::new(SectorRegistry::new(store.clone()));
    let discussions = DiscussionEngine::new(store, agents.clone(), sectors.clone(), oracle, 0.5, 0);

    let sector = sectors.create_sector("Metals".to_string(), None).await.unwrap();
    let agent = agents.create_agent("analyst", Some(sector.id), Some(Role::Analyst)).await.unwrap();

    let room = discussions
        .start_discussion(sector.id, "Outlook".to_string(), Some(vec![agent.id.clone()]))
        .await
        .unwrap();
    assert_eq!(room.status, DiscussionStatus::Created);

    let decided = discussions.produce_decision(room.id).await.unwrap();
    assert_eq!(decided.status, DiscussionStatus::Decided);
    assert!(decided.final_decision.is_some());
}

/// Scenario 5: watchdog force-resolves a room stalled past STALL_THRESHOLD
/// with no messages, producing HOLD/confidence 0/conflict_score 1.0 and a
/// "stalled" close reason.
#[tokio::test]
async fn watchdog_force_resolves_a_stalled_room() {
    let store = temp_store();
    let oracle = Arc::new(OracleClient::new(Arc::new(NullOracle), Duration::from_millis(20), 0));
    let agents = Arc::new(AgentRegistry::new(store.clone(), oracle.clone(), 200, 12));
    let sectors = Arc::new(SectorRegistry::new(store.clone()));
    let discussions = Arc::new(DiscussionEngine::new(store, agents, sectors.clone(), oracle, 0.5, 0));
    let watchdog = DiscussionWatchdog::new(discussions.clone(), Duration::from_millis(0), Duration::from_secs(3600));

    let sector = sectors.create_sector("Agriculture".to_string(), None).await.unwrap();
    let room = discussions
        .start_discussion(sector.id, "Outlook".to_string(), Some(vec![]))
        .await
        .unwrap();
    assert_eq!(room.status, DiscussionStatus::Created);

    watchdog.sweep().await.unwrap();

    let resolved = discussions.get_room(room.id).await.unwrap();
    assert_eq!(resolved.status, DiscussionStatus::Closed);
    let decision = resolved.final_decision.unwrap();
    assert_eq!(decision.action, Action::Hold);
    assert_eq!(decision.confidence, 0.0);
    assert_eq!(decision.conflict_score, 1.0);
}

/// Scenario 6: two concurrent createAgent calls against a sector already at
/// MAX_AGENTS_PER_SECTOR - 1. Exactly one succeeds, the other fails with
/// CapacityExceeded, and the final count equals MAX_AGENTS_PER_SECTOR with
/// no duplicate ids.
#[tokio::test]
async fn concurrent_create_agent_at_capacity_admits_exactly_one() {
    let store = temp_store();
    let oracle = Arc::new(OracleClient::new(Arc::new(NullOracle), Duration::from_millis(20), 0));
    let max_per_sector = 3;
    let agents = Arc::new(AgentRegistry::new(store.clone(), oracle, 200, max_per_sector));
    let sectors = Arc::new(SectorRegistry::new(store.clone()));
    let sector = sectors.create_sector("Tech".to_string(), None).await.unwrap();

    for _ in 0..max_per_sector - 1 {
        agents.create_agent("filler", Some(sector.id), Some(Role::Trader)).await.unwrap();
    }

    let agents_a = agents.clone();
    let agents_b = agents.clone();
    let sector_id = sector.id;
    let (result_a, result_b) = tokio::join!(
        agents_a.create_agent("racer-a", Some(sector_id), Some(Role::Trader)),
        agents_b.create_agent("racer-b", Some(sector_id), Some(Role::Trader)),
    );

    let successes = [&result_a, &result_b].into_iter().filter(|r| r.is_ok()).count();
    let failures = [&result_a, &result_b].into_iter().filter(|r| r.is_err()).count();
    assert_eq!(successes, 1, "exactly one of the two concurrent creates should succeed");
    assert_eq!(failures, 1);

    let failed = if result_a.is_err() { result_a } else { result_b };
    assert!(matches!(failed.unwrap_err(), EngineError::CapacityExceeded(_)));

    let roster = agents.list_for_sector(sector_id).await.unwrap();
    assert_eq!(roster.len(), max_per_sector);
    let unique_ids: std::collections::HashSet<_> = roster.iter().map(|a| a.id.clone()).collect();
    assert_eq!(unique_ids.len(), max_per_sector);
}
