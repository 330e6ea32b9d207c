//! Black-box coverage of the scheduling loop: due-monitor dispatch, poll
//! failure handling, and graceful shutdown draining, exercised only through
//! `MonitorEngine`'s public API (no access to its private `poll_monitor`).

use std::sync::Arc;
use std::time::Duration;

use monitor_ai::{ProviderRouter, TriageClient};
use monitor_core::config::EngineConfig;
use monitor_core::{ConnectionId, Monitor, MonitorId, MonitorStatus, OrganizationId, ProviderConfig};
use monitor_engine::MonitorEngine;
use monitor_processor::EventProcessor;
use monitor_storage::{PlaintextDecryptor, SqliteStorage, Storage};
use tokio::sync::watch;

fn due_monitor_with_missing_connection() -> Monitor {
    Monitor {
        id: MonitorId::new(),
        organization_id: OrganizationId::new(),
        connection_id: ConnectionId::new(),
        provider_config: ProviderConfig::Slack {
            channel_ids: vec!["C1".to_string()],
            workspace_wide: false,
            tagged_user_ids: vec![],
            keywords: vec![],
            context_messages: 0,
            my_mentions: false,
        },
        queue_id: None,
        project_id: None,
        playbook_id: None,
        poll_interval_seconds: 60,
        poll_cursor: None,
        status: MonitorStatus::Active,
        last_polled_at: None,
        last_event_at: None,
        last_error: None,
        events_detected: 0,
        tasks_created: 0,
        input_data_template: serde_json::Map::new(),
        deleted_at: None,
    }
}

/// A monitor whose connection row does not exist fails at `load_connection`,
/// before any adapter is built — so this exercises the poll-failure path
/// (§4.3 step 2) without making a network call.
#[tokio::test]
async fn run_marks_monitor_as_error_when_connection_is_missing() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let processor = Arc::new(EventProcessor::new(
        storage.clone(),
        TriageClient::new(ProviderRouter::new(vec![])),
    ));
    let mut config = EngineConfig::default();
    config.tick_interval_secs = 1;
    let engine = Arc::new(MonitorEngine::new(
        storage.clone(),
        Arc::new(PlaintextDecryptor),
        processor,
        config,
    ));

    let monitor = due_monitor_with_missing_connection();
    storage.insert_monitor(&monitor).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_handle = tokio::spawn(engine.clone().run(shutdown_rx));

    // Let one tick fire and dispatch the due monitor before signaling shutdown.
    tokio::time::sleep(Duration::from_millis(1300)).await;
    shutdown_tx.send(true).unwrap();

    // `run()` must not return until the in-flight poll has actually finished
    // updating storage — if it returned early (the pre-fix behavior), the
    // assertion below would be racing the background task.
    engine_handle.await.expect("engine task panicked");

    let updated = storage.find_monitor(&monitor.id, None).await.unwrap().unwrap();
    assert_eq!(updated.status, MonitorStatus::Error);
    assert!(updated.last_error.is_some());
}

/// A monitor that is `Paused` must never be dispatched, regardless of how
/// long `run()` ticks.
#[tokio::test]
async fn run_never_dispatches_paused_monitors() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let processor = Arc::new(EventProcessor::new(
        storage.clone(),
        TriageClient::new(ProviderRouter::new(vec![])),
    ));
    let mut config = EngineConfig::default();
    config.tick_interval_secs = 1;
    let engine = Arc::new(MonitorEngine::new(
        storage.clone(),
        Arc::new(PlaintextDecryptor),
        processor,
        config,
    ));

    let mut monitor = due_monitor_with_missing_connection();
    monitor.status = MonitorStatus::Paused;
    storage.insert_monitor(&monitor).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_handle = tokio::spawn(engine.clone().run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(1300)).await;
    shutdown_tx.send(true).unwrap();
    engine_handle.await.expect("engine task panicked");

    let unchanged = storage.find_monitor(&monitor.id, None).await.unwrap().unwrap();
    assert_eq!(unchanged.status, MonitorStatus::Paused);
    assert!(unchanged.last_error.is_none());
}
