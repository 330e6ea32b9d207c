//! Black-box coverage of the event pipeline through `EventProcessor`'s
//! public API only: dedup, cross-monitor dedup by source URL, and
//! actionable-mention task creation.

use std::sync::Arc;

use chrono::Utc;
use monitor_ai::{ProviderRouter, TriageClient};
use monitor_core::{
    AdapterEvent, ConnectionId, ContextData, EventData, Monitor, MonitorId, MonitorStatus,
    OrganizationId, ProviderConfig, QueueId,
};
use monitor_processor::{EventProcessor, ProcessOutcome};
use monitor_storage::{SqliteStorage, Storage};

fn slack_mention_monitor(org: OrganizationId, queue_id: QueueId) -> Monitor {
    Monitor {
        id: MonitorId::new(),
        organization_id: org,
        connection_id: ConnectionId::new(),
        provider_config: ProviderConfig::Slack {
            channel_ids: vec![],
            workspace_wide: false,
            tagged_user_ids: vec![],
            keywords: vec![],
            context_messages: 0,
            my_mentions: true,
        },
        queue_id: Some(queue_id),
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

fn mention_event(provider_event_id: &str, text: &str, permalink: &str) -> AdapterEvent {
    AdapterEvent {
        provider_event_id: provider_event_id.to_string(),
        event_type: "message".to_string(),
        event_data: EventData {
            text: Some(text.to_string()),
            channel_id: Some("C1".to_string()),
            user: Some("U1".to_string()),
            ts: Some("100.1".to_string()),
            permalink: Some(permalink.to_string()),
            ..Default::default()
        },
        context_data: ContextData::default(),
        provider_timestamp: Utc::now(),
    }
}

fn processor(storage: Arc<dyn Storage>) -> EventProcessor {
    EventProcessor::new(storage, TriageClient::new(ProviderRouter::new(vec![])))
}

/// §8 scenario: a Slack `app_mention` that reads as actionable becomes a
/// queued task on the first processing pass.
#[tokio::test]
async fn actionable_slack_mention_creates_a_task() {
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let monitor = slack_mention_monitor(OrganizationId::new(), QueueId::new());
    let event = mention_event("C1:100.1", "please deploy the hotfix today", "https://slack.com/archives/C1/p1");

    let outcome = processor(storage).process(&monitor, event).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::TaskCreated { .. }));
}

/// §8 scenario: the same provider event reappearing on a later poll (e.g.
/// re-surfaced by a watermark overshoot) must not create a second task.
#[tokio::test]
async fn reprocessing_the_same_event_is_a_duplicate() {
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let monitor = slack_mention_monitor(OrganizationId::new(), QueueId::new());
    let proc = processor(storage);

    let first = proc
        .process(&monitor, mention_event("C1:100.1", "please deploy the hotfix today", "https://slack.com/archives/C1/p1"))
        .await
        .unwrap();
    assert!(matches!(first, ProcessOutcome::TaskCreated { .. }));

    let second = proc
        .process(&monitor, mention_event("C1:100.1", "please deploy the hotfix today", "https://slack.com/archives/C1/p1"))
        .await
        .unwrap();
    assert_eq!(second, ProcessOutcome::Duplicate);
}

/// §8 scenario: two different monitors (e.g. a channel monitor and a
/// mentions monitor) both surface the same underlying Slack message. The
/// second monitor to process it must not create a duplicate task, because
/// dedup on `source_url` is scoped to the organization, not the monitor.
#[tokio::test]
async fn two_monitors_surfacing_the_same_message_dedup_by_source_url() {
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let org = OrganizationId::new();
    let monitor_a = slack_mention_monitor(org.clone(), QueueId::new());
    let monitor_b = slack_mention_monitor(org, QueueId::new());
    let permalink = "https://slack.com/archives/C1/p1";

    let proc = processor(storage);
    let via_a = proc
        .process(&monitor_a, mention_event("C1:100.1", "please deploy the hotfix today", permalink))
        .await
        .unwrap();
    assert!(matches!(via_a, ProcessOutcome::TaskCreated { .. }));

    // Different monitor, different provider_event_id (so it is not caught by
    // the monitor-scoped dedup index), same underlying message permalink.
    let via_b = proc
        .process(&monitor_b, mention_event("C2:200.1", "please deploy the hotfix today", permalink))
        .await
        .unwrap();
    assert_eq!(via_b, ProcessOutcome::Dropped("duplicate source_url".to_string()));
}

/// A message that doesn't read as actionable is recorded (for dedup) but
/// never becomes a task.
#[tokio::test]
async fn non_actionable_mention_is_dropped_without_a_task() {
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let monitor = slack_mention_monitor(OrganizationId::new(), QueueId::new());
    let event = mention_event("C1:100.1", "thanks!", "https://slack.com/archives/C1/p1");

    let outcome = processor(storage).process(&monitor, event).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Dropped("not actionable".to_string()));
}
