use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashSet;
use monitor_adapters::PollWindow;
use monitor_core::config::EngineConfig;
use monitor_core::{
    Connection, Monitor, MonitorError, MonitorId, MonitorStatus, OrganizationId, Provider, Result,
};
use monitor_processor::EventProcessor;
use monitor_storage::{Decryptor, MonitorUpdate, Storage};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::adapter_factory::build_adapter;

/// Outcome of fanning one inbound webhook payload out to every matching
/// monitor. A per-monitor failure is recorded in `errors` rather than
/// aborting the rest of the batch.
#[derive(Debug, Clone, Default)]
pub struct WebhookDispatchResult {
    pub monitors_matched: u32,
    pub events_processed: u32,
    pub errors: Vec<String>,
}

/// Drives the scheduling + poll loop (C3). Owns no monitor state of its
/// own beyond the in-flight set — monitors, cursors, and counters all live
/// in `Storage`.
pub struct MonitorEngine {
    storage: Arc<dyn Storage>,
    decryptor: Arc<dyn Decryptor>,
    processor: Arc<EventProcessor>,
    config: EngineConfig,
    in_flight: Arc<DashSet<MonitorId>>,
}

impl MonitorEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        decryptor: Arc<dyn Decryptor>,
        processor: Arc<EventProcessor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            storage,
            decryptor,
            processor,
            config,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Main event loop: ticks at `tick_interval_secs`, dispatching every due
    /// monitor to its own task, honoring the worker-pool cap via a semaphore.
    /// On shutdown, stops picking up new ticks but drains every in-flight
    /// monitor task to completion before returning — a cancellation signal
    /// finishes in-flight work rather than killing it mid-poll (§5).
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("monitor engine started");
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.worker_count));
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs));
        let mut in_flight_tasks = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.clone().dispatch_due_monitors(semaphore.clone(), &mut in_flight_tasks).await {
                        error!("tick dispatch failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("monitor engine shutting down, draining in-flight polls");
                        break;
                    }
                }
            }
        }

        while in_flight_tasks.join_next().await.is_some() {}
        info!("monitor engine drained, exiting");
    }

    async fn dispatch_due_monitors(
        self: Arc<Self>,
        semaphore: Arc<tokio::sync::Semaphore>,
        in_flight_tasks: &mut tokio::task::JoinSet<()>,
    ) -> Result<()> {
        let now = Utc::now();
        let due = self.storage.find_due_monitors(now, None).await?;
        for monitor in due {
            if !self.in_flight.insert(monitor.id.clone()) {
                continue;
            }
            let engine = self.clone();
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore closed");
            in_flight_tasks.spawn(async move {
                let _permit = permit;
                let monitor_id = monitor.id.clone();
                let budget = Duration::from_secs(engine.config.monitor_time_budget_secs);
                match tokio::time::timeout(budget, engine.poll_monitor(monitor, PollWindow::default())).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(monitor_id = %monitor_id, error = %e, "monitor poll failed"),
                    Err(_) => {
                        warn!(monitor_id = %monitor_id, "monitor poll exceeded time budget");
                        let _ = engine
                            .storage
                            .update_monitor(&monitor_id, MonitorUpdate::failure("poll timeout".to_string()))
                            .await;
                    }
                }
                engine.in_flight.remove(&monitor_id);
            });
        }
        Ok(())
    }

    /// Decrypts credentials, builds the adapter, polls, and routes every
    /// returned event through the processor (§4.3 steps 1-7).
    async fn poll_monitor(&self, monitor: Monitor, window: PollWindow) -> Result<()> {
        if monitor.status != MonitorStatus::Active {
            return Ok(());
        }

        let connection = match self.load_connection(&monitor).await {
            Ok(conn) => conn,
            Err(e) => {
                self.storage
                    .update_monitor(&monitor.id, MonitorUpdate::failure(e.to_string()))
                    .await?;
                return Ok(());
            }
        };

        let timeout = Duration::from_secs(self.config.adapter_timeout_secs);
        let mut adapter = match build_adapter(&monitor.provider_config, &connection, timeout) {
            Ok(a) => a,
            Err(e) => {
                self.storage
                    .update_monitor(&monitor.id, MonitorUpdate::failure(e.to_string()))
                    .await?;
                return Ok(());
            }
        };

        let poll_result = adapter.poll(monitor.poll_cursor.clone(), window).await;
        let (events, new_cursor) = match poll_result {
            Ok(result) => result,
            Err(e) => {
                self.storage
                    .update_monitor(&monitor.id, MonitorUpdate::failure(e.to_string()))
                    .await?;
                return Ok(());
            }
        };

        let mut events_detected = 0u64;
        let mut tasks_created = 0u64;
        for event in events {
            match self.processor.process(&monitor, event).await {
                Ok(monitor_processor::ProcessOutcome::TaskCreated { .. }) => {
                    events_detected += 1;
                    tasks_created += 1;
                }
                Ok(monitor_processor::ProcessOutcome::Dropped(_)) => {
                    events_detected += 1;
                }
                Ok(monitor_processor::ProcessOutcome::Duplicate) => {}
                Err(e) => {
                    warn!(monitor_id = %monitor.id, error = %e, "event processing failed");
                }
            }
        }

        let now = Utc::now();
        let cursor = if window.is_backfill() { None } else { Some(new_cursor) };
        let mut update = MonitorUpdate::success_empty(now, cursor);
        if events_detected > 0 {
            update.last_event_at = Some(now);
        }
        update.events_detected_delta = events_detected;
        update.tasks_created_delta = tasks_created;
        self.storage.update_monitor(&monitor.id, update).await?;
        Ok(())
    }

    /// Handles an inbound webhook payload (steps 2-5 only: no cursor/
    /// `last_polled_at` mutation).
    pub async fn handle_webhook(
        &self,
        monitor: &Monitor,
        payload: serde_json::Value,
        headers: &HashMap<String, String>,
    ) -> Result<usize> {
        let connection = self.load_connection(monitor).await?;
        let timeout = Duration::from_secs(self.config.adapter_timeout_secs);
        let mut adapter = build_adapter(&monitor.provider_config, &connection, timeout)?;
        let events = adapter.handle_webhook(payload, headers).await?;
        let mut processed = 0;
        for event in events {
            match self.processor.process(monitor, event).await {
                Ok(_) => processed += 1,
                Err(e) => warn!(monitor_id = %monitor.id, error = %e, "webhook event processing failed"),
            }
        }
        Ok(processed)
    }

    /// Generic `POST /webhooks/{provider}` fan-out: every active monitor for
    /// `provider` gets the same payload, one monitor's failure does not
    /// block the rest.
    pub async fn dispatch_webhook(
        &self,
        provider: Provider,
        org: Option<&OrganizationId>,
        payload: serde_json::Value,
        headers: &HashMap<String, String>,
    ) -> Result<WebhookDispatchResult> {
        let mut result = WebhookDispatchResult::default();
        let candidates = self.storage.list_active_monitors(org).await?;
        for monitor in candidates {
            if monitor.provider_config.provider() != provider {
                continue;
            }
            result.monitors_matched += 1;
            match self.handle_webhook(&monitor, payload.clone(), headers).await {
                Ok(n) => result.events_processed += n as u32,
                Err(e) => {
                    warn!(monitor_id = %monitor.id, error = %e, "webhook dispatch failed for monitor");
                    result.errors.push(e.to_string());
                }
            }
        }
        Ok(result)
    }

    /// `POST /webhooks/slack` fan-out for `app_mention`/`message` events:
    /// every active Slack monitor with `my_mentions = true` whose
    /// connection's bot user is named in the mention text receives the
    /// payload. Other Slack event types are ignored here (they arrive via
    /// polling, not this webhook).
    pub async fn dispatch_slack_webhook(
        &self,
        org: Option<&OrganizationId>,
        payload: serde_json::Value,
        headers: &HashMap<String, String>,
    ) -> Result<WebhookDispatchResult> {
        let mut result = WebhookDispatchResult::default();
        let event = payload.get("event").cloned().unwrap_or_default();
        let event_type = event.get("type").and_then(|v| v.as_str()).unwrap_or("");
        if event_type != "app_mention" && event_type != "message" {
            return Ok(result);
        }
        let text = event.get("text").and_then(|v| v.as_str()).unwrap_or("");

        let candidates = self.storage.list_active_monitors(org).await?;
        for monitor in candidates {
            let my_mentions = matches!(
                &monitor.provider_config,
                monitor_core::ProviderConfig::Slack { my_mentions: true, .. }
            );
            if !my_mentions {
                continue;
            }
            let connection = match self.load_connection(&monitor).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(monitor_id = %monitor.id, error = %e, "no connection for webhook monitor");
                    continue;
                }
            };
            if event_type == "app_mention" {
                let Some(user_id) = connection.provider_user_id.as_deref() else {
                    continue;
                };
                if !text.contains(&format!("<@{user_id}>")) {
                    continue;
                }
            }

            result.monitors_matched += 1;
            match self.handle_webhook(&monitor, payload.clone(), headers).await {
                Ok(n) => result.events_processed += n as u32,
                Err(e) => {
                    warn!(monitor_id = %monitor.id, error = %e, "slack webhook dispatch failed for monitor");
                    result.errors.push(e.to_string());
                }
            }
        }
        Ok(result)
    }

    /// Finds every active Slack monitor with `my_mentions = true` whose
    /// connection's `provider_user_id` matches `mentioned_user_id`, for
    /// admin-facing lookups ("which monitors would catch a mention of this
    /// user").
    pub async fn monitors_mentioning(
        &self,
        org: Option<&OrganizationId>,
        mentioned_user_id: &str,
    ) -> Result<Vec<Monitor>> {
        let candidates = self.storage.list_active_monitors(org).await?;
        let mut matches = Vec::new();
        for monitor in candidates {
            let my_mentions = matches!(
                &monitor.provider_config,
                monitor_core::ProviderConfig::Slack { my_mentions: true, .. }
            );
            if !my_mentions {
                continue;
            }
            if let Ok(connection) = self.load_connection(&monitor).await {
                if connection.provider_user_id.as_deref() == Some(mentioned_user_id) {
                    matches.push(monitor);
                }
            }
        }
        Ok(matches)
    }

    /// Decrypts a connection's credentials (§4.3 step 2). Builds the adapter
    /// side of §1's "decrypt(token)" primitive for an admin API validating a
    /// monitor's config before save.
    pub async fn validate(&self, monitor: &Monitor) -> Result<()> {
        let connection = self.load_connection(monitor).await?;
        let timeout = Duration::from_secs(self.config.adapter_timeout_secs);
        let adapter = build_adapter(&monitor.provider_config, &connection, timeout)?;
        adapter.validate_config().await
    }

    async fn load_connection(&self, monitor: &Monitor) -> Result<Connection> {
        let encrypted = self
            .storage
            .find_connection(&monitor.connection_id)
            .await?
            .ok_or_else(|| MonitorError::ConnectionUnavailable("connection not found".to_string()))?;

        let access_token = self.decryptor.decrypt(&encrypted.access_token_ciphertext)?;
        let refresh_token = encrypted
            .refresh_token_ciphertext
            .as_deref()
            .map(|c| self.decryptor.decrypt(c))
            .transpose()?;

        Ok(Connection {
            id: encrypted.id,
            access_token,
            refresh_token,
            provider_user_id: encrypted.provider_user_id,
            scopes: encrypted.scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_ai::{ProviderRouter, TriageClient};
    use monitor_core::{MonitorId, OrganizationId, ProviderConfig};
    use monitor_storage::{EncryptedConnection, PlaintextDecryptor, SqliteStorage};

    fn test_engine() -> (Arc<MonitorEngine>, Arc<SqliteStorage>) {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let processor = Arc::new(EventProcessor::new(
            storage.clone(),
            TriageClient::new(ProviderRouter::new(vec![])),
        ));
        let engine = Arc::new(MonitorEngine::new(
            storage.clone(),
            Arc::new(PlaintextDecryptor),
            processor,
            EngineConfig::default(),
        ));
        (engine, storage)
    }

    fn sample_monitor(connection_id: monitor_core::ConnectionId, my_mentions: bool) -> Monitor {
        Monitor {
            id: MonitorId::new(),
            organization_id: OrganizationId::new(),
            connection_id,
            provider_config: ProviderConfig::Slack {
                channel_ids: vec![],
                workspace_wide: false,
                tagged_user_ids: vec![],
                keywords: vec![],
                context_messages: 0,
                my_mentions,
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

    #[tokio::test]
    async fn load_connection_fails_when_missing() {
        let (engine, _storage) = test_engine();
        let monitor = sample_monitor(monitor_core::ConnectionId::new(), false);
        let err = engine.load_connection(&monitor).await.unwrap_err();
        assert!(matches!(err, MonitorError::ConnectionUnavailable(_)));
    }

    #[tokio::test]
    async fn load_connection_decrypts_via_plaintext_decryptor() {
        let (engine, storage) = test_engine();
        let connection_id = monitor_core::ConnectionId::new();
        storage
            .insert_connection(&EncryptedConnection {
                id: connection_id.clone(),
                access_token_ciphertext: "token-123".to_string(),
                refresh_token_ciphertext: None,
                provider_user_id: Some("U1".to_string()),
                scopes: vec!["channels:history".to_string()],
            })
            .unwrap();
        let monitor = sample_monitor(connection_id, true);

        let connection = engine.load_connection(&monitor).await.unwrap();
        assert_eq!(connection.access_token, "token-123");
        assert_eq!(connection.provider_user_id.as_deref(), Some("U1"));
    }

    #[tokio::test]
    async fn monitors_mentioning_filters_by_provider_user_id() {
        let (engine, storage) = test_engine();
        let connection_id = monitor_core::ConnectionId::new();
        storage
            .insert_connection(&EncryptedConnection {
                id: connection_id.clone(),
                access_token_ciphertext: "token".to_string(),
                refresh_token_ciphertext: None,
                provider_user_id: Some("U1".to_string()),
                scopes: vec![],
            })
            .unwrap();
        let monitor = sample_monitor(connection_id, true);
        let org = monitor.organization_id.clone();
        storage.insert_monitor(&monitor).unwrap();

        let matches = engine.monitors_mentioning(Some(&org), "U1").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, monitor.id);

        let none = engine.monitors_mentioning(Some(&org), "U2").await.unwrap();
        assert!(none.is_empty());
    }
}
