use std::sync::Arc;

use chrono::Utc;
use monitor_ai::TriageClient;
use monitor_core::{
    AdapterEvent, CommentDraft, Monitor, MonitorEventId, MonitorEventRecord, Provider,
    ProviderConfig, Result, TaskDraft, TaskStatus, DEFAULT_TASK_PRIORITY,
};
use monitor_storage::Storage;
use tracing::info;

use crate::context::context_text;
use crate::mechanical::{mechanical_description, mechanical_title};
use crate::sender::extract_sender_name;

const ACTIONABLE_CONTEXT_LINES: usize = 5;
const HANDLED_CONTEXT_LINES: usize = 20;
const COMMENT_THREAD_REPLIES: usize = 10;
const COMMENT_REPLY_CHAR_CAP: usize = 300;

/// What happened to a single `AdapterEvent` after running the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Duplicate,
    Dropped(String),
    TaskCreated { task_id: monitor_core::TaskId },
}

/// The deterministic per-event pipeline (dedup, optional triage, synthesis,
/// task creation, Slack context comment).
pub struct EventProcessor {
    storage: Arc<dyn Storage>,
    triage: TriageClient,
}

impl EventProcessor {
    pub fn new(storage: Arc<dyn Storage>, triage: TriageClient) -> Self {
        Self { storage, triage }
    }

    pub async fn process(&self, monitor: &Monitor, event: AdapterEvent) -> Result<ProcessOutcome> {
        if self
            .storage
            .lookup_event(&monitor.id, &event.provider_event_id)
            .await?
            .is_some()
        {
            return Ok(ProcessOutcome::Duplicate);
        }

        let record = MonitorEventRecord {
            id: MonitorEventId::new(),
            monitor_id: monitor.id.clone(),
            provider_event_id: event.provider_event_id.clone(),
            event_type: event.event_type.clone(),
            event_data: event.event_data.clone(),
            context_data: event.context_data.clone(),
            provider_timestamp: event.provider_timestamp,
            processed: false,
            task_id: None,
            created_at: Utc::now(),
        };
        let event_id = match self.storage.insert_event(record).await {
            Ok(id) => id,
            Err(monitor_core::MonitorError::DuplicateEvent) => return Ok(ProcessOutcome::Duplicate),
            Err(e) => return Err(e),
        };

        let provider = monitor.provider();
        let my_mentions = matches!(
            &monitor.provider_config,
            ProviderConfig::Slack { my_mentions: true, .. }
        );

        let text = event.event_data.text.clone().unwrap_or_default();
        let sender = extract_sender_name(&event.event_data);

        if provider == Provider::Slack && my_mentions {
            let actionable_ctx = context_text(&event.context_data, ACTIONABLE_CONTEXT_LINES);
            if !self.triage.is_actionable(&text, actionable_ctx.as_deref()).await {
                info!(monitor_id = %monitor.id, event_id = %event_id, "dropped: not actionable");
                return Ok(ProcessOutcome::Dropped("not actionable".into()));
            }
            let handled_ctx = context_text(&event.context_data, HANDLED_CONTEXT_LINES);
            if let Some(ctx) = &handled_ctx {
                if self.triage.is_already_handled(&text, ctx).await {
                    info!(monitor_id = %monitor.id, event_id = %event_id, "dropped: already handled");
                    return Ok(ProcessOutcome::Dropped("already handled".into()));
                }
            }

            let _ = self.triage.is_urgent(&text, handled_ctx.as_deref()).await;

            let (title, description) = synthesize_with_ai(
                &self.triage,
                &text,
                handled_ctx.as_deref(),
                sender.as_deref(),
            )
            .await;

            self.finish(monitor, event, event_id, title, description).await
        } else {
            let title = mechanical_title(provider, &event.event_data);
            let description = mechanical_description(sender.as_deref(), &event.event_data);
            self.finish(monitor, event, event_id, title, description).await
        }
    }

    async fn finish(
        &self,
        monitor: &Monitor,
        event: AdapterEvent,
        event_id: MonitorEventId,
        title: String,
        description: String,
    ) -> Result<ProcessOutcome> {
        let source_url = event.event_data.permalink.clone();
        if let Some(url) = &source_url {
            if self.storage.find_task(&monitor.organization_id, url).await?.is_some() {
                return Ok(ProcessOutcome::Dropped("duplicate source_url".into()));
            }
        }

        let queue_id = match &monitor.queue_id {
            Some(q) => Some(q.clone()),
            None => self.storage.find_inbox_queue(&monitor.organization_id).await?,
        };
        let Some(queue_id) = queue_id else {
            return Ok(ProcessOutcome::Dropped("no queue available".into()));
        };

        let mut input_data = monitor.input_data_template.clone();
        input_data.insert(
            "_monitor_event".to_string(),
            serde_json::json!({
                "event_id": event_id.to_string(),
                "event_type": event.event_type,
                "event_data": event.event_data,
                "context_data": event.context_data,
                "provider_timestamp": event.provider_timestamp,
            }),
        );

        let task = TaskDraft {
            organization_id: monitor.organization_id.clone(),
            title,
            description,
            queue_id,
            project_id: monitor.project_id.clone(),
            status: TaskStatus::Queued,
            priority: DEFAULT_TASK_PRIORITY,
            source_monitor_id: monitor.id.clone(),
            source_playbook_id: monitor.playbook_id.clone(),
            source_url,
            input_data,
        };
        let task_id = self.storage.insert_task(task).await?;
        self.storage
            .mark_event_processed(&event_id, Some(task_id.clone()))
            .await?;

        if monitor.provider() == Provider::Slack {
            self.post_context_comment(&task_id, &event).await?;
        }

        Ok(ProcessOutcome::TaskCreated { task_id })
    }

    async fn post_context_comment(&self, task_id: &monitor_core::TaskId, event: &AdapterEvent) -> Result<()> {
        let ts = event.event_data.ts.as_deref().unwrap_or("unknown");
        let text = event.event_data.text.as_deref().unwrap_or("");
        let mut content = format!("> {text}\n— {ts}");

        for reply in event.context_data.thread.iter().take(COMMENT_THREAD_REPLIES) {
            let who = reply.user_name.as_deref().or(reply.user.as_deref()).unwrap_or("unknown");
            let capped: String = reply.text.chars().take(COMMENT_REPLY_CHAR_CAP).collect();
            content.push_str(&format!("\n\n{who}: {capped}"));
        }

        if let Some(permalink) = &event.event_data.permalink {
            content.push_str(&format!("\n\n{permalink}"));
        }

        self.storage
            .insert_comment(CommentDraft {
                task_id: task_id.clone(),
                user_id: "system".to_string(),
                user_name: "Slack Monitor".to_string(),
                content,
            })
            .await?;
        Ok(())
    }
}

async fn synthesize_with_ai(
    triage: &TriageClient,
    text: &str,
    context: Option<&str>,
    sender: Option<&str>,
) -> (String, String) {
    let title = triage.generate_title(text, context, sender, None).await;
    let description = triage.generate_description(text, context, sender).await;
    (title, description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_ai::ProviderRouter;
    use monitor_core::{ContextData, EventData, MonitorId, OrganizationId, QueueId};
    use monitor_storage::SqliteStorage;

    fn sample_monitor(queue_id: Option<QueueId>) -> Monitor {
        Monitor {
            id: MonitorId::new(),
            organization_id: OrganizationId::new(),
            connection_id: monitor_core::ConnectionId::new(),
            provider_config: ProviderConfig::Slack {
                channel_ids: vec![],
                workspace_wide: false,
                tagged_user_ids: vec![],
                keywords: vec![],
                context_messages: 0,
                my_mentions: true,
            },
            queue_id,
            project_id: None,
            playbook_id: None,
            poll_interval_seconds: 60,
            poll_cursor: None,
            status: monitor_core::MonitorStatus::Active,
            last_polled_at: None,
            last_event_at: None,
            last_error: None,
            events_detected: 0,
            tasks_created: 0,
            input_data_template: serde_json::Map::new(),
            deleted_at: None,
        }
    }

    fn sample_event(text: &str) -> AdapterEvent {
        AdapterEvent {
            provider_event_id: "C1:100.1".into(),
            event_type: "message".into(),
            event_data: EventData {
                text: Some(text.to_string()),
                channel_id: Some("C1".into()),
                user: Some("U1".into()),
                ts: Some("100.1".into()),
                permalink: Some("https://slack.com/archives/C1/p1".into()),
                ..Default::default()
            },
            context_data: ContextData::default(),
            provider_timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn drops_non_actionable_message_without_creating_task() {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let processor = EventProcessor::new(storage, TriageClient::new(ProviderRouter::new(vec![])));
        let monitor = sample_monitor(Some(QueueId::new()));

        let outcome = processor.process(&monitor, sample_event("thanks!")).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Dropped("not actionable".into()));
    }

    #[tokio::test]
    async fn creates_task_for_actionable_message() {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let processor = EventProcessor::new(storage, TriageClient::new(ProviderRouter::new(vec![])));
        let monitor = sample_monitor(Some(QueueId::new()));

        let outcome = processor
            .process(&monitor, sample_event("please review this PR"))
            .await
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::TaskCreated { .. }));
    }

    #[tokio::test]
    async fn second_poll_of_same_event_is_duplicate() {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let processor = EventProcessor::new(storage, TriageClient::new(ProviderRouter::new(vec![])));
        let monitor = sample_monitor(Some(QueueId::new()));

        processor.process(&monitor, sample_event("please review this PR")).await.unwrap();
        let second = processor
            .process(&monitor, sample_event("please review this PR"))
            .await
            .unwrap();
        assert_eq!(second, ProcessOutcome::Duplicate);
    }

    #[tokio::test]
    async fn drops_when_no_queue_available() {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let processor = EventProcessor::new(storage, TriageClient::new(ProviderRouter::new(vec![])));
        let monitor = sample_monitor(None);

        let outcome = processor
            .process(&monitor, sample_event("please review this PR"))
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Dropped("no queue available".into()));
    }
}
