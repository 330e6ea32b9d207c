use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

id_newtype!(OrganizationId);
id_newtype!(MonitorId);
id_newtype!(ConnectionId);
id_newtype!(QueueId);
id_newtype!(ProjectId);
id_newtype!(PlaybookId);
id_newtype!(TaskId);
id_newtype!(MonitorEventId);
id_newtype!(CommentId);

/// The upstream service a monitor polls. Extensible — new variants are
/// additive, the engine dispatches on this to pick an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Slack,
    Gmail,
    Outlook,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Slack => write!(f, "slack"),
            Provider::Gmail => write!(f, "gmail"),
            Provider::Outlook => write!(f, "outlook"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "slack" => Ok(Provider::Slack),
            "gmail" => Ok(Provider::Gmail),
            "outlook" => Ok(Provider::Outlook),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

impl Provider {
    /// Capitalized form used in mechanical task titles, e.g. "[Slack] ...".
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Slack => "Slack",
            Provider::Gmail => "Gmail",
            Provider::Outlook => "Outlook",
        }
    }
}

/// A monitor's pause/error/active lifecycle. `Error` always carries a
/// `last_error` on the owning `Monitor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Active,
    Paused,
    Error,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Active => write!(f, "active"),
            MonitorStatus::Paused => write!(f, "paused"),
            MonitorStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for MonitorStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(MonitorStatus::Active),
            "paused" => Ok(MonitorStatus::Paused),
            "error" => Ok(MonitorStatus::Error),
            other => Err(format!("unknown monitor status: {}", other)),
        }
    }
}

/// Provider-specific polling configuration (§6 `provider_config`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderConfig {
    Slack {
        #[serde(default)]
        channel_ids: Vec<String>,
        #[serde(default)]
        workspace_wide: bool,
        #[serde(default)]
        tagged_user_ids: Vec<String>,
        #[serde(default)]
        keywords: Vec<String>,
        #[serde(default)]
        context_messages: u32,
        #[serde(default)]
        my_mentions: bool,
    },
    Gmail {
        #[serde(default)]
        label_or_folder_ids: Vec<String>,
        #[serde(default)]
        from_filter: Vec<String>,
        #[serde(default)]
        keywords: Vec<String>,
        #[serde(default)]
        include_body: bool,
    },
    Outlook {
        #[serde(default)]
        label_or_folder_ids: Vec<String>,
        #[serde(default)]
        from_filter: Vec<String>,
        #[serde(default)]
        keywords: Vec<String>,
        #[serde(default)]
        include_body: bool,
    },
}

impl ProviderConfig {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderConfig::Slack { .. } => Provider::Slack,
            ProviderConfig::Gmail { .. } => Provider::Gmail,
            ProviderConfig::Outlook { .. } => Provider::Outlook,
        }
    }
}

/// Adapter-owned, engine-opaque position marker. The engine persists and
/// replays this blob but never inspects its contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Cursor {
    /// Slack `my_mentions` mode.
    LastSeenTs { last_seen_ts: String },
    /// Slack channel mode — one watermark per channel.
    ChannelWatermarks(HashMap<String, String>),
    /// Gmail/Outlook history or delta token.
    DeltaToken(String),
    Empty,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::Empty
    }
}

/// Credentials handed to an adapter after the storage port decrypts them.
/// Opaque to the core beyond these fields; refresh/ownership live outside.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub provider_user_id: Option<String>,
    pub scopes: Vec<String>,
}

/// A long-lived polling configuration binding one `Connection` to one queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: MonitorId,
    pub organization_id: OrganizationId,
    pub connection_id: ConnectionId,
    pub provider_config: ProviderConfig,
    pub queue_id: Option<QueueId>,
    pub project_id: Option<ProjectId>,
    pub playbook_id: Option<PlaybookId>,
    pub poll_interval_seconds: u32,
    pub poll_cursor: Option<Cursor>,
    pub status: MonitorStatus,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub events_detected: u64,
    pub tasks_created: u64,
    pub input_data_template: serde_json::Map<String, serde_json::Value>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Monitor {
    pub fn provider(&self) -> Provider {
        self.provider_config.provider()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Due-selection predicate from §4.3, evaluated against a caller-supplied
    /// `now` so tests can pin it.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.status != MonitorStatus::Active || self.is_deleted() {
            return false;
        }
        match self.last_polled_at {
            None => true,
            Some(last) => {
                let due_at = last + chrono::Duration::seconds(self.poll_interval_seconds as i64);
                due_at <= now
            }
        }
    }
}

/// One addressable piece of upstream conversational context (a reply, a
/// preceding/following message) captured alongside an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub user: Option<String>,
    pub user_name: Option<String>,
    pub text: String,
    pub ts: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextData {
    #[serde(default)]
    pub before: Vec<ContextMessage>,
    #[serde(default)]
    pub after: Vec<ContextMessage>,
    #[serde(default)]
    pub thread: Vec<ContextMessage>,
}

impl ContextData {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty() && self.thread.is_empty()
    }
}

/// Provider-shaped event payload. Deliberately a small enumerated set of
/// fields plus an escape hatch for unrecognized provider-specific data —
/// downstream code only ever reads the named fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventData {
    pub text: Option<String>,
    pub subject: Option<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub channel_id: Option<String>,
    pub user: Option<String>,
    pub user_name: Option<String>,
    pub ts: Option<String>,
    pub thread_ts: Option<String>,
    pub permalink: Option<String>,
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Produced by an adapter's `poll`/`handle_webhook`; never persisted as-is,
/// only wrapped inside a `MonitorEvent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterEvent {
    pub provider_event_id: String,
    pub event_type: String,
    pub event_data: EventData,
    #[serde(default)]
    pub context_data: ContextData,
    pub provider_timestamp: DateTime<Utc>,
}

/// Durable, per-`(monitor_id, provider_event_id)` audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEventRecord {
    pub id: MonitorEventId,
    pub monitor_id: MonitorId,
    pub provider_event_id: String,
    pub event_type: String,
    pub event_data: EventData,
    pub context_data: ContextData,
    pub provider_timestamp: DateTime<Utc>,
    pub processed: bool,
    pub task_id: Option<TaskId>,
    pub created_at: DateTime<Utc>,
}

/// Fields the core is allowed to set on the external Task entity (§4.4 step 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub organization_id: OrganizationId,
    pub title: String,
    pub description: String,
    pub queue_id: QueueId,
    pub project_id: Option<ProjectId>,
    pub status: TaskStatus,
    pub priority: u8,
    pub source_monitor_id: MonitorId,
    pub source_playbook_id: Option<PlaybookId>,
    pub source_url: Option<String>,
    pub input_data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queued")
    }
}

/// A system comment attached to a newly created task (Slack context comment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentDraft {
    pub task_id: TaskId,
    pub user_id: String,
    pub user_name: String,
    pub content: String,
}

/// Fixed priority the core always writes — see DESIGN.md Open Question
/// about `is_urgent` being computed but not used to raise this value.
pub const DEFAULT_TASK_PRIORITY: u8 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_not_due_when_paused() {
        let m = sample_monitor(MonitorStatus::Paused, None);
        assert!(!m.is_due(Utc::now()));
    }

    #[test]
    fn monitor_due_on_first_poll() {
        let m = sample_monitor(MonitorStatus::Active, None);
        assert!(m.is_due(Utc::now()));
    }

    #[test]
    fn monitor_not_due_before_interval_elapses() {
        let now = Utc::now();
        let m = sample_monitor(MonitorStatus::Active, Some(now));
        assert!(!m.is_due(now + chrono::Duration::seconds(10)));
    }

    #[test]
    fn monitor_due_after_interval_elapses() {
        let now = Utc::now();
        let m = sample_monitor(MonitorStatus::Active, Some(now));
        assert!(m.is_due(now + chrono::Duration::seconds(61)));
    }

    fn sample_monitor(status: MonitorStatus, last_polled_at: Option<DateTime<Utc>>) -> Monitor {
        Monitor {
            id: MonitorId::new(),
            organization_id: OrganizationId::new(),
            connection_id: ConnectionId::new(),
            provider_config: ProviderConfig::Slack {
                channel_ids: vec![],
                workspace_wide: false,
                tagged_user_ids: vec![],
                keywords: vec![],
                context_messages: 0,
                my_mentions: true,
            },
            queue_id: None,
            project_id: None,
            playbook_id: None,
            poll_interval_seconds: 60,
            poll_cursor: None,
            status,
            last_polled_at,
            last_event_at: None,
            last_error: None,
            events_detected: 0,
            tasks_created: 0,
            input_data_template: serde_json::Map::new(),
            deleted_at: None,
        }
    }
}
