use async_trait::async_trait;
use chrono::{DateTime, Utc};
use monitor_core::{
    CommentDraft, CommentId, ConnectionId, Cursor, Monitor, MonitorEventId, MonitorEventRecord,
    MonitorId, MonitorStatus, OrganizationId, QueueId, Result, TaskDraft, TaskId,
};

/// A connection row as stored: credentials at rest are ciphertext, decrypted
/// by the caller via [`Decryptor`] before handing them to an adapter.
#[derive(Debug, Clone)]
pub struct EncryptedConnection {
    pub id: ConnectionId,
    pub access_token_ciphertext: String,
    pub refresh_token_ciphertext: Option<String>,
    pub provider_user_id: Option<String>,
    pub scopes: Vec<String>,
}

/// Fields the engine is allowed to write back onto a monitor row after a
/// poll attempt (§4.3 steps 6-7). `cursor: None` leaves the stored cursor
/// untouched — used for backfill polls and failed polls alike.
#[derive(Debug, Clone)]
pub struct MonitorUpdate {
    pub last_polled_at: Option<DateTime<Utc>>,
    pub cursor: Option<Cursor>,
    pub status: MonitorStatus,
    pub last_error: Option<String>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub events_detected_delta: u64,
    pub tasks_created_delta: u64,
}

impl MonitorUpdate {
    /// Successful poll that produced no events: clears the error, advances
    /// `last_polled_at`, leaves counters and `last_event_at` untouched.
    pub fn success_empty(now: DateTime<Utc>, cursor: Option<Cursor>) -> Self {
        Self {
            last_polled_at: Some(now),
            cursor,
            status: MonitorStatus::Active,
            last_error: None,
            last_event_at: None,
            events_detected_delta: 0,
            tasks_created_delta: 0,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            last_polled_at: None,
            cursor: None,
            status: MonitorStatus::Error,
            last_error: Some(message),
            last_event_at: None,
            events_detected_delta: 0,
            tasks_created_delta: 0,
        }
    }
}

/// Storage ports (C5) — purely interface definitions; any backing store
/// satisfying this contract can sit under the engine and processor.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn find_monitor(&self, id: &MonitorId, org: Option<&OrganizationId>) -> Result<Option<Monitor>>;

    async fn find_connection(&self, id: &ConnectionId) -> Result<Option<EncryptedConnection>>;

    async fn find_due_monitors(&self, now: DateTime<Utc>, org: Option<&OrganizationId>) -> Result<Vec<Monitor>>;

    /// Every active, non-deleted monitor, regardless of due-ness — used for
    /// webhook fan-out, which runs off an inbound event rather than a tick.
    async fn list_active_monitors(&self, org: Option<&OrganizationId>) -> Result<Vec<Monitor>>;

    /// Must be safe to call concurrently on different monitor ids; updates
    /// to a single monitor may serialize.
    async fn update_monitor(&self, id: &MonitorId, update: MonitorUpdate) -> Result<()>;

    async fn lookup_event(
        &self,
        monitor_id: &MonitorId,
        provider_event_id: &str,
    ) -> Result<Option<MonitorEventRecord>>;

    /// Returns `Err(MonitorError::DuplicateEvent)` if the uniqueness
    /// constraint on `(monitor_id, provider_event_id)` is violated.
    async fn insert_event(&self, event: MonitorEventRecord) -> Result<MonitorEventId>;

    async fn mark_event_processed(&self, id: &MonitorEventId, task_id: Option<TaskId>) -> Result<()>;

    async fn insert_task(&self, task: TaskDraft) -> Result<TaskId>;

    async fn find_task(&self, org: &OrganizationId, source_url: &str) -> Result<Option<TaskId>>;

    async fn find_inbox_queue(&self, org: &OrganizationId) -> Result<Option<QueueId>>;

    async fn insert_comment(&self, comment: CommentDraft) -> Result<CommentId>;
}

/// Credential decryption is an external concern (§1 "we require only a
/// decrypt(token) primitive") — kept as a separate trait so a real
/// implementation can be swapped in without touching the rest of storage.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// Identity decryptor — secret storage and key management are out of scope
/// here (§1 Non-goals); this stands in for whatever KMS-backed decryptor a
/// deployment wires in, and doubles as the test double.
pub struct PlaintextDecryptor;

impl Decryptor for PlaintextDecryptor {
    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        Ok(ciphertext.to_string())
    }
}
