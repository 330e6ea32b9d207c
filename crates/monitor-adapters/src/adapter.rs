use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use monitor_core::{AdapterEvent, Connection, Cursor, MonitorError, Provider, Result};

/// Bounds for a backfill poll. `None` means "normal incremental poll using
/// the stored cursor"; `Some` bounds mean the engine will not persist
/// whatever cursor the adapter returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollWindow {
    pub oldest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

impl PollWindow {
    pub fn is_backfill(&self) -> bool {
        self.oldest.is_some() || self.latest.is_some()
    }
}

/// The provider-agnostic contract every adapter implements (§4.1/§6).
///
/// An adapter instance is constructed per-poll from a decrypted `Connection`
/// and the monitor's `provider_config`; it owns no durable state itself —
/// the engine persists everything across calls.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn provider(&self) -> Provider;

    async fn poll(
        &mut self,
        cursor: Option<Cursor>,
        window: PollWindow,
    ) -> Result<(Vec<AdapterEvent>, Cursor)>;

    async fn handle_webhook(
        &mut self,
        payload: serde_json::Value,
        headers: &HashMap<String, String>,
    ) -> Result<Vec<AdapterEvent>>;

    /// Checks that the connection + provider_config are usable (valid
    /// token, required fields present). Returns `Err` with a human-readable
    /// reason on failure rather than panicking.
    async fn validate_config(&self) -> Result<()>;

    fn required_scopes(&self) -> Vec<&'static str>;
}

/// Subtypes every adapter drops before emitting an event (§4.1 canonical
/// filtering rules). Providers may recognize additional subtypes of their
/// own on top of this shared set.
pub const DROPPED_SUBTYPES: &[&str] = &["bot_message", "channel_join", "channel_leave"];

pub fn is_dropped_subtype(subtype: Option<&str>) -> bool {
    subtype.map(|s| DROPPED_SUBTYPES.contains(&s)).unwrap_or(false)
}

/// Helper for the common "connection is missing a required field" failure
/// path (§7 `ConnectionUnavailable`).
pub fn require_field<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MonitorError::ConnectionUnavailable(format!("missing {field}")))
}

pub fn require_connection_token(conn: &Connection) -> Result<&str> {
    if conn.access_token.is_empty() {
        return Err(MonitorError::ConnectionUnavailable(
            "connection has no access token".to_string(),
        ));
    }
    Ok(&conn.access_token)
}
