use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use monitor_adapters::{require_connection_token, Adapter, NameCache, PollWindow};
use monitor_core::{
    AdapterEvent, Connection, ContextData, ContextMessage, Cursor, EventData, MonitorError,
    Provider, Result,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::SlackClient;
use crate::filters::{extract_mentioned_user_ids, message_matches_filters, SlackFilters};

const SEARCH_COUNT: u32 = 50;
const MAX_THREAD_REPLIES: usize = 400;

/// Slack-specific view of `ProviderConfig::Slack` — owned copies so the
/// adapter does not borrow from the monitor across awaits.
#[derive(Debug, Clone, Default)]
pub struct SlackConfig {
    pub channel_ids: Vec<String>,
    pub workspace_wide: bool,
    pub tagged_user_ids: Vec<String>,
    pub keywords: Vec<String>,
    pub context_messages: u32,
    pub my_mentions: bool,
}

impl SlackConfig {
    fn filters(&self) -> SlackFilters {
        SlackFilters {
            my_mentions: self.my_mentions,
            tagged_user_ids: self.tagged_user_ids.clone(),
            keywords: self.keywords.clone(),
        }
    }
}

pub struct SlackAdapter {
    client: SlackClient,
    connection_user_id: Option<String>,
    config: SlackConfig,
    name_cache: NameCache,
}

impl SlackAdapter {
    pub fn new(connection: &Connection, config: SlackConfig, timeout: Duration) -> Result<Self> {
        let token = require_connection_token(connection)?;
        Ok(Self {
            client: SlackClient::new(token, timeout),
            connection_user_id: connection.provider_user_id.clone(),
            config,
            name_cache: NameCache::default(),
        })
    }

    async fn resolve_user_name(&mut self, user_id: &str) -> String {
        if let Some(cached) = self.name_cache.get(user_id) {
            return cached.to_string();
        }
        match self.client.users_info(user_id).await {
            Ok(body) => {
                let name = body
                    .get("user")
                    .and_then(|u| u.get("profile"))
                    .and_then(|p| p.get("display_name").or_else(|| p.get("real_name")))
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(user_id)
                    .to_string();
                self.name_cache.insert(user_id.to_string(), name.clone());
                name
            }
            Err(e) => {
                debug!(user_id, error = %e, "slack user resolve failed, using raw id");
                user_id.to_string()
            }
        }
    }

    async fn permalink(&self, channel: &str, ts: &str) -> Option<String> {
        match self.client.chat_get_permalink(channel, ts).await {
            Ok(body) => body
                .get("permalink")
                .and_then(Value::as_str)
                .map(String::from),
            Err(e) => {
                warn!(channel, ts, error = %e, "slack permalink fetch failed");
                None
            }
        }
    }

    /// Threaded: paginate all replies up to MAX_THREAD_REPLIES.
    /// Non-threaded: context_messages before + after the target, same channel.
    async fn fetch_context(
        &mut self,
        channel: &str,
        ts: &str,
        thread_ts: Option<&str>,
    ) -> ContextData {
        let context_messages = self.config.context_messages;
        if context_messages == 0 {
            return ContextData::default();
        }
        match thread_ts {
            Some(root) => {
                let mut thread = Vec::new();
                let mut cursor: Option<String> = None;
                loop {
                    let page = match self
                        .client
                        .conversations_replies(channel, root, cursor.as_deref())
                        .await
                    {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(channel, root, error = %e, "slack thread fetch failed");
                            break;
                        }
                    };
                    let messages = page
                        .get("messages")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    for m in &messages {
                        if thread.len() >= MAX_THREAD_REPLIES {
                            break;
                        }
                        thread.push(self.to_context_message(m).await);
                    }
                    if thread.len() >= MAX_THREAD_REPLIES {
                        break;
                    }
                    cursor = page
                        .get("response_metadata")
                        .and_then(|r| r.get("next_cursor"))
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(String::from);
                    if cursor.is_none() {
                        break;
                    }
                }
                ContextData {
                    thread,
                    ..Default::default()
                }
            }
            None => {
                let before = match self
                    .client
                    .conversations_history(channel, None, Some(ts))
                    .await
                {
                    Ok(body) => self.collect_context_messages(&body, context_messages).await,
                    Err(e) => {
                        warn!(channel, ts, error = %e, "slack before-context fetch failed");
                        Vec::new()
                    }
                };
                let after = match self
                    .client
                    .conversations_history(channel, Some(ts), None)
                    .await
                {
                    Ok(body) => self.collect_context_messages(&body, context_messages).await,
                    Err(e) => {
                        warn!(channel, ts, error = %e, "slack after-context fetch failed");
                        Vec::new()
                    }
                };
                ContextData {
                    before,
                    after,
                    ..Default::default()
                }
            }
        }
    }

    async fn collect_context_messages(&mut self, body: &Value, limit: u32) -> Vec<ContextMessage> {
        let messages = body
            .get("messages")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::new();
        for m in messages.iter().take(limit as usize) {
            out.push(self.to_context_message(m).await);
        }
        out
    }

    async fn to_context_message(&mut self, m: &Value) -> ContextMessage {
        let user = m.get("user").and_then(Value::as_str).map(String::from);
        let text = m.get("text").and_then(Value::as_str).unwrap_or("").to_string();
        let ts = m.get("ts").and_then(Value::as_str).map(String::from);
        let user_name = match &user {
            Some(u) => Some(self.resolve_user_name(u).await),
            None => None,
        };
        ContextMessage {
            user,
            user_name,
            text,
            ts,
        }
    }

    fn event_data_from_message(
        &self,
        channel: &str,
        m: &Value,
        permalink: Option<String>,
        user_name: Option<String>,
    ) -> EventData {
        EventData {
            text: m.get("text").and_then(Value::as_str).map(String::from),
            channel_id: Some(channel.to_string()),
            user: m.get("user").and_then(Value::as_str).map(String::from),
            user_name,
            ts: m.get("ts").and_then(Value::as_str).map(String::from),
            thread_ts: m.get("thread_ts").and_then(Value::as_str).map(String::from),
            permalink,
            subtype: m.get("subtype").and_then(Value::as_str).map(String::from),
            ..Default::default()
        }
    }

    async fn build_event(&mut self, channel: &str, m: &Value) -> AdapterEvent {
        let ts = m.get("ts").and_then(Value::as_str).unwrap_or("0").to_string();
        let thread_ts = m.get("thread_ts").and_then(Value::as_str).map(String::from);
        let permalink = self.permalink(channel, &ts).await;
        let context = self
            .fetch_context(channel, &ts, thread_ts.as_deref())
            .await;
        let provider_timestamp = slack_ts_to_datetime(&ts);
        let user_name = match m.get("user").and_then(Value::as_str) {
            Some(u) => Some(self.resolve_user_name(u).await),
            None => None,
        };
        let event_data = self.event_data_from_message(channel, m, permalink, user_name);
        AdapterEvent {
            provider_event_id: format!("{channel}:{ts}"),
            event_type: "message".to_string(),
            event_data,
            context_data: context,
            provider_timestamp,
        }
    }

    /// `_poll_via_search`: the non-trivial `my_mentions` path. One search
    /// call, then per-hit filtering; cursor advances to the max ts across
    /// every hit, filtered-out or not (overshoot is intentional, see
    /// DESIGN.md).
    async fn poll_via_search(
        &mut self,
        cursor_ts: &str,
        window: PollWindow,
    ) -> Result<(Vec<AdapterEvent>, Cursor)> {
        let user_id = self
            .connection_user_id
            .clone()
            .ok_or_else(|| MonitorError::InvalidConfig("my_mentions requires a connection provider_user_id".into()))?;

        let mut query = format!("<@{user_id}>");
        if let Some(oldest) = window.oldest {
            query.push_str(&format!(" after:{}", to_slack_date(oldest)));
        }
        if let Some(latest) = window.latest {
            query.push_str(&format!(" before:{}", to_slack_date(latest)));
        }

        let body = self.client.search_messages(&query, SEARCH_COUNT, 1).await?;
        let matches = body
            .get("messages")
            .and_then(|m| m.get("matches"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut events = Vec::new();
        let mut max_ts: f64 = cursor_ts.parse().unwrap_or(0.0);

        for hit in &matches {
            let ts = hit.get("ts").and_then(Value::as_str).unwrap_or("0");
            let ts_val: f64 = ts.parse().unwrap_or(0.0);
            if ts_val > max_ts {
                max_ts = ts_val;
            }

            let cursor_val: f64 = cursor_ts.parse().unwrap_or(0.0);
            if ts_val <= cursor_val {
                continue;
            }
            let subtype = hit.get("subtype").and_then(Value::as_str);
            if monitor_adapters::is_dropped_subtype(subtype) {
                continue;
            }
            let channel = hit
                .get("channel")
                .and_then(|c| c.get("id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            events.push(self.build_event(&channel, hit).await);
        }

        let new_cursor = Cursor::LastSeenTs {
            last_seen_ts: format_slack_ts(max_ts),
        };
        Ok((events, new_cursor))
    }

    /// Channel mode: resolve the channel set, then poll each channel with
    /// its own watermark. One channel's failure is logged and does not
    /// abort the rest of the batch; the merged cursor only replaces entries
    /// for channels that actually returned a value.
    async fn poll_channels(
        &mut self,
        watermarks: &HashMap<String, String>,
        window: PollWindow,
    ) -> Result<(Vec<AdapterEvent>, Cursor)> {
        let channels = self.channels_to_poll().await?;
        let filters = self.config.filters();

        let mut all_events = Vec::new();
        let mut new_watermarks = watermarks.clone();

        for channel in channels {
            let oldest = watermarks.get(&channel).cloned();
            let oldest_param = window
                .oldest
                .map(|d| to_unix_ts(d))
                .or(oldest.clone());
            let latest_param = window.latest.map(to_unix_ts);

            let body = match self
                .client
                .conversations_history(&channel, oldest_param.as_deref(), latest_param.as_deref())
                .await
            {
                Ok(b) => b,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "slack channel poll failed, skipping");
                    continue;
                }
            };
            let messages = body
                .get("messages")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            let mut channel_max_ts = oldest.clone().unwrap_or_default();
            for m in &messages {
                let ts = m.get("ts").and_then(Value::as_str).unwrap_or("0").to_string();
                if ts.as_str() > channel_max_ts.as_str() {
                    channel_max_ts = ts.clone();
                }
                let text = m.get("text").and_then(Value::as_str).unwrap_or("");
                let subtype = m.get("subtype").and_then(Value::as_str);
                let mentions = extract_mentioned_user_ids(text);
                if !message_matches_filters(text, subtype, &mentions, &filters) {
                    continue;
                }
                all_events.push(self.build_event(&channel, m).await);
            }
            if !channel_max_ts.is_empty() {
                new_watermarks.insert(channel.clone(), channel_max_ts);
            }
        }

        Ok((all_events, Cursor::ChannelWatermarks(new_watermarks)))
    }

    /// `_get_channels_to_poll`: explicit channel_ids win; otherwise enumerate
    /// every accessible channel when workspace_wide or my_mentions is set.
    async fn channels_to_poll(&self) -> Result<Vec<String>> {
        if !self.config.channel_ids.is_empty() {
            return Ok(self.config.channel_ids.clone());
        }
        if !self.config.workspace_wide {
            return Ok(Vec::new());
        }
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let body = self.client.conversations_list(cursor.as_deref()).await?;
            let list = body
                .get("channels")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for c in &list {
                if let Some(id) = c.get("id").and_then(Value::as_str) {
                    channels.push(id.to_string());
                }
            }
            cursor = body
                .get("response_metadata")
                .and_then(|r| r.get("next_cursor"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from);
            if cursor.is_none() {
                break;
            }
        }
        Ok(channels)
    }
}

#[async_trait]
impl Adapter for SlackAdapter {
    fn provider(&self) -> Provider {
        Provider::Slack
    }

    async fn poll(
        &mut self,
        cursor: Option<Cursor>,
        window: PollWindow,
    ) -> Result<(Vec<AdapterEvent>, Cursor)> {
        if self.config.my_mentions {
            let cursor_ts = match cursor {
                Some(Cursor::LastSeenTs { last_seen_ts }) => last_seen_ts,
                _ => "0".to_string(),
            };
            self.poll_via_search(&cursor_ts, window).await
        } else {
            let watermarks = match cursor {
                Some(Cursor::ChannelWatermarks(map)) => map,
                _ => HashMap::new(),
            };
            self.poll_channels(&watermarks, window).await
        }
    }

    async fn handle_webhook(
        &mut self,
        payload: Value,
        _headers: &HashMap<String, String>,
    ) -> Result<Vec<AdapterEvent>> {
        if payload.get("type").and_then(Value::as_str) == Some("url_verification") {
            return Ok(Vec::new());
        }
        let Some(event) = payload.get("event") else {
            return Ok(Vec::new());
        };
        let event_type = event.get("type").and_then(Value::as_str).unwrap_or("");
        if event_type != "app_mention" && event_type != "message" {
            return Ok(Vec::new());
        }
        let subtype = event.get("subtype").and_then(Value::as_str);
        if event_type == "message"
            && matches!(
                subtype,
                Some("bot_message") | Some("message_changed") | Some("message_deleted")
            )
        {
            return Ok(Vec::new());
        }
        if monitor_adapters::is_dropped_subtype(subtype) {
            return Ok(Vec::new());
        }

        let channel = event
            .get("channel")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(vec![self.build_event(&channel, event).await])
    }

    async fn validate_config(&self) -> Result<()> {
        let auth = self.client.auth_test().await?;
        if auth.get("ok").and_then(Value::as_bool) != Some(true) {
            return Err(MonitorError::InvalidConfig(
                "slack auth.test failed".to_string(),
            ));
        }
        if self.config.channel_ids.is_empty()
            && !self.config.workspace_wide
            && !self.config.my_mentions
        {
            return Err(MonitorError::InvalidConfig(
                "one of channel_ids, workspace_wide, my_mentions must be set".to_string(),
            ));
        }
        if self.config.my_mentions && self.connection_user_id.is_none() {
            return Err(MonitorError::InvalidConfig(
                "my_mentions requires a connection provider_user_id".to_string(),
            ));
        }
        for channel in &self.config.channel_ids {
            self.client.conversations_info(channel).await?;
        }
        Ok(())
    }

    fn required_scopes(&self) -> Vec<&'static str> {
        vec![
            "channels:history",
            "channels:read",
            "groups:history",
            "groups:read",
            "im:history",
            "im:read",
            "mpim:history",
            "mpim:read",
            "users:read",
            "search:read",
        ]
    }
}

fn slack_ts_to_datetime(ts: &str) -> DateTime<Utc> {
    let secs: f64 = ts.parse().unwrap_or(0.0);
    Utc.timestamp_opt(secs.trunc() as i64, ((secs.fract()) * 1_000_000_000.0) as u32)
        .single()
        .unwrap_or_else(Utc::now)
}

fn to_slack_date(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

fn to_unix_ts(dt: DateTime<Utc>) -> String {
    format!("{}.000000", dt.timestamp())
}

fn format_slack_ts(ts: f64) -> String {
    if ts == ts.trunc() {
        format!("{:.1}", ts)
    } else {
        format!("{}", ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slack_date_truncates_to_day() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 7, 13, 45, 0).unwrap();
        assert_eq!(to_slack_date(dt), "2025-01-07");
    }

    #[test]
    fn ts_roundtrip_preserves_ordering() {
        let a = slack_ts_to_datetime("1000.100000");
        let b = slack_ts_to_datetime("1000.200000");
        assert!(a < b);
    }
}
