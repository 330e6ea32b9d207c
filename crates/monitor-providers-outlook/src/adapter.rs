use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use monitor_adapters::{require_connection_token, Adapter, PollWindow};
use monitor_core::{AdapterEvent, Connection, ContextData, Cursor, EventData, Provider, Result};
use serde_json::Value;

use crate::client::OutlookClient;

#[derive(Debug, Clone, Default)]
pub struct OutlookConfig {
    pub label_or_folder_ids: Vec<String>,
    pub from_filter: Vec<String>,
    pub keywords: Vec<String>,
    pub include_body: bool,
}

pub struct OutlookAdapter {
    client: OutlookClient,
    config: OutlookConfig,
}

impl OutlookAdapter {
    pub fn new(connection: &Connection, config: OutlookConfig, timeout: Duration) -> Result<Self> {
        let token = require_connection_token(connection)?;
        Ok(Self {
            client: OutlookClient::new(token, timeout),
            config,
        })
    }

    fn folder_ids(&self) -> Vec<String> {
        if self.config.label_or_folder_ids.is_empty() {
            vec!["inbox".to_string()]
        } else {
            self.config.label_or_folder_ids.clone()
        }
    }

    fn matches_filters(&self, from_addr: &str, subject: &str, preview: &str) -> bool {
        if !self.config.from_filter.is_empty() {
            let from_lower = from_addr.to_lowercase();
            if !self
                .config
                .from_filter
                .iter()
                .any(|f| from_lower.contains(&f.to_lowercase()))
            {
                return false;
            }
        }
        if !self.config.keywords.is_empty() {
            let haystack = format!("{subject} {preview}").to_lowercase();
            if !self
                .config
                .keywords
                .iter()
                .any(|kw| haystack.contains(&kw.to_lowercase()))
            {
                return false;
            }
        }
        true
    }

    fn message_to_event(&self, msg: &Value) -> Option<AdapterEvent> {
        if is_auto_reply(msg) {
            return None;
        }
        let id = msg.get("id").and_then(Value::as_str)?.to_string();
        let subject = msg.get("subject").and_then(Value::as_str).unwrap_or("").to_string();
        let from_email = msg
            .get("from")
            .and_then(|f| f.get("emailAddress"))
            .and_then(|e| e.get("address"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let from_name = msg
            .get("from")
            .and_then(|f| f.get("emailAddress"))
            .and_then(|e| e.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(&from_email)
            .to_string();
        let preview = msg.get("bodyPreview").and_then(Value::as_str).unwrap_or("").to_string();

        if !self.matches_filters(&from_email, &subject, &preview) {
            return None;
        }

        let received = msg
            .get("receivedDateTime")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let web_link = msg.get("webLink").and_then(Value::as_str).map(String::from);
        let text = if self.config.include_body { Some(preview) } else { None };

        Some(AdapterEvent {
            provider_event_id: id,
            event_type: "email".to_string(),
            event_data: EventData {
                text,
                subject: Some(subject),
                from_email: Some(from_email),
                from_name: Some(from_name),
                permalink: web_link,
                ..Default::default()
            },
            context_data: ContextData::default(),
            provider_timestamp: received,
        })
    }
}

fn is_auto_reply(msg: &Value) -> bool {
    msg.get("subject")
        .and_then(Value::as_str)
        .map(|s| {
            let lower = s.to_lowercase();
            lower.starts_with("automatic reply") || lower.starts_with("out of office")
        })
        .unwrap_or(false)
}

#[async_trait]
impl Adapter for OutlookAdapter {
    fn provider(&self) -> Provider {
        Provider::Outlook
    }

    async fn poll(
        &mut self,
        cursor: Option<Cursor>,
        window: PollWindow,
    ) -> Result<(Vec<AdapterEvent>, Cursor)> {
        let mut events = Vec::new();

        if window.is_backfill() {
            for folder in self.folder_ids() {
                let filter = self.config.keywords.join(" ");
                let body = self.client.messages_search(&folder, &filter).await?;
                let messages = body.get("value").and_then(Value::as_array).cloned().unwrap_or_default();
                for m in &messages {
                    if let Some(event) = self.message_to_event(m) {
                        events.push(event);
                    }
                }
            }
            return Ok((events, cursor.unwrap_or(Cursor::Empty)));
        }

        let (folder, delta_link) = match &cursor {
            Some(Cursor::DeltaToken(link)) => (self.folder_ids().remove(0), Some(link.clone())),
            _ => (self.folder_ids().remove(0), None),
        };

        let body = self.client.delta(&folder, delta_link.as_deref()).await?;
        let messages = body.get("value").and_then(Value::as_array).cloned().unwrap_or_default();
        for m in &messages {
            if let Some(event) = self.message_to_event(m) {
                events.push(event);
            }
        }

        let new_delta_link = body
            .get("@odata.deltaLink")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| delta_link.unwrap_or_default());

        Ok((events, Cursor::DeltaToken(new_delta_link)))
    }

    async fn handle_webhook(
        &mut self,
        _payload: Value,
        _headers: &HashMap<String, String>,
    ) -> Result<Vec<AdapterEvent>> {
        // Graph change notifications only carry a resource pointer; the
        // actual message is fetched on the next delta poll.
        Ok(Vec::new())
    }

    async fn validate_config(&self) -> Result<()> {
        self.client.profile().await?;
        Ok(())
    }

    fn required_scopes(&self) -> Vec<&'static str> {
        vec!["Mail.Read"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_automatic_reply_subject() {
        let msg = serde_json::json!({"subject": "Automatic reply: Out until Monday"});
        assert!(is_auto_reply(&msg));
    }

    #[test]
    fn regular_subject_is_not_auto_reply() {
        let msg = serde_json::json!({"subject": "Can you review this?"});
        assert!(!is_auto_reply(&msg));
    }
}
