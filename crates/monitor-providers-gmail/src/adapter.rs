use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use monitor_adapters::{require_connection_token, Adapter, PollWindow};
use monitor_core::{AdapterEvent, Connection, ContextData, Cursor, EventData, Provider, Result};
use serde_json::Value;
use tracing::warn;

use crate::client::GmailClient;

#[derive(Debug, Clone, Default)]
pub struct GmailConfig {
    pub label_or_folder_ids: Vec<String>,
    pub from_filter: Vec<String>,
    pub keywords: Vec<String>,
    pub include_body: bool,
}

pub struct GmailAdapter {
    client: GmailClient,
    config: GmailConfig,
}

impl GmailAdapter {
    pub fn new(connection: &Connection, config: GmailConfig, timeout: Duration) -> Result<Self> {
        let token = require_connection_token(connection)?;
        Ok(Self {
            client: GmailClient::new(token, timeout),
            config,
        })
    }

    fn matches_filters(&self, from_header: &str, subject: &str, snippet: &str) -> bool {
        if !self.config.from_filter.is_empty() {
            let from_lower = from_header.to_lowercase();
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
            let haystack = format!("{subject} {snippet}").to_lowercase();
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

    async fn build_event(&self, message_id: &str) -> Result<Option<AdapterEvent>> {
        let msg = self.client.message_get(message_id).await?;
        if is_auto_response(&msg) {
            return Ok(None);
        }
        let headers = msg
            .get("payload")
            .and_then(|p| p.get("headers"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let header = |name: &str| -> Option<String> {
            headers.iter().find_map(|h| {
                if h.get("name").and_then(Value::as_str).eq(&Some(name)) {
                    h.get("value").and_then(Value::as_str).map(String::from)
                } else {
                    None
                }
            })
        };
        let from_header = header("From").unwrap_or_default();
        let subject = header("Subject").unwrap_or_default();
        let snippet = msg.get("snippet").and_then(Value::as_str).unwrap_or("").to_string();

        if !self.matches_filters(&from_header, &subject, &snippet) {
            return Ok(None);
        }

        let (from_name, from_email) = split_from_header(&from_header);
        let internal_date = msg
            .get("internalDate")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        let provider_timestamp = DateTime::<Utc>::from_timestamp_millis(internal_date).unwrap_or_else(Utc::now);

        let text = if self.config.include_body { Some(snippet) } else { None };

        Ok(Some(AdapterEvent {
            provider_event_id: message_id.to_string(),
            event_type: "email".to_string(),
            event_data: EventData {
                text,
                subject: Some(subject),
                from_email: Some(from_email),
                from_name: Some(from_name),
                permalink: Some(format!("https://mail.google.com/mail/u/0/#all/{message_id}")),
                ..Default::default()
            },
            context_data: ContextData::default(),
            provider_timestamp,
        }))
    }
}

fn split_from_header(header: &str) -> (String, String) {
    if let Some(lt) = header.find('<') {
        let name = header[..lt].trim().trim_matches('"').to_string();
        let email = header[lt + 1..].trim_end_matches('>').to_string();
        (name, email)
    } else {
        (header.to_string(), header.to_string())
    }
}

fn is_auto_response(msg: &Value) -> bool {
    let headers = msg
        .get("payload")
        .and_then(|p| p.get("headers"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    headers.iter().any(|h| {
        let name = h.get("name").and_then(Value::as_str).unwrap_or("").to_lowercase();
        let value = h.get("value").and_then(Value::as_str).unwrap_or("").to_lowercase();
        (name == "auto-submitted" && value != "no") || (name == "precedence" && value == "bulk")
    })
}

#[async_trait]
impl Adapter for GmailAdapter {
    fn provider(&self) -> Provider {
        Provider::Gmail
    }

    async fn poll(
        &mut self,
        cursor: Option<Cursor>,
        window: PollWindow,
    ) -> Result<(Vec<AdapterEvent>, Cursor)> {
        let mut events = Vec::new();

        if window.is_backfill() {
            let query = self.backfill_query(window);
            let body = self.client.messages_list(&query).await?;
            let ids = body
                .get("messages")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for m in ids {
                if let Some(id) = m.get("id").and_then(Value::as_str) {
                    if let Some(event) = self.build_event(id).await? {
                        events.push(event);
                    }
                }
            }
            return Ok((events, cursor.unwrap_or(Cursor::Empty)));
        }

        let start_history_id = match &cursor {
            Some(Cursor::DeltaToken(id)) => id.clone(),
            _ => {
                let profile = self.client.profile().await?;
                let id = profile
                    .get("historyId")
                    .and_then(Value::as_str)
                    .unwrap_or("1")
                    .to_string();
                return Ok((Vec::new(), Cursor::DeltaToken(id)));
            }
        };

        let body = self.client.history_list(&start_history_id).await?;
        let history = body
            .get("history")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut new_history_id = start_history_id.clone();
        if let Some(hid) = body.get("historyId").and_then(Value::as_str) {
            new_history_id = hid.to_string();
        }

        for h in &history {
            let added = h
                .get("messagesAdded")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for a in &added {
                let Some(id) = a.get("message").and_then(|m| m.get("id")).and_then(Value::as_str) else {
                    continue;
                };
                match self.build_event(id).await {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {}
                    Err(e) => warn!(message_id = id, error = %e, "gmail message enrichment failed"),
                }
            }
        }

        Ok((events, Cursor::DeltaToken(new_history_id)))
    }

    async fn handle_webhook(
        &mut self,
        _payload: Value,
        _headers: &HashMap<String, String>,
    ) -> Result<Vec<AdapterEvent>> {
        // Gmail push notifications carry only a historyId pointer; the real
        // fan-out happens through the next incremental poll, not here.
        Ok(Vec::new())
    }

    async fn validate_config(&self) -> Result<()> {
        self.client.profile().await?;
        Ok(())
    }

    fn required_scopes(&self) -> Vec<&'static str> {
        vec!["https://www.googleapis.com/auth/gmail.readonly"]
    }
}

impl GmailAdapter {
    fn backfill_query(&self, window: PollWindow) -> String {
        let mut parts = Vec::new();
        if let Some(oldest) = window.oldest {
            parts.push(format!("after:{}", oldest.format("%Y/%m/%d")));
        }
        if let Some(latest) = window.latest {
            parts.push(format!("before:{}", latest.format("%Y/%m/%d")));
        }
        for label in &self.config.label_or_folder_ids {
            parts.push(format!("label:{label}"));
        }
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_from_header_with_display_name() {
        let (name, email) = split_from_header("Alice <alice@example.com>");
        assert_eq!(name, "Alice");
        assert_eq!(email, "alice@example.com");
    }

    #[test]
    fn detects_auto_submitted_header() {
        let msg = serde_json::json!({
            "payload": { "headers": [{"name": "Auto-Submitted", "value": "auto-replied"}] }
        });
        assert!(is_auto_response(&msg));
    }
}
