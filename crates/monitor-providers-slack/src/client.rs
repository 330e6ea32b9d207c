use std::time::Duration;

use monitor_core::{MonitorError, Result};
use serde_json::{json, Value};

const BASE_URL: &str = "https://slack.com/api";

/// Thin wrapper over the Slack Web API. Maps transport failures and Slack's
/// `{"ok": false, "error": ...}` envelope onto the taxonomy in monitor-core
/// so the adapter layer never has to know about HTTP status codes.
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
}

impl SlackClient {
    pub fn new(token: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client build");
        Self {
            http,
            token: token.to_string(),
        }
    }

    async fn get(&self, method: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{BASE_URL}/{method}");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        handle_response(resp).await
    }

    async fn post_json(&self, method: &str, body: Value) -> Result<Value> {
        let url = format!("{BASE_URL}/{method}");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        handle_response(resp).await
    }

    pub async fn auth_test(&self) -> Result<Value> {
        self.post_json("auth.test", json!({})).await
    }

    pub async fn conversations_info(&self, channel: &str) -> Result<Value> {
        self.get("conversations.info", &[("channel", channel.to_string())])
            .await
    }

    pub async fn conversations_list(&self, cursor: Option<&str>) -> Result<Value> {
        let mut query = vec![
            ("types", "public_channel,private_channel".to_string()),
            ("limit", "200".to_string()),
        ];
        if let Some(c) = cursor {
            query.push(("cursor", c.to_string()));
        }
        self.get("conversations.list", &query).await
    }

    pub async fn search_messages(
        &self,
        query: &str,
        count: u32,
        cursor_page: u32,
    ) -> Result<Value> {
        self.get(
            "search.messages",
            &[
                ("query", query.to_string()),
                ("sort", "timestamp".to_string()),
                ("sort_dir", "desc".to_string()),
                ("count", count.to_string()),
                ("page", cursor_page.to_string()),
            ],
        )
        .await
    }

    pub async fn conversations_history(
        &self,
        channel: &str,
        oldest: Option<&str>,
        latest: Option<&str>,
    ) -> Result<Value> {
        let mut query = vec![("channel", channel.to_string()), ("limit", "200".to_string())];
        if let Some(o) = oldest {
            query.push(("oldest", o.to_string()));
        }
        if let Some(l) = latest {
            query.push(("latest", l.to_string()));
            query.push(("inclusive", "true".to_string()));
        }
        self.get("conversations.history", &query).await
    }

    pub async fn conversations_replies(
        &self,
        channel: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<Value> {
        let mut query = vec![
            ("channel", channel.to_string()),
            ("ts", thread_ts.to_string()),
            ("limit", "200".to_string()),
        ];
        if let Some(c) = cursor {
            query.push(("cursor", c.to_string()));
        }
        self.get("conversations.replies", &query).await
    }

    pub async fn chat_get_permalink(&self, channel: &str, message_ts: &str) -> Result<Value> {
        self.get(
            "chat.getPermalink",
            &[
                ("channel", channel.to_string()),
                ("message_ts", message_ts.to_string()),
            ],
        )
        .await
    }

    pub async fn users_info(&self, user: &str) -> Result<Value> {
        self.get("users.info", &[("user", user.to_string())]).await
    }
}

fn transport_error(e: &reqwest::Error) -> MonitorError {
    if e.is_timeout() {
        MonitorError::ProviderTransient(format!("slack request timed out: {e}"))
    } else {
        MonitorError::ProviderTransient(format!("slack transport error: {e}"))
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(MonitorError::ProviderTransient(format!(
            "slack http {status}"
        )));
    }
    if status.is_client_error() {
        return Err(MonitorError::ProviderPermanent(format!(
            "slack http {status}"
        )));
    }
    let body: Value = resp
        .json()
        .await
        .map_err(|e| MonitorError::ProviderTransient(format!("slack response decode: {e}")))?;

    match body.get("ok").and_then(Value::as_bool) {
        Some(true) => Ok(body),
        _ => {
            let err = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            if err == "ratelimited" || err == "internal_error" {
                Err(MonitorError::ProviderTransient(format!("slack api error: {err}")))
            } else {
                Err(MonitorError::ProviderPermanent(format!("slack api error: {err}")))
            }
        }
    }
}
