use std::time::Duration;

use monitor_core::{MonitorError, Result};
use serde_json::Value;

const BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

pub struct GmailClient {
    http: reqwest::Client,
    token: String,
}

impl GmailClient {
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

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{BASE_URL}{path}");
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

    pub async fn profile(&self) -> Result<Value> {
        self.get("/profile", &[]).await
    }

    /// Incremental delta since `start_history_id`.
    pub async fn history_list(&self, start_history_id: &str) -> Result<Value> {
        self.get(
            "/history",
            &[
                ("startHistoryId", start_history_id.to_string()),
                ("historyTypes", "messageAdded".to_string()),
            ],
        )
        .await
    }

    /// Backfill search over an explicit date window / label filter.
    pub async fn messages_list(&self, query: &str) -> Result<Value> {
        self.get("/messages", &[("q", query.to_string()), ("maxResults", "50".to_string())])
            .await
    }

    pub async fn message_get(&self, id: &str) -> Result<Value> {
        self.get(&format!("/messages/{id}"), &[("format", "metadata".to_string())])
            .await
    }
}

fn transport_error(e: &reqwest::Error) -> MonitorError {
    if e.is_timeout() {
        MonitorError::ProviderTransient(format!("gmail request timed out: {e}"))
    } else {
        MonitorError::ProviderTransient(format!("gmail transport error: {e}"))
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(MonitorError::ProviderTransient(format!("gmail http {status}")));
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(MonitorError::ConnectionUnavailable(format!(
            "gmail auth rejected: {status}"
        )));
    }
    if status.is_client_error() {
        return Err(MonitorError::ProviderPermanent(format!("gmail http {status}")));
    }
    resp.json()
        .await
        .map_err(|e| MonitorError::ProviderTransient(format!("gmail response decode: {e}")))
}
