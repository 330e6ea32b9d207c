use std::time::Duration;

use monitor_core::{MonitorError, Result};
use serde_json::Value;

const BASE_URL: &str = "https://graph.microsoft.com/v1.0/me";

pub struct OutlookClient {
    http: reqwest::Client,
    token: String,
}

impl OutlookClient {
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
        self.get("", &[]).await
    }

    /// Incremental delta query over a mail folder.
    pub async fn delta(&self, folder_id: &str, delta_link: Option<&str>) -> Result<Value> {
        match delta_link {
            Some(link) => {
                let resp = self
                    .http
                    .get(link)
                    .bearer_auth(&self.token)
                    .send()
                    .await
                    .map_err(|e| transport_error(&e))?;
                handle_response(resp).await
            }
            None => {
                self.get(&format!("/mailFolders/{folder_id}/messages/delta"), &[])
                    .await
            }
        }
    }

    pub async fn messages_search(&self, folder_id: &str, filter: &str) -> Result<Value> {
        self.get(
            &format!("/mailFolders/{folder_id}/messages"),
            &[("$search", filter.to_string()), ("$top", "50".to_string())],
        )
        .await
    }
}

fn transport_error(e: &reqwest::Error) -> MonitorError {
    if e.is_timeout() {
        MonitorError::ProviderTransient(format!("outlook request timed out: {e}"))
    } else {
        MonitorError::ProviderTransient(format!("outlook transport error: {e}"))
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(MonitorError::ProviderTransient(format!("outlook http {status}")));
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(MonitorError::ConnectionUnavailable(format!(
            "outlook auth rejected: {status}"
        )));
    }
    if status.is_client_error() {
        return Err(MonitorError::ProviderPermanent(format!("outlook http {status}")));
    }
    resp.json()
        .await
        .map_err(|e| MonitorError::ProviderTransient(format!("outlook response decode: {e}")))
}
