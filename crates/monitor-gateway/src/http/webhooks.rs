//! Webhook ingress — `POST /webhooks/slack` and `POST /webhooks/{provider}`.
//!
//! Slack gets its own route because its Events API payload shape (the
//! `url_verification` handshake, `event_callback` envelope) and its
//! mention-based fan-out rule are Slack-specific (§4.3 "Webhook procedure").
//! Every other provider goes through the generic route, which fans the
//! payload out to every active monitor for that provider.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use monitor_core::{config::WebhookAuthMode, OrganizationId, Provider};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

/// POST /webhooks/slack
///
/// Answers the `url_verification` handshake directly; `event_callback`
/// payloads are authenticated then fanned out via
/// `MonitorEngine::dispatch_slack_webhook`.
pub async fn slack_webhook_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "invalid JSON in Slack webhook body");
        bad_request("invalid JSON body")
    })?;

    if payload.get("type").and_then(Value::as_str) == Some("url_verification") {
        let challenge = payload.get("challenge").cloned().unwrap_or(Value::Null);
        return Ok(Json(json!({ "challenge": challenge })));
    }

    if !state.config.webhooks.enabled {
        warn!("slack event_callback received but webhooks subsystem is disabled");
        return Err((StatusCode::NOT_FOUND, Json(json!({"error": "webhook subsystem is disabled"}))));
    }

    authenticate(&state, "slack", &headers, &body)?;

    let org = params.get("organization_id").map(|s| OrganizationId::from(s.clone()));
    let header_map = header_map_to_strings(&headers);
    let result = state
        .engine
        .dispatch_slack_webhook(org.as_ref(), payload, &header_map)
        .await
        .map_err(|e| {
            warn!(error = %e, "slack webhook dispatch failed");
            internal_error("dispatch failed")
        })?;

    info!(
        monitors_matched = result.monitors_matched,
        events_processed = result.events_processed,
        "slack webhook processed"
    );
    Ok(Json(json!({
        "ok": true,
        "monitors_matched": result.monitors_matched,
        "events_processed": result.events_processed,
        "errors": result.errors,
    })))
}

/// POST /webhooks/{provider}
pub async fn generic_webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let cfg = &state.config.webhooks;
    if !cfg.enabled {
        warn!(provider = %provider, "webhook received but webhooks subsystem is disabled");
        return Err((StatusCode::NOT_FOUND, Json(json!({"error": "webhook subsystem is disabled"}))));
    }

    let parsed: Provider = provider.parse().map_err(|_| {
        warn!(provider = %provider, "unknown webhook provider");
        (StatusCode::NOT_FOUND, Json(json!({"error": "unknown provider"})))
    })?;

    authenticate(&state, &provider, &headers, &body)?;

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(provider = %provider, error = %e, "invalid JSON in webhook body");
        bad_request("invalid JSON body")
    })?;

    let org = params.get("organization_id").map(|s| OrganizationId::from(s.clone()));
    let header_map = header_map_to_strings(&headers);
    let result = state
        .engine
        .dispatch_webhook(parsed, org.as_ref(), payload, &header_map)
        .await
        .map_err(|e| {
            warn!(provider = %provider, error = %e, "webhook dispatch failed");
            internal_error("dispatch failed")
        })?;

    info!(
        provider = %provider,
        monitors_matched = result.monitors_matched,
        events_processed = result.events_processed,
        "webhook processed"
    );
    Ok(Json(json!({
        "ok": true,
        "monitors_matched": result.monitors_matched,
        "events_processed": result.events_processed,
        "errors": result.errors,
    })))
}

// ── Auth ─────────────────────────────────────────────────────────────────

fn authenticate(
    state: &AppState,
    source: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<(), (StatusCode, Json<Value>)> {
    let Some(source_cfg) = state.config.webhooks.sources.iter().find(|s| s.name == source) else {
        if state.config.webhooks.enabled {
            warn!(source = %source, "no webhook auth configured for source, rejecting");
            return Err((StatusCode::UNAUTHORIZED, Json(json!({"error": "source not configured"}))));
        }
        return Ok(());
    };

    match &source_cfg.auth_mode {
        WebhookAuthMode::HmacSha256 if source == "slack" => {
            verify_slack_signature(headers, body, source_cfg.secret.as_deref()).map_err(auth_error)
        }
        WebhookAuthMode::HmacSha256 => {
            verify_hmac_sha256(headers, body, source_cfg.secret.as_deref()).map_err(auth_error)
        }
        WebhookAuthMode::BearerToken => {
            verify_bearer_token(headers, source_cfg.secret.as_deref()).map_err(auth_error)
        }
        WebhookAuthMode::None => Ok(()),
    }
}

/// Slack's request-signing scheme: `X-Slack-Signature: v0=<hex>` over
/// `v0:{X-Slack-Request-Timestamp}:{raw body}`.
fn verify_slack_signature(headers: &HeaderMap, body: &Bytes, secret: Option<&str>) -> Result<(), String> {
    let secret = secret.ok_or_else(|| "no signing secret configured for slack".to_string())?;

    let timestamp = headers
        .get("x-slack-request-timestamp")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Slack-Request-Timestamp header".to_string())?;

    let sig_header = headers
        .get("x-slack-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Slack-Signature header".to_string())?;

    let sig_hex = sig_header
        .strip_prefix("v0=")
        .ok_or_else(|| "malformed X-Slack-Signature header".to_string())?;
    let expected = hex::decode(sig_hex).map_err(|_| "X-Slack-Signature is not valid hex".to_string())?;

    let basestring = format!("v0:{timestamp}:{}", String::from_utf8_lossy(body));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(basestring.as_bytes());
    mac.verify_slice(&expected).map_err(|_| "Slack signature mismatch".to_string())
}

/// GitHub-style `X-Hub-Signature-256: sha256=<hex>` over the raw body.
fn verify_hmac_sha256(headers: &HeaderMap, body: &Bytes, secret: Option<&str>) -> Result<(), String> {
    let secret = secret.ok_or_else(|| "no HMAC secret configured for this source".to_string())?;

    let sig_header = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Hub-Signature-256 header".to_string())?;

    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed X-Hub-Signature-256 header".to_string())?;
    let expected = hex::decode(sig_hex).map_err(|_| "X-Hub-Signature-256 is not valid hex".to_string())?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| "HMAC signature mismatch".to_string())
}

fn verify_bearer_token(headers: &HeaderMap, secret: Option<&str>) -> Result<(), String> {
    let expected = secret.ok_or_else(|| "no bearer token configured for this source".to_string())?;

    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing Authorization header".to_string())?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| "Authorization header must use Bearer scheme".to_string())?;

    if token == expected {
        Ok(())
    } else {
        Err("bearer token mismatch".to_string())
    }
}

fn header_map_to_strings(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect()
}

fn auth_error(reason: String) -> (StatusCode, Json<Value>) {
    warn!(reason = %reason, "webhook authentication failed");
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "authentication failed", "reason": reason})))
}

fn bad_request(msg: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({"error": msg})))
}

fn internal_error(msg: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": msg})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn sign(secret: &str, basestring: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(basestring.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn slack_signature_round_trips() {
        let secret = "shhh";
        let body = Bytes::from_static(br#"{"type":"event_callback"}"#);
        let timestamp = "1700000000";
        let sig = sign(secret, &format!("v0:{timestamp}:{}", String::from_utf8_lossy(&body)));

        let mut headers = HeaderMap::new();
        headers.insert("x-slack-request-timestamp", HeaderValue::from_str(timestamp).unwrap());
        headers.insert("x-slack-signature", HeaderValue::from_str(&format!("v0={sig}")).unwrap());

        assert!(verify_slack_signature(&headers, &body, Some(secret)).is_ok());
    }

    #[test]
    fn slack_signature_rejects_wrong_secret() {
        let body = Bytes::from_static(br#"{"type":"event_callback"}"#);
        let mut headers = HeaderMap::new();
        headers.insert("x-slack-request-timestamp", HeaderValue::from_static("1700000000"));
        headers.insert(
            "x-slack-signature",
            HeaderValue::from_str(&format!("v0={}", sign("right", "v0:1700000000:{}"))).unwrap(),
        );

        assert!(verify_slack_signature(&headers, &body, Some("wrong")).is_err());
    }

    #[test]
    fn bearer_token_matches_expected() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret-token"));
        assert!(verify_bearer_token(&headers, Some("secret-token")).is_ok());
        assert!(verify_bearer_token(&headers, Some("other-token")).is_err());
    }

    #[test]
    fn bearer_token_requires_bearer_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic secret-token"));
        assert!(verify_bearer_token(&headers, Some("secret-token")).is_err());
    }
}
