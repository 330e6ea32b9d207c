use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKER_COUNT: usize = 8;
pub const DEFAULT_POLL_INTERVAL_SECONDS: u32 = 60;
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MONITOR_TIME_BUDGET_SECS: u64 = 300;
pub const DEFAULT_GATEWAY_PORT: u16 = 8089;
pub const DEFAULT_GATEWAY_BIND: &str = "127.0.0.1";

/// Top-level config (monitor.toml + MONITOR_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_poll_interval_seconds")]
    pub default_poll_interval_seconds: u32,
    #[serde(default = "default_adapter_timeout_secs")]
    pub adapter_timeout_secs: u64,
    #[serde(default = "default_monitor_time_budget_secs")]
    pub monitor_time_budget_secs: u64,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            default_poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            adapter_timeout_secs: DEFAULT_ADAPTER_TIMEOUT_SECS,
            monitor_time_budget_secs: DEFAULT_MONITOR_TIME_BUDGET_SECS,
            tick_interval_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_GATEWAY_PORT,
            bind: DEFAULT_GATEWAY_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// AI triage provider credentials. Every field optional — the engine runs
/// fine with none configured, falling back to deterministic heuristics.
///
/// `use_cases` names, per triage use case (e.g. "title", "actionability"),
/// the provider ("groq" | "openai" | "anthropic") that should be tried
/// first for that use case before falling through to the fixed-order
/// Groq → OpenAI → Anthropic list (§4.2's two-stage provider order).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiConfig {
    pub groq: Option<AiProviderConfig>,
    pub openai: Option<AiProviderConfig>,
    pub anthropic: Option<AiProviderConfig>,
    #[serde(default)]
    pub use_cases: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiProviderConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Authentication mode for an incoming webhook source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WebhookAuthMode {
    /// HMAC-SHA256 over the raw request body (Slack-style signing secret).
    HmacSha256,
    /// Static bearer token in the Authorization header.
    BearerToken,
    /// No authentication — use only for internal/trusted networks.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSourceConfig {
    /// Identifier used in the route, e.g. "slack" -> POST /webhooks/slack.
    pub name: String,
    pub secret: Option<String>,
    pub auth_mode: WebhookAuthMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub sources: Vec<WebhookSourceConfig>,
}

fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}
fn default_poll_interval_seconds() -> u32 {
    DEFAULT_POLL_INTERVAL_SECONDS
}
fn default_adapter_timeout_secs() -> u64 {
    DEFAULT_ADAPTER_TIMEOUT_SECS
}
fn default_monitor_time_budget_secs() -> u64 {
    DEFAULT_MONITOR_TIME_BUDGET_SECS
}
fn default_tick_interval_secs() -> u64 {
    1
}
fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}
fn default_gateway_bind() -> String {
    DEFAULT_GATEWAY_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.monitor-engine/monitor.db", home)
}
fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.monitor-engine/monitor.toml", home)
}

impl MonitorConfig {
    /// Load config from a TOML file with MONITOR_* env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: MonitorConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("MONITOR_").split("_"))
            .extract()
            .map_err(|e| crate::error::MonitorError::Config(e.to_string()))?;

        Ok(config)
    }
}
