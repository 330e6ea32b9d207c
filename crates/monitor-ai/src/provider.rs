use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// A single use-case prompt: one system instruction plus the user content
/// (message text, optional thread context already flattened to plain text).
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// Stateless chat-completion facade every configured AI provider implements.
/// `monitor-ai`'s `TriageClient` is the only caller; it never talks to
/// `reqwest` directly.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Sends one request, returns the raw assistant text.
    async fn send(&self, req: &ChatRequest) -> Result<String, ProviderError>;
}
