use thiserror::Error;

/// The seven-kind taxonomy every adapter, the engine, and the processor
/// report through. The `code()` string is what an admin UI reads off a
/// monitor's `last_error`.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("provider transient error: {0}")]
    ProviderTransient(String),

    #[error("provider permanent error: {0}")]
    ProviderPermanent(String),

    #[error("adapter enrichment failed: {0}")]
    AdapterEnrichmentFailure(String),

    #[error("triage failed: {0}")]
    TriageFailure(String),

    #[error("duplicate event")]
    DuplicateEvent,

    #[error("storage error: {0}")]
    StorageFatal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid monitor config: {0}")]
    InvalidConfig(String),

    #[error("poll timeout")]
    PollTimeout,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MonitorError {
    /// Short code persisted nowhere but useful for log fields and admin APIs.
    pub fn code(&self) -> &'static str {
        match self {
            MonitorError::ConnectionUnavailable(_) => "CONNECTION_UNAVAILABLE",
            MonitorError::ProviderTransient(_) => "PROVIDER_TRANSIENT",
            MonitorError::ProviderPermanent(_) => "PROVIDER_PERMANENT",
            MonitorError::AdapterEnrichmentFailure(_) => "ADAPTER_ENRICHMENT_FAILURE",
            MonitorError::TriageFailure(_) => "TRIAGE_FAILURE",
            MonitorError::DuplicateEvent => "DUPLICATE_EVENT",
            MonitorError::StorageFatal(_) => "STORAGE_FATAL",
            MonitorError::Config(_) => "CONFIG_ERROR",
            MonitorError::InvalidConfig(_) => "INVALID_CONFIG",
            MonitorError::PollTimeout => "POLL_TIMEOUT",
            MonitorError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether this kind should cause the engine to retry on the next tick
    /// (transient) or wait for admin intervention (permanent/config).
    pub fn is_retryable(&self) -> bool {
        matches!(self, MonitorError::ProviderTransient(_) | MonitorError::PollTimeout)
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
