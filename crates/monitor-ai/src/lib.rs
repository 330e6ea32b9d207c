pub mod fallback;
pub mod provider;
pub mod providers;
pub mod router;
pub mod triage;

pub use provider::{ChatRequest, LlmProvider, ProviderError};
pub use providers::{build_router, build_single_provider_router};
pub use router::{ProviderRouter, ProviderSlot};
pub use triage::TriageClient;
