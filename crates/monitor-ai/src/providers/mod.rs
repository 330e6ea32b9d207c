pub mod anthropic;
pub mod groq;
pub mod openai;
pub mod openai_compat;

use monitor_core::config::AiConfig;

use crate::router::{ProviderRouter, ProviderSlot};

const DEFAULT_MAX_RETRIES: u32 = 2;

/// Builds a router over every configured provider in the fixed preference
/// order Groq → OpenAI → Anthropic (§4.2), skipping any provider whose
/// credentials are absent. An all-unconfigured `AiConfig` yields an empty
/// router, which `TriageClient` treats identically to "every call failed".
pub fn build_router(config: &AiConfig) -> ProviderRouter {
    let mut slots = Vec::new();

    if let Some(groq) = &config.groq {
        slots.push(ProviderSlot {
            provider: Box::new(groq::groq_provider(
                groq.api_key.clone(),
                groq.base_url.clone(),
                groq.model.clone(),
            )),
            max_retries: DEFAULT_MAX_RETRIES,
        });
    }
    if let Some(openai) = &config.openai {
        slots.push(ProviderSlot {
            provider: Box::new(openai::openai_provider(
                openai.api_key.clone(),
                openai.base_url.clone(),
                openai.model.clone(),
            )),
            max_retries: DEFAULT_MAX_RETRIES,
        });
    }
    if let Some(anthropic) = &config.anthropic {
        slots.push(ProviderSlot {
            provider: Box::new(anthropic::AnthropicProvider::new(
                anthropic.api_key.clone(),
                anthropic.base_url.clone(),
                anthropic.model.clone(),
            )),
            max_retries: DEFAULT_MAX_RETRIES,
        });
    }

    ProviderRouter::new(slots)
}

/// Builds a single-slot router over the named provider ("groq" | "openai" |
/// "anthropic"), or `None` if that provider has no credentials configured.
/// Used to try a per-use-case configured provider first (§4.2) before
/// falling through to `build_router`'s fixed-order list.
pub fn build_single_provider_router(config: &AiConfig, provider_name: &str) -> Option<ProviderRouter> {
    let slot = match provider_name {
        "groq" => config.groq.as_ref().map(|groq| ProviderSlot {
            provider: Box::new(groq::groq_provider(
                groq.api_key.clone(),
                groq.base_url.clone(),
                groq.model.clone(),
            )) as Box<_>,
            max_retries: DEFAULT_MAX_RETRIES,
        }),
        "openai" => config.openai.as_ref().map(|openai| ProviderSlot {
            provider: Box::new(openai::openai_provider(
                openai.api_key.clone(),
                openai.base_url.clone(),
                openai.model.clone(),
            )) as Box<_>,
            max_retries: DEFAULT_MAX_RETRIES,
        }),
        "anthropic" => config.anthropic.as_ref().map(|anthropic| ProviderSlot {
            provider: Box::new(anthropic::AnthropicProvider::new(
                anthropic.api_key.clone(),
                anthropic.base_url.clone(),
                anthropic.model.clone(),
            )) as Box<_>,
            max_retries: DEFAULT_MAX_RETRIES,
        }),
        _ => None,
    }?;
    Some(ProviderRouter::new(vec![slot]))
}
