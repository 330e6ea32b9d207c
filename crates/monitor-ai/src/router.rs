use std::time::Duration;

use crate::provider::{ChatRequest, LlmProvider, ProviderError};

pub struct ProviderSlot {
    pub provider: Box<dyn LlmProvider>,
    pub max_retries: u32,
}

/// Tries each configured provider in order; within a slot, retries up to
/// `max_retries` times with linear backoff, except a rate-limit response
/// moves straight to the next slot instead of retrying the same one.
/// Returns `Unavailable` only once every slot has been exhausted — the
/// triage client treats that the same as "no provider configured".
pub struct ProviderRouter {
    slots: Vec<ProviderSlot>,
}

impl ProviderRouter {
    pub fn new(slots: Vec<ProviderSlot>) -> Self {
        Self { slots }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub async fn send(&self, req: &ChatRequest) -> Result<String, ProviderError> {
        if self.slots.is_empty() {
            return Err(ProviderError::Unavailable("no provider configured".to_string()));
        }

        let mut last_err = None;
        for slot in &self.slots {
            for attempt in 0..=slot.max_retries {
                match slot.provider.send(req).await {
                    Ok(text) => return Ok(text),
                    Err(ProviderError::RateLimited { .. }) => {
                        last_err = Some(ProviderError::Unavailable(format!(
                            "{} rate limited",
                            slot.provider.name()
                        )));
                        break;
                    }
                    Err(e) => {
                        last_err = Some(e);
                        if attempt < slot.max_retries {
                            tokio::time::sleep(Duration::from_millis(200 * (attempt as u64 + 1))).await;
                        }
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("all providers failed".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct AlwaysFail;
    #[async_trait]
    impl LlmProvider for AlwaysFail {
        fn name(&self) -> &str {
            "always-fail"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<String, ProviderError> {
            Err(ProviderError::Api {
                status: 500,
                message: "boom".to_string(),
            })
        }
    }

    struct AlwaysOk {
        calls: Arc<AtomicU32>,
    }
    #[async_trait]
    impl LlmProvider for AlwaysOk {
        fn name(&self) -> &str {
            "always-ok"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("fine".to_string())
        }
    }

    fn sample_req() -> ChatRequest {
        ChatRequest {
            system: "s".to_string(),
            user: "u".to_string(),
            max_tokens: 64,
        }
    }

    #[tokio::test]
    async fn router_falls_back_to_second_provider() {
        let calls = Arc::new(AtomicU32::new(0));
        let router = ProviderRouter::new(vec![
            ProviderSlot {
                provider: Box::new(AlwaysFail),
                max_retries: 0,
            },
            ProviderSlot {
                provider: Box::new(AlwaysOk { calls: calls.clone() }),
                max_retries: 0,
            },
        ]);
        let result = router.send(&sample_req()).await.unwrap();
        assert_eq!(result, "fine");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn router_errors_when_all_fail() {
        let router = ProviderRouter::new(vec![ProviderSlot {
            provider: Box::new(AlwaysFail),
            max_retries: 1,
        }]);
        assert!(router.send(&sample_req()).await.is_err());
    }

    #[tokio::test]
    async fn empty_router_is_unavailable() {
        let router = ProviderRouter::new(vec![]);
        assert!(router.send(&sample_req()).await.is_err());
    }
}
