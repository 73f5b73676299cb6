//! Client to local inference-server processes: per-tier deadlines, linear
//! retry backoff, and early abandonment once the deadline has passed.

pub mod client;
pub mod error;

pub use client::{GenerationRequest, GenerationResponse, Generator, HttpGenerator};
pub use error::{InferenceError, InferenceResult};

use orc_kernel::settings::TierInferenceSettings;
use std::time::{Duration, Instant};
use tracing::warn;

pub struct InferenceClient<G: Generator> {
    generator: G,
}

impl<G: Generator> InferenceClient<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Call the model, retrying transient failures with linear backoff
    /// until either the tier's `max_retries` is exhausted, a fatal error is
    /// returned, or the tier's `deadline_ms` elapses — whichever comes
    /// first. Retries never fire after the deadline has passed even if
    /// attempts remain.
    pub async fn generate(
        &self,
        req: &GenerationRequest,
        settings: &TierInferenceSettings,
    ) -> InferenceResult<GenerationResponse> {
        let deadline = Instant::now() + Duration::from_millis(settings.deadline_ms);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(InferenceError::Deadline { attempts: attempt - 1 });
            }

            let call = tokio::time::timeout(remaining, self.generator.generate(req)).await;
            let outcome = match call {
                Ok(result) => result,
                Err(_elapsed) => Err(InferenceError::Deadline { attempts: attempt }),
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(InferenceError::Deadline { attempts }) => {
                    return Err(InferenceError::Deadline { attempts })
                }
                Err(err) if !err.is_retryable() || attempt > settings.max_retries => {
                    return Err(err);
                }
                Err(err) => {
                    warn!(attempt, %err, "transient inference error, retrying");
                    let backoff = Duration::from_millis(settings.retry_backoff_ms * attempt as u64);
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(InferenceError::Deadline { attempts: attempt });
                    }
                    tokio::time::sleep(backoff.min(remaining)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyGenerator {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Generator for FlakyGenerator {
        async fn generate(&self, _req: &GenerationRequest) -> InferenceResult<GenerationResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err(InferenceError::Transient("connection reset".to_string()));
            }
            Ok(GenerationResponse {
                text: "ok".to_string(),
                tokens_generated: Some(1),
            })
        }
    }

    struct FatalGenerator;

    #[async_trait]
    impl Generator for FatalGenerator {
        async fn generate(&self, _req: &GenerationRequest) -> InferenceResult<GenerationResponse> {
            Err(InferenceError::Fatal("bad request".to_string()))
        }
    }

    fn req() -> GenerationRequest {
        GenerationRequest {
            port: 38001,
            prompt: "hi".to_string(),
            max_tokens: 64,
            temperature: 0.7,
        }
    }

    fn settings() -> TierInferenceSettings {
        TierInferenceSettings {
            deadline_ms: 2_000,
            max_retries: 3,
            retry_backoff_ms: 5,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_retry_budget() {
        let client = InferenceClient::new(FlakyGenerator {
            fail_times: 2,
            calls: AtomicU32::new(0),
        });
        let resp = client.generate(&req(), &settings()).await.unwrap();
        assert_eq!(resp.text, "ok");
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let client = InferenceClient::new(FatalGenerator);
        let err = client.generate(&req(), &settings()).await.unwrap_err();
        assert!(matches!(err, InferenceError::Fatal(_)));
    }

    #[tokio::test]
    async fn exhausting_retries_surfaces_last_transient_error() {
        let client = InferenceClient::new(FlakyGenerator {
            fail_times: 100,
            calls: AtomicU32::new(0),
        });
        let mut s = settings();
        s.max_retries = 1;
        let err = client.generate(&req(), &s).await.unwrap_err();
        assert!(matches!(err, InferenceError::Transient(_)));
    }

    #[tokio::test]
    async fn zero_deadline_abandons_immediately() {
        let client = InferenceClient::new(FlakyGenerator {
            fail_times: 0,
            calls: AtomicU32::new(0),
        });
        let mut s = settings();
        s.deadline_ms = 0;
        let err = client.generate(&req(), &s).await.unwrap_err();
        assert!(matches!(err, InferenceError::Deadline { .. }));
    }
}
