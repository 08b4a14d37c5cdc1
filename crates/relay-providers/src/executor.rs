//! Request executor — one request, one provider, bounded retries.
//!
//! Classification per attempt:
//!
//! | reply                         | action                                    |
//! |-------------------------------|-------------------------------------------|
//! | 2xx, JSON body                | `Success`                                 |
//! | 429                           | `RateLimited`, no further attempts        |
//! | other status                  | retry immediately, `Failed` on last try   |
//! | 2xx non-JSON / transport error | sleep backoff, retry, `Failed` on last try |
//!
//! Every attempt is reported to the [`CallObserver`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error, warn};

use relay_core::utils::truncate_string;
use relay_core::{CallOutcome, ConfigurationError, FailureReason, Request};

use crate::observer::{CallEvent, OutcomeStatus};
use crate::registry::ProviderRegistry;
use crate::traits::{CallExecutor, CallObserver, Transport};
use crate::transport::ProviderCall;

/// Pause after a network-level failure or unreadable body before the next attempt.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Error bodies are kept in outcomes, but only this many characters of them.
const MAX_ERROR_BODY_CHARS: usize = 500;

pub struct RequestExecutor {
    registry: Arc<ProviderRegistry>,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn CallObserver>,
    retry_backoff: Duration,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("registry", &self.registry)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

impl RequestExecutor {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn CallObserver>,
    ) -> Self {
        RequestExecutor {
            registry,
            transport,
            observer,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Send `request` to one selected provider.
    ///
    /// Per-request failures come back as `Ok(CallOutcome::Failed | RateLimited)`.
    /// `Err` is reserved for configuration mismatches and should abort the caller.
    pub async fn execute(&self, request: &Request) -> Result<CallOutcome, ConfigurationError> {
        let provider = self.registry.select().to_string();
        let config = self.registry.config_for(&provider)?;
        let url = self.registry.endpoint(config);
        let max_attempts = config.max_retries;

        let mut attempt = 0;
        while attempt < max_attempts {
            attempt += 1;
            let final_attempt = attempt >= max_attempts;
            let started = Instant::now();

            let body = self.registry.build_payload(config, request);
            let credential = self
                .registry
                .credential(config)
                .ok_or_else(|| ConfigurationError::EmptyCredentials(provider.clone()))?;

            debug!(provider = %provider, attempt, max_attempts, "Calling provider");

            let result = self
                .transport
                .post(ProviderCall {
                    url: &url,
                    credential,
                    headers: config.headers.as_ref(),
                    body: &body,
                    timeout: config.timeout(),
                })
                .await;
            let latency = started.elapsed();

            let reason = match result {
                Ok(reply) if reply.is_success() => {
                    match serde_json::from_str::<serde_json::Value>(&reply.body) {
                        Ok(payload) => {
                            self.observe(&provider, OutcomeStatus::Success, latency, attempt);
                            return Ok(CallOutcome::Success {
                                provider,
                                payload,
                                latency,
                            });
                        }
                        Err(e) => {
                            self.observe(&provider, OutcomeStatus::Failed, latency, attempt);
                            let reason = FailureReason::InvalidBody(e.to_string());
                            if final_attempt {
                                return Ok(self.failed(provider, reason, latency, attempt));
                            }
                            warn!(
                                provider = %provider,
                                attempt,
                                %reason,
                                "Unreadable response body, backing off"
                            );
                            tokio::time::sleep(self.retry_backoff).await;
                            continue;
                        }
                    }
                }
                Ok(reply) if reply.is_rate_limited() => {
                    self.observe(&provider, OutcomeStatus::RateLimited, latency, attempt);
                    warn!(provider = %provider, attempt, "Rate limited, giving up on this request");
                    return Ok(CallOutcome::RateLimited { provider });
                }
                Ok(reply) => FailureReason::Http {
                    status: reply.status,
                    body: truncate_string(&reply.body, MAX_ERROR_BODY_CHARS),
                },
                Err(e) => {
                    self.observe(&provider, OutcomeStatus::Failed, latency, attempt);
                    let reason = FailureReason::Transport(e.to_string());
                    if final_attempt {
                        return Ok(self.failed(provider, reason, latency, attempt));
                    }
                    warn!(provider = %provider, attempt, error = %e, "Transport error, backing off");
                    tokio::time::sleep(self.retry_backoff).await;
                    continue;
                }
            };

            self.observe(&provider, OutcomeStatus::Failed, latency, attempt);
            if final_attempt {
                return Ok(self.failed(provider, reason, latency, attempt));
            }
            warn!(provider = %provider, attempt, %reason, "Provider error, retrying");
        }

        // Only reachable when the budget allows no attempt at all.
        Ok(self.failed(
            provider,
            FailureReason::Exhausted { attempts: attempt },
            Duration::ZERO,
            attempt,
        ))
    }

    fn observe(&self, provider: &str, status: OutcomeStatus, latency: Duration, attempt: u32) {
        self.observer.record(&CallEvent {
            provider,
            status,
            latency,
            attempt,
        });
    }

    fn failed(
        &self,
        provider: String,
        reason: FailureReason,
        latency: Duration,
        attempts: u32,
    ) -> CallOutcome {
        error!(provider = %provider, attempts, %reason, "Request failed");
        CallOutcome::Failed {
            provider: Some(provider),
            reason,
            latency,
        }
    }
}

#[async_trait]
impl CallExecutor for RequestExecutor {
    async fn execute(&self, request: &Request) -> Result<CallOutcome, ConfigurationError> {
        RequestExecutor::execute(self, request).await
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
