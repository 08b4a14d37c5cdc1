//! Seams of the provider layer: the network, the metrics sink, and the
//! per-request executor the orchestrator drives.

use async_trait::async_trait;

use relay_core::{CallOutcome, ConfigurationError, Request};

use crate::observer::CallEvent;
use crate::transport::{HttpReply, ProviderCall, TransportError};

/// Sends one HTTP request to a provider.
///
/// Implementations report every HTTP status as `Ok`; only failures below HTTP
/// (connect, DNS, timeout, broken body stream) are `Err`. Classification of
/// statuses belongs to the executor.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, call: ProviderCall<'_>) -> Result<HttpReply, TransportError>;
}

/// Receives one event per call attempt.
///
/// Called from concurrent tasks; implementations synchronize internally and
/// must not block for long.
pub trait CallObserver: Send + Sync {
    fn record(&self, event: &CallEvent<'_>);
}

/// Runs one request to a final outcome.
///
/// `Err` means the provider setup itself is unusable and the whole batch
/// should stop; every per-request failure is an `Ok` outcome.
#[async_trait]
pub trait CallExecutor: Send + Sync {
    async fn execute(&self, request: &Request) -> Result<CallOutcome, ConfigurationError>;
}
