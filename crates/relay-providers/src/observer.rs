//! Per-attempt observability.
//!
//! The executor reports `(provider, status, latency)` for every attempt to an
//! injected [`CallObserver`]. Nothing here is global: [`CallStats`] is an
//! ordinary value owned by whoever wants the numbers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::traits::CallObserver;

/// Result class of one attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutcomeStatus {
    Success,
    RateLimited,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::RateLimited => "rate_limited",
            OutcomeStatus::Failed => "failed",
        }
    }
}

/// One attempt against one provider.
#[derive(Clone, Copy, Debug)]
pub struct CallEvent<'a> {
    pub provider: &'a str,
    pub status: OutcomeStatus,
    pub latency: Duration,
    /// 1-based attempt number within the request.
    pub attempt: u32,
}

// ─────────────────────────────────────────────
// Simple observers
// ─────────────────────────────────────────────

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl CallObserver for NoopObserver {
    fn record(&self, _event: &CallEvent<'_>) {}
}

/// Emits each event as a structured `tracing` event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl CallObserver for TracingObserver {
    fn record(&self, event: &CallEvent<'_>) {
        let latency_ms = event.latency.as_millis() as u64;
        match event.status {
            OutcomeStatus::Success => debug!(
                provider = event.provider,
                attempt = event.attempt,
                latency_ms,
                status = event.status.as_str(),
                "provider call"
            ),
            _ => warn!(
                provider = event.provider,
                attempt = event.attempt,
                latency_ms,
                status = event.status.as_str(),
                "provider call"
            ),
        }
    }
}

/// Forwards every event to each inner observer, in order.
#[derive(Clone, Default)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn CallObserver>>,
}

impl FanoutObserver {
    pub fn new(observers: Vec<Arc<dyn CallObserver>>) -> Self {
        FanoutObserver { observers }
    }
}

impl CallObserver for FanoutObserver {
    fn record(&self, event: &CallEvent<'_>) {
        for observer in &self.observers {
            observer.record(event);
        }
    }
}

// ─────────────────────────────────────────────
// CallStats — counters + latency histogram
// ─────────────────────────────────────────────

/// Histogram bucket upper bounds in seconds.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Aggregated numbers for one provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProviderStats {
    pub success: u64,
    pub rate_limited: u64,
    pub failed: u64,
    /// Sum of all attempt latencies.
    pub latency_total: Duration,
    pub latency_max: Duration,
    /// Cumulative counts per [`LATENCY_BUCKETS`] bound; the final slot is `+Inf`.
    pub buckets: Vec<u64>,
}

impl ProviderStats {
    pub fn attempts(&self) -> u64 {
        self.success + self.rate_limited + self.failed
    }

    pub fn mean_latency(&self) -> Duration {
        match self.attempts() {
            0 => Duration::ZERO,
            n => self.latency_total / n as u32,
        }
    }

    fn observe(&mut self, status: OutcomeStatus, latency: Duration) {
        match status {
            OutcomeStatus::Success => self.success += 1,
            OutcomeStatus::RateLimited => self.rate_limited += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.latency_total += latency;
        self.latency_max = self.latency_max.max(latency);

        if self.buckets.is_empty() {
            self.buckets = vec![0; LATENCY_BUCKETS.len() + 1];
        }
        let secs = latency.as_secs_f64();
        for (slot, bound) in LATENCY_BUCKETS.iter().enumerate() {
            if secs <= *bound {
                self.buckets[slot] += 1;
            }
        }
        self.buckets[LATENCY_BUCKETS.len()] += 1;
    }
}

/// In-memory per-provider counters and latency histogram.
#[derive(Debug, Default)]
pub struct CallStats {
    inner: Mutex<BTreeMap<String, ProviderStats>>,
}

impl CallStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current numbers, keyed by provider name.
    pub fn snapshot(&self) -> BTreeMap<String, ProviderStats> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Total attempts recorded across all providers.
    pub fn total_attempts(&self) -> u64 {
        self.snapshot().values().map(ProviderStats::attempts).sum()
    }
}

impl CallObserver for CallStats {
    fn record(&self, event: &CallEvent<'_>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .entry(event.provider.to_string())
            .or_default()
            .observe(event.status, event.latency);
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
