//! Batch orchestrator — cache lookups, concurrent fan-out, ordered results.
//!
//! 1. Every request is fingerprinted; cache hits are answered immediately.
//! 2. Misses with the same fingerprint are coalesced into one provider call.
//! 3. Each unique miss runs as its own task on a `JoinSet`, gated by a
//!    semaphore so at most `max_concurrency` calls are in flight.
//! 4. Successful payloads are written back to the cache by the task itself.
//! 5. Results land in an index-addressed buffer, so output order always
//!    matches input order no matter which call finishes first.
//!
//! A batch deadline or a cancelled token stops the wait: unfinished slots
//! become `Failed { reason: Cancelled }` and their tasks are aborted. A task
//! that panics fails only the slots it owned, with `Internal`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use relay_core::config::DispatchConfig;
use relay_core::{CallOutcome, ConfigurationError, Fingerprint, Request};
use relay_providers::CallExecutor;

use crate::cache::ResponseCache;

// ─────────────────────────────────────────────
// BatchResult
// ─────────────────────────────────────────────

/// What one input slot resolved to.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchResult {
    /// Served from the cache; no provider was called.
    Cached(serde_json::Value),
    /// Result of a provider call (or of cancellation).
    Outcome(CallOutcome),
}

impl BatchResult {
    pub fn is_cached(&self) -> bool {
        matches!(self, BatchResult::Cached(_))
    }

    /// Response payload for cache hits and successful calls.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            BatchResult::Cached(value) => Some(value),
            BatchResult::Outcome(outcome) => outcome.payload(),
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            BatchResult::Cached(_) => "cached",
            BatchResult::Outcome(outcome) => outcome.status_label(),
        }
    }
}

// ─────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────

pub struct Orchestrator {
    executor: Arc<dyn CallExecutor>,
    cache: Option<Arc<ResponseCache>>,
    max_concurrency: usize,
    deadline: Option<Duration>,
}

impl Orchestrator {
    /// `cache: None` disables caching entirely: no lookups, no writes.
    pub fn new(executor: Arc<dyn CallExecutor>, cache: Option<Arc<ResponseCache>>) -> Self {
        Orchestrator {
            executor,
            cache,
            max_concurrency: DispatchConfig::default().effective_concurrency(),
            deadline: None,
        }
    }

    /// Apply `maxConcurrency` and `batchDeadlineSeconds` from config.
    pub fn with_dispatch_config(self, config: &DispatchConfig) -> Self {
        self.with_max_concurrency(config.effective_concurrency())
            .with_deadline(config.batch_deadline())
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_deref()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run every request; one result per request, in input order.
    pub async fn run_batch(
        &self,
        requests: &[Request],
    ) -> Result<Vec<BatchResult>, ConfigurationError> {
        self.run_batch_until(requests, CancellationToken::new()).await
    }

    /// Like [`run_batch`](Self::run_batch), but stops waiting once `cancel`
    /// fires (or the configured deadline passes).
    ///
    /// Only a [`ConfigurationError`] aborts the batch; any other failure is
    /// confined to its own slot.
    pub async fn run_batch_until(
        &self,
        requests: &[Request],
        cancel: CancellationToken,
    ) -> Result<Vec<BatchResult>, ConfigurationError> {
        let started = Instant::now();
        let mut slots: Vec<Option<BatchResult>> = vec![None; requests.len()];

        // Group misses by fingerprint, keeping first-seen order.
        let mut groups: Vec<(Fingerprint, Vec<usize>)> = Vec::new();
        let mut group_of: HashMap<Fingerprint, usize> = HashMap::new();
        for (index, request) in requests.iter().enumerate() {
            let key = ResponseCache::fingerprint(request);
            if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key)) {
                debug!(index, key = %key, "Cache hit");
                slots[index] = Some(BatchResult::Cached(hit));
                continue;
            }
            match group_of.get(&key) {
                Some(&g) => groups[g].1.push(index),
                None => {
                    group_of.insert(key.clone(), groups.len());
                    groups.push((key, vec![index]));
                }
            }
        }

        let cached = slots.iter().filter(|s| s.is_some()).count();
        debug!(
            total = requests.len(),
            cached,
            calls = groups.len(),
            max_concurrency = self.max_concurrency,
            "Dispatching batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks: JoinSet<Result<CallOutcome, ConfigurationError>> = JoinSet::new();
        // Which input slots each task answers for.
        let mut owners: HashMap<Id, Vec<usize>> = HashMap::new();
        for (key, indices) in groups {
            let request = requests[indices[0]].clone();
            let executor = self.executor.clone();
            let cache = self.cache.clone();
            let semaphore = semaphore.clone();
            let handle = tasks.spawn(async move {
                // The semaphore is never closed, so acquisition only waits.
                let _permit = semaphore.acquire_owned().await.ok();
                let result = executor.execute(&request).await;
                if let (Ok(CallOutcome::Success { payload, .. }), Some(cache)) = (&result, &cache) {
                    cache.insert(key, payload.clone());
                }
                result
            });
            owners.insert(handle.id(), indices);
        }

        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next_with_id() => match joined {
                    None => break,
                    Some(Ok((id, Ok(outcome)))) => {
                        for index in owners.remove(&id).unwrap_or_default() {
                            slots[index] = Some(BatchResult::Outcome(outcome.clone()));
                        }
                    }
                    Some(Ok((_, Err(e)))) => {
                        error!(error = %e, "Configuration error, aborting batch");
                        tasks.abort_all();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        let indices = owners.remove(&e.id()).unwrap_or_default();
                        error!(error = %e, slots = ?indices, "Request task did not complete");
                        for index in indices {
                            slots[index] = Some(BatchResult::Outcome(CallOutcome::panicked()));
                        }
                    }
                },
                _ = cancel.cancelled() => {
                    warn!(pending = tasks.len(), "Batch cancelled");
                    break;
                }
                _ = &mut deadline => {
                    warn!(pending = tasks.len(), "Batch deadline reached");
                    break;
                }
            }
        }
        tasks.abort_all();

        let results: Vec<BatchResult> = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| BatchResult::Outcome(CallOutcome::cancelled())))
            .collect();

        let succeeded = results
            .iter()
            .filter(|r| matches!(r, BatchResult::Outcome(o) if o.is_success()))
            .count();
        info!(
            total = results.len(),
            cached,
            succeeded,
            failed = results.len() - cached - succeeded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );

        Ok(results)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::config::{ProviderConfig, SelectionPolicy};
    use relay_core::FailureReason;
    use relay_providers::{
        CallStats, HttpReply, HttpTransport, NoopObserver, ProviderCall, ProviderRegistry,
        RequestExecutor, Transport, TransportError,
    };
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        orchestrator: Orchestrator,
        cache: Arc<ResponseCache>,
        stats: Arc<CallStats>,
    }

    fn harness(base_url: &str, max_retries: u32, cache_enabled: bool) -> Harness {
        let mut providers = BTreeMap::new();
        providers.insert(
            "mock".to_string(),
            ProviderConfig {
                base_url: base_url.to_string(),
                credentials: vec!["test-key".to_string()],
                max_retries,
                ..Default::default()
            },
        );
        let registry = ProviderRegistry::seeded(providers, SelectionPolicy::Random, 0).unwrap();
        let stats = Arc::new(CallStats::new());
        let executor = RequestExecutor::new(
            Arc::new(registry),
            Arc::new(HttpTransport::new()),
            stats.clone(),
        )
        .with_retry_backoff(Duration::from_millis(10));
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60)));
        let orchestrator = Orchestrator::new(
            Arc::new(executor),
            cache_enabled.then(|| cache.clone()),
        )
        .with_max_concurrency(8);
        Harness {
            orchestrator,
            cache,
            stats,
        }
    }

    fn body_for(prompt: &str) -> serde_json::Value {
        json!({"messages": [{"role": "user", "content": prompt}]})
    }

    /// Answer `{"answer": prompt}` for requests whose only message is `prompt`.
    async fn mount_answer(server: &MockServer, prompt: &str, delay: Duration, expect: u64) {
        Mock::given(method("POST"))
            .and(body_json(body_for(prompt)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"answer": prompt}))
                    .set_delay(delay),
            )
            .expect(expect)
            .mount(server)
            .await;
    }

    fn answers(results: &[BatchResult]) -> Vec<Option<String>> {
        results
            .iter()
            .map(|r| {
                r.payload()
                    .and_then(|p| p["answer"].as_str())
                    .map(String::from)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let h = harness("http://127.0.0.1:1", 1, true);
        let results = h.orchestrator.run_batch(&[]).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let server = MockServer::start().await;
        mount_answer(&server, "A", Duration::ZERO, 1).await;
        mount_answer(&server, "B", Duration::from_millis(300), 1).await;
        mount_answer(&server, "C", Duration::ZERO, 1).await;

        let h = harness(&server.uri(), 1, true);
        let batch = vec![
            Request::from_prompt("A"),
            Request::from_prompt("B"),
            Request::from_prompt("C"),
        ];
        let results = h.orchestrator.run_batch(&batch).await.unwrap();

        assert_eq!(
            answers(&results),
            vec![Some("A".into()), Some("B".into()), Some("C".into())]
        );
        assert!(results.iter().all(|r| r.status_label() == "success"));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), 3, true);
        let request = Request::from_prompt("cached already");
        h.cache
            .insert(ResponseCache::fingerprint(&request), json!({"answer": "from cache"}));

        let results = h.orchestrator.run_batch(&[request]).await.unwrap();

        assert_eq!(results, vec![BatchResult::Cached(json!({"answer": "from cache"}))]);
        assert_eq!(h.stats.total_attempts(), 0);
    }

    #[tokio::test]
    async fn test_success_is_cached_for_next_batch() {
        let server = MockServer::start().await;
        mount_answer(&server, "once", Duration::ZERO, 1).await;

        let h = harness(&server.uri(), 1, true);
        let batch = vec![Request::from_prompt("once")];

        let first = h.orchestrator.run_batch(&batch).await.unwrap();
        assert_eq!(first[0].status_label(), "success");

        let second = h.orchestrator.run_batch(&batch).await.unwrap();
        assert_eq!(second, vec![BatchResult::Cached(json!({"answer": "once"}))]);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_not_cached() {
        let server = MockServer::start().await;
        mount_answer(&server, "A", Duration::ZERO, 1).await;
        Mock::given(method("POST"))
            .and(body_json(body_for("B")))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;
        mount_answer(&server, "C", Duration::ZERO, 1).await;

        let h = harness(&server.uri(), 2, true);
        let batch = vec![
            Request::from_prompt("A"),
            Request::from_prompt("B"),
            Request::from_prompt("C"),
        ];
        let results = h.orchestrator.run_batch(&batch).await.unwrap();

        assert_eq!(answers(&results), vec![Some("A".into()), None, Some("C".into())]);
        match &results[1] {
            BatchResult::Outcome(CallOutcome::Failed { reason, .. }) => {
                assert_eq!(reason, &FailureReason::Http { status: 500, body: String::new() });
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(h.cache.get(&batch[1].fingerprint()).is_none());
        assert!(h.cache.get(&batch[0].fingerprint()).is_some());
    }

    #[tokio::test]
    async fn test_rate_limited_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), 5, true);
        let request = Request::from_prompt("busy");
        let results = h.orchestrator.run_batch(&[request.clone()]).await.unwrap();

        assert_eq!(
            results,
            vec![BatchResult::Outcome(CallOutcome::RateLimited { provider: "mock".into() })]
        );
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_provider_does_not_raise() {
        let h = harness("http://127.0.0.1:1", 2, true);
        let batch = vec![Request::from_prompt("x"), Request::from_prompt("y")];
        let results = h.orchestrator.run_batch(&batch).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status_label() == "failed"));
    }

    #[tokio::test]
    async fn test_identical_requests_share_one_call() {
        let server = MockServer::start().await;
        mount_answer(&server, "same", Duration::from_millis(50), 1).await;
        mount_answer(&server, "other", Duration::ZERO, 1).await;

        let h = harness(&server.uri(), 1, true);
        let batch = vec![
            Request::from_prompt("same"),
            Request::from_prompt("other"),
            Request::from_prompt("same"),
        ];
        let results = h.orchestrator.run_batch(&batch).await.unwrap();

        assert_eq!(
            answers(&results),
            vec![Some("same".into()), Some("other".into()), Some("same".into())]
        );
        assert_eq!(h.stats.total_attempts(), 2);
    }

    #[tokio::test]
    async fn test_cache_disabled_always_calls() {
        let server = MockServer::start().await;
        mount_answer(&server, "again", Duration::ZERO, 2).await;

        let h = harness(&server.uri(), 1, false);
        let batch = vec![Request::from_prompt("again")];
        h.orchestrator.run_batch(&batch).await.unwrap();
        let second = h.orchestrator.run_batch(&batch).await.unwrap();

        assert_eq!(second[0].status_label(), "success");
        assert!(h.orchestrator.cache().is_none());
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_cap_serializes_calls() {
        let server = MockServer::start().await;
        for p in ["1", "2", "3"] {
            mount_answer(&server, p, Duration::from_millis(100), 1).await;
        }

        let h = harness(&server.uri(), 1, true);
        let orchestrator = h.orchestrator.with_max_concurrency(1);
        let batch: Vec<Request> = ["1", "2", "3"].into_iter().map(Request::from_prompt).collect();

        let started = Instant::now();
        let results = orchestrator.run_batch(&batch).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(
            answers(&results),
            vec![Some("1".into()), Some("2".into()), Some("3".into())]
        );
    }

    #[tokio::test]
    async fn test_calls_run_concurrently() {
        let server = MockServer::start().await;
        for p in ["1", "2", "3", "4"] {
            mount_answer(&server, p, Duration::from_millis(300), 1).await;
        }

        let h = harness(&server.uri(), 1, true);
        let batch: Vec<Request> = ["1", "2", "3", "4"].into_iter().map(Request::from_prompt).collect();

        let started = Instant::now();
        let results = h.orchestrator.run_batch(&batch).await.unwrap();

        assert!(results.iter().all(|r| r.status_label() == "success"));
        assert!(started.elapsed() < Duration::from_millis(1200));
    }

    #[tokio::test]
    async fn test_deadline_cancels_slow_slots() {
        let server = MockServer::start().await;
        mount_answer(&server, "fast", Duration::ZERO, 1).await;
        Mock::given(method("POST"))
            .and(body_json(body_for("slow")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"answer": "slow"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let h = harness(&server.uri(), 1, true);
        let orchestrator = h.orchestrator.with_deadline(Some(Duration::from_millis(300)));
        let batch = vec![Request::from_prompt("fast"), Request::from_prompt("slow")];

        let started = Instant::now();
        let results = orchestrator.run_batch(&batch).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(results[0].payload(), Some(&json!({"answer": "fast"})));
        assert_eq!(results[1], BatchResult::Outcome(CallOutcome::cancelled()));
    }

    #[tokio::test]
    async fn test_cancellation_token_stops_waiting() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let h = harness(&server.uri(), 1, true);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let batch = vec![Request::from_prompt("a"), Request::from_prompt("b")];
        let results = h.orchestrator.run_batch_until(&batch, token).await.unwrap();

        assert_eq!(
            results,
            vec![
                BatchResult::Outcome(CallOutcome::cancelled()),
                BatchResult::Outcome(CallOutcome::cancelled()),
            ]
        );
    }

    /// Answers `{"answer": prompt}`; panics on "boom", stalls on "slow".
    struct ScriptedTransport;

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post(&self, call: ProviderCall<'_>) -> Result<HttpReply, TransportError> {
            let prompt = call.body["messages"][0]["content"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            match prompt.as_str() {
                "boom" => panic!("transport blew up"),
                "slow" => tokio::time::sleep(Duration::from_secs(5)).await,
                _ => {}
            }
            Ok(HttpReply {
                status: 200,
                body: json!({"answer": prompt}).to_string(),
            })
        }
    }

    fn scripted_orchestrator() -> Orchestrator {
        let mut providers = BTreeMap::new();
        providers.insert(
            "mock".to_string(),
            ProviderConfig {
                base_url: "http://scripted".to_string(),
                credentials: vec!["test-key".to_string()],
                max_retries: 1,
                ..Default::default()
            },
        );
        let registry = ProviderRegistry::seeded(providers, SelectionPolicy::Random, 0).unwrap();
        let executor = RequestExecutor::new(
            Arc::new(registry),
            Arc::new(ScriptedTransport),
            Arc::new(NoopObserver),
        );
        Orchestrator::new(Arc::new(executor), None).with_max_concurrency(4)
    }

    #[tokio::test]
    async fn test_panicking_task_fails_only_its_slots() {
        let orchestrator = scripted_orchestrator();
        let batch = vec![
            Request::from_prompt("a"),
            Request::from_prompt("boom"),
            Request::from_prompt("b"),
            Request::from_prompt("boom"),
        ];
        let results = orchestrator.run_batch(&batch).await.unwrap();

        assert_eq!(
            answers(&results),
            vec![Some("a".into()), None, Some("b".into()), None]
        );
        assert_eq!(results[1], BatchResult::Outcome(CallOutcome::panicked()));
        assert_eq!(results[3], BatchResult::Outcome(CallOutcome::panicked()));
    }

    #[tokio::test]
    async fn test_panic_is_not_reported_as_cancelled_after_deadline() {
        let orchestrator =
            scripted_orchestrator().with_deadline(Some(Duration::from_millis(300)));
        let batch = vec![Request::from_prompt("boom"), Request::from_prompt("slow")];
        let results = orchestrator.run_batch(&batch).await.unwrap();

        match &results[0] {
            BatchResult::Outcome(CallOutcome::Failed { reason, .. }) => {
                assert!(matches!(reason, FailureReason::Internal(_)));
            }
            other => panic!("expected internal failure, got {other:?}"),
        }
        assert_eq!(results[1], BatchResult::Outcome(CallOutcome::cancelled()));
    }

    /// Fails the whole setup for "misconfigured", answers everything else.
    struct StrictExecutor;

    #[async_trait]
    impl CallExecutor for StrictExecutor {
        async fn execute(&self, request: &Request) -> Result<CallOutcome, ConfigurationError> {
            match request.last_user_content() {
                Some("misconfigured") => {
                    Err(ConfigurationError::UnknownProvider("ghost".to_string()))
                }
                _ => Ok(CallOutcome::Success {
                    provider: "stub".to_string(),
                    payload: json!({}),
                    latency: Duration::ZERO,
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_configuration_error_aborts_batch() {
        let orchestrator = Orchestrator::new(Arc::new(StrictExecutor), None);
        let batch = vec![
            Request::from_prompt("fine"),
            Request::from_prompt("misconfigured"),
            Request::from_prompt("also fine"),
        ];

        let err = orchestrator.run_batch(&batch).await.unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownProvider("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_configuration_error_leaves_cache_untouched() {
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60)));
        let orchestrator = Orchestrator::new(Arc::new(StrictExecutor), Some(cache.clone()));

        let ok = orchestrator
            .run_batch(&[Request::from_prompt("fine")])
            .await
            .unwrap();
        assert_eq!(ok[0].status_label(), "success");

        assert!(orchestrator
            .run_batch(&[Request::from_prompt("misconfigured")])
            .await
            .is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_dispatch_config_applies() {
        let h = harness("http://127.0.0.1:1", 1, true);
        let config = DispatchConfig {
            max_concurrency: 3,
            batch_deadline_seconds: Some(10),
            ..Default::default()
        };
        let orchestrator = h.orchestrator.with_dispatch_config(&config);
        assert_eq!(orchestrator.max_concurrency(), 3);
        assert_eq!(orchestrator.deadline, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let h = harness("http://127.0.0.1:1", 1, true);
        assert_eq!(h.orchestrator.with_max_concurrency(0).max_concurrency(), 1);
    }
}
