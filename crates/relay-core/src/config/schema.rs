//! Configuration schema.
//!
//! Hierarchy: `Config` → `providers` (name → `ProviderConfig`), `CacheConfig`,
//! `DispatchConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.llm-relay/config.json` + env vars.
///
/// Read-only once loaded; nothing in the dispatch path mutates it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Providers keyed by name. A `BTreeMap` keeps iteration order stable,
    /// which seeded provider selection relies on.
    pub providers: BTreeMap<String, ProviderConfig>,
    pub cache: CacheConfig,
    pub dispatch: DispatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert("dify".to_string(), ProviderConfig::dify());
        Self {
            providers,
            cache: CacheConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

pub const DEFAULT_PATH: &str = "/chat/completions";

/// Connection settings for one remote LLM endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// Base URL, e.g. `"https://api.openai.com/v1"`.
    pub base_url: String,
    /// Sub-path appended to `base_url`. Defaults to `/chat/completions`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Bearer credentials; one is picked per attempt.
    pub credentials: Vec<String>,
    /// Per-call timeout.
    pub timeout_seconds: u64,
    /// Total attempts allowed per request (not "retries after the first").
    pub max_retries: u32,
    /// JSON body template. `"{{messages}}"` and `"{{prompt}}"` are substituted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<serde_json::Value>,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            path: None,
            credentials: Vec::new(),
            timeout_seconds: 15,
            max_retries: 3,
            template: None,
            headers: None,
        }
    }
}

impl ProviderConfig {
    /// A Dify chat app in blocking mode, the default shipped provider.
    pub fn dify() -> Self {
        Self {
            base_url: "https://api.dify.ai/v1".to_string(),
            path: Some("/chat-messages".to_string()),
            template: Some(serde_json::json!({
                "inputs": {},
                "query": "{{prompt}}",
                "response_mode": "blocking",
                "conversation_id": "",
                "user": "1"
            })),
            ..Default::default()
        }
    }

    /// Whether this provider has at least one usable credential.
    pub fn is_configured(&self) -> bool {
        self.credentials.iter().any(|c| !c.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// The sub-path, falling back to [`DEFAULT_PATH`].
    pub fn path_or_default(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_PATH)
    }
}

// ─────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

// ─────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────

/// How a provider is picked for each request.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SelectionPolicy {
    /// Uniformly random among all configured providers.
    #[default]
    Random,
    /// Cycle through providers in name order.
    RoundRobin,
}

/// Orchestrator and executor tuning.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchConfig {
    /// Maximum provider calls in flight. `0` means "number of CPUs".
    pub max_concurrency: usize,
    /// Give up on unfinished requests after this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_deadline_seconds: Option<u64>,
    /// Fixed pause after a network-level failure before the next attempt.
    pub retry_backoff_millis: u64,
    pub selection: SelectionPolicy,
    /// Seed for provider and credential selection. Unseeded uses OS entropy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            batch_deadline_seconds: None,
            retry_backoff_millis: 1000,
            selection: SelectionPolicy::Random,
            seed: None,
        }
    }
}

impl DispatchConfig {
    /// Concurrency cap with `0` resolved to the available parallelism.
    pub fn effective_concurrency(&self) -> usize {
        if self.max_concurrency > 0 {
            return self.max_concurrency;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_millis)
    }

    pub fn batch_deadline(&self) -> Option<Duration> {
        self.batch_deadline_seconds.map(Duration::from_secs)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
