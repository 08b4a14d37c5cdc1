//! Provider registry — the configured provider set and how one is chosen.
//!
//! Configs are validated once at construction and never mutated afterwards,
//! so concurrent readers need no synchronization. The only interior state is
//! the selection RNG (and the round-robin cursor), both of which are owned by
//! the registry so a seed makes every choice reproducible.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use relay_core::config::{Config, ProviderConfig, SelectionPolicy};
use relay_core::{ConfigurationError, Request};

use crate::template;

pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderConfig>,
    /// Provider names in `BTreeMap` order; indexes into this drive selection.
    names: Vec<String>,
    policy: SelectionPolicy,
    rng: Mutex<StdRng>,
    cursor: AtomicUsize,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names)
            .field("policy", &self.policy)
            .finish()
    }
}

impl ProviderRegistry {
    /// Build a registry seeded from OS entropy.
    pub fn new(
        providers: BTreeMap<String, ProviderConfig>,
        policy: SelectionPolicy,
    ) -> Result<Self, ConfigurationError> {
        Self::build(providers, policy, StdRng::from_entropy())
    }

    /// Build a registry whose provider and credential choices are reproducible.
    pub fn seeded(
        providers: BTreeMap<String, ProviderConfig>,
        policy: SelectionPolicy,
        seed: u64,
    ) -> Result<Self, ConfigurationError> {
        Self::build(providers, policy, StdRng::seed_from_u64(seed))
    }

    /// Build from a loaded [`Config`], honoring `dispatch.selection` and `dispatch.seed`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigurationError> {
        let providers = config.providers.clone();
        match config.dispatch.seed {
            Some(seed) => Self::seeded(providers, config.dispatch.selection, seed),
            None => Self::new(providers, config.dispatch.selection),
        }
    }

    fn build(
        mut providers: BTreeMap<String, ProviderConfig>,
        policy: SelectionPolicy,
        rng: StdRng,
    ) -> Result<Self, ConfigurationError> {
        if providers.is_empty() {
            return Err(ConfigurationError::NoProviders);
        }

        for (name, config) in providers.iter_mut() {
            if config.base_url.trim().is_empty() {
                return Err(ConfigurationError::MissingField {
                    provider: name.clone(),
                    field: "baseUrl",
                });
            }
            config.credentials.retain(|c| !c.is_empty());
            if config.credentials.is_empty() {
                return Err(ConfigurationError::EmptyCredentials(name.clone()));
            }
        }

        let names: Vec<String> = providers.keys().cloned().collect();
        debug!(providers = ?names, ?policy, "Provider registry ready");

        Ok(ProviderRegistry {
            providers,
            names,
            policy,
            rng: Mutex::new(rng),
            cursor: AtomicUsize::new(0),
        })
    }

    /// Choose a provider for one call.
    pub fn select(&self) -> &str {
        let index = match self.policy {
            SelectionPolicy::Random => self.with_rng(|rng| rng.gen_range(0..self.names.len())),
            SelectionPolicy::RoundRobin => {
                self.cursor.fetch_add(1, Ordering::Relaxed) % self.names.len()
            }
        };
        &self.names[index]
    }

    /// Look up a provider's config.
    ///
    /// An unknown name means selection and lookup disagree, which is a bug in
    /// the caller or the config, never a per-request condition.
    pub fn config_for(&self, name: &str) -> Result<&ProviderConfig, ConfigurationError> {
        self.providers
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownProvider(name.to_string()))
    }

    /// Pick one credential from the provider's pool, uniformly at random.
    ///
    /// `None` only for a config with an empty pool, which the registry never
    /// holds itself.
    pub fn credential<'a>(&self, config: &'a ProviderConfig) -> Option<&'a str> {
        match config.credentials.len() {
            0 => None,
            1 => Some(&config.credentials[0]),
            n => {
                let index = self.with_rng(|rng| rng.gen_range(0..n));
                Some(&config.credentials[index])
            }
        }
    }

    /// Render the provider-specific body for `request`.
    pub fn build_payload(&self, config: &ProviderConfig, request: &Request) -> serde_json::Value {
        match &config.template {
            Some(t) => template::render(t, request),
            None => template::render(&template::default_template(), request),
        }
    }

    /// Full URL: base URL joined with the provider's sub-path.
    pub fn endpoint(&self, config: &ProviderConfig) -> String {
        format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.path_or_default().trim_start_matches('/')
        )
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
