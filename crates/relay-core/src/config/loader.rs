//! Config loader — reads `~/.llm-relay/config.json`, merges env vars, and
//! migrates legacy snake_case keys.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.llm-relay/config.json` (or an explicit path)
//! 3. Environment variables `LLM_RELAY_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Legacy provider keys and the field they map to.
const PROVIDER_KEY_MIGRATIONS: &[(&str, &str)] = &[
    ("base_url", "baseUrl"),
    ("api_keys", "credentials"),
    ("timeout", "timeoutSeconds"),
    ("max_retries", "maxRetries"),
];

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the given path (or the default one) + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    load_config_from_path(&config_path)
}

fn load_config_from_path(path: &Path) -> Config {
    apply_env_overrides(read_config_file(path))
}

/// The file's contents alone, without env overrides.
fn read_config_file(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return Config::default();
        }
    };

    migrate_config(&mut raw);

    let config: Config = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            return Config::default();
        }
    };

    config
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Rename snake_case keys written for the older Python tool.
///
/// An existing camelCase key always wins over its legacy spelling.
fn migrate_config(raw: &mut serde_json::Value) {
    if let Some(providers) = raw.get_mut("providers").and_then(|p| p.as_object_mut()) {
        for (name, provider) in providers.iter_mut() {
            let Some(fields) = provider.as_object_mut() else {
                continue;
            };
            for (legacy, current) in PROVIDER_KEY_MIGRATIONS {
                if let Some(val) = fields.remove(*legacy) {
                    if !fields.contains_key(*current) {
                        fields.insert((*current).to_string(), val);
                        debug!(provider = %name, "Migrated {} → {}", legacy, current);
                    }
                }
            }
        }
    }

    if let Some(cache) = raw.get_mut("cache").and_then(|c| c.as_object_mut()) {
        if let Some(val) = cache.remove("ttl") {
            if !cache.contains_key("ttlSeconds") {
                cache.insert("ttlSeconds".to_string(), val);
                debug!("Migrated cache.ttl → cache.ttlSeconds");
            }
        }
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `LLM_RELAY_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `LLM_RELAY_CACHE__ENABLED` → `cache.enabled`
/// - `LLM_RELAY_CACHE__TTL_SECONDS` → `cache.ttl_seconds`
/// - `LLM_RELAY_DISPATCH__MAX_CONCURRENCY` → `dispatch.max_concurrency`
/// - `LLM_RELAY_DISPATCH__SEED` → `dispatch.seed`
/// - `LLM_RELAY_PROVIDERS__<NAME>__CREDENTIALS` → `providers.<name>.credentials` (comma separated)
/// - `LLM_RELAY_PROVIDERS__<NAME>__BASE_URL` → `providers.<name>.base_url`
fn apply_env_overrides(config: Config) -> Config {
    apply_overrides(config, |key| std::env::var(key).ok())
}

fn apply_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(val) = var("LLM_RELAY_CACHE__ENABLED") {
        config.cache.enabled = val == "true" || val == "1";
    }
    if let Some(val) = var("LLM_RELAY_CACHE__TTL_SECONDS") {
        if let Ok(n) = val.parse::<u64>() {
            config.cache.ttl_seconds = n;
        }
    }
    if let Some(val) = var("LLM_RELAY_DISPATCH__MAX_CONCURRENCY") {
        if let Ok(n) = val.parse::<usize>() {
            config.dispatch.max_concurrency = n;
        }
    }
    if let Some(val) = var("LLM_RELAY_DISPATCH__SEED") {
        if let Ok(n) = val.parse::<u64>() {
            config.dispatch.seed = Some(n);
        }
    }

    for (name, provider) in config.providers.iter_mut() {
        let key = env_name(name);
        if let Some(val) = var(&format!("LLM_RELAY_PROVIDERS__{key}__CREDENTIALS")) {
            provider.credentials = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(val) = var(&format!("LLM_RELAY_PROVIDERS__{key}__BASE_URL")) {
            provider.base_url = val;
        }
    }

    config
}

/// `"my-proxy"` → `"MY_PROXY"`.
fn env_name(provider: &str) -> String {
    provider
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
