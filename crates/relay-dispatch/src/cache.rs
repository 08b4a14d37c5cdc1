//! Response cache — fingerprint → response, with per-entry expiry.
//!
//! In-memory only. Expired entries are treated as absent and dropped lazily
//! when touched; [`ResponseCache::purge_expired`] sweeps them on demand.
//! Every operation holds the one mutex for its whole duration, so an entry's
//! response and expiry are always written and read together.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use relay_core::{Fingerprint, Request};

#[derive(Debug)]
struct CacheEntry {
    response: serde_json::Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    /// Create an empty cache whose [`insert`](Self::insert) uses `ttl`.
    pub fn new(ttl: Duration) -> Self {
        ResponseCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Cache key for `request`.
    pub fn fingerprint(request: &Request) -> Fingerprint {
        request.fingerprint()
    }

    /// Clone of the cached response, if present and not yet expired.
    pub fn get(&self, key: &Fingerprint) -> Option<serde_json::Value> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.response.clone()),
            Some(_) => {
                entries.remove(key);
                debug!(key = %key, "Cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite; the entry expires `ttl` from now.
    pub fn set(&self, key: Fingerprint, response: serde_json::Value, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.lock().insert(key, CacheEntry { response, expires_at });
    }

    /// [`set`](Self::set) with the cache's default TTL.
    pub fn insert(&self, key: Fingerprint, response: serde_json::Value) {
        self.set(key, response, self.ttl);
    }

    /// Drop an entry regardless of expiry. Returns whether one was present.
    pub fn evict(&self, key: &Fingerprint) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
