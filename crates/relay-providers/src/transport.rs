//! HTTP transport for provider calls.
//!
//! Speaks the generic provider wire contract: `POST <endpoint>` with
//! `Authorization: Bearer <credential>`, a JSON body, and a per-call timeout.
//! No provider schema is assumed beyond "has a status, has a body".

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tracing::{debug, warn};

use crate::traits::Transport;

// ─────────────────────────────────────────────
// Call / reply / error
// ─────────────────────────────────────────────

/// Everything needed to send one attempt.
#[derive(Clone, Copy, Debug)]
pub struct ProviderCall<'a> {
    pub url: &'a str,
    pub credential: &'a str,
    pub headers: Option<&'a HashMap<String, String>>,
    pub body: &'a serde_json::Value,
    pub timeout: Duration,
}

/// Status and raw body of a provider response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// A failure below the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

// ─────────────────────────────────────────────
// HttpTransport
// ─────────────────────────────────────────────

/// [`Transport`] backed by a shared, connection-pooled `reqwest::Client`.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        HttpTransport { client }
    }
}

/// Convert configured header pairs, skipping (and logging) invalid ones.
fn header_map(headers: Option<&HashMap<String, String>>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (key, value) in headers.into_iter().flatten() {
        if let (Ok(name), Ok(val)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.insert(name, val);
        } else {
            warn!("Invalid header: {}={}", key, value);
        }
    }
    map
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, call: ProviderCall<'_>) -> Result<HttpReply, TransportError> {
        debug!(url = call.url, timeout_ms = call.timeout.as_millis() as u64, "POST");

        let response = self
            .client
            .post(call.url)
            .bearer_auth(call.credential)
            .headers(header_map(call.headers))
            .timeout(call.timeout)
            .json(call.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
