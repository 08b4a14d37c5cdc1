//! Core types for llm-relay — conversations going out, outcomes coming back.
//!
//! A [`Request`] is one logical conversation turn: an ordered list of
//! role/content pairs. It is immutable once built and identified for caching
//! purposes by its content [`Fingerprint`], never by object identity.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// Who authored a message in a conversation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single role/content pair.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────

/// One conversation to send to a provider.
///
/// Serializes as a bare JSON array of messages.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Request {
    messages: Vec<Message>,
}

impl Request {
    pub fn new(messages: Vec<Message>) -> Self {
        Request { messages }
    }

    /// Shorthand for a conversation made of a single user message.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Request::new(vec![Message::user(prompt)])
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Content of the last user message, if any.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// SHA-256 over every role and content of the conversation, in order.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        for message in &self.messages {
            // Length-prefix each field so ("ab","c") and ("a","bc") never collide.
            let role = message.role.as_str();
            hasher.update((role.len() as u64).to_le_bytes());
            hasher.update(role.as_bytes());
            hasher.update((message.content.len() as u64).to_le_bytes());
            hasher.update(message.content.as_bytes());
        }
        Fingerprint::from_digest(&hasher.finalize())
    }
}

impl From<Vec<Message>> for Request {
    fn from(messages: Vec<Message>) -> Self {
        Request::new(messages)
    }
}

/// Deterministic content digest of a [`Request`], used as the cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    fn from_digest(bytes: &[u8]) -> Self {
        use std::fmt::Write;
        let mut hex = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            let _ = write!(hex, "{b:02x}");
        }
        Fingerprint(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────
// Call outcomes
// ─────────────────────────────────────────────

/// Why a call ended in [`CallOutcome::Failed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The provider answered with a non-2xx, non-429 status.
    Http { status: u16, body: String },
    /// Connection refused, DNS failure, timeout expiry, ...
    Transport(String),
    /// A 2xx response whose body was not valid JSON.
    InvalidBody(String),
    /// The retry budget allowed no attempt at all.
    Exhausted { attempts: u32 },
    /// The batch deadline passed or the batch was cancelled first.
    Cancelled,
    /// The call's task died without producing an outcome (it panicked).
    Internal(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Http { status, body } if body.is_empty() => {
                write!(f, "HTTP {status}")
            }
            FailureReason::Http { status, body } => write!(f, "HTTP {status}: {body}"),
            FailureReason::Transport(msg) => write!(f, "transport error: {msg}"),
            FailureReason::InvalidBody(msg) => write!(f, "invalid response body: {msg}"),
            FailureReason::Exhausted { attempts } => {
                write!(f, "retry budget exhausted after {attempts} attempt(s)")
            }
            FailureReason::Cancelled => f.write_str("cancelled"),
            FailureReason::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

/// Tagged result of attempting one provider call.
#[derive(Clone, Debug, PartialEq)]
pub enum CallOutcome {
    /// The provider answered 2xx; `payload` is the decoded JSON body as-is.
    Success {
        provider: String,
        payload: serde_json::Value,
        latency: Duration,
    },
    /// The provider answered 429. Never retried by the executor.
    RateLimited { provider: String },
    /// The call failed. `provider` is `None` only when the request never
    /// reached provider selection (e.g. cancelled while queued).
    Failed {
        provider: Option<String>,
        reason: FailureReason,
        latency: Duration,
    },
}

impl CallOutcome {
    /// Outcome for a slot that was abandoned before it completed.
    pub fn cancelled() -> Self {
        CallOutcome::Failed {
            provider: None,
            reason: FailureReason::Cancelled,
            latency: Duration::ZERO,
        }
    }

    /// Outcome for a slot whose task panicked before reporting back.
    pub fn panicked() -> Self {
        CallOutcome::Failed {
            provider: None,
            reason: FailureReason::Internal("task panicked".to_string()),
            latency: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success { .. })
    }

    /// Name of the provider that handled the call, if one was chosen.
    pub fn provider(&self) -> Option<&str> {
        match self {
            CallOutcome::Success { provider, .. } | CallOutcome::RateLimited { provider } => {
                Some(provider)
            }
            CallOutcome::Failed { provider, .. } => provider.as_deref(),
        }
    }

    /// Response payload for successful calls.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            CallOutcome::Success { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Short machine-readable status label.
    pub fn status_label(&self) -> &'static str {
        match self {
            CallOutcome::Success { .. } => "success",
            CallOutcome::RateLimited { .. } => "rate_limited",
            CallOutcome::Failed { .. } => "failed",
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
