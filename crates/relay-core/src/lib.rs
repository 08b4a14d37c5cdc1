//! Shared building blocks for llm-relay.
//!
//! - [`types`] — requests, messages, and call outcomes
//! - [`error`] — the fatal [`ConfigurationError`]
//! - [`config`] — JSON config schema, loader, and env overrides
//! - [`utils`] — paths and small string helpers

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use error::ConfigurationError;
pub use types::{CallOutcome, FailureReason, Fingerprint, Message, Request, Role};
