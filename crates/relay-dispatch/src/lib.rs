//! Batch dispatch for llm-relay.
//!
//! - [`cache::ResponseCache`] — fingerprint-keyed, TTL-bounded, internally locked
//! - [`orchestrator::Orchestrator`] — cache lookups, concurrent fan-out of
//!   misses, index-preserving result assembly

pub mod cache;
pub mod orchestrator;

pub use cache::ResponseCache;
pub use orchestrator::{BatchResult, Orchestrator};
