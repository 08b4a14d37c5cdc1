//! Provider layer for llm-relay.
//!
//! # Architecture
//!
//! - [`registry::ProviderRegistry`] — immutable provider configs, provider and
//!   credential selection, payload rendering
//! - [`traits::Transport`] — the network seam; [`transport::HttpTransport`] is
//!   the `reqwest` implementation
//! - [`traits::CallObserver`] — per-attempt observability sink; see [`observer`]
//! - [`executor::RequestExecutor`] — one request, bounded retries, 429 short-circuit;
//!   the production [`traits::CallExecutor`]

pub mod executor;
pub mod observer;
pub mod registry;
mod template;
pub mod traits;
pub mod transport;

// Re-export main types for convenience
pub use executor::RequestExecutor;
pub use observer::{CallEvent, CallStats, FanoutObserver, NoopObserver, OutcomeStatus, TracingObserver};
pub use registry::ProviderRegistry;
pub use traits::{CallExecutor, CallObserver, Transport};
pub use transport::{HttpReply, HttpTransport, ProviderCall, TransportError};
