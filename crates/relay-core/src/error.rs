//! Fatal configuration errors.
//!
//! Everything that can go wrong with a single provider call is reported as a
//! [`CallOutcome`](crate::types::CallOutcome) value. A `ConfigurationError`
//! means selection and lookup disagree, or the loaded config cannot describe a
//! working provider set; it aborts whatever batch it surfaces in.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no providers configured")]
    NoProviders,

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("provider '{0}' has no credentials")]
    EmptyCredentials(String),

    #[error("provider '{provider}' is missing required field '{field}'")]
    MissingField {
        provider: String,
        field: &'static str,
    },
}
