//! Errors reported while composing a store.

use stillwater::NonEmptyVec;
use thiserror::Error;

/// A single configuration problem found by validation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_nested_updates must be at least 1")]
    ZeroNestedUpdates,

    #[error("temporal max_depth must be at least 1")]
    ZeroMaxDepth,

    #[error("persist name must not be empty")]
    EmptyPersistName,

    #[error("middleware '{name}' was added more than once")]
    DuplicateMiddleware { name: &'static str },

    #[error("middleware '{name}' needs a tokio runtime; call it inside one or pass a handle")]
    NoRuntime { name: &'static str },
}

/// Errors that can occur when building a store.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Validation found one or more problems; all of them are reported
    #[error("invalid store configuration ({} problem(s))", .0.len())]
    InvalidConfig(NonEmptyVec<ConfigError>),

    /// A middleware needs a tokio runtime and none was reachable at attach
    #[error("middleware '{middleware}' needs a tokio runtime")]
    RuntimeUnavailable { middleware: &'static str },

    /// A middleware failed to attach to the assembled store
    #[error("middleware '{middleware}' failed to attach: {reason}")]
    Attach {
        middleware: &'static str,
        reason: String,
    },
}
