//! Store error types.

use thiserror::Error;

/// Errors that can occur while applying a state update.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The state does not serialize to a record of named fields
    #[error("state is not a record of named fields (serialized as {found})")]
    NotARecord { found: &'static str },

    /// Serialization of the state failed
    #[error("state serialization failed: {0}")]
    Serialize(String),

    /// The merged record does not deserialize back into the state type
    #[error("merged fields do not form a valid state: {0}")]
    Deserialize(String),

    /// Listeners kept scheduling updates past the nesting limit
    #[error("more than {limit} nested updates in one notification pass")]
    ReentrancyOverflow { limit: usize },
}
