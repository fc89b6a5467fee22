//! Error taxonomy of the graph engine.
//!
//! Every variant except `StorageFailure` is a local validation failure
//! raised before any mutation begins.

use crate::types::{ForkId, IdError};

/// Error type for graph operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Referenced fork, tag or relation does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Requested extraction depth is negative.
    #[error("Invalid depth: {0}")]
    InvalidDepth(i32),
    /// Self-relation or relation between incompatible forks.
    #[error("Invalid relation: {0}")]
    InvalidRelation(String),
    /// Tag external resource equals the tagging fork's own identifier.
    #[error("Fork cannot be tagged with its own identifier: {0}")]
    SelfIdentification(ForkId),
    /// Malformed clone input.
    #[error("Invalid tree: {0}")]
    InvalidTree(String),
    /// Opaque backing store failure.
    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl GraphError {
    /// Create a storage failure from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::StorageFailure(e.to_string())
    }

    /// Not-found error for a fork.
    pub fn fork_not_found(id: &ForkId) -> Self {
        Self::NotFound(format!("fork {id}"))
    }
}

impl From<IdError> for GraphError {
    fn from(e: IdError) -> Self {
        Self::NotFound(e.to_string())
    }
}

/// Result alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
