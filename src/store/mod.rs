//! Graph storage backends.

pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::GraphError;
use crate::graph::OwnerGraph;
use crate::types::OwnerId;

/// Trait for graph storage backends.
///
/// Writes are serialized per owner; reads get a point-in-time view that
/// never shows a half-applied mutation.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Immutable view of an owner's graph as of now. Unknown owners yield
    /// an empty graph.
    async fn snapshot(&self, owner: &OwnerId) -> Result<Arc<OwnerGraph>, Self::Error>;

    /// Run `op` against a private copy of the owner's graph and publish the
    /// copy only if `op` succeeds. Concurrent transactions on the same owner
    /// run one at a time.
    async fn transact<R, F>(&self, owner: &OwnerId, op: F) -> Result<R, GraphError>
    where
        R: Send,
        F: FnOnce(&mut OwnerGraph) -> Result<R, GraphError> + Send;
}

pub use memory::InMemoryGraphStore;
