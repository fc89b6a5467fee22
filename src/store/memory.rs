//! In-memory graph store.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use super::GraphStore;
use crate::error::GraphError;
use crate::graph::OwnerGraph;
use crate::types::OwnerId;

/// State of one owner: a write gate serializing transactions and the
/// currently published graph.
#[derive(Debug)]
struct OwnerSlot {
    write_gate: Mutex<()>,
    published: RwLock<Arc<OwnerGraph>>,
}

impl OwnerSlot {
    fn new(graph: OwnerGraph) -> Self {
        Self {
            write_gate: Mutex::new(()),
            published: RwLock::new(Arc::new(graph)),
        }
    }
}

/// In-memory graph store.
///
/// Readers clone the published `Arc` and never wait for writers; writers
/// copy the published graph, mutate the copy and swap it in.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    slots: RwLock<BTreeMap<OwnerId, Arc<OwnerSlot>>>,
}

impl InMemoryGraphStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from previously exported graphs.
    pub fn from_graphs(graphs: impl IntoIterator<Item = OwnerGraph>) -> Self {
        let slots = graphs
            .into_iter()
            .map(|graph| (graph.owner().clone(), Arc::new(OwnerSlot::new(graph))))
            .collect();
        Self {
            slots: RwLock::new(slots),
        }
    }

    /// Copy out every owner's published graph, ordered by owner.
    pub fn export(&self) -> Vec<OwnerGraph> {
        self.slots
            .read()
            .values()
            .map(|slot| (**slot.published.read()).clone())
            .collect()
    }

    /// Owners with a graph.
    pub fn owners(&self) -> Vec<OwnerId> {
        self.slots.read().keys().cloned().collect()
    }

    fn slot(&self, owner: &OwnerId) -> Arc<OwnerSlot> {
        if let Some(slot) = self.slots.read().get(owner) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(
            slots
                .entry(owner.clone())
                .or_insert_with(|| Arc::new(OwnerSlot::new(OwnerGraph::new(owner.clone())))),
        )
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    type Error = Infallible;

    async fn snapshot(&self, owner: &OwnerId) -> Result<Arc<OwnerGraph>, Self::Error> {
        let published = self
            .slots
            .read()
            .get(owner)
            .map(|slot| Arc::clone(&slot.published.read()));
        Ok(published.unwrap_or_else(|| Arc::new(OwnerGraph::new(owner.clone()))))
    }

    async fn transact<R, F>(&self, owner: &OwnerId, op: F) -> Result<R, GraphError>
    where
        R: Send,
        F: FnOnce(&mut OwnerGraph) -> Result<R, GraphError> + Send,
    {
        let slot = self.slot(owner);
        let _gate = slot.write_gate.lock();
        let mut working = (**slot.published.read()).clone();
        match op(&mut working) {
            Ok(out) => {
                *slot.published.write() = Arc::new(working);
                Ok(out)
            }
            Err(e) => {
                tracing::debug!(%owner, error = %e, "transaction rolled back");
                Err(e)
            }
        }
    }
}
