//! Clone input: a set of fork ids with a designated root.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::ForkId;
use super::subgraph::SubGraph;

/// Immutable set of fork identifiers plus the root to clone from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    root: ForkId,
    members: BTreeSet<ForkId>,
}

impl Tree {
    /// Build a tree. Membership of the root is checked when cloning.
    pub fn new(root: ForkId, members: impl IntoIterator<Item = ForkId>) -> Self {
        Self {
            root,
            members: members.into_iter().collect(),
        }
    }

    /// Tree of every fully traversed fork and relation of a subgraph,
    /// rooted at its center.
    pub fn from_subgraph(subgraph: &SubGraph) -> Option<Self> {
        let root = subgraph.center.clone()?;
        Some(Self::new(root, subgraph.traversed_ids().cloned()))
    }

    /// Root id.
    pub fn root(&self) -> &ForkId {
        &self.root
    }

    /// Member ids, sorted.
    pub fn members(&self) -> &BTreeSet<ForkId> {
        &self.members
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &ForkId) -> bool {
        self.members.contains(id)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the tree has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
