//! SubGraph: the immutable result of an extraction.
//!
//! ## Invariants
//!
//! 1. **Single inclusion**: a fork id appears at most once across `forks` and
//!    `relations`.
//! 2. **Endpoint privacy**: a fork present only to describe a relation
//!    endpoint carries its identifier and kind, nothing else.
//! 3. **Placeholders**: composite forks list included elements by id only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::fork::{Fork, NeighborCount};
use super::ids::{ForkId, ForkKind};
use super::share_level::ShareLevel;
use super::tag::Tag;
use crate::canonical::canonical_hash_hex;
use crate::FORK_GRAPH_SCHEMA_VERSION;

/// Content-derived identity of a subgraph.
///
/// Same center + same policy + same reachable ids produce the same
/// fingerprint, which lets callers cache rendered views.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubGraphFingerprint(String);

impl SubGraphFingerprint {
    /// Get the fingerprint as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubGraphFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time copy of one fork inside a subgraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkSnapshot {
    /// Identifier.
    pub id: ForkId,
    /// Structural kind.
    pub kind: ForkKind,
    /// Present only to describe a relation endpoint.
    pub reference_only: bool,
    /// Label (empty for reference-only snapshots).
    pub label: String,
    /// Comment (empty for reference-only snapshots).
    pub comment: String,
    /// Visibility.
    pub share_level: Option<ShareLevel>,
    /// Attached tags.
    pub tags: Vec<Tag>,
    /// Neighbor tallies.
    pub neighbor_count: Option<NeighborCount>,
    /// `(source, destination)` for relations.
    pub endpoints: Option<(ForkId, ForkId)>,
    /// Included element placeholders for composites.
    pub included: Vec<ForkId>,
    /// Declared pattern.
    pub is_pattern: bool,
    /// Pattern usage counter.
    pub pattern_usage: u64,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ForkSnapshot {
    /// Full snapshot of a traversed fork.
    pub fn full(fork: &Fork, neighbor_count: NeighborCount, tags: Vec<Tag>) -> Self {
        Self {
            id: fork.id.clone(),
            kind: fork.kind(),
            reference_only: false,
            label: fork.label.clone(),
            comment: fork.comment.clone(),
            share_level: Some(fork.share_level),
            tags,
            neighbor_count: Some(neighbor_count),
            endpoints: fork.endpoints().map(|(s, d)| (s.clone(), d.clone())),
            included: fork.included(),
            is_pattern: fork.is_pattern,
            pattern_usage: fork.pattern_usage,
            created_at: Some(fork.created_at),
            updated_at: Some(fork.updated_at),
        }
    }

    /// Identifier-only snapshot of a relation endpoint.
    pub fn reference(id: ForkId) -> Self {
        let kind = id.kind();
        Self {
            id,
            kind,
            reference_only: true,
            label: String::new(),
            comment: String::new(),
            share_level: None,
            tags: Vec::new(),
            neighbor_count: None,
            endpoints: None,
            included: Vec::new(),
            is_pattern: false,
            pattern_usage: 0,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Bounded, share-level-filtered snapshot around a fork or a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubGraph {
    /// Center fork in center-fork mode.
    pub center: Option<ForkId>,
    /// Center tag in center-tag mode.
    pub center_tag: Option<Tag>,
    /// Effective depth the extraction ran with.
    pub depth: u32,
    /// Forks acting as nodes, keyed by id.
    pub forks: BTreeMap<ForkId, ForkSnapshot>,
    /// Relations acting as edges, keyed by id.
    pub relations: BTreeMap<ForkId, ForkSnapshot>,
    /// Params hash of the extraction policy used.
    pub policy_params_hash: String,
}

impl SubGraph {
    /// Empty subgraph.
    pub fn empty(depth: u32, policy_params_hash: impl Into<String>) -> Self {
        Self {
            center: None,
            center_tag: None,
            depth,
            forks: BTreeMap::new(),
            relations: BTreeMap::new(),
            policy_params_hash: policy_params_hash.into(),
        }
    }

    /// Insert a node snapshot. Full snapshots replace reference-only ones,
    /// never the other way round; ids already present as relations are kept
    /// there.
    pub fn insert_fork(&mut self, snapshot: ForkSnapshot) {
        if self.relations.contains_key(&snapshot.id) {
            return;
        }
        match self.forks.get(&snapshot.id) {
            Some(existing) if !existing.reference_only || snapshot.reference_only => {}
            _ => {
                self.forks.insert(snapshot.id.clone(), snapshot);
            }
        }
    }

    /// Insert an edge snapshot, evicting any node entry with the same id.
    pub fn insert_relation(&mut self, snapshot: ForkSnapshot) {
        self.forks.remove(&snapshot.id);
        match self.relations.get(&snapshot.id) {
            Some(existing) if !existing.reference_only || snapshot.reference_only => {}
            _ => {
                self.relations.insert(snapshot.id.clone(), snapshot);
            }
        }
    }

    /// Union with another subgraph (full snapshots win).
    pub fn merge(&mut self, other: SubGraph) {
        for (_, relation) in other.relations {
            self.insert_relation(relation);
        }
        for (_, fork) in other.forks {
            self.insert_fork(fork);
        }
    }

    /// Whether the id appears as node or edge.
    pub fn contains(&self, id: &ForkId) -> bool {
        self.forks.contains_key(id) || self.relations.contains_key(id)
    }

    /// Node snapshot by id.
    pub fn fork(&self, id: &ForkId) -> Option<&ForkSnapshot> {
        self.forks.get(id)
    }

    /// Edge snapshot by id.
    pub fn relation(&self, id: &ForkId) -> Option<&ForkSnapshot> {
        self.relations.get(id)
    }

    /// Number of node snapshots.
    pub fn num_forks(&self) -> usize {
        self.forks.len()
    }

    /// Number of edge snapshots.
    pub fn num_relations(&self) -> usize {
        self.relations.len()
    }

    /// Ids of fully traversed forks and relations.
    pub fn traversed_ids(&self) -> impl Iterator<Item = &ForkId> {
        self.forks
            .values()
            .chain(self.relations.values())
            .filter(|s| !s.reference_only)
            .map(|s| &s.id)
    }

    /// Compute the fingerprint of this subgraph.
    pub fn fingerprint(&self) -> SubGraphFingerprint {
        let forks: Vec<(String, bool)> = self
            .forks
            .values()
            .map(|s| (s.id.to_uri(), s.reference_only))
            .collect();
        let relations: Vec<String> = self.relations.keys().map(ForkId::to_uri).collect();
        let canonical = (
            self.center.as_ref().map(ForkId::to_uri),
            self.center_tag.as_ref().map(|t| t.id.to_uri()),
            self.depth,
            forks,
            relations,
            &self.policy_params_hash,
            FORK_GRAPH_SCHEMA_VERSION,
        );
        SubGraphFingerprint(canonical_hash_hex(&canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fork::ForkDetails;
    use crate::types::ids::OwnerId;

    fn vertex(label: &str) -> Fork {
        let owner = OwnerId::new("alice").unwrap();
        let mut fork = Fork::new(
            ForkId::generate(&owner, ForkKind::Vertex),
            ShareLevel::Public,
            ForkDetails::vertex(),
        );
        fork.label = label.to_string();
        fork
    }

    #[test]
    fn test_full_snapshot_replaces_reference() {
        let fork = vertex("a");
        let mut graph = SubGraph::empty(1, "p");
        graph.insert_fork(ForkSnapshot::reference(fork.id.clone()));
        graph.insert_fork(ForkSnapshot::full(&fork, NeighborCount::default(), vec![]));
        assert_eq!(graph.fork(&fork.id).unwrap().label, "a");

        graph.insert_fork(ForkSnapshot::reference(fork.id.clone()));
        assert!(!graph.fork(&fork.id).unwrap().reference_only);
    }

    #[test]
    fn test_reference_snapshot_hides_details() {
        let fork = vertex("secret");
        let snapshot = ForkSnapshot::reference(fork.id.clone());
        assert!(snapshot.label.is_empty());
        assert!(snapshot.comment.is_empty());
        assert!(snapshot.tags.is_empty());
        assert_eq!(snapshot.kind, ForkKind::Vertex);
    }

    #[test]
    fn test_fingerprint_determinism() {
        let fork = vertex("a");
        let mut g1 = SubGraph::empty(2, "p");
        g1.insert_fork(ForkSnapshot::full(&fork, NeighborCount::default(), vec![]));
        let g2 = g1.clone();
        assert_eq!(g1.fingerprint(), g2.fingerprint());

        let mut g3 = g1.clone();
        g3.policy_params_hash = "q".into();
        assert_ne!(g1.fingerprint(), g3.fingerprint());
    }
}
