//! Per-owner graph state and the fork model operations.
//!
//! An [`OwnerGraph`] is an arena of fork records indexed by identifier plus
//! an adjacency index (fork id → incident relation ids). Forks never point at
//! each other directly; every traversal carries its own visited set.
//!
//! ## Invariants
//!
//! 1. `neighbor_count(f).total` equals the number of relations with
//!    `f` as source or destination.
//! 2. Each incident relation is tallied in the tier of the opposite
//!    endpoint's share level.
//! 3. A tag's reference count equals the number of forks holding it.
//!
//! Mutations validate everything first, then apply.

pub mod neighbors;
pub mod tags;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{GraphError, GraphResult};
use crate::types::{
    Fork, ForkDetails, ForkId, ForkKind, NeighborCount, OwnerId, ShareLevel,
};

pub use neighbors::NeighborCounter;
pub use tags::TagRegistry;

/// Which endpoint of a relation an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Source,
    Destination,
}

/// Neighbor count that disagrees with a from-scratch tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountMismatch {
    /// Fork whose count drifted.
    pub fork: ForkId,
    /// Incrementally maintained value.
    pub maintained: NeighborCount,
    /// Recomputed value.
    pub rebuilt: NeighborCount,
}

/// All graph state of one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerGraph {
    owner: OwnerId,
    forks: BTreeMap<ForkId, Fork>,
    adjacency: BTreeMap<ForkId, BTreeSet<ForkId>>,
    neighbors: NeighborCounter,
    tags: TagRegistry,
}

impl OwnerGraph {
    /// Create an empty graph for `owner`.
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            forks: BTreeMap::new(),
            adjacency: BTreeMap::new(),
            neighbors: NeighborCounter::new(),
            tags: TagRegistry::new(),
        }
    }

    /// Owner of this graph.
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Fork by id.
    pub fn fork(&self, id: &ForkId) -> Option<&Fork> {
        self.forks.get(id)
    }

    /// Fork by id, or `NotFound`.
    pub fn require_fork(&self, id: &ForkId) -> GraphResult<&Fork> {
        self.forks.get(id).ok_or_else(|| GraphError::fork_not_found(id))
    }

    fn require_fork_mut(&mut self, id: &ForkId) -> GraphResult<&mut Fork> {
        self.forks
            .get_mut(id)
            .ok_or_else(|| GraphError::fork_not_found(id))
    }

    /// All forks, ordered by id.
    pub fn forks(&self) -> impl Iterator<Item = &Fork> {
        self.forks.values()
    }

    /// Number of forks (relations included).
    pub fn num_forks(&self) -> usize {
        self.forks.len()
    }

    /// Ids of relations where `id` is source or destination, ordered.
    pub fn incident_relations(&self, id: &ForkId) -> impl Iterator<Item = &ForkId> {
        self.adjacency.get(id).into_iter().flatten()
    }

    /// Maintained neighbor tallies of a fork.
    pub fn neighbor_count(&self, id: &ForkId) -> GraphResult<NeighborCount> {
        self.require_fork(id)?;
        Ok(self.neighbors.get(id))
    }

    /// The neighbor counter.
    pub fn neighbors(&self) -> &NeighborCounter {
        &self.neighbors
    }

    /// The tag registry.
    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    fn share_level_of(&self, id: &ForkId) -> GraphResult<ShareLevel> {
        Ok(self.require_fork(id)?.share_level)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Creation
    // ─────────────────────────────────────────────────────────────────────

    /// Create a vertex owned by this graph's owner.
    pub fn create_vertex(&mut self, share_level: ShareLevel) -> ForkId {
        let id = ForkId::generate(&self.owner, ForkKind::Vertex);
        self.forks.insert(
            id.clone(),
            Fork::new(id.clone(), share_level, ForkDetails::vertex()),
        );
        tracing::debug!(fork = %id, %share_level, "created vertex");
        id
    }

    /// Create a relation `source -> destination`.
    ///
    /// The relation is public when both endpoints are public, private
    /// otherwise.
    pub fn create_relation(
        &mut self,
        source: &ForkId,
        destination: &ForkId,
    ) -> GraphResult<ForkId> {
        let source_level = self.share_level_of(source)?;
        let destination_level = self.share_level_of(destination)?;
        let id = ForkId::generate(&self.owner, ForkKind::Relation);
        let relation = Fork::new(
            id.clone(),
            ShareLevel::for_new_relation(source_level, destination_level),
            ForkDetails::Relation {
                source: source.clone(),
                destination: destination.clone(),
            },
        );
        self.insert_relation(relation)?;
        Ok(id)
    }

    /// Create a composite vertex including `members` and the relations
    /// among them as placeholders.
    pub fn create_group_vertex(
        &mut self,
        members: &[ForkId],
        label: impl Into<String>,
    ) -> GraphResult<ForkId> {
        let included_vertices: BTreeSet<ForkId> = members.iter().cloned().collect();
        if included_vertices.len() < 2 {
            return Err(GraphError::InvalidRelation(
                "a group vertex needs at least two distinct members".into(),
            ));
        }
        for member in &included_vertices {
            if self.require_fork(member)?.kind() != ForkKind::Vertex {
                return Err(GraphError::InvalidRelation(format!(
                    "{member} is not a vertex"
                )));
            }
        }
        let included_relations: BTreeSet<ForkId> = included_vertices
            .iter()
            .flat_map(|member| self.incident_relations(member))
            .filter(|relation| {
                self.forks
                    .get(*relation)
                    .and_then(Fork::endpoints)
                    .is_some_and(|(s, d)| {
                        included_vertices.contains(s) && included_vertices.contains(d)
                    })
            })
            .cloned()
            .collect();

        let id = ForkId::generate(&self.owner, ForkKind::Vertex);
        let mut fork = Fork::new(
            id.clone(),
            ShareLevel::Private,
            ForkDetails::Vertex {
                included_vertices,
                included_relations,
            },
        );
        fork.label = label.into();
        self.forks.insert(id.clone(), fork);
        tracing::debug!(fork = %id, members = members.len(), "created group vertex");
        Ok(id)
    }

    /// Insert a prepared non-relation fork record.
    pub(crate) fn insert_node(&mut self, fork: Fork) -> GraphResult<()> {
        if fork.id.owner() != &self.owner {
            return Err(GraphError::InvalidRelation(format!(
                "{} does not belong to {}",
                fork.id, self.owner
            )));
        }
        if fork.endpoints().is_some() {
            return Err(GraphError::InvalidRelation(format!(
                "{} is a relation",
                fork.id
            )));
        }
        self.forks.insert(fork.id.clone(), fork);
        Ok(())
    }

    /// Insert a prepared relation record, wiring adjacency and counters.
    pub(crate) fn insert_relation(&mut self, relation: Fork) -> GraphResult<()> {
        let (source, destination) = relation
            .endpoints()
            .map(|(s, d)| (s.clone(), d.clone()))
            .ok_or_else(|| {
                GraphError::InvalidRelation(format!("{} has no endpoints", relation.id))
            })?;
        self.validate_endpoints(&relation.id, &source, &destination)?;
        let source_level = self.share_level_of(&source)?;
        let destination_level = self.share_level_of(&destination)?;

        let id = relation.id.clone();
        self.forks.insert(id.clone(), relation);
        self.link(&id, &source);
        self.link(&id, &destination);
        self.neighbors
            .on_relation_added(&source, source_level, &destination, destination_level);
        tracing::debug!(relation = %id, %source, %destination, "created relation");
        Ok(())
    }

    fn validate_endpoints(
        &self,
        relation: &ForkId,
        source: &ForkId,
        destination: &ForkId,
    ) -> GraphResult<()> {
        for endpoint in [relation, source, destination] {
            if endpoint.owner() != &self.owner {
                return Err(GraphError::InvalidRelation(format!(
                    "{endpoint} belongs to another owner than {}",
                    self.owner
                )));
            }
        }
        if source == destination {
            return Err(GraphError::InvalidRelation(format!(
                "self-relation on {source}"
            )));
        }
        if source == relation || destination == relation {
            return Err(GraphError::InvalidRelation(format!(
                "{relation} cannot be its own endpoint"
            )));
        }
        self.require_fork(source)?;
        self.require_fork(destination)?;
        Ok(())
    }

    fn link(&mut self, relation: &ForkId, endpoint: &ForkId) {
        self.adjacency
            .entry(endpoint.clone())
            .or_default()
            .insert(relation.clone());
    }

    fn unlink(&mut self, relation: &ForkId, endpoint: &ForkId) {
        if let Some(incident) = self.adjacency.get_mut(endpoint) {
            incident.remove(relation);
            if incident.is_empty() {
                self.adjacency.remove(endpoint);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Removal
    // ─────────────────────────────────────────────────────────────────────

    /// Remove a fork, cascading to every relation incident to it (and to
    /// relations chained onto those). Returns the removed ids in removal
    /// order, the requested fork last.
    pub fn remove(&mut self, id: &ForkId) -> GraphResult<Vec<ForkId>> {
        self.require_fork(id)?;

        // Post-order walk: relations chained onto a relation go before it.
        let mut order = Vec::new();
        let mut seen = BTreeSet::from([id.clone()]);
        let mut stack = vec![(id.clone(), false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                order.push(current);
                continue;
            }
            stack.push((current.clone(), true));
            for relation in self.incident_relations(&current) {
                if seen.insert(relation.clone()) {
                    stack.push((relation.clone(), false));
                }
            }
        }

        // Endpoint levels are read up front: with relations chained onto
        // each other, an endpoint may be gone before its relation is.
        let removed: BTreeSet<&ForkId> = order.iter().collect();
        let lost: Vec<(ForkId, ShareLevel)> = order
            .iter()
            .filter_map(|r| self.forks.get(r)?.endpoints())
            .flat_map(|(source, destination)| [(source, destination), (destination, source)])
            .filter(|(survivor, _)| !removed.contains(survivor))
            .filter_map(|(survivor, other)| {
                Some((survivor.clone(), self.forks.get(other)?.share_level))
            })
            .collect();
        for (survivor, level) in &lost {
            self.neighbors.on_neighbor_lost(survivor, *level);
        }

        for removed in &order {
            self.remove_one(removed);
        }
        tracing::debug!(fork = %id, cascaded = order.len() - 1, "removed fork");
        Ok(order)
    }

    fn remove_one(&mut self, id: &ForkId) {
        let Some(fork) = self.forks.remove(id) else {
            return;
        };
        if let Some((source, destination)) = fork.endpoints() {
            self.unlink(id, source);
            self.unlink(id, destination);
        }
        for tag in fork.tags.values() {
            self.tags.remove_holder(tag, id);
        }
        self.neighbors.forget(id);
        self.adjacency.remove(id);
        for other in self.forks.values_mut() {
            match &mut other.details {
                ForkDetails::Vertex {
                    included_vertices,
                    included_relations,
                } => {
                    included_vertices.remove(id);
                    included_relations.remove(id);
                }
                ForkDetails::GroupRelation { included_relations } => {
                    included_relations.remove(id);
                }
                ForkDetails::Relation { .. } => {}
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────

    /// Change the share level of a fork, shifting the tallies of every
    /// relation-adjacent fork one relation at a time.
    pub fn change_share_level(&mut self, id: &ForkId, new_level: ShareLevel) -> GraphResult<()> {
        let old_level = self.share_level_of(id)?;
        if old_level == new_level {
            return Ok(());
        }
        let neighbors: Vec<ForkId> = self
            .incident_relations(id)
            .filter_map(|relation| self.forks.get(relation)?.other_end(id).cloned())
            .collect();
        for neighbor in &neighbors {
            self.neighbors
                .on_endpoint_share_level_changed(neighbor, old_level, new_level);
        }
        let fork = self.require_fork_mut(id)?;
        fork.share_level = new_level;
        fork.touch();
        tracing::debug!(fork = %id, from = %old_level, to = %new_level, "changed share level");
        Ok(())
    }

    /// Point a relation at a new source.
    pub fn change_source(&mut self, relation: &ForkId, new_source: &ForkId) -> GraphResult<()> {
        self.change_endpoint(relation, new_source, Endpoint::Source)
    }

    /// Point a relation at a new destination.
    pub fn change_destination(
        &mut self,
        relation: &ForkId,
        new_destination: &ForkId,
    ) -> GraphResult<()> {
        self.change_endpoint(relation, new_destination, Endpoint::Destination)
    }

    // Old endpoint is decremented before the new one is incremented; the
    // unchanged endpoint sees a net tier shift only when the two differ in
    // share level.
    fn change_endpoint(
        &mut self,
        relation: &ForkId,
        new_endpoint: &ForkId,
        which: Endpoint,
    ) -> GraphResult<()> {
        let (source, destination) = self
            .require_fork(relation)?
            .endpoints()
            .map(|(s, d)| (s.clone(), d.clone()))
            .ok_or_else(|| GraphError::InvalidRelation(format!("{relation} is not a relation")))?;
        let (old_endpoint, new_source, new_destination) = match which {
            Endpoint::Source => (source.clone(), new_endpoint.clone(), destination.clone()),
            Endpoint::Destination => (destination.clone(), source.clone(), new_endpoint.clone()),
        };
        if &old_endpoint == new_endpoint {
            return Ok(());
        }
        self.validate_endpoints(relation, &new_source, &new_destination)?;

        let source_level = self.share_level_of(&source)?;
        let destination_level = self.share_level_of(&destination)?;
        let new_source_level = self.share_level_of(&new_source)?;
        let new_destination_level = self.share_level_of(&new_destination)?;

        self.neighbors
            .on_relation_removed(&source, source_level, &destination, destination_level);
        self.unlink(relation, &old_endpoint);
        self.link(relation, new_endpoint);
        self.neighbors.on_relation_added(
            &new_source,
            new_source_level,
            &new_destination,
            new_destination_level,
        );

        let fork = self.require_fork_mut(relation)?;
        fork.details = ForkDetails::Relation {
            source: new_source,
            destination: new_destination,
        };
        fork.touch();
        tracing::debug!(
            %relation,
            from = %old_endpoint,
            to = %new_endpoint,
            endpoint = ?which,
            "changed relation endpoint"
        );
        Ok(())
    }

    /// Convert `A -R-> B` into `A -new-> G -R-> B`, where G is a group
    /// relation including R. R's tags move to G; reference counts are
    /// unchanged. Returns G's id.
    pub fn convert_to_group_relation(
        &mut self,
        relation: &ForkId,
        label: impl Into<String>,
        share_level: ShareLevel,
    ) -> GraphResult<ForkId> {
        let original = self.require_fork(relation)?;
        let (source, _) = original
            .endpoints()
            .map(|(s, d)| (s.clone(), d.clone()))
            .ok_or_else(|| GraphError::InvalidRelation(format!("{relation} is not a relation")))?;
        let moved_tags = original.tags.clone();

        let group_id = ForkId::generate(&self.owner, ForkKind::GroupRelation);
        let mut group = Fork::new(
            group_id.clone(),
            share_level,
            ForkDetails::GroupRelation {
                included_relations: BTreeSet::from([relation.clone()]),
            },
        );
        group.label = label.into();
        group.tags = moved_tags.clone();
        self.forks.insert(group_id.clone(), group);

        for tag in moved_tags.values() {
            self.tags.transfer_holder(tag, relation, &group_id);
        }
        let original = self.require_fork_mut(relation)?;
        original.tags.clear();
        original.touch();

        self.change_source(relation, &group_id)?;
        self.create_relation(&source, &group_id)?;
        tracing::debug!(%relation, group = %group_id, tags = moved_tags.len(), "converted to group relation");
        Ok(group_id)
    }

    /// Set the label of a fork.
    pub fn set_label(&mut self, id: &ForkId, label: impl Into<String>) -> GraphResult<()> {
        let fork = self.require_fork_mut(id)?;
        fork.label = label.into();
        fork.touch();
        Ok(())
    }

    /// Set the comment of a fork.
    pub fn set_comment(&mut self, id: &ForkId, comment: impl Into<String>) -> GraphResult<()> {
        let fork = self.require_fork_mut(id)?;
        fork.comment = comment.into();
        fork.touch();
        Ok(())
    }

    /// Declare or undeclare a fork as a pattern.
    pub fn set_pattern(&mut self, id: &ForkId, is_pattern: bool) -> GraphResult<()> {
        let fork = self.require_fork_mut(id)?;
        fork.is_pattern = is_pattern;
        fork.touch();
        Ok(())
    }

    /// Forks declared as patterns, excluding clones made under a pattern.
    pub fn patterns(&self) -> impl Iterator<Item = &Fork> {
        self.forks
            .values()
            .filter(|f| f.is_pattern && !f.is_under_pattern)
    }

    /// Increment the usage counter of a pattern.
    pub(crate) fn increment_pattern_usage(&mut self, id: &ForkId) -> GraphResult<u64> {
        let fork = self.require_fork_mut(id)?;
        fork.pattern_usage += 1;
        Ok(fork.pattern_usage)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Repair
    // ─────────────────────────────────────────────────────────────────────

    /// Recompute a fork's tallies from the adjacency index.
    pub fn rebuild_neighbor_count(&self, id: &ForkId) -> GraphResult<NeighborCount> {
        self.require_fork(id)?;
        let levels = self.incident_relations(id).filter_map(|relation| {
            let other = self.forks.get(relation)?.other_end(id)?;
            Some(self.forks.get(other)?.share_level)
        });
        Ok(NeighborCount::tally(levels))
    }

    /// Every fork whose maintained tallies differ from a rebuild.
    pub fn verify_neighbor_counts(&self) -> Vec<CountMismatch> {
        self.forks
            .keys()
            .filter_map(|id| {
                let rebuilt = self.rebuild_neighbor_count(id).ok()?;
                let maintained = self.neighbors.get(id);
                (rebuilt != maintained).then(|| CountMismatch {
                    fork: id.clone(),
                    maintained,
                    rebuilt,
                })
            })
            .collect()
    }

    /// Overwrite drifted tallies with rebuilt ones. Returns the number of
    /// forks repaired.
    pub fn repair_neighbor_counts(&mut self) -> usize {
        let mismatches = self.verify_neighbor_counts();
        for mismatch in &mismatches {
            tracing::warn!(
                fork = %mismatch.fork,
                maintained = ?mismatch.maintained,
                rebuilt = ?mismatch.rebuilt,
                "repairing neighbor count"
            );
            self.neighbors.set(&mismatch.fork, mismatch.rebuilt);
        }
        let orphans: Vec<ForkId> = self
            .neighbors
            .ids()
            .filter(|id| !self.forks.contains_key(*id))
            .cloned()
            .collect();
        for orphan in &orphans {
            self.neighbors.forget(orphan);
        }
        mismatches.len() + orphans.len()
    }

    /// Rebuild the adjacency index from relation records (after loading a
    /// dump).
    pub fn rebuild_adjacency(&mut self) {
        let mut adjacency: BTreeMap<ForkId, BTreeSet<ForkId>> = BTreeMap::new();
        for fork in self.forks.values() {
            if let Some((source, destination)) = fork.endpoints() {
                adjacency.entry(source.clone()).or_default().insert(fork.id.clone());
                adjacency
                    .entry(destination.clone())
                    .or_default()
                    .insert(fork.id.clone());
            }
        }
        self.adjacency = adjacency;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExternalUri, TagDraft};

    fn graph() -> OwnerGraph {
        OwnerGraph::new(OwnerId::new("alice").unwrap())
    }

    fn assert_counts_consistent(g: &OwnerGraph) {
        assert_eq!(g.verify_neighbor_counts(), vec![]);
    }

    #[test]
    fn test_create_relation_updates_counts() {
        let mut g = graph();
        let a = g.create_vertex(ShareLevel::Private);
        let b = g.create_vertex(ShareLevel::Public);
        let ab = g.create_relation(&a, &b).unwrap();

        assert_eq!(g.fork(&ab).unwrap().share_level, ShareLevel::Private);
        assert_eq!(g.neighbor_count(&a).unwrap().public, 1);
        assert_eq!(g.neighbor_count(&b).unwrap().private, 1);
        assert_counts_consistent(&g);
    }

    #[test]
    fn test_relation_between_public_forks_is_public() {
        let mut g = graph();
        let a = g.create_vertex(ShareLevel::Public);
        let b = g.create_vertex(ShareLevel::Public);
        let ab = g.create_relation(&a, &b).unwrap();
        assert_eq!(g.fork(&ab).unwrap().share_level, ShareLevel::Public);
    }

    #[test]
    fn test_self_relation_rejected() {
        let mut g = graph();
        let a = g.create_vertex(ShareLevel::Private);
        assert!(matches!(
            g.create_relation(&a, &a),
            Err(GraphError::InvalidRelation(_))
        ));
    }

    #[test]
    fn test_relation_to_other_owner_rejected() {
        let mut g = graph();
        let a = g.create_vertex(ShareLevel::Private);
        let foreign = ForkId::generate(&OwnerId::new("bob").unwrap(), ForkKind::Vertex);
        assert!(matches!(
            g.create_relation(&a, &foreign),
            Err(GraphError::InvalidRelation(_))
        ));
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let mut g = graph();
        let ghost = ForkId::generate(g.owner(), ForkKind::Vertex);
        assert!(matches!(g.remove(&ghost), Err(GraphError::NotFound(_))));
    }

    #[test]
    fn test_remove_cascades_to_chained_relations() {
        let mut g = graph();
        let a = g.create_vertex(ShareLevel::Private);
        let b = g.create_vertex(ShareLevel::Private);
        let c = g.create_vertex(ShareLevel::Private);
        let ab = g.create_relation(&a, &b).unwrap();
        // relation onto a relation
        let c_ab = g.create_relation(&c, &ab).unwrap();

        let removed = g.remove(&a).unwrap();
        assert_eq!(removed, vec![c_ab.clone(), ab.clone(), a.clone()]);
        assert!(g.fork(&b).is_some());
        assert!(g.fork(&c).is_some());
        assert_eq!(g.neighbor_count(&b).unwrap().total, 0);
        assert_eq!(g.neighbor_count(&c).unwrap().total, 0);
        assert_counts_consistent(&g);
    }

    #[test]
    fn test_remove_relations_pointing_at_each_other() {
        let mut g = graph();
        let v = g.create_vertex(ShareLevel::Private);
        let w = g.create_vertex(ShareLevel::Public);
        let x = g.create_vertex(ShareLevel::Friends);
        let r1 = g.create_relation(&v, &w).unwrap();
        let r2 = g.create_relation(&r1, &x).unwrap();
        // r1: v -> r2, r2: r1 -> x
        g.change_destination(&r1, &r2).unwrap();
        assert_counts_consistent(&g);

        let removed = g.remove(&r1).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(g.fork(&r2).is_none());
        assert_eq!(g.neighbor_count(&v).unwrap(), NeighborCount::default());
        assert_eq!(g.neighbor_count(&w).unwrap(), NeighborCount::default());
        assert_eq!(g.neighbor_count(&x).unwrap(), NeighborCount::default());
        assert_counts_consistent(&g);
    }

    #[test]
    fn test_remove_keeps_tag_with_zero_references() {
        let mut g = graph();
        let a = g.create_vertex(ShareLevel::Private);
        let tag = g
            .attach_tag(&a, TagDraft::new(ExternalUri::new("https://example.org/x")))
            .unwrap()
            .tag;
        g.remove(&a).unwrap();
        let stored = g.tags().get(&tag.id).unwrap();
        assert_eq!(stored.reference_count, 0);
    }

    #[test]
    fn test_change_share_level_shifts_neighbors() {
        let mut g = graph();
        let a = g.create_vertex(ShareLevel::Private);
        let b = g.create_vertex(ShareLevel::Private);
        let c = g.create_vertex(ShareLevel::Private);
        g.create_relation(&a, &b).unwrap();
        g.create_relation(&c, &a).unwrap();

        g.change_share_level(&a, ShareLevel::Public).unwrap();
        assert_eq!(g.neighbor_count(&b).unwrap().public, 1);
        assert_eq!(g.neighbor_count(&c).unwrap().public, 1);
        assert_eq!(g.neighbor_count(&a).unwrap().private, 2);

        g.change_share_level(&a, ShareLevel::Friends).unwrap();
        assert_eq!(g.neighbor_count(&b).unwrap().friend, 1);
        assert_eq!(g.neighbor_count(&b).unwrap().public, 0);
        assert_counts_consistent(&g);
    }

    #[test]
    fn test_change_source_moves_counts() {
        let mut g = graph();
        let a = g.create_vertex(ShareLevel::Private);
        let b = g.create_vertex(ShareLevel::Public);
        let c = g.create_vertex(ShareLevel::Public);
        let ab = g.create_relation(&a, &b).unwrap();

        g.change_source(&ab, &c).unwrap();
        assert_eq!(g.neighbor_count(&a).unwrap().total, 0);
        assert_eq!(g.neighbor_count(&c).unwrap().public, 1);
        // b now sees a public neighbor instead of a private one
        let cb = g.neighbor_count(&b).unwrap();
        assert_eq!((cb.public, cb.private, cb.total), (1, 0, 1));
        assert_eq!(g.incident_relations(&a).count(), 0);
        assert_counts_consistent(&g);
    }

    #[test]
    fn test_change_destination_to_adjacent_endpoint() {
        let mut g = graph();
        let a = g.create_vertex(ShareLevel::Private);
        let b = g.create_vertex(ShareLevel::Friends);
        let c = g.create_vertex(ShareLevel::Public);
        let ab = g.create_relation(&a, &b).unwrap();
        g.create_relation(&b, &c).unwrap();

        g.change_destination(&ab, &c).unwrap();
        assert_counts_consistent(&g);
        assert_eq!(g.neighbor_count(&c).unwrap().total, 2);
        assert_eq!(g.neighbor_count(&b).unwrap().total, 1);
    }

    #[test]
    fn test_change_endpoint_to_self_relation_rejected() {
        let mut g = graph();
        let a = g.create_vertex(ShareLevel::Private);
        let b = g.create_vertex(ShareLevel::Private);
        let ab = g.create_relation(&a, &b).unwrap();
        assert!(matches!(
            g.change_source(&ab, &b),
            Err(GraphError::InvalidRelation(_))
        ));
        assert!(matches!(
            g.change_source(&ab, &ab),
            Err(GraphError::InvalidRelation(_))
        ));
        assert_counts_consistent(&g);
    }

    #[test]
    fn test_convert_to_group_relation_moves_tags() {
        let mut g = graph();
        let a = g.create_vertex(ShareLevel::Private);
        let b = g.create_vertex(ShareLevel::Private);
        let r = g.create_relation(&a, &b).unwrap();
        let t1 = g
            .attach_tag(&r, TagDraft::new(ExternalUri::new("urn:t1")))
            .unwrap()
            .tag;
        let t2 = g
            .attach_tag(&r, TagDraft::new(ExternalUri::new("urn:t2")))
            .unwrap()
            .tag;

        let group = g
            .convert_to_group_relation(&r, "group", ShareLevel::Private)
            .unwrap();

        assert!(g.fork(&r).unwrap().tags.is_empty());
        assert_eq!(g.fork(&group).unwrap().tags.len(), 2);
        assert_eq!(g.get_reference_count(&t1.id).unwrap(), 1);
        assert_eq!(g.get_reference_count(&t2.id).unwrap(), 1);
        assert_eq!(g.fork(&r).unwrap().endpoints(), Some((&group, &b)));
        assert_eq!(g.incident_relations(&group).count(), 2);
        assert_counts_consistent(&g);
    }

    #[test]
    fn test_group_vertex_includes_member_relations() {
        let mut g = graph();
        let a = g.create_vertex(ShareLevel::Private);
        let b = g.create_vertex(ShareLevel::Private);
        let c = g.create_vertex(ShareLevel::Private);
        let ab = g.create_relation(&a, &b).unwrap();
        g.create_relation(&b, &c).unwrap();

        let group = g.create_group_vertex(&[a.clone(), b.clone()], "ab").unwrap();
        let fork = g.fork(&group).unwrap();
        assert!(fork.is_composite());
        let included = fork.included();
        assert!(included.contains(&a) && included.contains(&b) && included.contains(&ab));
        assert_eq!(included.len(), 3);

        g.remove(&a).unwrap();
        assert_eq!(g.fork(&group).unwrap().included(), vec![b]);
    }
}
