//! Bounded, share-level-filtered subgraph extraction.
//!
//! The extractor walks breadth-first from a center fork (or from every
//! holder of a center tag) over a point-in-time view of the owner's graph.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::graph::OwnerGraph;
use crate::policy::ExtractionPolicy;
use crate::store::GraphStore;
use crate::types::{Fork, ForkId, ForkKind, ForkSnapshot, ShareLevelSet, SubGraph, TagId};

/// Subgraph extractor.
///
/// ## Algorithm
///
/// 1. Start with the center at depth 0; it is always included, whatever its
///    share level
/// 2. Pop the next fork; stop expanding it once its depth reaches the budget
/// 3. For every relation touching it (and, when the fork is itself a
///    relation, for its own two endpoints), admit the relation only if both
///    endpoints are allowed, then admit the opposite endpoint at depth + 1
/// 4. Add relations joining two already admitted forks
/// 5. Describe endpoints that were never admitted by identifier only
///
/// A visited set keyed by fork id makes every fork appear at most once and
/// guarantees termination on cyclic graphs.
pub struct SubGraphExtractor<S: GraphStore> {
    store: Arc<S>,
    policy: ExtractionPolicy,
}

impl<S: GraphStore + 'static> SubGraphExtractor<S> {
    /// Create a new extractor.
    pub fn new(store: Arc<S>, policy: ExtractionPolicy) -> Self {
        Self { store, policy }
    }

    /// Extract the subgraph around `center`.
    ///
    /// `max_depth` 0 yields the center alone; negative depths fail with
    /// `InvalidDepth` before the store is touched.
    pub async fn extract(
        &self,
        center: &ForkId,
        max_depth: i32,
        allowed: &ShareLevelSet,
    ) -> GraphResult<SubGraph> {
        let depth = self.policy.resolve_depth(max_depth)?;
        let view = self
            .store
            .snapshot(center.owner())
            .await
            .map_err(GraphError::from_store)?;
        let subgraph = extract_from_view(&view, center, depth, allowed, &self.policy.params_hash())?;
        tracing::debug!(
            %center,
            depth,
            forks = subgraph.num_forks(),
            relations = subgraph.num_relations(),
            "extracted subgraph"
        );
        Ok(subgraph)
    }

    /// Extract around `center` with the policy's default depth.
    pub async fn extract_default(
        &self,
        center: &ForkId,
        allowed: &ShareLevelSet,
    ) -> GraphResult<SubGraph> {
        let depth = i32::try_from(self.policy.default_depth).unwrap_or(i32::MAX);
        self.extract(center, depth, allowed).await
    }

    /// Extract the union of subgraphs around every fork holding `tag`.
    ///
    /// Holders sit at depth 1 and are expanded `max_depth - 1` further hops.
    /// The tag itself becomes the result's center. A tag whose share level is
    /// not allowed is reported as missing.
    pub async fn extract_around_tag(
        &self,
        tag: &TagId,
        max_depth: i32,
        allowed: &ShareLevelSet,
    ) -> GraphResult<SubGraph> {
        let depth = self.policy.resolve_depth(max_depth)?;
        let view = self
            .store
            .snapshot(tag.owner())
            .await
            .map_err(GraphError::from_store)?;
        let center_tag = view
            .tags()
            .get(tag)
            .filter(|t| allowed.contains(t.share_level))
            .ok_or_else(|| GraphError::NotFound(format!("tag {tag}")))?;

        let params_hash = self.policy.params_hash();
        let mut subgraph = SubGraph::empty(depth, params_hash.as_str());
        subgraph.center_tag = Some(center_tag.clone());
        if depth == 0 {
            return Ok(subgraph);
        }

        let mut holders = 0usize;
        for holder in view.tags().holders(tag) {
            let Some(fork) = view.fork(holder) else {
                continue;
            };
            if !allowed.contains(fork.share_level) {
                continue;
            }
            holders += 1;
            subgraph.merge(extract_from_view(&view, holder, depth - 1, allowed, &params_hash)?);
        }
        tracing::debug!(
            %tag,
            depth,
            holders,
            forks = subgraph.num_forks(),
            relations = subgraph.num_relations(),
            "extracted subgraph around tag"
        );
        Ok(subgraph)
    }

    /// Get the policy.
    pub fn policy(&self) -> &ExtractionPolicy {
        &self.policy
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Run a center-fork extraction against an already captured view.
pub fn extract_from_view(
    view: &OwnerGraph,
    center: &ForkId,
    depth: u32,
    allowed: &ShareLevelSet,
    policy_params_hash: &str,
) -> GraphResult<SubGraph> {
    let center_fork = view.require_fork(center)?;
    let mut walk = Walk {
        view,
        center,
        allowed,
        subgraph: SubGraph::empty(depth, policy_params_hash),
        visited: BTreeSet::from([center.clone()]),
    };
    walk.subgraph.center = Some(center.clone());
    walk.admit(center_fork);

    let mut queue = VecDeque::from([(center.clone(), 0u32)]);
    while let Some((current, hops)) = queue.pop_front() {
        if hops >= depth {
            continue;
        }
        for (relation, neighbor) in neighborhood(view, &current) {
            let Some(relation_fork) = view.fork(&relation) else {
                continue;
            };
            if !walk.relation_allowed(relation_fork) {
                continue;
            }
            walk.admit_relation(relation_fork);
            if walk.visited.insert(relation.clone()) {
                queue.push_back((relation, hops + 1));
            }
            let Some(neighbor_fork) = view.fork(&neighbor) else {
                continue;
            };
            // A chained relation is an edge too: both its ends must be visible.
            if neighbor_fork.kind() == ForkKind::Relation
                && &neighbor != center
                && !walk.relation_allowed(neighbor_fork)
            {
                continue;
            }
            if walk.visited.insert(neighbor.clone()) {
                walk.admit(neighbor_fork);
                queue.push_back((neighbor, hops + 1));
            }
        }
    }

    walk.close_relations();
    walk.describe_endpoints();
    Ok(walk.subgraph)
}

/// `(relation, opposite endpoint)` pairs reachable from `id` in one hop.
fn neighborhood(view: &OwnerGraph, id: &ForkId) -> Vec<(ForkId, ForkId)> {
    let mut pairs: Vec<(ForkId, ForkId)> = view
        .incident_relations(id)
        .filter_map(|relation| {
            let other = view.fork(relation)?.other_end(id)?;
            Some((relation.clone(), other.clone()))
        })
        .collect();
    if let Some((source, destination)) = view.fork(id).and_then(Fork::endpoints) {
        pairs.push((id.clone(), source.clone()));
        pairs.push((id.clone(), destination.clone()));
    }
    pairs
}

struct Walk<'a> {
    view: &'a OwnerGraph,
    center: &'a ForkId,
    allowed: &'a ShareLevelSet,
    subgraph: SubGraph,
    visited: BTreeSet<ForkId>,
}

impl Walk<'_> {
    /// The center is admitted whatever its level.
    fn admissible(&self, id: &ForkId) -> bool {
        id == self.center
            || self
                .view
                .fork(id)
                .is_some_and(|f| self.allowed.contains(f.share_level))
    }

    fn relation_allowed(&self, relation: &Fork) -> bool {
        relation
            .endpoints()
            .is_some_and(|(s, d)| self.admissible(s) && self.admissible(d))
    }

    fn snapshot(&self, fork: &Fork) -> ForkSnapshot {
        ForkSnapshot::full(
            fork,
            self.view.neighbors().get(&fork.id),
            self.view.resolve_tags(fork),
        )
    }

    /// Record a traversed fork. Relations other than the center are edges.
    fn admit(&mut self, fork: &Fork) {
        let snapshot = self.snapshot(fork);
        if fork.kind() == ForkKind::Relation && &fork.id != self.center {
            self.subgraph.insert_relation(snapshot);
        } else {
            self.subgraph.insert_fork(snapshot);
        }
    }

    fn admit_relation(&mut self, relation: &Fork) {
        if &relation.id != self.center && !self.subgraph.relations.contains_key(&relation.id) {
            let snapshot = self.snapshot(relation);
            self.subgraph.insert_relation(snapshot);
        }
    }

    /// Add relations whose endpoints were both admitted but which no
    /// expansion step crossed (both ends at the depth limit).
    fn close_relations(&mut self) {
        let view = self.view;
        let admitted: Vec<ForkId> = self.subgraph.traversed_ids().cloned().collect();
        for id in &admitted {
            for relation in view.incident_relations(id) {
                if self.subgraph.contains(relation) {
                    continue;
                }
                let Some(relation_fork) = view.fork(relation) else {
                    continue;
                };
                let joins_admitted = relation_fork
                    .other_end(id)
                    .is_some_and(|other| self.is_traversed(other));
                if joins_admitted && self.relation_allowed(relation_fork) {
                    let snapshot = self.snapshot(relation_fork);
                    self.subgraph.insert_relation(snapshot);
                }
            }
        }
    }

    fn is_traversed(&self, id: &ForkId) -> bool {
        self.subgraph
            .fork(id)
            .or_else(|| self.subgraph.relation(id))
            .is_some_and(|s| !s.reference_only)
    }

    /// Identifier-only entries for relation endpoints never admitted.
    fn describe_endpoints(&mut self) {
        let missing: BTreeSet<ForkId> = self
            .subgraph
            .relations
            .values()
            .filter_map(|s| s.endpoints.clone())
            .flat_map(|(s, d)| [s, d])
            .filter(|id| !self.subgraph.contains(id))
            .collect();
        for id in missing {
            self.subgraph.insert_fork(ForkSnapshot::reference(id));
        }
    }
}
