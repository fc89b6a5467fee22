//! Deep cloning of fork trees across owners.
//!
//! The cloner reads the source owner through a snapshot and writes the
//! destination owner in a single transaction, so only one owner is ever
//! locked at a time.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::graph::OwnerGraph;
use crate::policy::ClonePolicy;
use crate::store::GraphStore;
use crate::types::{
    CloneOrigin, ExternalUri, Fork, ForkDetails, ForkId, OwnerId, ShareLevel, TagDraft, Tree,
};

/// Label and comment of a clone's origin, as recorded at clone time versus
/// as they read now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginDrift {
    /// Root of the clone.
    pub clone_root: ForkId,
    /// Fork the clone was made from.
    pub origin: ForkId,
    /// Origin label when the clone was made.
    pub recorded_label: String,
    /// Origin comment when the clone was made.
    pub recorded_comment: String,
    /// Current origin label, `None` once the origin is gone.
    pub current_label: Option<String>,
    /// Current origin comment, `None` once the origin is gone.
    pub current_comment: Option<String>,
}

impl OriginDrift {
    /// Whether the origin changed (or disappeared) since the clone was made.
    pub fn has_drifted(&self) -> bool {
        self.current_label.as_deref() != Some(self.recorded_label.as_str())
            || self.current_comment.as_deref() != Some(self.recorded_comment.as_str())
    }
}

/// Fork cloner.
///
/// ## Algorithm
///
/// 1. Validate the tree against a snapshot of the source owner
/// 2. Mint a fresh identifier per member, owned by the destination
/// 3. Copy vertices and group relations, then every relation whose endpoints
///    were both copied, in dependency order for relations chained onto
///    relations
/// 4. Attach each member's tags to its copy, reusing the destination
///    owner's entries for the same external resource
/// 5. Tag the copy of the root with the original root's identifier
/// 6. Bump the source pattern's usage counter once
pub struct ForkCloner<S: GraphStore> {
    store: Arc<S>,
    policy: ClonePolicy,
}

impl<S: GraphStore + 'static> ForkCloner<S> {
    /// Create a new cloner.
    pub fn new(store: Arc<S>, policy: ClonePolicy) -> Self {
        Self { store, policy }
    }

    /// Collect the tree structurally reachable from `root`.
    ///
    /// Follows relations, relation endpoints and included elements, up to
    /// `tree_max_depth` hops. Tag identifications are never followed.
    pub async fn collect_tree(&self, root: &ForkId) -> GraphResult<Tree> {
        let view = self.snapshot(root.owner()).await?;
        view.require_fork(root)?;

        let mut members = BTreeSet::from([root.clone()]);
        let mut queue = VecDeque::from([(root.clone(), 0u32)]);
        while let Some((current, hops)) = queue.pop_front() {
            if hops >= self.policy.tree_max_depth {
                continue;
            }
            for next in structural_neighbors(&view, &current) {
                if members.insert(next.clone()) {
                    if members.len() > self.policy.max_members {
                        return Err(self.too_large(root));
                    }
                    queue.push_back((next, hops + 1));
                }
            }
        }
        Ok(Tree::new(root.clone(), members))
    }

    /// Clone `tree` into `destination`'s graph and return the new root.
    ///
    /// Every copy is private. Relations reaching outside the tree are not
    /// copied.
    pub async fn clone_tree(&self, tree: &Tree, destination: &OwnerId) -> GraphResult<ForkId> {
        let root = tree.root();
        if !tree.contains(root) {
            return Err(GraphError::InvalidTree(format!(
                "root {root} is not a member"
            )));
        }
        if let Some(stranger) = tree.members().iter().find(|m| m.owner() != root.owner()) {
            return Err(GraphError::InvalidTree(format!(
                "{stranger} is not owned by {}",
                root.owner()
            )));
        }
        if tree.len() > self.policy.max_members {
            return Err(self.too_large(root));
        }

        let view = self.snapshot(root.owner()).await?;
        let plan = ClonePlan::build(&view, tree, destination)?;
        let new_root = plan.new_root.clone();
        let root_is_pattern = plan.root_is_pattern;
        let copied = plan.forks.len() + plan.relations.len();
        let skipped = plan.skipped_relations;

        self.store.transact(destination, move |g| plan.apply(g)).await?;

        if root_is_pattern {
            let source = root.clone();
            match self
                .store
                .transact(root.owner(), move |g| g.increment_pattern_usage(&source))
                .await
            {
                Ok(usage) => tracing::debug!(pattern = %root, usage, "pattern used"),
                Err(e) => tracing::warn!(
                    pattern = %root,
                    error = %e,
                    "clone committed but pattern usage was not recorded"
                ),
            }
        }

        tracing::info!(
            origin = %root,
            clone = %new_root,
            %destination,
            copied,
            skipped_relations = skipped,
            pattern = root_is_pattern,
            "cloned tree"
        );
        Ok(new_root)
    }

    /// Clone roots in `owner`'s graph made from `origin`.
    pub async fn clones_of(&self, origin: &ForkId, owner: &OwnerId) -> GraphResult<Vec<ForkId>> {
        let view = self.snapshot(owner).await?;
        Ok(view
            .forks()
            .filter(|f| f.cloned_from.as_ref().is_some_and(|o| &o.fork == origin))
            .map(|f| f.id.clone())
            .collect())
    }

    /// Compare the origin description a clone root recorded when it was made
    /// with its origin's current one.
    pub async fn origin_drift(&self, clone_root: &ForkId) -> GraphResult<OriginDrift> {
        let view = self.snapshot(clone_root.owner()).await?;
        let clone = view.require_fork(clone_root)?;
        let recorded = clone
            .cloned_from
            .clone()
            .ok_or_else(|| GraphError::NotFound(format!("clone origin of {clone_root}")))?;

        let origin_view = self.snapshot(recorded.fork.owner()).await?;
        let current = origin_view.fork(&recorded.fork);
        Ok(OriginDrift {
            clone_root: clone_root.clone(),
            origin: recorded.fork.clone(),
            recorded_label: recorded.label.clone(),
            recorded_comment: recorded.comment.clone(),
            current_label: current.map(|f| f.label.clone()),
            current_comment: current.map(|f| f.comment.clone()),
        })
    }

    /// Get the policy.
    pub fn policy(&self) -> &ClonePolicy {
        &self.policy
    }

    async fn snapshot(&self, owner: &OwnerId) -> GraphResult<Arc<OwnerGraph>> {
        self.store.snapshot(owner).await.map_err(GraphError::from_store)
    }

    fn too_large(&self, root: &ForkId) -> GraphError {
        GraphError::InvalidTree(format!(
            "tree of {root} exceeds {} members",
            self.policy.max_members
        ))
    }
}

/// Forks one structural hop away: incident relations, their far ends, own
/// endpoints and included elements.
fn structural_neighbors(view: &OwnerGraph, id: &ForkId) -> Vec<ForkId> {
    let mut next = Vec::new();
    for relation in view.incident_relations(id) {
        next.push(relation.clone());
        if let Some(other) = view.fork(relation).and_then(|r| r.other_end(id)) {
            next.push(other.clone());
        }
    }
    if let Some(fork) = view.fork(id) {
        if let Some((source, destination)) = fork.endpoints() {
            next.push(source.clone());
            next.push(destination.clone());
        }
        next.extend(fork.included().into_iter().filter(|i| view.fork(i).is_some()));
    }
    next
}

/// Destination records prepared from a source snapshot.
struct ClonePlan {
    new_root: ForkId,
    root_is_pattern: bool,
    /// Non-relation copies.
    forks: Vec<Fork>,
    /// Relation copies, each after the relations it is chained onto.
    relations: Vec<Fork>,
    /// Tags to attach per copy.
    tags: Vec<(ForkId, TagDraft)>,
    back_reference: TagDraft,
    skipped_relations: usize,
}

impl ClonePlan {
    fn build(view: &OwnerGraph, tree: &Tree, destination: &OwnerId) -> GraphResult<Self> {
        let root = view.require_fork(tree.root())?;
        if root.is_composite() && tree.len() < 2 {
            return Err(GraphError::InvalidTree(format!(
                "composite root {} needs at least two members",
                root.id
            )));
        }
        let sources = tree
            .members()
            .iter()
            .map(|id| view.require_fork(id))
            .collect::<GraphResult<Vec<&Fork>>>()?;

        let (nodes, mut pending): (Vec<&Fork>, Vec<&Fork>) =
            sources.into_iter().partition(|f| f.endpoints().is_none());
        let mut placed: BTreeSet<&ForkId> = nodes.iter().map(|f| &f.id).collect();
        let mut ordered: Vec<&Fork> = Vec::new();
        loop {
            let before = ordered.len();
            pending.retain(|&relation| match relation.endpoints() {
                Some((s, d)) if placed.contains(s) && placed.contains(d) => {
                    placed.insert(&relation.id);
                    ordered.push(relation);
                    false
                }
                _ => true,
            });
            if ordered.len() == before {
                break;
            }
        }

        let id_map: BTreeMap<ForkId, ForkId> = nodes
            .iter()
            .chain(ordered.iter())
            .map(|f| (f.id.clone(), ForkId::generate(destination, f.kind())))
            .collect();
        let root_is_pattern = root.is_pattern;
        let copy = |source: &Fork| -> GraphResult<Fork> {
            let id = remap(&id_map, &source.id)?;
            let mut fork = Fork::new(
                id,
                ShareLevel::Private,
                remap_details(&id_map, &source.details)?,
            );
            fork.label = source.label.clone();
            fork.comment = source.comment.clone();
            if root_is_pattern {
                fork.pattern_origin = Some(root.id.clone());
                fork.is_under_pattern = source.id != root.id;
            }
            if source.id == root.id {
                fork.cloned_from = Some(CloneOrigin::of(root));
            }
            Ok(fork)
        };
        let forks = nodes.iter().map(|&f| copy(f)).collect::<GraphResult<Vec<_>>>()?;
        let relations = ordered.iter().map(|&f| copy(f)).collect::<GraphResult<Vec<_>>>()?;

        let mut tags = Vec::new();
        for source in nodes.iter().chain(ordered.iter()) {
            let copy_id = remap(&id_map, &source.id)?;
            for tag in view.resolve_tags(source) {
                tags.push((copy_id.clone(), TagDraft::from_tag(&tag)));
            }
        }

        Ok(Self {
            new_root: remap(&id_map, &root.id)?,
            root_is_pattern,
            forks,
            relations,
            tags,
            back_reference: TagDraft::new(ExternalUri::from(&root.id))
                .with_label(root.label.clone())
                .with_comment(root.comment.clone()),
            skipped_relations: pending.len(),
        })
    }

    fn apply(self, graph: &mut OwnerGraph) -> GraphResult<()> {
        for fork in self.forks {
            graph.insert_node(fork)?;
        }
        for relation in self.relations {
            graph.insert_relation(relation)?;
        }
        for (fork, draft) in &self.tags {
            graph.attach_tag_exact(fork, draft)?;
        }
        graph.attach_tag_exact(&self.new_root, &self.back_reference)?;
        Ok(())
    }
}

fn remap(id_map: &BTreeMap<ForkId, ForkId>, id: &ForkId) -> GraphResult<ForkId> {
    id_map
        .get(id)
        .cloned()
        .ok_or_else(|| GraphError::InvalidTree(format!("{id} was not copied")))
}

/// Rewrite details onto copied ids; included placeholders of forks that were
/// not copied are dropped.
fn remap_details(
    id_map: &BTreeMap<ForkId, ForkId>,
    details: &ForkDetails,
) -> GraphResult<ForkDetails> {
    let keep = |ids: &BTreeSet<ForkId>| -> BTreeSet<ForkId> {
        ids.iter().filter_map(|id| id_map.get(id).cloned()).collect()
    };
    Ok(match details {
        ForkDetails::Vertex {
            included_vertices,
            included_relations,
        } => ForkDetails::Vertex {
            included_vertices: keep(included_vertices),
            included_relations: keep(included_relations),
        },
        ForkDetails::Relation {
            source,
            destination,
        } => ForkDetails::Relation {
            source: remap(id_map, source)?,
            destination: remap(id_map, destination)?,
        },
        ForkDetails::GroupRelation { included_relations } => ForkDetails::GroupRelation {
            included_relations: keep(included_relations),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGraphStore;
    use crate::types::ForkKind;

    fn alice() -> OwnerId {
        OwnerId::new("alice").unwrap()
    }

    fn bob() -> OwnerId {
        OwnerId::new("bob").unwrap()
    }

    fn cloner(store: Arc<InMemoryGraphStore>) -> ForkCloner<InMemoryGraphStore> {
        ForkCloner::new(store, ClonePolicy::default())
    }

    /// Public P -> Q -> R with a tag on Q.
    async fn pattern(store: &InMemoryGraphStore) -> (ForkId, ForkId, ForkId) {
        store
            .transact(&alice(), |g| {
                let p = g.create_vertex(ShareLevel::Public);
                let q = g.create_vertex(ShareLevel::Public);
                let r = g.create_vertex(ShareLevel::Public);
                g.set_label(&p, "pattern")?;
                g.set_comment(&p, "v1")?;
                g.set_pattern(&p, true)?;
                g.create_relation(&p, &q)?;
                g.create_relation(&q, &r)?;
                g.attach_tag(&q, TagDraft::new(ExternalUri::new("urn:topic")).with_label("topic"))?;
                Ok((p, q, r))
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_collect_tree_follows_relations() {
        let store = Arc::new(InMemoryGraphStore::new());
        let (p, q, r) = pattern(&store).await;
        let tree = cloner(store).collect_tree(&p).await.unwrap();
        assert_eq!(tree.len(), 5);
        for id in [&p, &q, &r] {
            assert!(tree.contains(id));
        }
    }

    #[tokio::test]
    async fn test_collect_tree_ignores_tag_identifications() {
        let store = Arc::new(InMemoryGraphStore::new());
        let (p, other) = store
            .transact(&alice(), |g| {
                let p = g.create_vertex(ShareLevel::Private);
                let other = g.create_vertex(ShareLevel::Private);
                g.attach_tag(&p, TagDraft::new(ExternalUri::from(&other)))?;
                Ok((p, other))
            })
            .await
            .unwrap();
        let tree = cloner(store).collect_tree(&p).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert!(!tree.contains(&other));
    }

    #[tokio::test]
    async fn test_collect_tree_respects_member_limit() {
        let store = Arc::new(InMemoryGraphStore::new());
        let (p, _, _) = pattern(&store).await;
        let err = ForkCloner::new(store, ClonePolicy::new(64, 2))
            .collect_tree(&p)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidTree(_)));
    }

    #[tokio::test]
    async fn test_clone_pattern_into_other_owner() {
        let store = Arc::new(InMemoryGraphStore::new());
        let (p, _, _) = pattern(&store).await;
        let cloner = cloner(store.clone());
        let tree = cloner.collect_tree(&p).await.unwrap();
        let new_root = cloner.clone_tree(&tree, &bob()).await.unwrap();

        assert_eq!(new_root.owner(), &bob());
        let dest = store.snapshot(&bob()).await.unwrap();
        assert_eq!(dest.num_forks(), 5);
        assert!(dest.forks().all(|f| f.share_level == ShareLevel::Private));
        assert!(dest.forks().all(|f| f.pattern_origin.as_ref() == Some(&p)));

        let copy = dest.fork(&new_root).unwrap();
        assert!(!copy.is_pattern);
        assert!(!copy.is_under_pattern);
        assert_eq!(copy.label, "pattern");
        assert!(copy.holds(&ExternalUri::from(&p)));
        assert_eq!(dest.patterns().count(), 0);

        let source = store.snapshot(&alice()).await.unwrap();
        assert_eq!(source.fork(&p).unwrap().pattern_usage, 1);
    }

    #[tokio::test]
    async fn test_clone_reuses_destination_tags() {
        let store = Arc::new(InMemoryGraphStore::new());
        let (p, _, _) = pattern(&store).await;
        let existing = store
            .transact(&bob(), |g| {
                let v = g.create_vertex(ShareLevel::Private);
                Ok(g.attach_tag(&v, TagDraft::new(ExternalUri::new("urn:topic")))?.tag)
            })
            .await
            .unwrap();
        let cloner = cloner(store.clone());
        let tree = cloner.collect_tree(&p).await.unwrap();
        cloner.clone_tree(&tree, &bob()).await.unwrap();

        let dest = store.snapshot(&bob()).await.unwrap();
        let tag = dest.tags().find_by_external(&ExternalUri::new("urn:topic")).unwrap();
        assert_eq!(tag.id, existing.id);
        assert_eq!(tag.reference_count, 2);
    }

    #[tokio::test]
    async fn test_relations_leaving_the_tree_are_dropped() {
        let store = Arc::new(InMemoryGraphStore::new());
        let (a, b, ab) = store
            .transact(&alice(), |g| {
                let a = g.create_vertex(ShareLevel::Private);
                let b = g.create_vertex(ShareLevel::Private);
                let ab = g.create_relation(&a, &b)?;
                Ok((a, b, ab))
            })
            .await
            .unwrap();
        let tree = Tree::new(a.clone(), [a.clone(), ab.clone()]);
        let new_root = cloner(store.clone()).clone_tree(&tree, &bob()).await.unwrap();

        let dest = store.snapshot(&bob()).await.unwrap();
        assert_eq!(dest.num_forks(), 1);
        assert_eq!(dest.neighbor_count(&new_root).unwrap().total, 0);
        assert!(dest.fork(&b).is_none());
    }

    #[tokio::test]
    async fn test_root_outside_members_is_invalid() {
        let store = Arc::new(InMemoryGraphStore::new());
        let (p, q, _) = pattern(&store).await;
        let err = cloner(store)
            .clone_tree(&Tree::new(p, [q]), &bob())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidTree(_)));
    }

    #[tokio::test]
    async fn test_lone_composite_root_is_invalid() {
        let store = Arc::new(InMemoryGraphStore::new());
        let group = store
            .transact(&alice(), |g| {
                let a = g.create_vertex(ShareLevel::Private);
                let b = g.create_vertex(ShareLevel::Private);
                g.create_group_vertex(&[a, b], "group")
            })
            .await
            .unwrap();
        let err = cloner(store.clone())
            .clone_tree(&Tree::new(group.clone(), [group]), &bob())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidTree(_)));
        assert_eq!(store.snapshot(&bob()).await.unwrap().num_forks(), 0);
    }

    #[tokio::test]
    async fn test_missing_member_leaves_destination_untouched() {
        let store = Arc::new(InMemoryGraphStore::new());
        let (p, _, _) = pattern(&store).await;
        let ghost = ForkId::generate(&alice(), ForkKind::Vertex);
        let err = cloner(store.clone())
            .clone_tree(&Tree::new(p.clone(), [p.clone(), ghost]), &bob())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::NotFound(_)));
        assert_eq!(store.snapshot(&bob()).await.unwrap().num_forks(), 0);
        let source = store.snapshot(&alice()).await.unwrap();
        assert_eq!(source.fork(&p).unwrap().pattern_usage, 0);
    }

    #[tokio::test]
    async fn test_chained_relations_are_copied() {
        let store = Arc::new(InMemoryGraphStore::new());
        let a = store
            .transact(&alice(), |g| {
                let a = g.create_vertex(ShareLevel::Private);
                let b = g.create_vertex(ShareLevel::Private);
                let c = g.create_vertex(ShareLevel::Private);
                let ab = g.create_relation(&a, &b)?;
                g.create_relation(&c, &ab)?;
                Ok(a)
            })
            .await
            .unwrap();
        let cloner = cloner(store.clone());
        let tree = cloner.collect_tree(&a).await.unwrap();
        assert_eq!(tree.len(), 5);
        cloner.clone_tree(&tree, &bob()).await.unwrap();
        let dest = store.snapshot(&bob()).await.unwrap();
        assert_eq!(dest.num_forks(), 5);
        assert!(dest.verify_neighbor_counts().is_empty());
    }

    #[tokio::test]
    async fn test_origin_drift() {
        let store = Arc::new(InMemoryGraphStore::new());
        let (p, _, _) = pattern(&store).await;
        let cloner = cloner(store.clone());
        let tree = cloner.collect_tree(&p).await.unwrap();
        let clone_root = cloner.clone_tree(&tree, &bob()).await.unwrap();

        assert_eq!(cloner.clones_of(&p, &bob()).await.unwrap(), vec![clone_root.clone()]);
        assert!(!cloner.origin_drift(&clone_root).await.unwrap().has_drifted());

        let origin = p.clone();
        store
            .transact(&alice(), move |g| g.set_comment(&origin, "v2"))
            .await
            .unwrap();
        let drift = cloner.origin_drift(&clone_root).await.unwrap();
        assert!(drift.has_drifted());
        assert_eq!(drift.recorded_comment, "v1");
        assert_eq!(drift.current_comment.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_second_clone_records_current_origin() {
        let store = Arc::new(InMemoryGraphStore::new());
        let (p, _, _) = pattern(&store).await;
        let cloner = cloner(store.clone());
        let tree = cloner.collect_tree(&p).await.unwrap();
        let first = cloner.clone_tree(&tree, &bob()).await.unwrap();

        let origin = p.clone();
        store
            .transact(&alice(), move |g| g.set_label(&origin, "pattern v2"))
            .await
            .unwrap();
        let second = cloner.clone_tree(&tree, &bob()).await.unwrap();

        let drift = cloner.origin_drift(&second).await.unwrap();
        assert_eq!(drift.recorded_label, "pattern v2");
        assert!(!drift.has_drifted());
        let stale = cloner.origin_drift(&first).await.unwrap();
        assert_eq!(stale.recorded_label, "pattern");
        assert!(stale.has_drifted());
        assert_eq!(cloner.clones_of(&p, &bob()).await.unwrap().len(), 2);
    }
}
