//! Reference-counted tag registry.
//!
//! Tags are keyed by external resource within an owner's registry: the first
//! attach of a resource creates the entry, later attaches reuse it and keep
//! the stored description. The registry keeps a reverse index from tag to
//! holder forks; a tag's reference count mirrors the size of that set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::OwnerGraph;
use crate::error::{GraphError, GraphResult};
use crate::types::{
    ExternalUri, Fork, ForkId, OwnerId, ShareLevel, Tag, TagAttachment, TagDraft, TagId,
};

/// Tags of one owner plus the holder reverse index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRegistry {
    tags: BTreeMap<TagId, Tag>,
    by_external: BTreeMap<ExternalUri, TagId>,
    holders: BTreeMap<TagId, BTreeSet<ForkId>>,
}

impl TagRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag by id.
    pub fn get(&self, id: &TagId) -> Option<&Tag> {
        self.tags.get(id)
    }

    /// Tag registered for an external resource.
    pub fn find_by_external(&self, uri: &ExternalUri) -> Option<&Tag> {
        self.by_external.get(uri).and_then(|id| self.tags.get(id))
    }

    /// Forks directly holding a tag, ordered.
    pub fn holders(&self, id: &TagId) -> impl Iterator<Item = &ForkId> {
        self.holders.get(id).into_iter().flatten()
    }

    /// All tags, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    /// Number of registered tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    fn require(&self, id: &TagId) -> GraphResult<&Tag> {
        self.tags
            .get(id)
            .ok_or_else(|| GraphError::NotFound(format!("tag {id}")))
    }

    /// Existing entry for the draft's resource, or a new one.
    fn lookup_or_insert(&mut self, owner: &OwnerId, draft: &TagDraft) -> (TagId, bool) {
        if let Some(id) = self.by_external.get(&draft.external_uri) {
            return (id.clone(), false);
        }
        let id = TagId::generate(owner);
        self.tags.insert(id.clone(), Tag::from_draft(id.clone(), draft));
        self.by_external
            .insert(draft.external_uri.clone(), id.clone());
        (id, true)
    }

    /// Record `fork` as a holder. Returns whether it was new.
    fn add_holder(&mut self, id: &TagId, fork: &ForkId) -> bool {
        let inserted = self
            .holders
            .entry(id.clone())
            .or_default()
            .insert(fork.clone());
        if inserted {
            if let Some(tag) = self.tags.get_mut(id) {
                tag.reference_count += 1;
            }
        }
        inserted
    }

    /// Drop `fork` as a holder. Returns whether it was one.
    pub(crate) fn remove_holder(&mut self, id: &TagId, fork: &ForkId) -> bool {
        let removed = match self.holders.get_mut(id) {
            Some(set) => {
                let removed = set.remove(fork);
                if set.is_empty() {
                    self.holders.remove(id);
                }
                removed
            }
            None => false,
        };
        if removed {
            if let Some(tag) = self.tags.get_mut(id) {
                tag.reference_count = tag.reference_count.saturating_sub(1);
            }
        }
        removed
    }

    /// Move holdership from one fork to another without touching the count.
    pub(crate) fn transfer_holder(&mut self, id: &TagId, from: &ForkId, to: &ForkId) {
        if let Some(set) = self.holders.get_mut(id) {
            if set.remove(from) {
                set.insert(to.clone());
            }
        }
    }

    fn delete(&mut self, id: &TagId) -> Option<Tag> {
        let tag = self.tags.remove(id)?;
        self.by_external.remove(&tag.external_uri);
        self.holders.remove(id);
        Some(tag)
    }
}

impl OwnerGraph {
    /// Attach a tag to a fork.
    ///
    /// Reuses the owner's existing entry for the same external resource
    /// (first writer wins on description). When the resource names another
    /// fork of this graph, the fork also receives every tag that element
    /// holds, one level deep; a tag that would identify the fork to itself is
    /// skipped.
    ///
    /// A draft naming the fork's own id is rejected with `SelfIdentification`
    /// rather than identifying the fork to itself: that only ever happens
    /// through [`OwnerGraph::identify_to_self`], never as a side effect.
    pub fn attach_tag(&mut self, fork: &ForkId, draft: TagDraft) -> GraphResult<TagAttachment> {
        self.check_attachable(fork, &draft.external_uri)?;
        let identified = draft
            .external_uri
            .as_fork_id()
            .filter(|target| target != fork)
            .and_then(|target| self.forks.get(&target))
            .map(|target| target.tags.clone())
            .unwrap_or_default();

        let (tag_id, created) = self.attach_unchecked(fork, &draft);

        let own_uri = ExternalUri::from(fork);
        let mut inherited = Vec::new();
        for (uri, inherited_id) in identified {
            if uri == own_uri || uri == draft.external_uri {
                continue;
            }
            if self.hold(fork, &uri, &inherited_id) {
                if let Some(tag) = self.tags.get(&inherited_id) {
                    inherited.push(tag.clone());
                }
            }
        }

        let tag = self.tags.require(&tag_id)?.clone();
        tracing::debug!(
            %fork,
            tag = %tag.id,
            external_uri = %tag.external_uri,
            created,
            inherited = inherited.len(),
            "attached tag"
        );
        Ok(TagAttachment {
            tag,
            inherited,
            created,
        })
    }

    /// Attach exactly one tag, without inheriting from identified forks.
    pub(crate) fn attach_tag_exact(&mut self, fork: &ForkId, draft: &TagDraft) -> GraphResult<Tag> {
        self.check_attachable(fork, &draft.external_uri)?;
        let (tag_id, _) = self.attach_unchecked(fork, draft);
        Ok(self.tags.require(&tag_id)?.clone())
    }

    /// Tag a fork with its own identifier. This is the only way a fork gets
    /// identified to itself.
    pub fn identify_to_self(&mut self, fork: &ForkId) -> GraphResult<Tag> {
        let target = self.require_fork(fork)?;
        let draft = TagDraft::new(ExternalUri::from(fork))
            .with_label(target.label.clone())
            .with_comment(target.comment.clone())
            .with_share_level(target.share_level);
        let (tag_id, _) = self.attach_unchecked(fork, &draft);
        Ok(self.tags.require(&tag_id)?.clone())
    }

    fn check_attachable(&self, fork: &ForkId, uri: &ExternalUri) -> GraphResult<()> {
        self.require_fork(fork)?;
        if uri.as_fork_id().as_ref() == Some(fork) {
            return Err(GraphError::SelfIdentification(fork.clone()));
        }
        Ok(())
    }

    fn attach_unchecked(&mut self, fork: &ForkId, draft: &TagDraft) -> (TagId, bool) {
        let (tag_id, created) = self.tags.lookup_or_insert(&self.owner, draft);
        self.hold(fork, &draft.external_uri, &tag_id);
        (tag_id, created)
    }

    /// Make `fork` hold `tag`. Returns whether the fork gained it.
    fn hold(&mut self, fork: &ForkId, uri: &ExternalUri, tag: &TagId) -> bool {
        let Some(record) = self.forks.get_mut(fork) else {
            return false;
        };
        if record.tags.contains_key(uri) {
            return false;
        }
        record.tags.insert(uri.clone(), tag.clone());
        record.touch();
        self.tags.add_holder(tag, fork)
    }

    /// Detach a tag from a fork. Returns `false` when it was not attached.
    pub fn detach_tag(&mut self, fork: &ForkId, tag: &TagId) -> GraphResult<bool> {
        let uri = self.tags.require(tag)?.external_uri.clone();
        let record = self
            .forks
            .get_mut(fork)
            .ok_or_else(|| GraphError::fork_not_found(fork))?;
        if record.tags.get(&uri) != Some(tag) {
            return Ok(false);
        }
        record.tags.remove(&uri);
        record.touch();
        self.tags.remove_holder(tag, fork);
        tracing::debug!(%fork, %tag, "detached tag");
        Ok(true)
    }

    /// Current reference count of a tag.
    pub fn get_reference_count(&self, tag: &TagId) -> GraphResult<u32> {
        Ok(self.tags.require(tag)?.reference_count)
    }

    /// Administrative override of a tag's reference count.
    pub fn set_reference_count(&mut self, tag: &TagId, count: u32) -> GraphResult<()> {
        self.tags.require(tag)?;
        if let Some(entry) = self.tags.tags.get_mut(tag) {
            tracing::warn!(
                %tag,
                from = entry.reference_count,
                to = count,
                "overriding tag reference count"
            );
            entry.reference_count = count;
        }
        Ok(())
    }

    /// Change the visibility of a tag for tag-scoped queries.
    pub fn set_tag_share_level(&mut self, tag: &TagId, share_level: ShareLevel) -> GraphResult<()> {
        self.tags.require(tag)?;
        if let Some(entry) = self.tags.tags.get_mut(tag) {
            entry.share_level = share_level;
        }
        Ok(())
    }

    /// Merge `source` into `destination`.
    ///
    /// Every fork directly holding `source` ends up holding `destination`
    /// (forks already holding it are not counted twice), then `source` is
    /// deleted regardless of its count.
    pub fn merge_tags(&mut self, source: &TagId, destination: &TagId) -> GraphResult<Tag> {
        let source_uri = self.tags.require(source)?.external_uri.clone();
        let destination_uri = self.tags.require(destination)?.external_uri.clone();
        if source == destination {
            return Ok(self.tags.require(destination)?.clone());
        }

        let migrated: Vec<ForkId> = self.tags.holders(source).cloned().collect();
        let mut gained = 0usize;
        for fork in &migrated {
            if let Some(record) = self.forks.get_mut(fork) {
                record.tags.remove(&source_uri);
            }
            if self.hold(fork, &destination_uri, destination) {
                gained += 1;
            }
        }
        self.tags.delete(source);

        let merged = self.tags.require(destination)?.clone();
        tracing::info!(
            %source,
            %destination,
            migrated = migrated.len(),
            gained,
            reference_count = merged.reference_count,
            "merged tags"
        );
        Ok(merged)
    }

    /// Tags held by a fork.
    pub fn tags_of(&self, fork: &ForkId) -> GraphResult<Vec<Tag>> {
        Ok(self.resolve_tags(self.require_fork(fork)?))
    }

    pub(crate) fn resolve_tags(&self, fork: &Fork) -> Vec<Tag> {
        fork.tags
            .values()
            .filter_map(|id| self.tags.get(id).cloned())
            .collect()
    }

    /// Delete tags with no holders and a zero count.
    pub fn collect_garbage(&mut self) -> Vec<Tag> {
        let dead: Vec<TagId> = self
            .tags
            .iter()
            .filter(|t| t.reference_count == 0 && self.tags.holders(&t.id).next().is_none())
            .map(|t| t.id.clone())
            .collect();
        let removed: Vec<Tag> = dead.iter().filter_map(|id| self.tags.delete(id)).collect();
        if !removed.is_empty() {
            tracing::debug!(removed = removed.len(), "collected unreferenced tags");
        }
        removed
    }

    /// Rebuild the holder index from fork tag sets and reset every count to
    /// its holder count. Returns the number of tags whose count changed.
    pub fn recount_references(&mut self) -> usize {
        let mut holders: BTreeMap<TagId, BTreeSet<ForkId>> = BTreeMap::new();
        for fork in self.forks.values() {
            for tag in fork.tags.values() {
                holders.entry(tag.clone()).or_default().insert(fork.id.clone());
            }
        }
        let mut corrected = 0;
        for tag in self.tags.tags.values_mut() {
            let actual = holders.get(&tag.id).map_or(0, |set| set.len() as u32);
            if tag.reference_count != actual {
                tracing::warn!(
                    tag = %tag.id,
                    stored = tag.reference_count,
                    actual,
                    "correcting tag reference count"
                );
                tag.reference_count = actual;
                corrected += 1;
            }
        }
        holders.retain(|id, _| self.tags.tags.contains_key(id));
        self.tags.holders = holders;
        corrected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ForkKind, OwnerId};

    fn graph() -> OwnerGraph {
        OwnerGraph::new(OwnerId::new("alice").unwrap())
    }

    fn draft(uri: &str) -> TagDraft {
        TagDraft::new(ExternalUri::new(uri))
    }

    #[test]
    fn test_attach_reuses_existing_and_keeps_description() {
        let mut g = graph();
        let v1 = g.create_vertex(ShareLevel::Private);
        let v2 = g.create_vertex(ShareLevel::Private);

        let first = g.attach_tag(&v1, draft("urn:x").with_label("first")).unwrap();
        let second = g.attach_tag(&v2, draft("urn:x").with_label("second")).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.tag.id, second.tag.id);
        assert_eq!(second.tag.label, "first");
        assert_eq!(second.tag.reference_count, 2);
    }

    #[test]
    fn test_attach_twice_to_same_fork_counts_once() {
        let mut g = graph();
        let v = g.create_vertex(ShareLevel::Private);
        g.attach_tag(&v, draft("urn:x")).unwrap();
        let again = g.attach_tag(&v, draft("urn:x")).unwrap();
        assert_eq!(again.tag.reference_count, 1);
    }

    #[test]
    fn test_detach_is_idempotent() {
        let mut g = graph();
        let v = g.create_vertex(ShareLevel::Private);
        let tag = g.attach_tag(&v, draft("urn:x")).unwrap().tag;
        assert!(g.detach_tag(&v, &tag.id).unwrap());
        assert!(!g.detach_tag(&v, &tag.id).unwrap());
        assert_eq!(g.get_reference_count(&tag.id).unwrap(), 0);
    }

    #[test]
    fn test_self_identification_rejected() {
        let mut g = graph();
        let v = g.create_vertex(ShareLevel::Private);
        let err = g
            .attach_tag(&v, TagDraft::new(ExternalUri::from(&v)))
            .unwrap_err();
        assert_eq!(err, GraphError::SelfIdentification(v.clone()));
        assert!(g.tags().is_empty());
    }

    #[test]
    fn test_identifying_to_graph_element_inherits_its_tags() {
        let mut g = graph();
        let x = g.create_vertex(ShareLevel::Public);
        let f = g.create_vertex(ShareLevel::Private);
        let x_tag = g.attach_tag(&x, draft("urn:topic")).unwrap().tag;

        let attachment = g.attach_tag(&f, TagDraft::new(ExternalUri::from(&x))).unwrap();

        assert_eq!(attachment.inherited.len(), 1);
        assert_eq!(attachment.inherited[0].id, x_tag.id);
        assert_eq!(g.get_reference_count(&x_tag.id).unwrap(), 2);
        assert!(g.fork(&f).unwrap().holds(&ExternalUri::new("urn:topic")));
        // x is not identified to itself as a side effect
        assert!(!g.fork(&x).unwrap().holds(&ExternalUri::from(&x)));
    }

    #[test]
    fn test_inheritance_is_one_level_and_skips_self() {
        let mut g = graph();
        let f = g.create_vertex(ShareLevel::Private);
        let x = g.create_vertex(ShareLevel::Private);
        let y = g.create_vertex(ShareLevel::Private);
        g.attach_tag(&y, draft("urn:deep")).unwrap();
        // x holds a tag identifying y, and a tag identifying f
        g.attach_tag(&x, TagDraft::new(ExternalUri::from(&y))).unwrap();
        g.attach_tag(&x, TagDraft::new(ExternalUri::from(&f))).unwrap();
        // x now holds: y, urn:deep (inherited from y), f
        assert_eq!(g.fork(&x).unwrap().tags.len(), 3);

        let attachment = g.attach_tag(&f, TagDraft::new(ExternalUri::from(&x))).unwrap();
        let f_tags = &g.fork(&f).unwrap().tags;
        assert!(f_tags.contains_key(&ExternalUri::from(&x)));
        assert!(f_tags.contains_key(&ExternalUri::from(&y)));
        assert!(f_tags.contains_key(&ExternalUri::new("urn:deep")));
        assert!(!f_tags.contains_key(&ExternalUri::from(&f)));
        assert_eq!(attachment.inherited.len(), 2);
    }

    #[test]
    fn test_identify_to_self_is_explicit() {
        let mut g = graph();
        let v = g.create_vertex(ShareLevel::Public);
        g.set_label(&v, "me").unwrap();
        let tag = g.identify_to_self(&v).unwrap();
        assert_eq!(tag.label, "me");
        assert_eq!(tag.reference_count, 1);
        assert!(g.fork(&v).unwrap().holds(&ExternalUri::from(&v)));
    }

    #[test]
    fn test_merge_counts_only_new_holders() {
        let mut g = graph();
        let v1 = g.create_vertex(ShareLevel::Private);
        let v2 = g.create_vertex(ShareLevel::Private);
        let v3 = g.create_vertex(ShareLevel::Private);
        let t = g.attach_tag(&v1, draft("urn:t")).unwrap().tag;
        g.attach_tag(&v2, draft("urn:t")).unwrap();
        let t2 = g.attach_tag(&v2, draft("urn:t2")).unwrap().tag;
        g.attach_tag(&v3, draft("urn:t2")).unwrap();

        let merged = g.merge_tags(&t2.id, &t.id).unwrap();

        assert!(g.tags().get(&t2.id).is_none());
        assert!(g.tags().find_by_external(&ExternalUri::new("urn:t2")).is_none());
        // prior 2 + v3 (v2 already held t)
        assert_eq!(merged.reference_count, 3);
        assert!(!g.fork(&v2).unwrap().holds(&ExternalUri::new("urn:t2")));
        assert!(g.fork(&v3).unwrap().holds(&ExternalUri::new("urn:t")));
    }

    #[test]
    fn test_merge_missing_tag_fails() {
        let mut g = graph();
        let v = g.create_vertex(ShareLevel::Private);
        let t = g.attach_tag(&v, draft("urn:t")).unwrap().tag;
        let ghost = TagId::generate(g.owner());
        assert!(matches!(g.merge_tags(&ghost, &t.id), Err(GraphError::NotFound(_))));
    }

    #[test]
    fn test_garbage_collection_only_drops_unreferenced() {
        let mut g = graph();
        let v = g.create_vertex(ShareLevel::Private);
        let kept = g.attach_tag(&v, draft("urn:kept")).unwrap().tag;
        let dropped = g.attach_tag(&v, draft("urn:dropped")).unwrap().tag;
        g.detach_tag(&v, &dropped.id).unwrap();

        let removed = g.collect_garbage();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, dropped.id);
        assert!(g.tags().get(&kept.id).is_some());
    }

    #[test]
    fn test_recount_repairs_override() {
        let mut g = graph();
        let v = g.create_vertex(ShareLevel::Private);
        let t = g.attach_tag(&v, draft("urn:t")).unwrap().tag;
        g.set_reference_count(&t.id, 9).unwrap();
        assert_eq!(g.get_reference_count(&t.id).unwrap(), 9);

        assert_eq!(g.recount_references(), 1);
        assert_eq!(g.get_reference_count(&t.id).unwrap(), 1);
    }

    #[test]
    fn test_attach_to_missing_fork_fails() {
        let mut g = graph();
        let ghost = ForkId::generate(g.owner(), ForkKind::Vertex);
        assert!(matches!(
            g.attach_tag(&ghost, draft("urn:x")),
            Err(GraphError::NotFound(_))
        ));
    }
}
