//! Incrementally maintained neighbor tallies.
//!
//! The counter is updated by exactly three events: a relation appears, a
//! relation disappears, or a fork adjacent to some relation changes its
//! share level. It never recomputes in the hot path; [`NeighborCount::tally`]
//! exists for repair and for checking the incremental state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{ForkId, NeighborCount, ShareLevel};

/// Per-owner map of fork id to neighbor tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborCounter {
    counts: BTreeMap<ForkId, NeighborCount>,
}

impl NeighborCount {
    /// Count from scratch given the share levels of the opposite endpoints
    /// of every incident relation.
    pub fn tally(neighbor_levels: impl IntoIterator<Item = ShareLevel>) -> Self {
        let mut count = Self::default();
        for level in neighbor_levels {
            count.add(level.tier());
        }
        count
    }
}

impl NeighborCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tallies of a fork (zero when it has no neighbors).
    pub fn get(&self, id: &ForkId) -> NeighborCount {
        self.counts.get(id).copied().unwrap_or_default()
    }

    /// A relation `source -> destination` was created.
    ///
    /// Each endpoint gains one neighbor in the tier of the opposite
    /// endpoint's share level.
    pub fn on_relation_added(
        &mut self,
        source: &ForkId,
        source_level: ShareLevel,
        destination: &ForkId,
        destination_level: ShareLevel,
    ) {
        self.counts
            .entry(source.clone())
            .or_default()
            .add(destination_level.tier());
        self.counts
            .entry(destination.clone())
            .or_default()
            .add(source_level.tier());
    }

    /// A relation `source -> destination` was removed.
    pub fn on_relation_removed(
        &mut self,
        source: &ForkId,
        source_level: ShareLevel,
        destination: &ForkId,
        destination_level: ShareLevel,
    ) {
        self.decrement(source, destination_level);
        self.decrement(destination, source_level);
    }

    /// A relation disappeared in the same cascade as one of its endpoints;
    /// only the surviving endpoint `id` loses a neighbor.
    pub fn on_neighbor_lost(&mut self, id: &ForkId, neighbor_level: ShareLevel) {
        self.decrement(id, neighbor_level);
    }

    /// A fork on the other side of one of `neighbor`'s relations moved from
    /// `old` to `new`. Called once per incident relation.
    pub fn on_endpoint_share_level_changed(
        &mut self,
        neighbor: &ForkId,
        old: ShareLevel,
        new: ShareLevel,
    ) {
        let count = self.counts.entry(neighbor.clone()).or_default();
        if !count.shift(old.tier(), new.tier()) {
            tracing::error!(
                fork = %neighbor,
                from = %old,
                to = %new,
                "NEIGHBOR_COUNT_DRIFT: shifted a neighbor out of an empty tier"
            );
        }
    }

    /// Drop the entry of a removed fork.
    pub fn forget(&mut self, id: &ForkId) {
        self.counts.remove(id);
    }

    /// Overwrite the tallies of a fork (repair only).
    pub fn set(&mut self, id: &ForkId, count: NeighborCount) {
        if count.is_empty() {
            self.counts.remove(id);
        } else {
            self.counts.insert(id.clone(), count);
        }
    }

    /// Ids with a non-default entry.
    pub fn ids(&self) -> impl Iterator<Item = &ForkId> {
        self.counts.keys()
    }

    fn decrement(&mut self, id: &ForkId, neighbor_level: ShareLevel) {
        let count = self.counts.entry(id.clone()).or_default();
        if !count.remove(neighbor_level.tier()) {
            tracing::error!(
                fork = %id,
                level = %neighbor_level,
                "NEIGHBOR_COUNT_DRIFT: removed a neighbor that was never counted"
            );
        }
        if count.is_empty() {
            self.counts.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ForkKind, OwnerId};

    fn ids() -> (ForkId, ForkId) {
        let owner = OwnerId::new("alice").unwrap();
        (
            ForkId::generate(&owner, ForkKind::Vertex),
            ForkId::generate(&owner, ForkKind::Vertex),
        )
    }

    #[test]
    fn test_added_counts_opposite_tier() {
        let (a, b) = ids();
        let mut counter = NeighborCounter::new();
        counter.on_relation_added(&a, ShareLevel::Private, &b, ShareLevel::Public);

        let ca = counter.get(&a);
        assert_eq!((ca.public, ca.private, ca.total), (1, 0, 1));
        let cb = counter.get(&b);
        assert_eq!((cb.public, cb.private, cb.total), (0, 1, 1));
    }

    #[test]
    fn test_removed_restores_empty() {
        let (a, b) = ids();
        let mut counter = NeighborCounter::new();
        counter.on_relation_added(&a, ShareLevel::Friends, &b, ShareLevel::Public);
        counter.on_relation_removed(&a, ShareLevel::Friends, &b, ShareLevel::Public);
        assert_eq!(counter, NeighborCounter::new());
    }

    #[test]
    fn test_neighbor_lost_touches_one_side() {
        let (a, b) = ids();
        let mut counter = NeighborCounter::new();
        counter.on_relation_added(&a, ShareLevel::Private, &b, ShareLevel::Public);
        counter.forget(&b);
        counter.on_neighbor_lost(&a, ShareLevel::Public);
        assert_eq!(counter, NeighborCounter::new());
    }

    #[test]
    fn test_share_level_change_shifts_tier() {
        let (a, b) = ids();
        let mut counter = NeighborCounter::new();
        counter.on_relation_added(&a, ShareLevel::Private, &b, ShareLevel::Private);
        counter.on_endpoint_share_level_changed(&a, ShareLevel::Private, ShareLevel::Friends);

        let ca = counter.get(&a);
        assert_eq!((ca.private, ca.friend, ca.total), (0, 1, 1));
        // b untouched
        assert_eq!(counter.get(&b).private, 1);
    }

    #[test]
    fn test_public_with_link_counts_as_public() {
        let (a, b) = ids();
        let mut counter = NeighborCounter::new();
        counter.on_relation_added(&a, ShareLevel::Private, &b, ShareLevel::PublicWithLink);
        assert_eq!(counter.get(&a).public, 1);
    }

    #[test]
    fn test_tally_matches_incremental() {
        let (a, b) = ids();
        let mut counter = NeighborCounter::new();
        counter.on_relation_added(&a, ShareLevel::Private, &b, ShareLevel::Friends);
        assert_eq!(counter.get(&a), NeighborCount::tally([ShareLevel::Friends]));
    }
}
