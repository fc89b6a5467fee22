//! Fork records: the common node type of the relation graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::ids::{ExternalUri, ForkId, ForkKind, OwnerId, TagId};
use super::share_level::{ShareLevel, VisibilityTier};

/// Per-fork neighbor tallies by visibility tier.
///
/// `private + friend + public == total` holds for every maintained count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NeighborCount {
    /// Neighbors that are private.
    pub private: u32,
    /// Neighbors shared with friends.
    pub friend: u32,
    /// Neighbors that are public or public-with-link.
    pub public: u32,
    /// All incident relations.
    pub total: u32,
}

impl NeighborCount {
    fn slot(&mut self, tier: VisibilityTier) -> &mut u32 {
        match tier {
            VisibilityTier::Private => &mut self.private,
            VisibilityTier::Friend => &mut self.friend,
            VisibilityTier::Public => &mut self.public,
        }
    }

    /// Count one more neighbor in `tier`.
    pub fn add(&mut self, tier: VisibilityTier) {
        *self.slot(tier) += 1;
        self.total += 1;
    }

    /// Count one fewer neighbor in `tier`.
    ///
    /// Returns `false` (leaving the count saturated at zero) when the count
    /// was already empty, which means the counter drifted.
    pub fn remove(&mut self, tier: VisibilityTier) -> bool {
        let total_ok = self.total > 0;
        self.total = self.total.saturating_sub(1);
        let slot = self.slot(tier);
        let ok = *slot > 0 && total_ok;
        *slot = slot.saturating_sub(1);
        ok
    }

    /// Move one neighbor from tier `from` to tier `to`.
    pub fn shift(&mut self, from: VisibilityTier, to: VisibilityTier) -> bool {
        if from == to {
            return true;
        }
        let slot = self.slot(from);
        let ok = *slot > 0;
        *slot = slot.saturating_sub(1);
        *self.slot(to) += 1;
        ok
    }

    /// Whether no relation touches the fork.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Kind-specific data of a fork.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForkDetails {
    /// A vertex, composite when `included_vertices` is non-empty.
    Vertex {
        /// Placeholders of the vertices merged into this one.
        included_vertices: BTreeSet<ForkId>,
        /// Placeholders of the relations among the merged vertices.
        included_relations: BTreeSet<ForkId>,
    },
    /// A directed relation.
    Relation {
        /// Source endpoint.
        source: ForkId,
        /// Destination endpoint.
        destination: ForkId,
    },
    /// A relation converted into a tag-holding aggregate.
    GroupRelation {
        /// Placeholders of the aggregated relations.
        included_relations: BTreeSet<ForkId>,
    },
}

impl ForkDetails {
    /// Details of a plain vertex.
    pub fn vertex() -> Self {
        Self::Vertex {
            included_vertices: BTreeSet::new(),
            included_relations: BTreeSet::new(),
        }
    }

    /// The structural kind of these details.
    pub fn kind(&self) -> ForkKind {
        match self {
            Self::Vertex { .. } => ForkKind::Vertex,
            Self::Relation { .. } => ForkKind::Relation,
            Self::GroupRelation { .. } => ForkKind::GroupRelation,
        }
    }
}

/// The fork a clone root was made from, described as it read at clone time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneOrigin {
    /// Origin root.
    pub fork: ForkId,
    /// Origin label when cloned.
    pub label: String,
    /// Origin comment when cloned.
    pub comment: String,
}

impl CloneOrigin {
    /// Record `origin` as it reads now.
    pub fn of(origin: &Fork) -> Self {
        Self {
            fork: origin.id.clone(),
            label: origin.label.clone(),
            comment: origin.comment.clone(),
        }
    }
}

/// A node of the relation graph: vertex, relation or group relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fork {
    /// Globally unique identifier.
    pub id: ForkId,
    /// Human label.
    pub label: String,
    /// Free-form comment.
    pub comment: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Visibility.
    pub share_level: ShareLevel,
    /// Attached tags keyed by their external resource.
    pub tags: BTreeMap<ExternalUri, TagId>,
    /// Declared as a template for cloning.
    pub is_pattern: bool,
    /// Cloned as a non-root member of a pattern.
    pub is_under_pattern: bool,
    /// Pattern root this fork was cloned from.
    pub pattern_origin: Option<ForkId>,
    /// Root this fork was cloned from, set on clone roots only.
    #[serde(default)]
    pub cloned_from: Option<CloneOrigin>,
    /// Number of times this pattern was used.
    pub pattern_usage: u64,
    /// Kind-specific fields.
    pub details: ForkDetails,
}

impl Fork {
    /// Create a fork with empty description.
    pub fn new(id: ForkId, share_level: ShareLevel, details: ForkDetails) -> Self {
        let now = Utc::now();
        Self {
            id,
            label: String::new(),
            comment: String::new(),
            created_at: now,
            updated_at: now,
            share_level,
            tags: BTreeMap::new(),
            is_pattern: false,
            is_under_pattern: false,
            pattern_origin: None,
            cloned_from: None,
            pattern_usage: 0,
            details,
        }
    }

    /// Owner of the fork.
    pub fn owner(&self) -> &OwnerId {
        self.id.owner()
    }

    /// Structural kind.
    pub fn kind(&self) -> ForkKind {
        self.details.kind()
    }

    /// `(source, destination)` when this fork is a relation.
    pub fn endpoints(&self) -> Option<(&ForkId, &ForkId)> {
        match &self.details {
            ForkDetails::Relation { source, destination } => Some((source, destination)),
            _ => None,
        }
    }

    /// The endpoint opposite to `id`, when this relation touches `id`.
    pub fn other_end(&self, id: &ForkId) -> Option<&ForkId> {
        let (source, destination) = self.endpoints()?;
        if source == id {
            Some(destination)
        } else if destination == id {
            Some(source)
        } else {
            None
        }
    }

    /// Identifier placeholders of included elements.
    pub fn included(&self) -> Vec<ForkId> {
        match &self.details {
            ForkDetails::Vertex {
                included_vertices,
                included_relations,
            } => included_vertices
                .iter()
                .chain(included_relations.iter())
                .cloned()
                .collect(),
            ForkDetails::GroupRelation { included_relations } => {
                included_relations.iter().cloned().collect()
            }
            ForkDetails::Relation { .. } => Vec::new(),
        }
    }

    /// Whether the fork aggregates other elements.
    pub fn is_composite(&self) -> bool {
        match &self.details {
            ForkDetails::Vertex {
                included_vertices, ..
            } => !included_vertices.is_empty(),
            ForkDetails::GroupRelation { .. } => true,
            ForkDetails::Relation { .. } => false,
        }
    }

    /// Whether the fork holds a tag for `uri`.
    pub fn holds(&self, uri: &ExternalUri) -> bool {
        self.tags.contains_key(uri)
    }

    /// Bump the modification time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
