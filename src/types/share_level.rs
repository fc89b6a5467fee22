//! Visibility tiers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Visibility of a fork or tag.
///
/// Totally ordered by visibility breadth:
/// `Private < Friends < PublicWithLink < Public`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShareLevel {
    /// Visible to the owner only.
    Private,
    /// Visible to the owner's friends.
    Friends,
    /// Visible to anyone holding the link.
    PublicWithLink,
    /// Visible to everyone and listed.
    Public,
}

impl ShareLevel {
    /// All levels, narrowest first.
    pub const ALL: [ShareLevel; 4] = [
        Self::Private,
        Self::Friends,
        Self::PublicWithLink,
        Self::Public,
    ];

    /// Parse share level from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "private" => Some(Self::Private),
            "friends" => Some(Self::Friends),
            "public_with_link" | "public-with-link" => Some(Self::PublicWithLink),
            "public" => Some(Self::Public),
            _ => None,
        }
    }

    /// Counter tier a neighbor at this level contributes to.
    pub fn tier(&self) -> VisibilityTier {
        match self {
            Self::Private => VisibilityTier::Private,
            Self::Friends => VisibilityTier::Friend,
            Self::PublicWithLink | Self::Public => VisibilityTier::Public,
        }
    }

    /// Share level of a freshly created relation: private unless both ends
    /// are public.
    pub fn for_new_relation(source: ShareLevel, destination: ShareLevel) -> Self {
        if source >= Self::Public && destination >= Self::Public {
            Self::Public
        } else {
            Self::Private
        }
    }
}

impl Default for ShareLevel {
    fn default() -> Self {
        Self::Private
    }
}

impl fmt::Display for ShareLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Friends => write!(f, "friends"),
            Self::PublicWithLink => write!(f, "public_with_link"),
            Self::Public => write!(f, "public"),
        }
    }
}

/// Bucket of the neighbor counter a neighbor falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilityTier {
    /// Neighbor is private.
    Private,
    /// Neighbor is shared with friends.
    Friend,
    /// Neighbor is public or public-with-link.
    Public,
}

/// Set of share levels a query is allowed to traverse into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShareLevelSet(BTreeSet<ShareLevel>);

impl ShareLevelSet {
    /// Build from any collection of levels.
    pub fn new(levels: impl IntoIterator<Item = ShareLevel>) -> Self {
        Self(levels.into_iter().collect())
    }

    /// Every level.
    pub fn all() -> Self {
        Self::new(ShareLevel::ALL)
    }

    /// Levels visible to anonymous readers.
    pub fn public_only() -> Self {
        Self::new([ShareLevel::PublicWithLink, ShareLevel::Public])
    }

    /// Levels visible to a friend of the owner.
    pub fn friends() -> Self {
        Self::new([ShareLevel::Friends, ShareLevel::PublicWithLink, ShareLevel::Public])
    }

    /// Whether `level` is allowed.
    pub fn contains(&self, level: ShareLevel) -> bool {
        self.0.contains(&level)
    }

    /// Whether no level is allowed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate allowed levels, narrowest first.
    pub fn iter(&self) -> impl Iterator<Item = ShareLevel> + '_ {
        self.0.iter().copied()
    }
}

impl Default for ShareLevelSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<ShareLevel> for ShareLevelSet {
    fn from_iter<I: IntoIterator<Item = ShareLevel>>(iter: I) -> Self {
        Self::new(iter)
    }
}
