//! Core types for the fork graph.

pub mod ids;
pub mod share_level;
pub mod fork;
pub mod tag;
pub mod subgraph;
pub mod tree;

pub use ids::{OwnerId, ForkId, ForkKind, TagId, ExternalUri, IdError};
pub use share_level::{ShareLevel, ShareLevelSet, VisibilityTier};
pub use fork::{CloneOrigin, Fork, ForkDetails, NeighborCount};
pub use tag::{Tag, TagDraft, TagAttachment};
pub use subgraph::{SubGraph, ForkSnapshot, SubGraphFingerprint};
pub use tree::Tree;
