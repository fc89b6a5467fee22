//! # fork-graph-kernel
//!
//! Graph engine for a personal knowledge graph of forks.
//!
//! Users build a directed graph of forks (vertices, relations and group
//! relations), annotate them with reusable tags, share them at different
//! visibility levels, and clone subgraphs into each other's graphs.
//!
//! ## Core Contract
//!
//! 1. Every mutation keeps per-fork neighbor counts and per-tag reference
//!    counts exact
//! 2. Extraction returns a bounded, share-level-filtered, cycle-safe subgraph
//!    around a fork or a tag
//! 3. Cloning copies a tree into another owner's graph with fresh ids, private
//!    visibility and a back-reference to the original root
//!
//! ## Architecture
//!
//! ```text
//! mutation → GraphStore::transact → OwnerGraph (forks, adjacency, counters, tags)
//!                                         ↓ snapshot
//!                     SubGraphExtractor → SubGraph → SubGraphFingerprint
//!                     ForkCloner → Tree → destination OwnerGraph
//! ```
//!
//! ## Consistency
//!
//! - Writes are serialized per owner and published all-or-nothing
//! - Reads run against a point-in-time snapshot
//! - Subgraph ordering is canonical (by fork id)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod error;
pub mod graph;
pub mod store;
pub mod policy;
pub mod config;
pub mod extractor;
pub mod cloner;
pub mod canonical;

// Re-exports
pub use types::{
    OwnerId, ForkId, ForkKind, TagId, ExternalUri, IdError,
    ShareLevel, ShareLevelSet, VisibilityTier,
    Fork, ForkDetails, NeighborCount, CloneOrigin,
    Tag, TagDraft, TagAttachment,
    SubGraph, ForkSnapshot, SubGraphFingerprint, Tree,
};
pub use error::{GraphError, GraphResult};
pub use graph::{OwnerGraph, NeighborCounter, TagRegistry, CountMismatch};
pub use store::{GraphStore, InMemoryGraphStore};
pub use policy::{ExtractionPolicy, ClonePolicy};
pub use config::KernelConfig;
pub use extractor::SubGraphExtractor;
pub use cloner::{ForkCloner, OriginDrift};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};

/// Schema version for serialized graph and subgraph types.
/// Increment on breaking changes to any schema type.
pub const FORK_GRAPH_SCHEMA_VERSION: &str = "1.0.0";

/// Default extraction policy version identifier.
pub const DEFAULT_EXTRACTION_POLICY_VERSION: &str = "extraction_policy_v1";

/// Default clone policy version identifier.
pub const DEFAULT_CLONE_POLICY_VERSION: &str = "clone_policy_v1";
