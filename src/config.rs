//! Kernel configuration.
//!
//! Environment variables:
//! - `FORK_GRAPH_MAX_DEPTH`: extraction depth cap (default: 32)
//! - `FORK_GRAPH_DEFAULT_DEPTH`: depth for unspecified requests (default: 2)
//! - `FORK_GRAPH_CLONE_MAX_DEPTH`: hop limit of the clone tree walk (default: 64)
//! - `FORK_GRAPH_CLONE_MAX_MEMBERS`: largest clonable tree (default: 10000)

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::policy::{ClonePolicy, ExtractionPolicy};

/// Policies for every engine component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Subgraph extraction.
    pub extraction: ExtractionPolicy,
    /// Fork cloning.
    pub cloning: ClonePolicy,
}

impl KernelConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let max_depth = parse_or(&lookup, "FORK_GRAPH_MAX_DEPTH", defaults.extraction.max_depth_cap);
        let default_depth = parse_or(
            &lookup,
            "FORK_GRAPH_DEFAULT_DEPTH",
            defaults.extraction.default_depth,
        );
        let clone_depth = parse_or(
            &lookup,
            "FORK_GRAPH_CLONE_MAX_DEPTH",
            defaults.cloning.tree_max_depth,
        );
        let clone_members = parse_or(
            &lookup,
            "FORK_GRAPH_CLONE_MAX_MEMBERS",
            defaults.cloning.max_members,
        );
        Self {
            extraction: ExtractionPolicy::new(max_depth, default_depth),
            cloning: ClonePolicy::new(clone_depth, clone_members),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, %default, "ignoring malformed setting");
            default
        }),
    }
}
