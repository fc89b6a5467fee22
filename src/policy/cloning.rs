//! Clone policy: bounds of the structural tree walk.

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::DEFAULT_CLONE_POLICY_VERSION;

/// Bounds applied when collecting a tree to clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClonePolicy {
    /// Policy version identifier.
    pub version: String,
    /// Hops from the root the tree walk follows.
    pub tree_max_depth: u32,
    /// Largest tree accepted for cloning.
    pub max_members: usize,
}

impl ClonePolicy {
    /// Create a policy.
    pub fn new(tree_max_depth: u32, max_members: usize) -> Self {
        Self {
            version: DEFAULT_CLONE_POLICY_VERSION.to_string(),
            tree_max_depth,
            max_members,
        }
    }

    /// Get the policy ID.
    pub fn policy_id(&self) -> &str {
        &self.version
    }

    /// Hash of the policy parameters.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(self)
    }
}

impl Default for ClonePolicy {
    fn default() -> Self {
        Self::new(64, 10_000)
    }
}
