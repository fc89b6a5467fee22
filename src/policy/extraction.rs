//! Extraction policy: depth handling for subgraph queries.

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::error::{GraphError, GraphResult};
use crate::DEFAULT_EXTRACTION_POLICY_VERSION;

/// Controls how requested depths are interpreted.
///
/// ## Parameters
///
/// - `max_depth_cap`: requests deeper than this are clamped to it
/// - `default_depth`: depth used when the caller does not specify one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionPolicy {
    /// Policy version identifier.
    pub version: String,
    /// Largest depth an extraction will run with.
    pub max_depth_cap: u32,
    /// Depth for requests that leave it unspecified.
    pub default_depth: u32,
}

impl ExtractionPolicy {
    /// Create a policy. `default_depth` is capped at `max_depth_cap`.
    pub fn new(max_depth_cap: u32, default_depth: u32) -> Self {
        Self {
            version: DEFAULT_EXTRACTION_POLICY_VERSION.to_string(),
            max_depth_cap,
            default_depth: default_depth.min(max_depth_cap),
        }
    }

    /// Get the policy ID.
    pub fn policy_id(&self) -> &str {
        &self.version
    }

    /// Hash of the policy parameters, folded into subgraph fingerprints.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(self)
    }

    /// Validate a requested depth and clamp it to the cap.
    pub fn resolve_depth(&self, requested: i32) -> GraphResult<u32> {
        let depth = u32::try_from(requested).map_err(|_| GraphError::InvalidDepth(requested))?;
        if depth > self.max_depth_cap {
            tracing::warn!(
                requested = depth,
                cap = self.max_depth_cap,
                "clamping extraction depth"
            );
            return Ok(self.max_depth_cap);
        }
        Ok(depth)
    }
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self::new(32, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_depth_rejected() {
        let policy = ExtractionPolicy::default();
        assert_eq!(policy.resolve_depth(-1), Err(GraphError::InvalidDepth(-1)));
    }

    #[test]
    fn test_depth_clamped_to_cap() {
        let policy = ExtractionPolicy::new(4, 2);
        assert_eq!(policy.resolve_depth(3), Ok(3));
        assert_eq!(policy.resolve_depth(40), Ok(4));
    }

    #[test]
    fn test_params_hash_changes() {
        let p1 = ExtractionPolicy::default();
        let mut p2 = ExtractionPolicy::default();
        assert_eq!(p1.params_hash(), p2.params_hash());
        p2.max_depth_cap = 5;
        assert_ne!(p1.params_hash(), p2.params_hash());
    }
}
