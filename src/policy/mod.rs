//! Traversal policies.

pub mod extraction;
pub mod cloning;

pub use extraction::ExtractionPolicy;
pub use cloning::ClonePolicy;
