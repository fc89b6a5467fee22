//! Tags (identifications): reusable, reference-counted identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::{ExternalUri, ForkId, TagId};
use super::share_level::ShareLevel;

/// A registry entry keyed by its external resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Registry identifier.
    pub id: TagId,
    /// Resource this tag identifies.
    pub external_uri: ExternalUri,
    /// Human label.
    pub label: String,
    /// Free-form comment.
    pub comment: String,
    /// Image URLs.
    pub images: BTreeSet<String>,
    /// Number of distinct forks holding this tag.
    pub reference_count: u32,
    /// Visibility for tag-scoped queries.
    pub share_level: ShareLevel,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Register a tag from a draft with a zero reference count.
    pub fn from_draft(id: TagId, draft: &TagDraft) -> Self {
        Self {
            id,
            external_uri: draft.external_uri.clone(),
            label: draft.label.clone(),
            comment: draft.comment.clone(),
            images: draft.images.clone(),
            reference_count: 0,
            share_level: draft.share_level,
            created_at: Utc::now(),
        }
    }

    /// The graph element this tag identifies, if any.
    pub fn identified_fork(&self) -> Option<ForkId> {
        self.external_uri.as_fork_id()
    }
}

/// Description supplied when attaching a tag.
///
/// Only used when the external resource is new to the owner's registry; an
/// existing entry keeps its stored description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDraft {
    /// Resource to identify.
    pub external_uri: ExternalUri,
    /// Label.
    pub label: String,
    /// Comment.
    pub comment: String,
    /// Image URLs.
    pub images: BTreeSet<String>,
    /// Visibility of the registry entry.
    pub share_level: ShareLevel,
}

impl TagDraft {
    /// Start a draft for `external_uri`.
    pub fn new(external_uri: ExternalUri) -> Self {
        Self {
            external_uri,
            label: String::new(),
            comment: String::new(),
            images: BTreeSet::new(),
            share_level: ShareLevel::Private,
        }
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Add an image URL.
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.images.insert(url.into());
        self
    }

    /// Set the share level.
    pub fn with_share_level(mut self, share_level: ShareLevel) -> Self {
        self.share_level = share_level;
        self
    }

    /// Copy the description of an existing tag.
    pub fn from_tag(tag: &Tag) -> Self {
        Self {
            external_uri: tag.external_uri.clone(),
            label: tag.label.clone(),
            comment: tag.comment.clone(),
            images: tag.images.clone(),
            share_level: tag.share_level,
        }
    }
}

/// Outcome of an attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagAttachment {
    /// The tag for the requested external resource.
    pub tag: Tag,
    /// Tags inherited from the identified graph element.
    pub inherited: Vec<Tag>,
    /// Whether the registry entry was created by this attach.
    pub created: bool,
}
