//! Identifier types for forks, tags and owners.
//!
//! Fork and tag identifiers are globally unique resource identifiers of the
//! form `/service/users/{owner}/graph/{kind}/{uuid}`. They serialize as that
//! URI string so they can key JSON maps.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const URI_PREFIX: &str = "/service/users/";
const GRAPH_SEGMENT: &str = "graph";
const TAG_SEGMENT: &str = "identification";

/// Error raised when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Owner names must be non-empty and free of `/`.
    #[error("Invalid owner name: {0:?}")]
    InvalidOwner(String),
    /// The string is not a graph resource URI.
    #[error("Malformed resource URI: {0}")]
    MalformedUri(String),
}

/// Owner (user) of a graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Create an owner id, rejecting empty names and names containing `/`.
    pub fn new(name: impl Into<String>) -> Result<Self, IdError> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(IdError::InvalidOwner(name));
        }
        Ok(Self(name))
    }

    /// Get the owner name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(owner: OwnerId) -> Self {
        owner.0
    }
}

/// Structural role of a fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ForkKind {
    /// Plain or composite vertex.
    Vertex,
    /// Directed relation between two forks.
    Relation,
    /// Aggregate formed by converting a relation.
    GroupRelation,
}

impl ForkKind {
    /// URI path segment for this kind.
    pub fn segment(&self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Relation => "edge",
            Self::GroupRelation => "groupRelation",
        }
    }

    /// Parse a kind from its URI path segment.
    pub fn from_segment(s: &str) -> Option<Self> {
        match s {
            "vertex" => Some(Self::Vertex),
            "edge" => Some(Self::Relation),
            "groupRelation" => Some(Self::GroupRelation),
            _ => None,
        }
    }
}

impl fmt::Display for ForkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Relation => write!(f, "relation"),
            Self::GroupRelation => write!(f, "group_relation"),
        }
    }
}

/// Splits `/service/users/{owner}/graph/{segment}/{uuid}` into its parts.
fn split_uri(uri: &str) -> Option<(&str, &str, Uuid)> {
    let rest = uri.strip_prefix(URI_PREFIX)?;
    let mut parts = rest.split('/');
    let owner = parts.next()?;
    if parts.next()? != GRAPH_SEGMENT {
        return None;
    }
    let segment = parts.next()?;
    let uuid = Uuid::parse_str(parts.next()?).ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((owner, segment, uuid))
}

/// Globally unique identifier of a fork.
///
/// Orders by owner, then kind, then uuid, which keeps iteration over an
/// owner's arena deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ForkId {
    owner: OwnerId,
    kind: ForkKind,
    uuid: Uuid,
}

impl ForkId {
    /// Build an identifier from its parts.
    pub fn new(owner: OwnerId, kind: ForkKind, uuid: Uuid) -> Self {
        Self { owner, kind, uuid }
    }

    /// Mint a fresh identifier.
    pub fn generate(owner: &OwnerId, kind: ForkKind) -> Self {
        Self::new(owner.clone(), kind, Uuid::new_v4())
    }

    /// Parse a fork URI.
    pub fn from_uri(uri: &str) -> Result<Self, IdError> {
        let malformed = || IdError::MalformedUri(uri.to_string());
        let (owner, segment, uuid) = split_uri(uri).ok_or_else(malformed)?;
        let kind = ForkKind::from_segment(segment).ok_or_else(malformed)?;
        Ok(Self::new(OwnerId::new(owner)?, kind, uuid))
    }

    /// Render as a resource URI.
    pub fn to_uri(&self) -> String {
        format!(
            "{URI_PREFIX}{}/{GRAPH_SEGMENT}/{}/{}",
            self.owner,
            self.kind.segment(),
            self.uuid
        )
    }

    /// Owner of the fork.
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Structural kind encoded in the identifier.
    pub fn kind(&self) -> ForkKind {
        self.kind
    }

    /// Inner uuid.
    pub fn as_uuid(&self) -> Uuid {
        self.uuid
    }
}

impl fmt::Display for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

impl TryFrom<String> for ForkId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_uri(&value)
    }
}

impl From<ForkId> for String {
    fn from(id: ForkId) -> Self {
        id.to_uri()
    }
}

/// Identifier of a tag (identification) in an owner's registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagId {
    owner: OwnerId,
    uuid: Uuid,
}

impl TagId {
    /// Mint a fresh tag identifier.
    pub fn generate(owner: &OwnerId) -> Self {
        Self {
            owner: owner.clone(),
            uuid: Uuid::new_v4(),
        }
    }

    /// Parse a tag URI.
    pub fn from_uri(uri: &str) -> Result<Self, IdError> {
        match split_uri(uri) {
            Some((owner, TAG_SEGMENT, uuid)) => Ok(Self {
                owner: OwnerId::new(owner)?,
                uuid,
            }),
            _ => Err(IdError::MalformedUri(uri.to_string())),
        }
    }

    /// Render as a resource URI.
    pub fn to_uri(&self) -> String {
        format!("{URI_PREFIX}{}/{GRAPH_SEGMENT}/{TAG_SEGMENT}/{}", self.owner, self.uuid)
    }

    /// Owner of the registry holding this tag.
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

impl TryFrom<String> for TagId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_uri(&value)
    }
}

impl From<TagId> for String {
    fn from(id: TagId) -> Self {
        id.to_uri()
    }
}

/// External resource a tag identifies.
///
/// Either an arbitrary URI (e.g. a Wikidata entity) or the URI of another
/// graph element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalUri(String);

impl ExternalUri {
    /// Wrap a URI string.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Get the URI string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The graph element this URI names, if it names one.
    pub fn as_fork_id(&self) -> Option<ForkId> {
        ForkId::from_uri(&self.0).ok()
    }
}

impl From<&ForkId> for ExternalUri {
    fn from(id: &ForkId) -> Self {
        Self(id.to_uri())
    }
}

impl fmt::Display for ExternalUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
