//! BookmarkId: Two-form record identity.
//!
//! A bookmark is born under a *provisional* id, generated locally so the
//! optimistic insert can happen before the server round-trip. Once the server
//! confirms the create, the record is re-keyed under the server-assigned
//! *permanent* id. Provisional ids render with a `local-` prefix and never
//! compare equal to permanent ids, so the two namespaces cannot collide.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Prefix that tags a provisional id in its string form.
const PROVISIONAL_PREFIX: &str = "local-";

#[derive(Debug, Error)]
pub enum IdError {
    #[error("Invalid bookmark ID format: expected UUID or local-UUID")]
    InvalidFormat,
    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}

/// Identity of a bookmark record.
///
/// # Examples
/// ```
/// use bookmarks_core::BookmarkId;
///
/// let provisional = BookmarkId::provisional();
/// assert!(provisional.is_provisional());
/// assert!(provisional.to_string().starts_with("local-"));
///
/// let permanent: BookmarkId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
/// assert!(!permanent.is_provisional());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BookmarkId {
    /// Locally generated, never sent to the server.
    Provisional(Uuid),
    /// Server-assigned, globally unique.
    Permanent(Uuid),
}

impl BookmarkId {
    /// Allocate a fresh provisional id (process-unique, uuid v4).
    pub fn provisional() -> Self {
        Self::Provisional(Uuid::new_v4())
    }

    /// Wrap a server-assigned uuid as a permanent id.
    pub fn permanent(id: Uuid) -> Self {
        Self::Permanent(id)
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }
}

impl Display for BookmarkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisional(id) => write!(f, "{PROVISIONAL_PREFIX}{id}"),
            Self::Permanent(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for BookmarkId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(PROVISIONAL_PREFIX) {
            return Ok(Self::Provisional(Uuid::parse_str(rest)?));
        }
        if s.is_empty() {
            return Err(IdError::InvalidFormat);
        }
        Ok(Self::Permanent(Uuid::parse_str(s)?))
    }
}

// Serialize as the display string so provisional ids stay tagged in logs,
// JSON, and wire payloads.
impl serde::Serialize for BookmarkId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for BookmarkId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
