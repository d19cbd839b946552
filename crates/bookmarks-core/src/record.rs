//! Record types shared across the engine and its collaborators.

use crate::id::BookmarkId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Identity of the user who owns a collection.
///
/// Opaque to the engine; whatever the session collaborator hands out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single bookmark record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Record identity, provisional until the server confirms the create.
    pub id: BookmarkId,
    /// Owner of the record; must match the collection's current owner.
    pub owner: UserId,
    pub url: String,
    pub title: String,
    /// Sort key only (descending, newest first).
    pub created_at: DateTime<Utc>,
}

/// The exact payload sent to the backend on create.
///
/// The server assigns `id` and `created_at` on the returned [`Bookmark`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub owner: UserId,
    pub url: String,
    pub title: String,
}
