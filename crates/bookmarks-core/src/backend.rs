//! BookmarkBackend trait for the persistent store collaborator.
//!
//! Implementations:
//! - `MemoryBackend` - For testing and the daemon harness
//! - A production implementation would wrap the hosted database's client
//!
//! The backend owns identity assignment: `insert` returns the authoritative
//! record including the server-assigned id and timestamp. The engine never
//! sends a provisional id across this seam.

use crate::id::BookmarkId;
use crate::record::{Bookmark, NewBookmark, UserId};
use crate::transport::LoopbackFeed;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Persistence seam for the bookmark collection.
#[async_trait]
pub trait BookmarkBackend: Send + Sync {
    /// Fetch every record owned by `owner`, newest first.
    async fn fetch_all(&self, owner: &UserId) -> Result<Vec<Bookmark>>;

    /// Persist a new record.
    ///
    /// Returns the authoritative record with the server-assigned id and
    /// timestamp.
    async fn insert(&self, payload: NewBookmark) -> Result<Bookmark>;

    /// Delete a record by id. Deleting an id that does not exist is success.
    async fn delete_by_id(&self, id: &BookmarkId) -> Result<()>;
}

/// In-memory backend.
///
/// Optionally wired to a [`LoopbackFeed`] so every committed mutation is also
/// published as a change-feed event, reproducing a backend whose realtime
/// channel echoes the issuer's own writes. Failure injection toggles cover
/// the rollback paths in tests.
#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<Vec<Bookmark>>,
    feed: Option<Arc<LoopbackFeed>>,
    fail_fetches: AtomicBool,
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish every committed mutation to `feed` as well.
    pub fn with_feed(feed: Arc<LoopbackFeed>) -> Self {
        Self {
            feed: Some(feed),
            ..Self::default()
        }
    }

    /// Make subsequent `fetch_all` calls fail.
    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent `insert` calls fail.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent `delete_by_id` calls fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::Relaxed);
    }

    /// Number of records currently held, across all owners.
    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl BookmarkBackend for MemoryBackend {
    async fn fetch_all(&self, owner: &UserId) -> Result<Vec<Bookmark>> {
        if self.fail_fetches.load(Ordering::Relaxed) {
            return Err(BackendError::Unavailable("fetch refused".into()));
        }
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut owned: Vec<Bookmark> = records
            .iter()
            .filter(|r| &r.owner == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn insert(&self, payload: NewBookmark) -> Result<Bookmark> {
        if self.fail_inserts.load(Ordering::Relaxed) {
            return Err(BackendError::Rejected("insert refused".into()));
        }

        let record = Bookmark {
            id: BookmarkId::permanent(Uuid::new_v4()),
            owner: payload.owner,
            url: payload.url,
            title: payload.title,
            created_at: Utc::now(),
        };

        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        debug!("Committed insert {}", record.id);

        if let Some(feed) = &self.feed {
            feed.publish_insert(record.clone());
        }
        Ok(record)
    }

    async fn delete_by_id(&self, id: &BookmarkId) -> Result<()> {
        if self.fail_deletes.load(Ordering::Relaxed) {
            return Err(BackendError::Rejected("delete refused".into()));
        }

        let removed = {
            let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            records
                .iter()
                .position(|r| &r.id == id)
                .map(|pos| records.remove(pos))
        };

        match removed {
            Some(record) => {
                debug!("Committed delete {}", record.id);
                if let Some(feed) = &self.feed {
                    feed.publish_delete(record.owner, record.id);
                }
            }
            // Already gone: treated as success per the backend contract.
            None => debug!("Delete for {} found nothing, treating as success", id),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChangeFeedTransport, FeedEvent};

    fn payload(owner: &str, title: &str) -> NewBookmark {
        NewBookmark {
            owner: UserId::from(owner),
            url: format!("https://example.com/{title}"),
            title: title.into(),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_permanent_identity() {
        let backend = MemoryBackend::new();
        let record = backend.insert(payload("alice", "a")).await.unwrap();

        assert!(!record.id.is_provisional());
        assert_eq!(record.owner, UserId::from("alice"));
        assert_eq!(backend.record_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_all_is_owner_scoped_and_newest_first() {
        let backend = MemoryBackend::new();
        let a = backend.insert(payload("alice", "a")).await.unwrap();
        backend.insert(payload("bob", "b")).await.unwrap();
        let c = backend.insert(payload("alice", "c")).await.unwrap();

        let fetched = backend.fetch_all(&UserId::from("alice")).await.unwrap();
        let ids: Vec<_> = fetched.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, [c.id, a.id]);
    }

    #[tokio::test]
    async fn test_delete_missing_id_is_success() {
        let backend = MemoryBackend::new();
        let id = BookmarkId::permanent(Uuid::new_v4());
        assert!(backend.delete_by_id(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let backend = MemoryBackend::new();
        backend.fail_inserts(true);
        assert!(backend.insert(payload("alice", "a")).await.is_err());

        backend.fail_inserts(false);
        let record = backend.insert(payload("alice", "a")).await.unwrap();

        backend.fail_deletes(true);
        assert!(backend.delete_by_id(&record.id).await.is_err());
        assert_eq!(backend.record_count(), 1);
    }

    #[tokio::test]
    async fn test_mutations_echo_to_feed() {
        let feed = Arc::new(LoopbackFeed::new());
        let backend = MemoryBackend::with_feed(Arc::clone(&feed));
        let mut sub = feed.subscribe(&UserId::from("alice")).await.unwrap();
        sub.events.recv().await; // Subscribed primer

        let record = backend.insert(payload("alice", "a")).await.unwrap();
        match sub.events.recv().await {
            Some(FeedEvent::Insert(echoed)) => assert_eq!(echoed.id, record.id),
            other => panic!("expected insert echo, got {other:?}"),
        }

        backend.delete_by_id(&record.id).await.unwrap();
        match sub.events.recv().await {
            Some(FeedEvent::Delete { id, .. }) => assert_eq!(id, record.id),
            other => panic!("expected delete echo, got {other:?}"),
        }
    }
}
