//! Mutation coordinator: optimistic create/delete with rollback.
//!
//! Every mutation is applied to the collection store before the backend call
//! starts, so readers see it immediately. The eventual backend response
//! either confirms the optimistic state (identity swap for creates, nothing
//! for deletes) or rolls it back to the exact pre-mutation shape. Overlap
//! with the change feed's echo of the same mutation is absorbed by the
//! store's idempotent merges, in either arrival order.

use crate::backend::{BackendError, BookmarkBackend};
use crate::events::{now_millis, CollectionEvent, EventBus};
use crate::id::BookmarkId;
use crate::record::{Bookmark, NewBookmark};
use crate::store::SharedStore;

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum MutationError {
    /// Malformed input, rejected before any optimistic state change.
    #[error("Validation failed: {field} must not be empty")]
    Validation { field: &'static str },

    /// No owner is signed in, so there is no collection to mutate.
    #[error("No owner is signed in")]
    SignedOut,

    /// The backend rejected the create. The optimistic record has already
    /// been removed; the original input rides along so the caller can
    /// restore it.
    #[error("Create rejected: {source}")]
    CreateRejected {
        url: String,
        title: String,
        source: BackendError,
    },

    /// The backend rejected the delete. The snapshot has already been
    /// reinserted at its original sort position.
    #[error("Delete rejected: {source}")]
    DeleteRejected { id: BookmarkId, source: BackendError },
}

pub type Result<T> = std::result::Result<T, MutationError>;

/// Issues create/delete intents against the backend, keeping the collection
/// store consistent through both outcomes.
#[derive(Clone)]
pub struct MutationCoordinator {
    store: SharedStore,
    backend: Arc<dyn BookmarkBackend>,
    events: Arc<EventBus>,
}

impl MutationCoordinator {
    pub fn new(
        store: SharedStore,
        backend: Arc<dyn BookmarkBackend>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            backend,
            events,
        }
    }

    /// Create a bookmark for the current owner.
    ///
    /// The provisional record is visible to readers before the backend call
    /// begins. On success the returned record carries the server-assigned
    /// identity and timestamp; on failure the store is back to its pre-call
    /// contents and the error carries the input for restitution.
    pub async fn create(&self, url: &str, title: &str) -> Result<Bookmark> {
        let url = url.trim();
        let title = title.trim();
        if url.is_empty() {
            return Err(MutationError::Validation { field: "url" });
        }
        if title.is_empty() {
            return Err(MutationError::Validation { field: "title" });
        }

        let owner = {
            let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
            store.owner().cloned().ok_or(MutationError::SignedOut)?
        };

        let provisional_id = BookmarkId::provisional();
        let provisional = Bookmark {
            id: provisional_id.clone(),
            owner: owner.clone(),
            url: url.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };

        // Optimistic apply, before the backend round-trip starts.
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .apply_insert(provisional);
        self.events.emit(CollectionEvent::RecordInserted {
            id: provisional_id.to_string(),
            timestamp: now_millis(),
        });

        let payload = NewBookmark {
            owner,
            url: url.to_string(),
            title: title.to_string(),
        };
        match self.backend.insert(payload).await {
            Ok(confirmed) => {
                let resolution = self
                    .store
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .resolve_provisional(&provisional_id, confirmed.clone());
                debug!(
                    "Create confirmed as {} ({:?}, was {})",
                    confirmed.id, resolution, provisional_id
                );
                Ok(confirmed)
            }
            Err(source) => {
                // Idempotent removal: safe even if the record was already
                // superseded while the request was in flight.
                let removed = self
                    .store
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .apply_delete(&provisional_id)
                    .is_some();
                if removed {
                    self.events.emit(CollectionEvent::RecordDeleted {
                        id: provisional_id.to_string(),
                        timestamp: now_millis(),
                    });
                }
                warn!("Create rejected by backend: {}", source);
                Err(MutationError::CreateRejected {
                    url: url.to_string(),
                    title: title.to_string(),
                    source,
                })
            }
        }
    }

    /// Delete a bookmark by id.
    ///
    /// An id that is no longer present counts as already deleted (success):
    /// a change-feed delete may have raced this call. On backend failure the
    /// snapshot is reinserted at its original sort position.
    pub async fn delete(&self, id: &BookmarkId) -> Result<()> {
        let snapshot = self
            .store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .apply_delete(id);
        let Some(snapshot) = snapshot else {
            debug!("Delete for {} found nothing, treating as already deleted", id);
            return Ok(());
        };
        self.events.emit(CollectionEvent::RecordDeleted {
            id: id.to_string(),
            timestamp: now_millis(),
        });

        match self.backend.delete_by_id(id).await {
            Ok(()) => Ok(()),
            Err(source) => {
                let restored = self
                    .store
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .apply_insert(snapshot);
                if restored {
                    self.events.emit(CollectionEvent::RecordInserted {
                        id: id.to_string(),
                        timestamp: now_millis(),
                    });
                }
                warn!("Delete rejected by backend: {}", source);
                Err(MutationError::DeleteRejected {
                    id: id.clone(),
                    source,
                })
            }
        }
    }
}
