//! BookmarkClient: composes the engine and reacts to session transitions.
//!
//! The session collaborator owns authentication; this client only reacts to
//! its owner-change notifications. Transitions are serialized through
//! `&mut self`: a sign-out fully resets the store and tears down the feed
//! subscription before a later sign-in's bulk fetch begins, so a stale
//! subscription can never deliver another owner's events into the new
//! owner's collection.

use crate::backend::{BackendError, BookmarkBackend};
use crate::events::{now_millis, CollectionEvent, EventBus, Subscription};
use crate::feed::{ChangeFeedListener, FeedState};
use crate::id::BookmarkId;
use crate::mutations::MutationCoordinator;
use crate::record::{Bookmark, UserId};
use crate::store::{CollectionStore, SharedStore};
use crate::transport::{ChangeFeedTransport, TransportError};

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Bulk fetch failed: {0}")]
    Fetch(#[from] BackendError),

    #[error("No owner is signed in")]
    SignedOut,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Owner lifecycle notifications from the session collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(UserId),
    SignedOut,
}

/// The assembled reconciliation engine for one collection.
pub struct BookmarkClient {
    store: SharedStore,
    backend: Arc<dyn BookmarkBackend>,
    coordinator: MutationCoordinator,
    listener: ChangeFeedListener,
    events: Arc<EventBus>,
}

impl BookmarkClient {
    pub fn new(backend: Arc<dyn BookmarkBackend>, transport: Arc<dyn ChangeFeedTransport>) -> Self {
        let store = CollectionStore::shared();
        let events = Arc::new(EventBus::new());
        let coordinator = MutationCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&backend),
            Arc::clone(&events),
        );
        let listener =
            ChangeFeedListener::new(Arc::clone(&store), transport, Arc::clone(&events));
        Self {
            store,
            backend,
            coordinator,
            listener,
            events,
        }
    }

    /// React to an owner change: reset, repopulate, resubscribe.
    ///
    /// Order matters: the old subscription is torn down and the store reset
    /// before the new owner's bulk fetch starts. A fetch failure propagates
    /// (the store stays empty for the new owner); a feed subscribe failure
    /// does not, since the fetched view stays usable and [`restart_feed`]
    /// remains available.
    ///
    /// [`restart_feed`]: Self::restart_feed
    pub async fn sign_in(&mut self, owner: UserId) -> Result<()> {
        self.listener.stop();
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset(Some(owner.clone()));

        let fetched = self.backend.fetch_all(&owner).await?;
        let kept = self
            .store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace_all(fetched);
        self.events.emit(CollectionEvent::CollectionReplaced {
            count: kept,
            timestamp: now_millis(),
        });
        info!("Signed in as {} with {} bookmarks", owner, kept);

        if let Err(e) = self.listener.start(owner).await {
            // Already reported to the event bus by the listener.
            warn!("Change feed unavailable after sign-in: {}", e);
        }
        Ok(())
    }

    /// React to a sign-out: tear down the subscription and clear the view.
    pub fn sign_out(&mut self) {
        self.listener.stop();
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset(None);
        self.events.emit(CollectionEvent::CollectionReplaced {
            count: 0,
            timestamp: now_millis(),
        });
        info!("Signed out");
    }

    /// Adapter for a session collaborator's event stream.
    pub async fn handle_session_event(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::SignedIn(owner) => self.sign_in(owner).await,
            SessionEvent::SignedOut => {
                self.sign_out();
                Ok(())
            }
        }
    }

    /// Create a bookmark (optimistic, see [`MutationCoordinator::create`]).
    pub async fn create(&self, url: &str, title: &str) -> crate::mutations::Result<Bookmark> {
        self.coordinator.create(url, title).await
    }

    /// Delete a bookmark (optimistic, see [`MutationCoordinator::delete`]).
    pub async fn delete(&self, id: &BookmarkId) -> crate::mutations::Result<()> {
        self.coordinator.delete(id).await
    }

    /// Ordered snapshot of the collection (newest first).
    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }

    /// Owner the collection currently holds records for.
    pub fn owner(&self) -> Option<UserId> {
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .owner()
            .cloned()
    }

    /// Current change feed lifecycle state.
    pub fn feed_state(&self) -> FeedState {
        self.listener.state()
    }

    /// Re-fetch the current owner's collection wholesale.
    ///
    /// The sanctioned fallback for a view gone stale (e.g. after a feed
    /// outage); never needed on the happy path.
    pub async fn refresh(&mut self) -> Result<usize> {
        let owner = self.owner().ok_or(ClientError::SignedOut)?;
        let fetched = self.backend.fetch_all(&owner).await?;
        let kept = self
            .store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace_all(fetched);
        self.events.emit(CollectionEvent::CollectionReplaced {
            count: kept,
            timestamp: now_millis(),
        });
        Ok(kept)
    }

    /// Explicitly re-subscribe the change feed for the current owner.
    pub async fn restart_feed(&mut self) -> std::result::Result<(), TransportError> {
        match self.owner() {
            Some(owner) => self.listener.start(owner).await,
            None => Ok(()),
        }
    }

    /// Subscribe to observability events.
    pub fn subscribe_events(
        &self,
        callback: impl Fn(CollectionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.subscribe(callback)
    }
}
