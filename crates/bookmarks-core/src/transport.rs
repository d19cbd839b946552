//! ChangeFeedTransport trait for the server-pushed change feed.
//!
//! Implementations:
//! - `LoopbackFeed` - In-process hub for testing and the daemon harness
//! - A production implementation would wrap the realtime channel of whatever
//!   backing service hosts the collection
//!
//! The transport delivers owner-scoped insert/delete notifications plus
//! subscription lifecycle signals. No ordering is guaranteed between this
//! stream and the backend's direct mutation responses.

use crate::id::BookmarkId;
use crate::record::{Bookmark, UserId};

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("Transport error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// One notification delivered on an owner-scoped subscription.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// The transport confirmed the subscription.
    Subscribed,
    /// A record was inserted server-side.
    Insert(Bookmark),
    /// A record was deleted server-side.
    Delete { owner: UserId, id: BookmarkId },
    /// Transport-level failure; the subscription is dead.
    Error(String),
    /// Subscription setup or keepalive timed out; the subscription is dead.
    TimedOut,
}

/// A live subscription. Dropping the receiver tears it down.
#[derive(Debug)]
pub struct FeedSubscription {
    /// Owner the subscription was requested for.
    pub owner: UserId,
    /// Event stream, lifecycle signals included.
    pub events: mpsc::UnboundedReceiver<FeedEvent>,
}

/// Transport seam for the push-based change feed.
#[async_trait]
pub trait ChangeFeedTransport: Send + Sync {
    /// Open a subscription scoped to one owner's records.
    ///
    /// The returned stream starts with `Subscribed` once the transport
    /// confirms. Retry policy on failure belongs to the caller, not here.
    async fn subscribe(&self, owner: &UserId) -> Result<FeedSubscription>;
}

/// In-process change feed hub.
///
/// Fans every published event out to all live subscriptions without any
/// owner filtering of its own: the listener's event-time owner check is the
/// layer under test, and a loopback that pre-filtered would mask it.
#[derive(Default)]
pub struct LoopbackFeed {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<FeedEvent>>>,
    fail_next_subscribe: Mutex<Option<String>>,
}

impl LoopbackFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an insert notification to every live subscription.
    pub fn publish_insert(&self, record: Bookmark) {
        self.emit(FeedEvent::Insert(record));
    }

    /// Publish a delete notification to every live subscription.
    pub fn publish_delete(&self, owner: UserId, id: BookmarkId) {
        self.emit(FeedEvent::Delete { owner, id });
    }

    /// Fan an event out to all subscriptions, pruning closed ones.
    pub fn emit(&self, event: FeedEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Make the next `subscribe` call fail with the given reason.
    pub fn fail_next_subscribe(&self, reason: impl Into<String>) {
        *self
            .fail_next_subscribe
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(reason.into());
    }

    /// Number of subscriptions that have not been dropped.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

#[async_trait]
impl ChangeFeedTransport for LoopbackFeed {
    async fn subscribe(&self, owner: &UserId) -> Result<FeedSubscription> {
        if let Some(reason) = self
            .fail_next_subscribe
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            return Err(TransportError::SubscribeFailed(reason));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        // Confirm immediately; a real transport would do this asynchronously.
        let _ = tx.send(FeedEvent::Subscribed);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);

        debug!("Loopback subscription opened for {}", owner);
        Ok(FeedSubscription {
            owner: owner.clone(),
            events: rx,
        })
    }
}
