//! Event infrastructure for observability.
//!
//! Provides `CollectionEvent` for debug/monitoring and `EventBus` for
//! subscriptions. The engine emits events on every store change and on
//! change-feed lifecycle transitions; nothing in the engine depends on
//! whether anyone is listening.

use serde::Serialize;

/// Milliseconds since Unix epoch, as emitted on every event.
pub(crate) fn now_millis() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

/// Events emitted while the collection is reconciled, for real-time monitoring.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CollectionEvent {
    /// A record became visible in the collection (optimistic or confirmed).
    RecordInserted {
        /// String form of the record id.
        id: String,
        /// When the insert was applied, in milliseconds since Unix epoch.
        timestamp: f64,
    },
    /// A record was removed from the collection.
    RecordDeleted {
        /// String form of the record id.
        id: String,
        /// When the delete was applied, in milliseconds since Unix epoch.
        timestamp: f64,
    },
    /// The collection was wholesale replaced by a bulk fetch.
    CollectionReplaced {
        /// Number of records after the replace.
        count: usize,
        /// When the replace was applied, in milliseconds since Unix epoch.
        timestamp: f64,
    },
    /// The change feed moved to a new lifecycle state.
    FeedStateChanged {
        /// New state (e.g. "subscribing", "active", "unsubscribed").
        state: String,
        /// When the transition happened, in milliseconds since Unix epoch.
        timestamp: f64,
    },
    /// The change feed reported an error or timed out.
    SubscriptionFailed {
        /// Transport-provided failure description.
        reason: String,
        /// When the failure was reported, in milliseconds since Unix epoch.
        timestamp: f64,
    },
    /// An event scoped to a different owner was dropped before the store.
    ForeignOwnerDropped {
        /// Owner the dropped event was scoped to.
        owner: String,
        /// When the event was dropped, in milliseconds since Unix epoch.
        timestamp: f64,
    },
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Event bus for publishing collection events to subscribers.
///
/// Thread-safe for use in multi-threaded Tokio runtime.
/// Wrap in `Arc` to enable subscriptions.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Arc<dyn Fn(CollectionEvent) + Send + Sync>)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    ///
    /// Requires `self` to be wrapped in `Arc`.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(CollectionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // Use try_write to avoid deadlock if Drop runs during panic unwinding
        // while a read lock is held (e.g., during emit).
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: CollectionEvent) {
        // Clone the callback list to prevent deadlock if a callback calls subscribe.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}
