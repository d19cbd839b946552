//! Change feed listener.
//!
//! Consumes the transport's owner-scoped push stream on a spawned task and
//! applies each notification to the collection store through the same
//! idempotent merges the mutation coordinator uses. Subscription lifecycle:
//!
//! `Unsubscribed -> Subscribing -> Active -> Unsubscribed`
//!
//! Transport errors and timeouts are reported to the event bus on the way
//! back to `Unsubscribed`; the listener never retries on its own (retry
//! policy belongs to the transport or the caller), but an explicit `start`
//! always remains possible.

use crate::events::{now_millis, CollectionEvent, EventBus};
use crate::record::UserId;
use crate::store::SharedStore;
use crate::transport::{ChangeFeedTransport, FeedEvent, Result};

use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle state of the feed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedState {
    #[default]
    Unsubscribed,
    Subscribing,
    Active,
}

impl Display for FeedState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unsubscribed => "unsubscribed",
            Self::Subscribing => "subscribing",
            Self::Active => "active",
        };
        f.write_str(s)
    }
}

/// Listens to one owner's change feed and applies it to the store.
pub struct ChangeFeedListener {
    store: SharedStore,
    transport: Arc<dyn ChangeFeedTransport>,
    events: Arc<EventBus>,
    state: Arc<Mutex<FeedState>>,
    task: Option<JoinHandle<()>>,
}

impl ChangeFeedListener {
    pub fn new(
        store: SharedStore,
        transport: Arc<dyn ChangeFeedTransport>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            transport,
            events,
            state: Arc::new(Mutex::new(FeedState::Unsubscribed)),
            task: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FeedState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe to `owner`'s change feed.
    ///
    /// Tears down any existing subscription first: at most one subscription
    /// is live at a time. On failure the listener ends back at
    /// `Unsubscribed` with the failure reported to the event bus.
    pub async fn start(&mut self, owner: UserId) -> Result<()> {
        self.stop();
        set_state(&self.state, &self.events, FeedState::Subscribing);

        let subscription = match self.transport.subscribe(&owner).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!("Change feed subscribe failed for {}: {}", owner, e);
                self.events.emit(CollectionEvent::SubscriptionFailed {
                    reason: e.to_string(),
                    timestamp: now_millis(),
                });
                set_state(&self.state, &self.events, FeedState::Unsubscribed);
                return Err(e);
            }
        };

        let store = Arc::clone(&self.store);
        let events = Arc::clone(&self.events);
        let state = Arc::clone(&self.state);
        self.task = Some(tokio::spawn(async move {
            run_loop(owner, subscription.events, store, &events, &state).await;
            set_state(&state, &events, FeedState::Unsubscribed);
        }));
        Ok(())
    }

    /// Tear down the subscription, if any.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Change feed task aborted");
        }
        set_state(&self.state, &self.events, FeedState::Unsubscribed);
    }
}

impl Drop for ChangeFeedListener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn set_state(state: &Mutex<FeedState>, events: &EventBus, next: FeedState) {
    let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
    if *guard == next {
        return;
    }
    *guard = next;
    drop(guard);
    events.emit(CollectionEvent::FeedStateChanged {
        state: next.to_string(),
        timestamp: now_millis(),
    });
}

/// Consume feed events until the stream ends or the transport reports a
/// failure. The store lock is taken per event and never held across an await.
async fn run_loop(
    owner: UserId,
    mut feed: mpsc::UnboundedReceiver<FeedEvent>,
    store: SharedStore,
    events: &EventBus,
    state: &Mutex<FeedState>,
) {
    while let Some(event) = feed.recv().await {
        match event {
            FeedEvent::Subscribed => {
                info!("Change feed active for {}", owner);
                set_state(state, events, FeedState::Active);
            }
            FeedEvent::Insert(record) => {
                if record.owner != owner {
                    drop_foreign(events, &record.owner, &owner);
                    continue;
                }
                let id = record.id.to_string();
                let applied = store
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .apply_insert(record);
                if applied {
                    events.emit(CollectionEvent::RecordInserted {
                        id,
                        timestamp: now_millis(),
                    });
                }
            }
            FeedEvent::Delete { owner: event_owner, id } => {
                if event_owner != owner {
                    drop_foreign(events, &event_owner, &owner);
                    continue;
                }
                let removed = store
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .apply_delete(&id)
                    .is_some();
                if removed {
                    events.emit(CollectionEvent::RecordDeleted {
                        id: id.to_string(),
                        timestamp: now_millis(),
                    });
                }
            }
            FeedEvent::Error(reason) => {
                warn!("Change feed error for {}: {}", owner, reason);
                events.emit(CollectionEvent::SubscriptionFailed {
                    reason,
                    timestamp: now_millis(),
                });
                break;
            }
            FeedEvent::TimedOut => {
                warn!("Change feed timed out for {}", owner);
                events.emit(CollectionEvent::SubscriptionFailed {
                    reason: "timed out".into(),
                    timestamp: now_millis(),
                });
                break;
            }
        }
    }
    debug!("Change feed stream for {} ended", owner);
}

fn drop_foreign(events: &EventBus, event_owner: &UserId, owner: &UserId) {
    warn!(
        "Dropping change feed event for foreign owner {} (subscribed: {})",
        event_owner, owner
    );
    events.emit(CollectionEvent::ForeignOwnerDropped {
        owner: event_owner.to_string(),
        timestamp: now_millis(),
    });
}
