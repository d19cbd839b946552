//! bookmarks-core: Optimistic-update reconciliation engine for a per-user
//! bookmark collection.
//!
//! This crate provides the core functionality for:
//! - Merging a bulk fetch, optimistic local mutations, and a server-pushed
//!   change feed into one consistent, duplicate-free, order-stable view
//! - Provisional-to-permanent record identity resolution
//! - Change feed subscription lifecycle tied to the signed-in owner
//! - BookmarkBackend and ChangeFeedTransport trait abstractions

pub mod backend;
pub mod client;
pub mod events;
pub mod feed;
pub mod id;
pub mod mutations;
pub mod record;
pub mod store;
pub mod transport;

pub use backend::{BackendError, BookmarkBackend, MemoryBackend};
pub use client::{BookmarkClient, ClientError, SessionEvent};
pub use events::{CollectionEvent, EventBus, Subscription};
pub use feed::{ChangeFeedListener, FeedState};
pub use id::{BookmarkId, IdError};
pub use mutations::{MutationCoordinator, MutationError};
pub use record::{Bookmark, NewBookmark, UserId};
pub use store::{CollectionStore, Resolution, SharedStore};
pub use transport::{ChangeFeedTransport, FeedEvent, FeedSubscription, LoopbackFeed, TransportError};
