//! CollectionStore: the single in-memory view of one owner's bookmarks.
//!
//! Everything the presentation layer reads comes from here, and every source
//! of change (bulk fetch, optimistic mutations, change-feed events) funnels
//! through the same merge operations. The merge operations are total: they
//! no-op on conflicting state instead of failing, which is what makes the
//! engine tolerate either arrival order of a mutation's own response and the
//! overlapping change-feed event.

use crate::id::BookmarkId;
use crate::record::{Bookmark, UserId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Shared handle to a store, as held by the coordinator and feed listener.
///
/// The mutex is only ever locked at callback-resumption points and never held
/// across an await, so no two merges interleave mid-update.
pub type SharedStore = Arc<Mutex<CollectionStore>>;

/// Outcome of completing a provisional-to-permanent identity swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The provisional record was re-keyed in place under the permanent id.
    Swapped,
    /// A change-feed insert already delivered the permanent record; the
    /// provisional one was discarded.
    AlreadyPresent,
    /// Neither id was present anymore; the permanent record was inserted.
    Inserted,
}

/// Ordered, deduplicated collection of one owner's bookmarks.
///
/// Invariants: no two records share an id; no record's owner differs from the
/// store's current owner; records are sorted by `created_at` descending with
/// ties broken by recency of insertion.
#[derive(Debug, Default)]
pub struct CollectionStore {
    owner: Option<UserId>,
    records: Vec<Bookmark>,
}

impl CollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared handle around an empty store.
    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// The owner whose records this store currently holds.
    pub fn owner(&self) -> Option<&UserId> {
        self.owner.as_ref()
    }

    /// Read-only ordered view (newest first).
    pub fn records(&self) -> &[Bookmark] {
        &self.records
    }

    /// Owned copy of the ordered view.
    pub fn snapshot(&self) -> Vec<Bookmark> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &BookmarkId) -> bool {
        self.records.iter().any(|r| &r.id == id)
    }

    pub fn get(&self, id: &BookmarkId) -> Option<&Bookmark> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// Empty the store and set the owner it will hold records for.
    ///
    /// Used on sign-in and sign-out; the caller coordinates change-feed
    /// teardown around it.
    pub fn reset(&mut self, owner: Option<UserId>) {
        self.owner = owner;
        self.records.clear();
    }

    /// Insert a record, preserving descending-timestamp order.
    ///
    /// Idempotent: a record whose id is already present is a no-op, which is
    /// what absorbs the duplicate delivery of a create's own confirmation and
    /// its change-feed echo. Records scoped to a different owner (or arriving
    /// while no owner is set) are dropped.
    ///
    /// Returns whether the record became visible.
    pub fn apply_insert(&mut self, record: Bookmark) -> bool {
        if self.owner.as_ref() != Some(&record.owner) {
            warn!(
                "Dropping insert for foreign owner {} (current: {:?})",
                record.owner,
                self.owner.as_ref().map(|o| o.as_str())
            );
            return false;
        }
        if self.contains(&record.id) {
            debug!("Insert for {} already present, skipping", record.id);
            return false;
        }

        // First index whose timestamp is <= the new record's: equal-timestamp
        // records sit after it, so the newest insertion wins the tie.
        let pos = self
            .records
            .partition_point(|r| r.created_at > record.created_at);
        self.records.insert(pos, record);
        true
    }

    /// Remove a record by id.
    ///
    /// Idempotent: an absent id is a no-op, absorbing the race between a
    /// local optimistic delete and its change-feed echo.
    ///
    /// Returns the removed record, which doubles as the rollback snapshot.
    pub fn apply_delete(&mut self, id: &BookmarkId) -> Option<Bookmark> {
        let pos = self.records.iter().position(|r| &r.id == id)?;
        Some(self.records.remove(pos))
    }

    /// Wholesale replace from a bulk fetch.
    ///
    /// Only ever used at owner-change time, before any mutation exists, so it
    /// does not merge with pending state. Records scoped to a different owner
    /// are dropped, duplicates are collapsed to their first occurrence, and
    /// the result is re-sorted newest first.
    ///
    /// Returns the number of records kept.
    pub fn replace_all(&mut self, records: Vec<Bookmark>) -> usize {
        let mut seen = HashSet::new();
        let mut kept: Vec<Bookmark> = Vec::with_capacity(records.len());
        for record in records {
            if self.owner.as_ref() != Some(&record.owner) {
                warn!("Dropping fetched record {} for foreign owner {}", record.id, record.owner);
                continue;
            }
            if !seen.insert(record.id.clone()) {
                warn!("Dropping duplicate fetched record {}", record.id);
                continue;
            }
            kept.push(record);
        }
        // Stable sort keeps the fetch's relative order among equal timestamps.
        kept.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.records = kept;
        self.records.len()
    }

    /// Complete a create by swapping a provisional identity for the permanent
    /// record returned by the server.
    ///
    /// If a change-feed insert already delivered the permanent id, the
    /// provisional record is discarded instead of renamed; either arrival
    /// order leaves exactly one record under the permanent id and none under
    /// the provisional one. The swap happens in place (same position); the
    /// server's payload and timestamp supersede the provisional ones.
    pub fn resolve_provisional(
        &mut self,
        provisional_id: &BookmarkId,
        permanent: Bookmark,
    ) -> Resolution {
        if self.contains(&permanent.id) {
            self.apply_delete(provisional_id);
            debug!(
                "Create for {} confirmed after feed insert, provisional {} discarded",
                permanent.id, provisional_id
            );
            return Resolution::AlreadyPresent;
        }

        if let Some(pos) = self.records.iter().position(|r| &r.id == provisional_id) {
            self.records[pos] = permanent;
            return Resolution::Swapped;
        }

        // Provisional record vanished locally (e.g. deleted mid-flight); the
        // server still committed the create, so converge on its record.
        // apply_insert still drops it if the owner changed mid-flight.
        self.apply_insert(permanent);
        Resolution::Inserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn owner() -> UserId {
        UserId::from("alice")
    }

    fn store() -> CollectionStore {
        let mut store = CollectionStore::new();
        store.reset(Some(owner()));
        store
    }

    fn bookmark(id: BookmarkId, title: &str, age_secs: i64) -> Bookmark {
        Bookmark {
            id,
            owner: owner(),
            url: format!("https://example.com/{title}"),
            title: title.into(),
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    fn permanent() -> BookmarkId {
        BookmarkId::permanent(Uuid::new_v4())
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut store = store();
        let record = bookmark(permanent(), "a", 0);

        assert!(store.apply_insert(record.clone()));
        assert!(!store.apply_insert(record.clone()));

        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0], record);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut store = store();
        let record = bookmark(permanent(), "a", 0);
        let id = record.id.clone();
        store.apply_insert(record.clone());

        assert_eq!(store.apply_delete(&id), Some(record));
        assert_eq!(store.apply_delete(&id), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_insert_keeps_descending_order() {
        let mut store = store();
        let newest = bookmark(permanent(), "newest", 0);
        let middle = bookmark(permanent(), "middle", 60);
        let oldest = bookmark(permanent(), "oldest", 120);

        // Insert out of order
        store.apply_insert(middle.clone());
        store.apply_insert(oldest.clone());
        store.apply_insert(newest.clone());

        let titles: Vec<_> = store.records().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["newest", "middle", "oldest"]);
    }

    #[test]
    fn test_tie_broken_by_newest_insertion() {
        let mut store = store();
        let ts = Utc::now();
        let first = Bookmark {
            created_at: ts,
            ..bookmark(permanent(), "first", 0)
        };
        let second = Bookmark {
            created_at: ts,
            ..bookmark(permanent(), "second", 0)
        };

        store.apply_insert(first);
        store.apply_insert(second);

        let titles: Vec<_> = store.records().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["second", "first"]);
    }

    #[test]
    fn test_insert_drops_foreign_owner() {
        let mut store = store();
        let mut record = bookmark(permanent(), "a", 0);
        record.owner = UserId::from("mallory");

        assert!(!store.apply_insert(record));
        assert!(store.is_empty());
    }

    #[test]
    fn test_insert_without_owner_is_dropped() {
        let mut store = CollectionStore::new();
        assert!(!store.apply_insert(bookmark(permanent(), "a", 0)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_replace_all_sorts_filters_and_dedups() {
        let mut store = store();
        store.apply_insert(bookmark(permanent(), "stale", 0));

        let keep_old = bookmark(permanent(), "old", 120);
        let keep_new = bookmark(permanent(), "new", 0);
        let dup = Bookmark {
            id: keep_new.id.clone(),
            ..bookmark(keep_new.id.clone(), "dup", 300)
        };
        let mut foreign = bookmark(permanent(), "foreign", 60);
        foreign.owner = UserId::from("mallory");

        let kept = store.replace_all(vec![keep_old.clone(), keep_new.clone(), dup, foreign]);

        assert_eq!(kept, 2);
        let titles: Vec<_> = store.records().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["new", "old"]);
    }

    #[test]
    fn test_reset_clears_records_and_retargets_owner() {
        let mut store = store();
        store.apply_insert(bookmark(permanent(), "a", 0));

        store.reset(Some(UserId::from("bob")));
        assert!(store.is_empty());
        assert_eq!(store.owner(), Some(&UserId::from("bob")));

        store.reset(None);
        assert_eq!(store.owner(), None);
    }

    #[test]
    fn test_resolve_swaps_in_place() {
        let mut store = store();
        let above = bookmark(permanent(), "above", 0);
        let below = bookmark(permanent(), "below", 120);
        let provisional = bookmark(BookmarkId::provisional(), "mine", 60);
        let provisional_id = provisional.id.clone();
        store.apply_insert(above);
        store.apply_insert(below);
        store.apply_insert(provisional);

        let confirmed = bookmark(permanent(), "mine", 60);
        let resolution = store.resolve_provisional(&provisional_id, confirmed.clone());

        assert_eq!(resolution, Resolution::Swapped);
        assert_eq!(store.len(), 3);
        // Same position, new identity, server payload.
        assert_eq!(store.records()[1], confirmed);
        assert!(!store.contains(&provisional_id));
    }

    #[test]
    fn test_resolve_discards_provisional_when_feed_won() {
        let mut store = store();
        let provisional = bookmark(BookmarkId::provisional(), "mine", 0);
        let provisional_id = provisional.id.clone();
        store.apply_insert(provisional);

        // Feed insert for the permanent id lands first.
        let confirmed = bookmark(permanent(), "mine", 0);
        store.apply_insert(confirmed.clone());

        let resolution = store.resolve_provisional(&provisional_id, confirmed.clone());

        assert_eq!(resolution, Resolution::AlreadyPresent);
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].id, confirmed.id);
        assert!(!store.contains(&provisional_id));
    }

    #[test]
    fn test_resolve_inserts_when_provisional_vanished() {
        let mut store = store();
        let provisional_id = BookmarkId::provisional();

        let confirmed = bookmark(permanent(), "mine", 0);
        let resolution = store.resolve_provisional(&provisional_id, confirmed.clone());

        assert_eq!(resolution, Resolution::Inserted);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&confirmed.id));
    }

    #[test]
    fn test_resolution_order_independence() {
        // Same final state whether the feed insert arrives before or after
        // the create's own confirmation.
        let provisional = bookmark(BookmarkId::provisional(), "mine", 0);
        let confirmed = bookmark(permanent(), "mine", 0);

        let mut feed_first = store();
        feed_first.apply_insert(provisional.clone());
        feed_first.apply_insert(confirmed.clone());
        feed_first.resolve_provisional(&provisional.id, confirmed.clone());

        let mut response_first = store();
        response_first.apply_insert(provisional.clone());
        response_first.resolve_provisional(&provisional.id, confirmed.clone());
        response_first.apply_insert(confirmed.clone());

        assert_eq!(feed_first.snapshot(), response_first.snapshot());
        assert_eq!(feed_first.len(), 1);
    }
}
