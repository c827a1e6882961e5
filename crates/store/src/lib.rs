//! Tideline feed store: the ordered item sequence plus the pagination cursor
//! and read marker, owned by the session loop and published to read-side
//! consumers as immutable snapshots.
//!
//! No locking beyond the owner task: two mutations never run simultaneously,
//! only interleaved at the loop's suspension points. Readers get
//! [`FeedSnapshot`] clones through an `ArcSwap` plus a watch epoch channel.

#![forbid(unsafe_code)]

use std::sync::Arc;

use arc_swap::ArcSwap;
use metrics::counter;
use rustc_hash::FxHashMap;
use tideline_core::{Cursor, FeedItem, FeedSnapshot, ItemId, ReadMarker};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Mutable feed state. Field ownership is split by component: the cursor is
/// written only by pager code, the marker only by synchronizer code.
#[derive(Default)]
pub struct FeedStore {
    epoch: u64,
    items: Vec<FeedItem>,
    index: FxHashMap<ItemId, usize>,
    cursor: Cursor,
    marker: ReadMarker,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from server-rendered defaults at view initialization.
    pub fn with_initial(items: Vec<FeedItem>, cursor: Cursor) -> Self {
        let mut store = Self { cursor, ..Self::default() };
        for item in items {
            store.index.insert(item.id, store.items.len());
            store.items.push(item);
        }
        store
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn marker(&self) -> ReadMarker {
        self.marker
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Append a loaded page after the current last item. Existing items are
    /// never reordered. An id already present is skipped: page composition
    /// is the server's call, but an exact-id collision would corrupt the
    /// index. Returns the number of items appended.
    pub fn append_page(&mut self, items: Vec<FeedItem>) -> usize {
        let mut appended = 0usize;
        for item in items {
            if self.index.contains_key(&item.id) {
                warn!(id = item.id, "store: duplicate item in page, skipped");
                continue;
            }
            self.index.insert(item.id, self.items.len());
            self.items.push(item);
            appended += 1;
        }
        if appended > 0 {
            self.epoch += 1;
            counter!("feed_items_appended_total", appended as u64);
        }
        appended
    }

    /// Prepend a live-pushed item ahead of the current first item.
    pub fn prepend_live(&mut self, item: FeedItem) -> bool {
        if self.index.contains_key(&item.id) {
            debug!(id = item.id, "store: live item already present, skipped");
            return false;
        }
        self.items.insert(0, item);
        self.index.clear();
        for (pos, it) in self.items.iter().enumerate() {
            self.index.insert(it.id, pos);
        }
        self.epoch += 1;
        true
    }

    /// Replace the cursor with server-reported values, verbatim. Also used
    /// for the external reset that clears a terminal `more = false`.
    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
        self.epoch += 1;
    }

    /// Install the initial marker id at view setup.
    pub fn init_marker(&mut self, id: ItemId) {
        self.marker = ReadMarker { acknowledged_id: id, in_flight_id: None };
        self.epoch += 1;
    }

    /// Optimistically advance the marker to `id`, recording the in-flight
    /// attempt. Returns the prior acknowledged id for the rollback path.
    pub fn begin_marker_attempt(&mut self, id: ItemId) -> ItemId {
        let prior = self.marker.acknowledged_id;
        self.marker.acknowledged_id = id;
        self.marker.in_flight_id = Some(id);
        self.epoch += 1;
        prior
    }

    /// Clear the in-flight record for a confirmed attempt. A stale confirm
    /// (a newer attempt has since been dispatched) leaves it untouched.
    pub fn confirm_marker(&mut self, attempted: ItemId) {
        if self.marker.in_flight_id == Some(attempted) {
            self.marker.in_flight_id = None;
            self.epoch += 1;
        }
    }

    /// Roll a failed attempt back to `restore_to`, but only if the marker
    /// still holds the attempted value — a newer confirmed advancement must
    /// never be clobbered. Returns whether the rollback applied.
    pub fn rollback_marker(&mut self, attempted: ItemId, restore_to: ItemId) -> bool {
        if self.marker.acknowledged_id != attempted {
            debug!(attempted, current = self.marker.acknowledged_id, "store: rollback superseded");
            return false;
        }
        self.marker.acknowledged_id = restore_to;
        self.marker.in_flight_id = None;
        self.epoch += 1;
        counter!("marker_rollbacks_total", 1u64);
        true
    }

    /// Freeze the current state into an immutable snapshot.
    pub fn freeze(&self) -> Arc<FeedSnapshot> {
        Arc::new(FeedSnapshot {
            epoch: self.epoch,
            items: self.items.clone(),
            cursor: self.cursor,
            marker: self.marker,
        })
    }
}

/// Writer half of the snapshot channel, held by the session loop.
pub struct FeedPublisher {
    snap: Arc<ArcSwap<FeedSnapshot>>,
    epoch_tx: watch::Sender<u64>,
}

impl FeedPublisher {
    pub fn publish(&self, store: &FeedStore) {
        let next = store.freeze();
        let epoch = next.epoch;
        self.snap.store(next);
        let _ = self.epoch_tx.send(epoch);
    }
}

/// Handle for readers to access the current snapshot and subscribe to swaps.
#[derive(Clone)]
pub struct FeedHandle {
    snap: Arc<ArcSwap<FeedSnapshot>>,
    epoch_rx: watch::Receiver<u64>,
}

impl FeedHandle {
    pub fn current(&self) -> Arc<FeedSnapshot> {
        self.snap.load_full()
    }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> {
        self.epoch_rx.clone()
    }
}

/// Build the publisher/handle pair seeded from the store's current state.
pub fn feed_channel(store: &FeedStore) -> (FeedPublisher, FeedHandle) {
    let initial = store.freeze();
    let epoch = initial.epoch;
    let snap = Arc::new(ArcSwap::new(initial));
    let (epoch_tx, epoch_rx) = watch::channel(epoch);
    (FeedPublisher { snap: Arc::clone(&snap), epoch_tx }, FeedHandle { snap, epoch_rx })
}
