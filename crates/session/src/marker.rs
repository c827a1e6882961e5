#![forbid(unsafe_code)]

use metrics::counter;
use tideline_api::FeedResult;
use tideline_core::{ControlId, ItemId};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::lock::Gesture;
use crate::model::{MarkerMode, SessionEvent, SessionMsg};
use crate::ViewSession;

/// Read-position synchronizer state. The debounce rides on `last_movement`
/// (set by the sampler tick whenever the viewport moved); the throttle
/// window on `last_dispatch`. `confirmed_floor` is the largest id a
/// successful sync has confirmed — a rollback never lands below it.
#[derive(Default)]
pub(crate) struct MarkerState {
    pub active: bool,
    pub name: String,
    pub last_movement: Option<Instant>,
    pub pending_scan: bool,
    pub last_dispatch: Option<Instant>,
    pub confirmed_floor: ItemId,
    pub highlighted: Option<ItemId>,
}

impl ViewSession {
    pub(crate) fn on_init_marker(&mut self, name: String, initial: ItemId) {
        self.store.init_marker(initial);
        self.marker = MarkerState {
            active: true,
            name: name.clone(),
            confirmed_floor: initial,
            highlighted: Some(initial),
            ..MarkerState::default()
        };
        self.presenter.highlight_item(initial);
        self.publish();
        // passive scanning only engages once the initial position is shown
        let _ = self.events.send(SessionEvent::ViewportReady);
        info!(name = %name, initial, "marker: sync enabled");
    }

    /// Called by the sampler tick for every consumed movement.
    pub(crate) fn note_movement(&mut self, now: Instant) {
        if self.marker.active {
            self.marker.last_movement = Some(now);
            self.marker.pending_scan = true;
        }
    }

    /// Debounced passive scan: runs once the movement stream has been quiet
    /// for the configured period, then dispatches a throttled sync if a
    /// forward candidate is visible.
    pub(crate) fn maybe_scan_marker(&mut self, now: Instant) {
        if !self.marker.active || !self.marker.pending_scan {
            return;
        }
        let Some(last) = self.marker.last_movement else {
            return;
        };
        if now.duration_since(last) < self.cfg.marker_debounce {
            return;
        }
        self.marker.pending_scan = false;

        let Some(candidate) = self.find_marker_candidate() else {
            return;
        };
        // forward-only on the passive path
        if candidate <= self.store.marker().acknowledged_id {
            return;
        }
        if let Some(t) = self.marker.last_dispatch {
            if now.duration_since(t) < self.cfg.marker_throttle {
                debug!(candidate, "marker: inside throttle window, dropped");
                counter!("marker_syncs_throttled_total", 1u64);
                return;
            }
        }
        self.dispatch_marker(candidate, MarkerMode::Throttled, None, now);
    }

    /// First item, in document order, whose top edge sits inside the
    /// viewport band below the fixed header.
    fn find_marker_candidate(&self) -> Option<ItemId> {
        let vp = self.viewport.current();
        let band_top = vp.scroll_top + self.cfg.header_offset_px;
        let band_bottom = band_top + vp.viewport_height;
        for item in self.store.items() {
            if let Some(top) = self.presenter.item_offset_top(item.id) {
                if top >= band_top && top <= band_bottom {
                    return Some(item.id);
                }
            }
        }
        None
    }

    /// Explicit user-triggered mark-read. Single-flight locked on the
    /// control; skips the throttle; failures are reported.
    pub(crate) fn on_mark_read(&mut self, control: ControlId, item: ItemId) {
        if !self.marker.active {
            warn!(%control, "marker: mark-read before init, ignored");
            return;
        }
        if self.locks.held(&control, Gesture::Click) {
            debug!(%control, "marker: re-entrant mark-read dropped");
            return;
        }
        if item <= self.store.marker().acknowledged_id {
            debug!(item, "marker: non-advancing mark-read, ignored");
            return;
        }
        self.locks.acquire(&control, Gesture::Click);
        self.dispatch_marker(item, MarkerMode::Immediate, Some(control), Instant::now());
    }

    fn dispatch_marker(
        &mut self,
        id: ItemId,
        mode: MarkerMode,
        control: Option<ControlId>,
        now: Instant,
    ) {
        let prior = self.store.begin_marker_attempt(id);
        let prior_highlight = self.marker.highlighted;
        self.marker.highlighted = Some(id);
        self.marker.last_dispatch = Some(now);
        self.presenter.highlight_item(id);
        self.publish();
        info!(id, prior, mode = ?mode, "marker: sync start");

        let api = self.api.clone();
        let tx = self.tx.clone();
        let name = self.marker.name.clone();
        tokio::spawn(async move {
            let result = api.sync_marker(&name, id).await;
            let _ = tx.send(SessionMsg::MarkerDone {
                attempted: id,
                prior,
                prior_highlight,
                mode,
                control,
                result,
            });
        });
    }

    pub(crate) fn on_marker_done(
        &mut self,
        attempted: ItemId,
        prior: ItemId,
        prior_highlight: Option<ItemId>,
        mode: MarkerMode,
        control: Option<ControlId>,
        result: FeedResult<()>,
    ) {
        if let Some(c) = control {
            let _ = self.tx.send(SessionMsg::ReleaseLock { control: c, gesture: Gesture::Click });
        }
        match result {
            Ok(()) => {
                self.store.confirm_marker(attempted);
                self.marker.confirmed_floor = self.marker.confirmed_floor.max(attempted);
                self.publish();
                counter!("marker_syncs_total", 1u64);
                info!(attempted, "marker: sync ok");
            }
            Err(err) => {
                // compare-before-rollback, and never below a later confirm
                let restore_to = prior.max(self.marker.confirmed_floor);
                if self.store.rollback_marker(attempted, restore_to) {
                    self.marker.highlighted = prior_highlight;
                    if let Some(h) = prior_highlight {
                        self.presenter.highlight_item(h);
                    }
                    self.publish();
                    warn!(attempted, restore_to, error = %err, "marker: sync failed, rolled back");
                } else {
                    debug!(attempted, error = %err, "marker: stale failure, rollback skipped");
                }
                if mode == MarkerMode::Immediate {
                    self.presenter
                        .render_error("Unable to update the stream marker. Wait a moment, and try again");
                }
            }
        }
    }
}
