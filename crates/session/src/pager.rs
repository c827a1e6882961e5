#![forbid(unsafe_code)]

use metrics::counter;
use smallvec::SmallVec;
use tideline_api::{FeedResult, PageQuery, PageResponse};
use tideline_core::{Cursor, Viewport};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::model::SessionMsg;
use crate::ViewSession;

/// Cursor pager state. `busy` is the drop-based backpressure flag every
/// trigger path consults; `generation` tags in-flight fetches so a response
/// from before an external cursor reset is discarded instead of applied.
#[derive(Default)]
pub(crate) struct PagerState {
    pub enabled: bool,
    pub busy: bool,
    pub generation: u64,
    pub filters: SmallVec<[(String, String); 4]>,
}

impl ViewSession {
    pub(crate) fn on_init_pager(
        &mut self,
        cursor: Cursor,
        filters: SmallVec<[(String, String); 4]>,
    ) {
        // (Re)initialization is the one sanctioned way out of a terminal
        // `more = false`; it also invalidates any fetch still in flight.
        self.pager.generation += 1;
        self.pager.busy = false;
        self.pager.enabled = true;
        self.pager.filters = filters;
        self.store.set_cursor(cursor);
        self.publish();
        info!(before = ?cursor.before_id, more = cursor.more, "pager: initialized");
    }

    /// Near-bottom predicate: false while a fetch is outstanding.
    pub(crate) fn near_bottom_ready(&self, vp: Viewport) -> bool {
        !self.pager.busy && vp.near_bottom(self.cfg.near_bottom_px)
    }

    /// Start one page fetch if the pager is idle and the cursor is not
    /// terminal. Concurrent triggers are dropped, not queued.
    pub(crate) fn start_page_load(&mut self, trigger: &'static str) {
        if !self.pager.enabled {
            return;
        }
        if self.pager.busy {
            debug!(trigger, "pager: busy, trigger dropped");
            counter!("pager_triggers_dropped_total", 1u64);
            return;
        }
        let cursor = self.store.cursor();
        if !cursor.more {
            debug!(trigger, "pager: cursor exhausted");
            return;
        }
        self.pager.busy = true;
        self.presenter.show_loading(true);
        let generation = self.pager.generation;
        let query = PageQuery {
            before_id: cursor.before_id,
            since_id: cursor.since_id,
            filters: self.pager.filters.clone(),
        };
        info!(trigger, before = ?query.before_id, "pager: load start");
        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let t0 = Instant::now();
            let result = api.fetch_page(query).await;
            debug!(took_ms = %t0.elapsed().as_millis(), ok = result.is_ok(), "pager: load done");
            let _ = tx.send(SessionMsg::PageDone { generation, result });
        });
    }

    pub(crate) fn on_page_done(&mut self, generation: u64, result: FeedResult<PageResponse>) {
        if generation != self.pager.generation {
            debug!(generation, "pager: stale page discarded");
            return;
        }
        // fail-open: the indicator and the busy flag clear on every outcome
        self.pager.busy = false;
        self.presenter.show_loading(false);
        match result {
            Ok(page) => {
                let appended = self.store.append_page(page.items);
                self.store.set_cursor(Cursor {
                    before_id: page.before_id,
                    since_id: page.since_id,
                    more: page.more,
                });
                self.publish();
                counter!("pager_pages_total", 1u64);
                info!(appended, more = page.more, "pager: page applied");
            }
            Err(e) => {
                // no automatic retry; the next movement past the threshold
                // is the user's re-trigger
                warn!(error = %e, "pager: page load failed");
            }
        }
    }

    pub(crate) fn on_insert_live(&mut self, item: tideline_core::FeedItem) {
        let id = item.id;
        if self.store.prepend_live(item) {
            self.publish();
            debug!(id, "pager: live item prepended");
        }
    }
}
