//! Tideline view-session runtime.
//!
//! One spawned task owns all mutable feed state and multiplexes three kinds
//! of input: host triggers and network completions over a single FIFO
//! channel, and a fixed-period sampler tick that consumes the viewport
//! dirty flag. Network calls run as subtasks and re-enter through the
//! channel, so every completion is applied against current state rather
//! than a snapshot captured at dispatch.

#![forbid(unsafe_code)]

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tideline_api::{FeedApi, Presenter};
use tideline_core::{ActionKind, ControlId, Cursor, FeedItem, ItemId, TargetId, Viewport};
use tideline_store::{feed_channel, FeedHandle, FeedPublisher, FeedStore};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

mod config;
mod lock;
mod marker;
mod model;
mod pager;
mod scroll;
mod toggle;

pub use config::SessionConfig;
pub use lock::{Gesture, SingleFlight};
pub use model::{MarkerMode, SessionEvent};
pub use scroll::ViewportCell;

use marker::MarkerState;
use model::SessionMsg;
use pager::PagerState;
use toggle::ToggleEntry;

/// The session actor. Constructed and consumed by [`ViewSession::spawn`];
/// all interaction goes through the returned [`SessionHandle`].
pub struct ViewSession {
    pub(crate) api: Arc<dyn FeedApi>,
    pub(crate) presenter: Arc<dyn Presenter>,
    pub(crate) cfg: SessionConfig,
    pub(crate) tx: mpsc::UnboundedSender<SessionMsg>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
    pub(crate) viewport: Arc<ViewportCell>,
    pub(crate) store: FeedStore,
    pub(crate) publisher: FeedPublisher,
    pub(crate) toggles: FxHashMap<ControlId, ToggleEntry>,
    pub(crate) pending_actions: FxHashSet<(ActionKind, TargetId)>,
    pub(crate) locks: SingleFlight,
    pub(crate) pager: PagerState,
    pub(crate) marker: MarkerState,
}

impl ViewSession {
    /// Spawn a session seeded with the server-rendered items. Pager and
    /// marker sync stay inert until their `init_*` calls arrive.
    pub fn spawn(
        api: Arc<dyn FeedApi>,
        presenter: Arc<dyn Presenter>,
        cfg: SessionConfig,
        initial_items: Vec<FeedItem>,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(32);
        let viewport = Arc::new(ViewportCell::new());
        let store = FeedStore::with_initial(initial_items, Cursor::default());
        let (publisher, feed) = feed_channel(&store);
        let session = ViewSession {
            api,
            presenter,
            cfg,
            tx: tx.clone(),
            events: events.clone(),
            viewport: Arc::clone(&viewport),
            store,
            publisher,
            toggles: FxHashMap::default(),
            pending_actions: FxHashSet::default(),
            locks: SingleFlight::new(),
            pager: PagerState::default(),
            marker: MarkerState::default(),
        };
        info!("session: starting");
        let task = tokio::spawn(session.run(rx));
        SessionHandle { tx, events, viewport, feed, task }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionMsg>) {
        let mut ticker = tokio::time::interval(self.cfg.scroll_poll);
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(SessionMsg::Shutdown) => {
                        info!("session: shutdown requested");
                        break;
                    }
                    Some(m) => self.handle_msg(m),
                    None => {
                        debug!("session: channel closed");
                        break;
                    }
                },
                _ = ticker.tick() => self.handle_tick(Instant::now()),
            }
        }
        info!("session: loop stopped");
    }

    fn handle_msg(&mut self, msg: SessionMsg) {
        match msg {
            SessionMsg::RegisterToggle { control, kind, target, state } => {
                self.on_register_toggle(control, kind, target, state)
            }
            SessionMsg::ToggleClicked { control } => self.on_toggle_clicked(control),
            SessionMsg::MarkRead { control, item } => self.on_mark_read(control, item),
            SessionMsg::InitPager { cursor, filters } => self.on_init_pager(cursor, filters),
            SessionMsg::InitMarker { name, initial } => self.on_init_marker(name, initial),
            SessionMsg::InsertLive(item) => self.on_insert_live(item),
            SessionMsg::LoadMore => self.start_page_load("manual"),
            SessionMsg::MutationDone { control, seq, kind, target, old_state, new_state, result } => {
                self.on_mutation_done(control, seq, kind, target, old_state, new_state, result)
            }
            SessionMsg::PageDone { generation, result } => self.on_page_done(generation, result),
            SessionMsg::MarkerDone { attempted, prior, prior_highlight, mode, control, result } => {
                self.on_marker_done(attempted, prior, prior_highlight, mode, control, result)
            }
            SessionMsg::ReleaseLock { control, gesture } => {
                self.locks.release(&control, gesture);
            }
            SessionMsg::Shutdown => unreachable!("handled in the loop"),
        }
    }

    /// One sampler tick: consume the movement flag, evaluate the near-bottom
    /// predicate, and advance the marker debounce.
    fn handle_tick(&mut self, now: Instant) {
        if self.viewport.take_dirty() {
            self.note_movement(now);
            let vp = self.viewport.current();
            if self.near_bottom_ready(vp) {
                self.start_page_load("scroll");
            }
        }
        self.maybe_scan_marker(now);
    }

    pub(crate) fn publish(&self) {
        self.publisher.publish(&self.store);
    }
}

/// Per-view handle collecting everything `init_*` creates; dropping it (or
/// calling [`teardown`]) releases the loop, its timers and its locks.
///
/// [`teardown`]: SessionHandle::teardown
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionMsg>,
    events: broadcast::Sender<SessionEvent>,
    viewport: Arc<ViewportCell>,
    feed: FeedHandle,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Register a rendered toggle control with its server-rendered state.
    pub fn init_toggle(&self, control: ControlId, kind: ActionKind, target: TargetId, state: bool) {
        let _ = self.tx.send(SessionMsg::RegisterToggle { control, kind, target, state });
    }

    /// Arm the pager with the server-supplied cursor and page-context
    /// filters. Calling it again is the external cursor reset.
    pub fn init_pager(&self, cursor: Cursor, filters: Vec<(String, String)>) {
        let filters: SmallVec<[(String, String); 4]> = filters.into_iter().collect();
        let _ = self.tx.send(SessionMsg::InitPager { cursor, filters });
    }

    /// Arm marker sync with the server-supplied initial id. Emits
    /// [`SessionEvent::ViewportReady`] once the initial highlight is shown.
    pub fn init_marker_sync(&self, name: impl Into<String>, initial: ItemId) {
        let _ = self.tx.send(SessionMsg::InitMarker { name: name.into(), initial });
    }

    pub fn toggle_clicked(&self, control: ControlId) {
        let _ = self.tx.send(SessionMsg::ToggleClicked { control });
    }

    /// Explicit mark-read on `item`, locked on `control`.
    pub fn mark_read(&self, control: ControlId, item: ItemId) {
        let _ = self.tx.send(SessionMsg::MarkRead { control, item });
    }

    /// Prepend a live-pushed item.
    pub fn insert_live(&self, item: FeedItem) {
        let _ = self.tx.send(SessionMsg::InsertLive(item));
    }

    /// Manual load-more trigger; dropped while a fetch is outstanding.
    pub fn load_more(&self) {
        let _ = self.tx.send(SessionMsg::LoadMore);
    }

    /// Record a movement event. Cheap enough for raw scroll/touch streams:
    /// stores the geometry and sets the dirty flag, nothing else.
    pub fn viewport_moved(&self, vp: Viewport) {
        self.viewport.store(vp);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Read-side snapshot handle.
    pub fn feed(&self) -> FeedHandle {
        self.feed.clone()
    }

    /// Stop the loop and release everything `init_*` created. In-flight
    /// network writes (marker syncs included) are not guaranteed to
    /// complete; their completions land on a closed channel and are
    /// dropped.
    pub fn teardown(self) {
        info!("session: teardown");
        if self.tx.send(SessionMsg::Shutdown).is_err() {
            self.task.abort();
        }
    }
}
