#![forbid(unsafe_code)]

use smallvec::SmallVec;
use tideline_api::{FeedResult, PageResponse};
use tideline_core::{ActionKind, ControlId, Cursor, FeedItem, ItemId, TargetId};

use crate::lock::Gesture;

/// Everything that enters the session loop: host triggers, network
/// completions, and the loop's own deferred bookkeeping. One FIFO channel
/// keeps registration-order delivery for same-trigger handlers.
#[derive(Debug)]
pub(crate) enum SessionMsg {
    // host triggers
    RegisterToggle { control: ControlId, kind: ActionKind, target: TargetId, state: bool },
    ToggleClicked { control: ControlId },
    MarkRead { control: ControlId, item: ItemId },
    InitPager { cursor: Cursor, filters: SmallVec<[(String, String); 4]> },
    InitMarker { name: String, initial: ItemId },
    InsertLive(FeedItem),
    LoadMore,
    Shutdown,
    // network completions
    MutationDone {
        control: ControlId,
        seq: u64,
        kind: ActionKind,
        target: TargetId,
        old_state: bool,
        new_state: bool,
        result: FeedResult<()>,
    },
    PageDone { generation: u64, result: FeedResult<PageResponse> },
    MarkerDone {
        attempted: ItemId,
        prior: ItemId,
        prior_highlight: Option<ItemId>,
        mode: MarkerMode,
        control: Option<ControlId>,
        result: FeedResult<()>,
    },
    // deferred single-flight release: enqueued by a completion handler so a
    // trigger already queued in the same turn still observes the lock
    ReleaseLock { control: ControlId, gesture: Gesture },
}

/// Delivery mode of a marker sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerMode {
    /// Explicit user-triggered mark-read; failures are reported.
    Immediate,
    /// Passive scroll-driven sync; rate-limited, failures are silent.
    Throttled,
}

/// Notifications external wiring may subscribe to. `StateChange` is the
/// `<kind>-state-change` event of the original wire contract.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChange { kind: ActionKind, target: TargetId, state: bool },
    ViewportReady,
}
