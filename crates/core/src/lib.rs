//! Tideline core types shared by the store, the runtime and the collaborators.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Server-assigned feed item id. Newer items have larger ids.
pub type ItemId = u64;
/// Id of the resource a toggle action targets (user, post, channel, app).
pub type TargetId = u64;
/// Author id carried on feed items.
pub type AuthorId = u64;
/// Host-side selector for the control that triggered an action.
pub type ControlId = String;

/// Closed set of toggle-style actions. One coordinator is parametrized over
/// this enum; each variant supplies its own service route and failure copy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Follow,
    Star,
    Repost,
    Subscribe,
    Mute,
    Block,
    Recommend,
}

impl ActionKind {
    /// Service route a mutation for `target` is issued against.
    /// Engage is POST, disengage is DELETE on the same route.
    pub fn route(&self, target: TargetId) -> String {
        match self {
            ActionKind::Follow => format!("users/{}/follow", target),
            ActionKind::Star => format!("posts/{}/star", target),
            ActionKind::Repost => format!("posts/{}/repost", target),
            ActionKind::Subscribe => format!("channels/{}/subscribe", target),
            ActionKind::Mute => format!("users/{}/mute", target),
            ActionKind::Block => format!("users/{}/block", target),
            ActionKind::Recommend => format!("apps/{}/recommend", target),
        }
    }

    /// Name of the state-change notification for this kind
    /// ("follow-state-change" etc.).
    pub fn event_name(&self) -> &'static str {
        match self {
            ActionKind::Follow => "follow-state-change",
            ActionKind::Star => "star-state-change",
            ActionKind::Repost => "repost-state-change",
            ActionKind::Subscribe => "subscribe-state-change",
            ActionKind::Mute => "mute-state-change",
            ActionKind::Block => "block-state-change",
            ActionKind::Recommend => "recommend-state-change",
        }
    }

    /// User-facing copy for a mutation toward `desired` that failed.
    pub fn failure_phrase(&self, desired: bool) -> String {
        let un = if desired { "" } else { "un" };
        match self {
            ActionKind::Follow => format!(
                "There was a problem {}following this user. Please wait a moment and try again.",
                un
            ),
            ActionKind::Subscribe => format!(
                "There was a problem {}subscribing. Please wait a moment and try again.",
                un
            ),
            ActionKind::Recommend => format!(
                "There was a problem {}recommending. Please wait a moment and try again.",
                un
            ),
            ActionKind::Star => {
                format!("Unable to {}star this post. Wait a moment, and try again", un)
            }
            ActionKind::Repost => format!(
                "Unable to {}. Wait a moment, and try again",
                if desired { "repost" } else { "remove repost" }
            ),
            ActionKind::Mute => {
                format!("We were unable to {}mute this user. Wait a moment, and try again", un)
            }
            ActionKind::Block => {
                format!("We were unable to {}block this user. Wait a moment, and try again", un)
            }
        }
    }
}

/// One rendered feed item. The body is opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedItem {
    pub id: ItemId,
    /// Author, when the item has one; consulted by the block cascade.
    pub author: Option<AuthorId>,
    pub body: String,
    pub created_ts: i64,
}

/// Pagination cursor. `before_id` only ever moves to a server-reported value
/// after a successful fetch; `more = false` is terminal until the cursor is
/// externally reset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Cursor {
    pub before_id: Option<ItemId>,
    pub since_id: Option<ItemId>,
    pub more: bool,
}

/// Furthest-read marker. `acknowledged_id` never decreases as a result of a
/// successful sync; it may decrease only via rollback of a failed attempt
/// that no later successful sync has superseded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ReadMarker {
    pub acknowledged_id: ItemId,
    pub in_flight_id: Option<ItemId>,
}

/// Immutable view of the feed store published to read-side consumers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeedSnapshot {
    pub epoch: u64,
    pub items: Vec<FeedItem>,
    pub cursor: Cursor,
    pub marker: ReadMarker,
}

/// Viewport geometry in CSS px, sampled by the scroll monitor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub document_height: f64,
}

impl Viewport {
    /// True when the scroll position is within `threshold` px of the bottom.
    pub fn near_bottom(&self, threshold: f64) -> bool {
        self.scroll_top > self.document_height - self.viewport_height - threshold
    }
}

pub mod prelude {
    pub use super::{
        ActionKind, AuthorId, ControlId, Cursor, FeedItem, FeedSnapshot, ItemId, ReadMarker,
        TargetId, Viewport,
    };
}
