//! Tideline collaborator contracts.
//!
//! This crate defines the stable traits and types the runtime depends on:
//! the remote service the core mutates and pages against (`FeedApi`) and the
//! presentation layer it drives (`Presenter`). Implementations can be remote
//! (`HttpApi`) or in-memory doubles for tests (`MockApi`,
//! `RecordingPresenter`).

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tideline_core::{ActionKind, ControlId, FeedItem, ItemId, TargetId};
use tracing::{debug, info};

/// Errors surfaced by the remote service collaborator. HTTP status codes
/// 429, 400 and 507 are distinguished cases; everything else is generic.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum FeedError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("over capacity: {0}")]
    OverCapacity(String),
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("request timed out")]
    Timeout,
    #[error("transport: {0}")]
    Transport(String),
}

pub type FeedResult<T> = Result<T, FeedError>;

impl FeedError {
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            429 => FeedError::RateLimited(message),
            400 => FeedError::Validation(message),
            507 => FeedError::OverCapacity(message),
            _ => FeedError::Http { status, message },
        }
    }
}

/// Parameters for one page fetch. `filters` are page-context pairs appended
/// to the request verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageQuery {
    pub before_id: Option<ItemId>,
    pub since_id: Option<ItemId>,
    pub filters: SmallVec<[(String, String); 4]>,
}

/// One page of feed items plus the server-reported cursor fields. The client
/// never recomputes these locally; the server may dedup/filter in ways the
/// client cannot replicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse {
    pub items: Vec<FeedItem>,
    pub before_id: Option<ItemId>,
    pub since_id: Option<ItemId>,
    pub more: bool,
}

/// Remote service operations the core consumes.
#[async_trait::async_trait]
pub trait FeedApi: Send + Sync {
    /// Apply (`desired = true`) or remove a toggle-style action on `target`.
    async fn mutate(&self, kind: ActionKind, target: TargetId, desired: bool) -> FeedResult<()>;

    /// Fetch one page of feed items bounded by the query's cursor fields.
    async fn fetch_page(&self, query: PageQuery) -> FeedResult<PageResponse>;

    /// Persist the furthest-read marker under `name`.
    async fn sync_marker(&self, name: &str, item: ItemId) -> FeedResult<()>;
}

/// Presentation collaborator the core drives. The core never touches markup;
/// it narrates state transitions through this trait.
pub trait Presenter: Send + Sync {
    fn apply_visual_state(&self, control: &ControlId, kind: ActionKind, state: bool);
    fn show_loading(&self, on: bool);
    fn render_error(&self, message: &str);
    fn render_upgrade_prompt(&self, message: &str, upgrade_url: &str);
    fn highlight_item(&self, item: ItemId);
    /// Vertical offset of a rendered item's top edge, `None` when the item
    /// is not currently rendered.
    fn item_offset_top(&self, item: ItemId) -> Option<f64>;
}

// ----------------- HTTP implementation -----------------

/// Service JSON envelope: payload under `data`, paging and error details
/// under `meta`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    meta: EnvelopeMeta,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeMeta {
    error_message: Option<String>,
    before_id: Option<ItemId>,
    since_id: Option<ItemId>,
    #[serde(default)]
    more: bool,
}

/// reqwest-backed implementation of [`FeedApi`].
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    feed_path: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url, feed_path: "posts/stream".to_string() })
    }

    /// Override the collection pages are fetched from.
    pub fn with_feed_path(mut self, path: impl Into<String>) -> Self {
        self.feed_path = path.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn map_transport(e: reqwest::Error) -> FeedError {
        if e.is_timeout() {
            FeedError::Timeout
        } else {
            FeedError::Transport(e.to_string())
        }
    }

    /// Map a non-2xx response to the error taxonomy, pulling the message out
    /// of the envelope's `meta.error_message` when the body parses.
    async fn check(resp: reqwest::Response) -> FeedResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let code = status.as_u16();
        let message = match resp.json::<Envelope<serde_json::Value>>().await {
            Ok(env) => env.meta.error_message.unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };
        Err(FeedError::from_status(code, message))
    }
}

#[async_trait::async_trait]
impl FeedApi for HttpApi {
    async fn mutate(&self, kind: ActionKind, target: TargetId, desired: bool) -> FeedResult<()> {
        let url = self.url(&kind.route(target));
        info!(kind = ?kind, target, desired, "api: mutate start");
        let req = if desired { self.client.post(&url) } else { self.client.delete(&url) };
        let resp = req.send().await.map_err(Self::map_transport)?;
        Self::check(resp).await?;
        info!(kind = ?kind, target, desired, "api: mutate ok");
        Ok(())
    }

    async fn fetch_page(&self, query: PageQuery) -> FeedResult<PageResponse> {
        let mut params: Vec<(String, String)> = Vec::new();
        if let Some(b) = query.before_id {
            params.push(("before_id".to_string(), b.to_string()));
        }
        if let Some(s) = query.since_id {
            params.push(("since_id".to_string(), s.to_string()));
        }
        params.extend(query.filters.iter().cloned());
        debug!(before = ?query.before_id, since = ?query.since_id, "api: fetch_page start");
        let resp = self
            .client
            .get(self.url(&self.feed_path))
            .query(&params)
            .send()
            .await
            .map_err(Self::map_transport)?;
        let resp = Self::check(resp).await?;
        let env: Envelope<Vec<FeedItem>> =
            resp.json().await.map_err(|e| FeedError::Transport(e.to_string()))?;
        let items = env.data.unwrap_or_default();
        info!(items = items.len(), more = env.meta.more, "api: fetch_page ok");
        Ok(PageResponse {
            items,
            before_id: env.meta.before_id,
            since_id: env.meta.since_id,
            more: env.meta.more,
        })
    }

    async fn sync_marker(&self, name: &str, item: ItemId) -> FeedResult<()> {
        info!(name, item, "api: sync_marker start");
        let resp = self
            .client
            .post(self.url("posts/marker"))
            .json(&serde_json::json!({ "name": name, "id": item }))
            .send()
            .await
            .map_err(Self::map_transport)?;
        Self::check(resp).await?;
        info!(name, item, "api: sync_marker ok");
        Ok(())
    }
}

// ----------------- Test doubles -----------------

/// A recorded mutate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationCall {
    pub kind: ActionKind,
    pub target: TargetId,
    pub desired: bool,
}

/// Scripted in-memory [`FeedApi`]. Results are popped from per-operation
/// queues in call order; an empty queue yields `Ok` for mutate/sync and a
/// transport error for pages. An optional delay keeps calls in flight so
/// tests can interleave triggers.
#[derive(Default)]
pub struct MockApi {
    pub mutations: Mutex<Vec<MutationCall>>,
    pub mutate_results: Mutex<VecDeque<FeedResult<()>>>,
    pub page_queries: Mutex<Vec<PageQuery>>,
    pub page_results: Mutex<VecDeque<FeedResult<PageResponse>>>,
    pub marker_calls: Mutex<Vec<(String, ItemId)>>,
    pub marker_results: Mutex<VecDeque<FeedResult<()>>>,
    pub delay: Mutex<Option<Duration>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_mutate(&self, result: FeedResult<()>) {
        self.mutate_results.lock().unwrap().push_back(result);
    }

    pub fn push_page(&self, result: FeedResult<PageResponse>) {
        self.page_results.lock().unwrap().push_back(result);
    }

    pub fn push_marker(&self, result: FeedResult<()>) {
        self.marker_results.lock().unwrap().push_back(result);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait::async_trait]
impl FeedApi for MockApi {
    async fn mutate(&self, kind: ActionKind, target: TargetId, desired: bool) -> FeedResult<()> {
        self.mutations.lock().unwrap().push(MutationCall { kind, target, desired });
        self.pause().await;
        self.mutate_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn fetch_page(&self, query: PageQuery) -> FeedResult<PageResponse> {
        self.page_queries.lock().unwrap().push(query);
        self.pause().await;
        self.page_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FeedError::Transport("no page scripted".to_string())))
    }

    async fn sync_marker(&self, name: &str, item: ItemId) -> FeedResult<()> {
        self.marker_calls.lock().unwrap().push((name.to_string(), item));
        self.pause().await;
        self.marker_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Call-recording [`Presenter`] with a configurable item-offset table.
#[derive(Default)]
pub struct RecordingPresenter {
    pub visuals: Mutex<Vec<(ControlId, ActionKind, bool)>>,
    pub loading: Mutex<Vec<bool>>,
    pub errors: Mutex<Vec<String>>,
    pub upgrades: Mutex<Vec<(String, String)>>,
    pub highlights: Mutex<Vec<ItemId>>,
    pub offsets: Mutex<std::collections::HashMap<ItemId, f64>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offset(&self, item: ItemId, top: f64) {
        self.offsets.lock().unwrap().insert(item, top);
    }
}

impl Presenter for RecordingPresenter {
    fn apply_visual_state(&self, control: &ControlId, kind: ActionKind, state: bool) {
        self.visuals.lock().unwrap().push((control.clone(), kind, state));
    }

    fn show_loading(&self, on: bool) {
        self.loading.lock().unwrap().push(on);
    }

    fn render_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn render_upgrade_prompt(&self, message: &str, upgrade_url: &str) {
        self.upgrades.lock().unwrap().push((message.to_string(), upgrade_url.to_string()));
    }

    fn highlight_item(&self, item: ItemId) {
        self.highlights.lock().unwrap().push(item);
    }

    fn item_offset_top(&self, item: ItemId) -> Option<f64> {
        self.offsets.lock().unwrap().get(&item).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_distinguishes_quota_and_validation() {
        assert!(matches!(FeedError::from_status(429, "slow down".into()), FeedError::RateLimited(_)));
        assert!(matches!(FeedError::from_status(400, "bad".into()), FeedError::Validation(_)));
        assert!(matches!(FeedError::from_status(507, "full".into()), FeedError::OverCapacity(_)));
        assert!(matches!(
            FeedError::from_status(500, "boom".into()),
            FeedError::Http { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn mock_pops_scripted_results_in_order() {
        let api = MockApi::new();
        api.push_mutate(Err(FeedError::Timeout));
        api.push_mutate(Ok(()));
        assert!(api.mutate(ActionKind::Follow, 1, true).await.is_err());
        assert!(api.mutate(ActionKind::Follow, 1, false).await.is_ok());
        // queue drained: defaults to ok
        assert!(api.mutate(ActionKind::Star, 2, true).await.is_ok());
        assert_eq!(api.mutations.lock().unwrap().len(), 3);
    }
}
