#![forbid(unsafe_code)]

use std::time::Duration;

/// Tunables for one view session. Defaults match the original product
/// behavior; each can be overridden through a `TIDELINE_*` env var.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Period of the viewport sampler consuming the movement dirty flag.
    pub scroll_poll: Duration,
    /// Near-bottom threshold for triggering a page load.
    pub near_bottom_px: f64,
    /// Quiet period after the movement stream stops before a marker scan.
    pub marker_debounce: Duration,
    /// Minimum spacing between passive marker writes.
    pub marker_throttle: Duration,
    /// Bound on a single action-mutation request.
    pub mutate_timeout: Duration,
    /// Fixed chrome height excluded from the top of the viewport band.
    pub header_offset_px: f64,
    /// Where the capacity/quota prompt sends the user.
    pub upgrade_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scroll_poll: Duration::from_millis(100),
            near_bottom_px: 800.0,
            marker_debounce: Duration::from_millis(500),
            marker_throttle: Duration::from_secs(10),
            mutate_timeout: Duration::from_secs(10),
            header_offset_px: 60.0,
            upgrade_url: "/upgrade".to_string(),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok())
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|s| s.parse::<f64>().ok())
}

impl SessionConfig {
    /// Defaults with `TIDELINE_*` overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(ms) = env_u64("TIDELINE_SCROLL_POLL_MS") {
            cfg.scroll_poll = Duration::from_millis(ms.max(1));
        }
        if let Some(px) = env_f64("TIDELINE_NEAR_BOTTOM_PX") {
            cfg.near_bottom_px = px;
        }
        if let Some(ms) = env_u64("TIDELINE_MARKER_DEBOUNCE_MS") {
            cfg.marker_debounce = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("TIDELINE_MARKER_THROTTLE_SECS") {
            cfg.marker_throttle = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("TIDELINE_MUTATE_TIMEOUT_SECS") {
            cfg.mutate_timeout = Duration::from_secs(secs);
        }
        if let Some(px) = env_f64("TIDELINE_HEADER_OFFSET_PX") {
            cfg.header_offset_px = px;
        }
        if let Ok(url) = std::env::var("TIDELINE_UPGRADE_URL") {
            cfg.upgrade_url = url;
        }
        cfg
    }
}
