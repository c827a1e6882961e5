#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tideline_core::Viewport;

/// Lock-free mailbox between raw host movement events and the session's
/// fixed-period sampler. Scroll and touch streams are high-frequency, so a
/// movement event only stores the latest geometry and sets the dirty flag;
/// the sampler tick consumes it. This keeps the event handlers minimal and
/// bounds the work rate — the polling is the backpressure mechanism, not an
/// artifact.
pub struct ViewportCell {
    vp: ArcSwap<Viewport>,
    dirty: AtomicBool,
}

impl ViewportCell {
    pub fn new() -> Self {
        Self { vp: ArcSwap::from_pointee(Viewport::default()), dirty: AtomicBool::new(false) }
    }

    /// Record a movement event.
    pub fn store(&self, vp: Viewport) {
        self.vp.store(Arc::new(vp));
        self.dirty.store(true, Ordering::Release);
    }

    /// Consume the dirty flag; true when the viewport moved since last tick.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub fn current(&self) -> Viewport {
        **self.vp.load()
    }
}

impl Default for ViewportCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(scroll_top: f64) -> Viewport {
        Viewport { scroll_top, viewport_height: 900.0, document_height: 5000.0 }
    }

    #[test]
    fn dirty_flag_is_consumed_once_per_burst() {
        let cell = ViewportCell::new();
        assert!(!cell.take_dirty());
        cell.store(vp(10.0));
        cell.store(vp(20.0));
        cell.store(vp(30.0));
        // a burst of movements collapses into one dirty tick with the latest geometry
        assert!(cell.take_dirty());
        assert_eq!(cell.current().scroll_top, 30.0);
        assert!(!cell.take_dirty());
    }

    #[test]
    fn near_bottom_threshold() {
        // document 5000, viewport 900, threshold 800 -> boundary at 3300
        assert!(!vp(3300.0).near_bottom(800.0));
        assert!(vp(3301.0).near_bottom(800.0));
        assert!(!vp(0.0).near_bottom(800.0));
    }
}
