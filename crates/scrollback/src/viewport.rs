use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Offset below which the viewport counts as scrolled to the top.
pub const DEFAULT_SCROLL_THRESHOLD_PX: f32 = 30.0;
/// Remaining distance to the tail under which new messages auto-follow.
pub const DEFAULT_NEAR_BOTTOM_PX: f32 = 100.0;
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Raw geometry of the scrollable message region.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportGeometry {
    pub scroll_offset: f32,
    pub content_extent: f32,
    pub visible_extent: f32,
}

impl ViewportGeometry {
    pub fn new(scroll_offset: f32, content_extent: f32, visible_extent: f32) -> Self {
        Self {
            scroll_offset,
            content_extent,
            visible_extent,
        }
    }

    pub fn distance_from_bottom(&self) -> f32 {
        self.content_extent - self.scroll_offset - self.visible_extent
    }

    pub fn max_offset(&self) -> f32 {
        (self.content_extent - self.visible_extent).max(0.0)
    }
}

/// Classified viewport position delivered to listeners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportInfo {
    pub is_at_top: bool,
    pub is_at_bottom: bool,
    pub geometry: ViewportGeometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollBehavior {
    /// Jump without animation.
    #[default]
    Immediate,
    Smooth,
}

/// Host-side handle of a mounted scroll container.
///
/// Handles are shared with the rendering host, so every method takes `&self`.
/// Implementations must not call back into the controller synchronously.
pub trait ViewportHandle {
    /// Current geometry, or `None` once the container is unmounted.
    fn geometry(&self) -> Option<ViewportGeometry>;
    /// Sets the offset without animation.
    fn set_offset(&self, offset: f32);
    fn scroll_to(&self, offset: f32, behavior: ScrollBehavior);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportThresholds {
    pub scroll_threshold_px: f32,
    pub near_bottom_px: f32,
}

impl Default for ViewportThresholds {
    fn default() -> Self {
        Self {
            scroll_threshold_px: DEFAULT_SCROLL_THRESHOLD_PX,
            near_bottom_px: DEFAULT_NEAR_BOTTOM_PX,
        }
    }
}

/// Samples viewport geometry and keeps the shared near-bottom flag current.
#[derive(Debug, Clone)]
pub struct ViewportMonitor {
    thresholds: ViewportThresholds,
    last: Option<ViewportInfo>,
    near_bottom: bool,
}

impl ViewportMonitor {
    pub fn new(thresholds: ViewportThresholds) -> Self {
        Self {
            thresholds,
            last: None,
            // A fresh list starts at its tail.
            near_bottom: true,
        }
    }

    pub fn classify(&self, geometry: ViewportGeometry) -> ViewportInfo {
        ViewportInfo {
            is_at_top: geometry.scroll_offset < self.thresholds.scroll_threshold_px,
            is_at_bottom: geometry.distance_from_bottom() < self.thresholds.near_bottom_px,
            geometry,
        }
    }

    /// Reads the handle; a detached handle yields the last known state unchanged.
    pub fn sample(&mut self, viewport: Option<&dyn ViewportHandle>) -> Option<ViewportInfo> {
        self.observe(viewport.and_then(|handle| handle.geometry()))
    }

    /// Same as [`Self::sample`] for geometry the caller already read.
    pub fn observe(&mut self, geometry: Option<ViewportGeometry>) -> Option<ViewportInfo> {
        let Some(geometry) = geometry else {
            return self.last;
        };

        let info = self.classify(geometry);
        self.near_bottom = info.is_at_bottom;
        self.last = Some(info);
        tracing::trace!(
            scroll_offset = geometry.scroll_offset,
            content_extent = geometry.content_extent,
            visible_extent = geometry.visible_extent,
            is_at_top = info.is_at_top,
            is_at_bottom = info.is_at_bottom,
            "viewport sampled"
        );
        Some(info)
    }

    pub fn near_bottom(&self) -> bool {
        self.near_bottom
    }

    pub fn last(&self) -> Option<ViewportInfo> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.near_bottom = true;
    }
}

/// Trailing-edge debouncer: only the job scheduled last survives its quiet window.
///
/// Jobs run on the current `LocalSet`.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule<F>(&mut self, job: F)
    where
        F: Future<Output = ()> + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            job.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| !pending.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
