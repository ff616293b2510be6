//! Renderer capability interface
//!
//! The segmentation engine never touches a browser directly. It drives a
//! [`Renderer`]: a session handle that answers geometry queries, scrolls,
//! resizes its viewport and captures pixels. Every mutating call takes
//! `&mut self`, so a [`GeometrySnapshot`](super::geometry::GeometrySnapshot)
//! taken before a scroll or resize is plainly stale afterwards and must be
//! queried again.

use super::geometry::ItemRect;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Which element scrolls
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "selector")]
pub enum ScrollContainer {
    /// The document scrolling element (window scroll)
    #[default]
    Document,
    /// The first element matching a CSS selector
    Selector(String),
    /// The scroll container the renderer judged most likely to hold the page content
    Auto,
}

/// Height metrics of a scroll container, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
    /// Current scroll offset
    pub scroll_top: f64,
    /// Full scrollable extent
    pub scroll_height: f64,
    /// Visible extent
    pub client_height: f64,
}

impl ScrollMetrics {
    /// Largest reachable scroll offset
    pub fn max_scroll_top(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }
}

/// Viewport size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSize {
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl ViewportSize {
    /// Create a viewport size
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A capture region in viewport coordinates, whole CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width, at least 1
    pub width: u32,
    /// Height, at least 1
    pub height: u32,
}

/// Capability set the engine consumes.
///
/// Waits live on the renderer so that a live implementation sleeps and a
/// simulated one can advance instantly.
#[allow(async_fn_in_trait)]
pub trait Renderer {
    /// Rectangles of all items with index >= `from_index`, ordered by index
    async fn query_item_rects(&mut self, selector: &str, from_index: usize)
        -> Result<Vec<ItemRect>>;

    /// Number of items currently in the document
    async fn item_count(&mut self, selector: &str) -> Result<usize>;

    /// Set the container's scroll offset; implementations clamp to the valid range
    async fn scroll_to(&mut self, container: &ScrollContainer, y: f64) -> Result<()>;

    /// Read the container's height metrics
    async fn scroll_metrics(&mut self, container: &ScrollContainer) -> Result<ScrollMetrics>;

    /// Resize the viewport
    async fn set_viewport_size(&mut self, size: ViewportSize) -> Result<()>;

    /// Current viewport size
    fn viewport_size(&self) -> ViewportSize;

    /// Physical pixels per CSS pixel
    fn device_pixel_ratio(&self) -> f64;

    /// Fixed settle wait
    async fn wait_settle(&mut self, ms: u64);

    /// Best-effort wait for network quiescence; `false` means it never quieted
    async fn wait_network_quiet(&mut self, timeout_ms: u64) -> bool;

    /// PNG bytes of a viewport-relative region
    async fn capture_region(&mut self, clip: ClipRect) -> Result<Vec<u8>>;

    /// PNG bytes of the current viewport
    async fn capture_viewport(&mut self) -> Result<Vec<u8>>;

    /// PNG bytes of the whole page, for failure snapshots. Falls back to the viewport.
    async fn capture_diagnostic(&mut self) -> Result<Vec<u8>> {
        self.capture_viewport().await
    }
}
