//! Viewport Overflow Resolver
//!
//! A region capture cannot extend past the rendering surface, so a segment
//! taller than the viewport is handled by growing the viewport, never by
//! dropping rows. The caller restores the base viewport afterwards.

use super::geometry::Segment;
use super::renderer::{Renderer, ViewportSize};
use crate::config::{GridConfig, TimingConfig};
use crate::error::Result;
use tracing::{debug, instrument, warn};

/// What the resolver did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowOutcome {
    /// The segment already fits; nothing changed
    Fits,
    /// The viewport was grown to `height`
    Grown {
        /// New viewport height
        height: u32,
    },
    /// The viewport was grown to the cap, which is still short of `needed`
    Capped {
        /// Height the segment would need
        needed: u32,
        /// The cap the viewport was grown to
        cap: u32,
    },
}

/// Grows the viewport so one segment fits into a single capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverflowResolver {
    /// Hard cap on viewport height
    pub cap: u32,
    /// Space kept below the segment when growing
    pub growth_margin: f64,
    /// A segment whose bottom is within this distance of the viewport bottom overflows
    pub check_margin: f64,
    /// Wait after resizing
    pub resize_settle_ms: u64,
}

impl Default for OverflowResolver {
    fn default() -> Self {
        Self::from_config(&GridConfig::default(), &TimingConfig::default())
    }
}

impl OverflowResolver {
    /// Build from configuration
    pub fn from_config(grid: &GridConfig, timing: &TimingConfig) -> Self {
        Self {
            cap: grid.viewport_height_cap,
            growth_margin: grid.overflow_growth_margin,
            check_margin: grid.overflow_check_margin,
            resize_settle_ms: timing.resize_settle_ms,
        }
    }

    /// Whether `segment` would be clipped by a viewport of `viewport` size
    pub fn overflows(&self, segment: &Segment, viewport: ViewportSize) -> bool {
        segment.bottom() > f64::from(viewport.height) - self.check_margin
    }

    /// Uncapped viewport height the segment needs
    pub fn needed_height(&self, segment: &Segment) -> u32 {
        (segment.bottom() + self.growth_margin).ceil().max(1.0) as u32
    }

    /// Viewport height the resolver will grow to
    pub fn target_height(&self, segment: &Segment) -> u32 {
        self.needed_height(segment).min(self.cap)
    }

    /// Grow the viewport for `segment` if it overflows.
    ///
    /// Geometry queried before this call is stale once it returns anything
    /// other than [`OverflowOutcome::Fits`].
    #[instrument(skip(self, renderer, segment), fields(start = segment.start))]
    pub async fn resolve<R: Renderer>(
        &self,
        renderer: &mut R,
        segment: &Segment,
    ) -> Result<OverflowOutcome> {
        let current = renderer.viewport_size();
        if !self.overflows(segment, current) {
            return Ok(OverflowOutcome::Fits);
        }

        let needed = self.needed_height(segment);
        let height = self.target_height(segment);
        debug!(
            "Growing viewport {}x{} -> {}x{} for segment bottom {:.1}",
            current.width,
            current.height,
            current.width,
            height,
            segment.bottom()
        );
        renderer
            .set_viewport_size(ViewportSize::new(current.width, height))
            .await?;
        renderer.wait_settle(self.resize_settle_ms).await;

        if needed > self.cap {
            warn!("Segment needs {}px, viewport capped at {}px", needed, self.cap);
            Ok(OverflowOutcome::Capped {
                needed,
                cap: self.cap,
            })
        } else {
            Ok(OverflowOutcome::Grown { height })
        }
    }
}
