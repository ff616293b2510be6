//! Item materialization for lazily-loaded lists
//!
//! Catalogs render more items as the page is scrolled. These loops scroll
//! the document to the bottom and wait until the item count is satisfied or
//! stops changing, each bounded by a hard round limit.

use super::renderer::{Renderer, ScrollContainer};
use crate::config::CaptureConfig;
use crate::error::{Result, SegmentError};
use tracing::{debug, info, instrument, warn};

/// Outcome of a best-effort full load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Items present when loading stopped
    pub count: usize,
    /// Scroll rounds performed
    pub rounds: u32,
    /// Whether the count stabilized before the round limit
    pub stabilized: bool,
}

/// Drives the renderer until items are materialized
#[derive(Debug, Clone)]
pub struct ItemLoader {
    selector: String,
    ensure_rounds: u32,
    max_scroll_rounds: u32,
    stable_rounds_to_stop: u32,
    after_scroll_ms: u64,
    network_quiet_ms: u64,
    after_load_ms: u64,
}

impl ItemLoader {
    /// Build from configuration
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            selector: config.grid.item_selector.clone(),
            ensure_rounds: config.grid.ensure_rounds,
            max_scroll_rounds: config.grid.max_scroll_rounds,
            stable_rounds_to_stop: config.grid.stable_rounds_to_stop,
            after_scroll_ms: config.timing.after_scroll_ms,
            network_quiet_ms: config.timing.network_quiet_ms,
            after_load_ms: config.timing.after_load_ms,
        }
    }

    /// The item selector
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Scroll until at least `min_count` items exist.
    ///
    /// Fails with [`SegmentError::MaterializationTimeout`] after `ensure_rounds`
    /// unsatisfied rounds.
    #[instrument(skip(self, renderer))]
    pub async fn ensure_rendered<R: Renderer>(
        &self,
        renderer: &mut R,
        min_count: usize,
    ) -> Result<()> {
        for round in 0..self.ensure_rounds {
            let count = renderer.item_count(&self.selector).await?;
            if count >= min_count {
                if round > 0 {
                    debug!("Materialized {} items after {} rounds", count, round);
                }
                return Ok(());
            }
            scroll_to_bottom(renderer).await?;
            renderer.wait_settle(self.after_scroll_ms).await;
        }

        Err(SegmentError::MaterializationTimeout {
            index: min_count.saturating_sub(1),
            rounds: self.ensure_rounds,
        }
        .into())
    }

    /// Scroll to the bottom until the item count stays unchanged for
    /// `stable_rounds_to_stop` rounds, then return to the top.
    #[instrument(skip(self, renderer))]
    pub async fn load_all_items<R: Renderer>(&self, renderer: &mut R) -> Result<LoadReport> {
        let mut stable = 0u32;
        let mut last_count: Option<usize> = None;
        let mut count = 0usize;
        let mut rounds = 0u32;
        let mut stabilized = false;

        while rounds < self.max_scroll_rounds {
            count = renderer.item_count(&self.selector).await?;
            stable = if last_count == Some(count) {
                stable + 1
            } else {
                0
            };
            last_count = Some(count);
            if stable >= self.stable_rounds_to_stop {
                stabilized = true;
                break;
            }

            scroll_to_bottom(renderer).await?;
            renderer.wait_settle(self.after_scroll_ms).await;
            if !renderer.wait_network_quiet(self.network_quiet_ms).await {
                debug!("Network not quiet after round {}", rounds);
            }
            rounds += 1;
        }

        if !stabilized {
            count = renderer.item_count(&self.selector).await?;
            warn!(
                "Item count still changing after {} rounds ({} items)",
                rounds, count
            );
        }

        renderer.scroll_to(&ScrollContainer::Document, 0.0).await?;
        renderer.wait_settle(self.after_load_ms).await;

        if count == 0 {
            return Err(SegmentError::NoItemsFound {
                selector: self.selector.clone(),
            }
            .into());
        }

        info!("Loaded {} items in {} rounds", count, rounds);
        Ok(LoadReport {
            count,
            rounds,
            stabilized,
        })
    }
}

/// Scroll the document to its current bottom
pub async fn scroll_to_bottom<R: Renderer>(renderer: &mut R) -> Result<()> {
    let metrics = renderer.scroll_metrics(&ScrollContainer::Document).await?;
    renderer
        .scroll_to(&ScrollContainer::Document, metrics.scroll_height)
        .await
}
