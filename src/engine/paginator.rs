//! Row Clustering Paginator
//!
//! Walks a grid of catalog items from a cursor, emitting one image per
//! segment of at most `max_rows_per_segment` whole rows. Each iteration:
//!
//! 1. materialize item `start` (bounded scroll-to-bottom rounds)
//! 2. bring it into view, compute the segment, align its top with the
//!    viewport top and compute the segment again
//! 3. grow the viewport if the segment would be clipped, then realign
//! 4. capture exactly the segment's box and advance to `next_start`
//! 5. restore the base viewport and re-read the item count
//!
//! Geometry is re-queried after every scroll and resize; a snapshot never
//! outlives the mutation that follows it.

use super::geometry::{compute_segment, GeometrySnapshot, Segment, SegmentParams};
use super::loader::ItemLoader;
use super::overflow::{OverflowOutcome, OverflowResolver};
use super::renderer::{Renderer, ScrollContainer, ViewportSize};
use crate::config::CaptureConfig;
use crate::error::{Error, Result, SegmentError};
use crate::output::{self, ShotRecord};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Process-local position of the pagination loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureCursor {
    /// Next item index to cover
    pub start: usize,
    /// 1-based number of the next shot
    pub shot_number: u32,
}

impl CaptureCursor {
    /// Cursor at `start`, first shot
    pub fn new(start: usize) -> Self {
        Self {
            start,
            shot_number: 1,
        }
    }

    /// Move past a captured segment
    pub fn advance(&mut self, next_start: usize) {
        debug_assert!(next_start > self.start, "cursor must make progress");
        self.start = next_start;
        self.shot_number += 1;
    }

    /// Whether items remain out of `total`
    pub fn has_remaining(&self, total: usize) -> bool {
        self.start < total
    }
}

/// Result of one pagination run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaginationReport {
    /// Images written, in order
    pub shots: Vec<ShotRecord>,
    /// Item count when the loop ended
    pub total_items: usize,
    /// Set when the loop stopped before covering every known item
    pub incomplete: Option<String>,
}

impl PaginationReport {
    /// Index one past the last covered item
    pub fn covered_until(&self) -> usize {
        self.shots.last().map(|s| s.next_start).unwrap_or(0)
    }
}

/// Row Clustering Paginator
#[derive(Debug, Clone)]
pub struct RowPaginator {
    loader: ItemLoader,
    params: SegmentParams,
    resolver: OverflowResolver,
    base: ViewportSize,
    align_offset: f64,
    align_settle_ms: u64,
    restore_settle_ms: u64,
    recheck_settle_ms: u64,
}

impl RowPaginator {
    /// Build from configuration
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            loader: ItemLoader::from_config(config),
            params: SegmentParams {
                max_rows: config.grid.max_rows_per_segment,
                tolerance: config.grid.row_tolerance,
                padding: config.grid.segment_padding,
            },
            resolver: OverflowResolver::from_config(&config.grid, &config.timing),
            base: ViewportSize::new(config.viewport.width, config.viewport.height),
            align_offset: config.grid.align_offset,
            align_settle_ms: config.timing.align_settle_ms,
            restore_settle_ms: config.timing.restore_settle_ms,
            recheck_settle_ms: config.timing.after_scroll_ms,
        }
    }

    /// Segment parameters in use
    pub fn params(&self) -> SegmentParams {
        self.params
    }

    /// Capture every currently-available item from index 0
    pub async fn run<R: Renderer>(
        &self,
        renderer: &mut R,
        out_dir: &Path,
    ) -> Result<PaginationReport> {
        self.run_from(renderer, out_dir, 0).await
    }

    /// Capture every currently-available item from `start`
    #[instrument(skip(self, renderer), fields(selector = self.loader.selector()))]
    pub async fn run_from<R: Renderer>(
        &self,
        renderer: &mut R,
        out_dir: &Path,
        start: usize,
    ) -> Result<PaginationReport> {
        output::ensure_dir(out_dir).await?;

        let selector = self.loader.selector();
        let mut report = PaginationReport::default();
        let mut total = renderer.item_count(selector).await?;
        let mut cursor = CaptureCursor::new(start);

        'outer: loop {
            while cursor.has_remaining(total) {
                let segment = match self.settled_segment(renderer, cursor.start).await {
                    Ok(Some(segment)) => segment,
                    Ok(None) => {
                        debug!("No items at or after {}", cursor.start);
                        break 'outer;
                    }
                    Err(Error::Segment(err @ SegmentError::MaterializationTimeout { .. })) => {
                        warn!("Stopping at item {}: {}", cursor.start, err);
                        report.incomplete = Some(err.to_string());
                        break 'outer;
                    }
                    Err(e) => return Err(e),
                };

                let record = self.capture_segment(renderer, &segment, &cursor, out_dir).await?;
                cursor.advance(record.next_start);
                report.shots.push(record);

                self.restore_viewport(renderer).await?;
                total = renderer.item_count(selector).await?;
            }

            // Catalogs can keep loading while we capture; look once more.
            renderer.wait_settle(self.recheck_settle_ms).await;
            total = renderer.item_count(selector).await?;
            if !cursor.has_remaining(total) {
                break;
            }
            info!("Item count grew to {}, continuing from {}", total, cursor.start);
        }

        self.restore_viewport(renderer).await?;
        report.total_items = total;
        info!(
            "Captured {} segments covering {} of {} items",
            report.shots.len(),
            report.covered_until(),
            total
        );
        Ok(report)
    }

    /// Steps 1-6 of an iteration: the segment at `start`, aligned and fitted
    /// into the viewport, with geometry fresh as of the last mutation.
    pub async fn settled_segment<R: Renderer>(
        &self,
        renderer: &mut R,
        start: usize,
    ) -> Result<Option<Segment>> {
        self.loader.ensure_rendered(renderer, start + 1).await?;
        self.bring_into_view(renderer, start).await?;

        let Some(segment) = self.segment_at(renderer, start).await? else {
            return Ok(None);
        };
        self.align_top(renderer, &segment).await?;
        let Some(mut segment) = self.segment_at(renderer, start).await? else {
            return Ok(None);
        };

        match self.resolver.resolve(renderer, &segment).await? {
            OverflowOutcome::Fits => {}
            OverflowOutcome::Grown { .. } | OverflowOutcome::Capped { .. } => {
                let Some(resized) = self.segment_at(renderer, start).await? else {
                    return Ok(None);
                };
                self.align_top(renderer, &resized).await?;
                let Some(realigned) = self.segment_at(renderer, start).await? else {
                    return Ok(None);
                };
                segment = realigned;
            }
        }
        Ok(Some(segment))
    }

    /// Step 7: capture exactly the segment's box
    async fn capture_segment<R: Renderer>(
        &self,
        renderer: &mut R,
        segment: &Segment,
        cursor: &CaptureCursor,
        out_dir: &Path,
    ) -> Result<ShotRecord> {
        let viewport = renderer.viewport_size();
        let overflow_unresolved = segment.bottom() > f64::from(viewport.height);
        if overflow_unresolved {
            let err = SegmentError::OverflowUnresolved {
                needed: self.resolver.needed_height(segment),
                cap: self.resolver.cap,
            };
            warn!("Capturing segment from {} with clipping risk: {}", segment.start, err);
        }

        let clip = segment.clip()?;
        let bytes = renderer.capture_region(clip).await?;
        let file = output::shot_file_name(cursor.shot_number);
        let path = out_dir.join(&file);
        output::write_file(&path, &bytes).await?;

        info!(
            "Wrote {} (start={} -> next={}, rows={})",
            path.display(),
            segment.start,
            segment.next_start,
            segment.row_count()
        );

        Ok(ShotRecord {
            shot: cursor.shot_number,
            file,
            start: segment.start,
            next_start: segment.next_start,
            rows: segment.row_count(),
            clip,
            overflow_unresolved,
        })
    }

    /// Fresh geometry for items at or after `start`
    pub async fn snapshot<R: Renderer>(
        &self,
        renderer: &mut R,
        start: usize,
    ) -> Result<GeometrySnapshot> {
        let items = renderer
            .query_item_rects(self.loader.selector(), start)
            .await?;
        Ok(GeometrySnapshot::new(items)?)
    }

    async fn segment_at<R: Renderer>(
        &self,
        renderer: &mut R,
        start: usize,
    ) -> Result<Option<Segment>> {
        let snapshot = self.snapshot(renderer, start).await?;
        Ok(compute_segment(&snapshot, start, self.params))
    }

    /// Scroll item `start` into view if it lies outside the viewport
    async fn bring_into_view<R: Renderer>(&self, renderer: &mut R, start: usize) -> Result<()> {
        let snapshot = self.snapshot(renderer, start).await?;
        let Some(item) = snapshot.get(start).or_else(|| snapshot.items().first()) else {
            return Ok(());
        };
        let height = f64::from(renderer.viewport_size().height);
        if item.rect.top >= 0.0 && item.rect.bottom <= height {
            return Ok(());
        }
        self.scroll_by(renderer, item.rect.top - self.align_offset)
            .await
    }

    /// Scroll so the segment's top sits `align_offset` below the viewport top
    async fn align_top<R: Renderer>(&self, renderer: &mut R, segment: &Segment) -> Result<()> {
        self.scroll_by(renderer, segment.top() - self.align_offset)
            .await
    }

    async fn scroll_by<R: Renderer>(&self, renderer: &mut R, delta: f64) -> Result<()> {
        let metrics = renderer.scroll_metrics(&ScrollContainer::Document).await?;
        let target = (metrics.scroll_top + delta).max(0.0);
        renderer.scroll_to(&ScrollContainer::Document, target).await?;
        renderer.wait_settle(self.align_settle_ms).await;
        Ok(())
    }

    /// Step 8: put the viewport back to its base size
    pub async fn restore_viewport<R: Renderer>(&self, renderer: &mut R) -> Result<()> {
        renderer.set_viewport_size(self.base).await?;
        renderer.wait_settle(self.restore_settle_ms).await;
        Ok(())
    }
}
