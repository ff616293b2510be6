//! Tile Capture
//!
//! Traverses one scroll container top to bottom, capturing a viewport-sized
//! tile per position with `overlap` pixels shared between neighbours. When
//! traversal reaches the bottom it waits and re-measures: growth beyond the
//! threshold means the list is still loading and traversal continues from the
//! old bottom; otherwise a stability counter runs until it reaches
//! `stable_rounds_to_stop`. A hard round ceiling bounds runaway growth.
//!
//! ```text
//! Positioning ──▶ Stabilizing ──▶ Capturing ──▶ y < maxY ? Advance : BottomCheck
//!      ▲                                              │                  │
//!      └──────────────────────────────────────────────┴──── (not stable) ┘
//! ```

use super::renderer::{Renderer, ScrollContainer, ScrollMetrics};
use crate::config::{CaptureConfig, TileConfig, TimingConfig};
use crate::error::{CaptureError, Result};
use crate::output;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// One viewport capture at a known scroll offset
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Ordinal position in the sequence
    pub index: usize,
    /// Scroll offset the tile was captured at, CSS pixels
    pub scroll_top: f64,
    /// Container client height at capture time, CSS pixels
    pub client_height: f64,
    /// Pixel width of the image
    pub width: u32,
    /// Pixel height of the image
    pub height: u32,
    /// Where the PNG was written
    pub path: PathBuf,
}

/// Why traversal stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The bottom stopped growing for the configured number of rounds
    Stable,
    /// The hard round ceiling was hit
    MaxRounds,
}

/// Ordered tiles covering the container's final extent
#[derive(Debug, Clone, PartialEq)]
pub struct TileSequence {
    /// Tiles in capture order, one per distinct scroll offset
    pub tiles: Vec<Tile>,
    /// Traversal rounds performed
    pub rounds: u32,
    /// scrollHeight at the last measurement
    pub final_scroll_height: f64,
    /// Why traversal ended
    pub stop: StopReason,
}

impl TileSequence {
    /// Number of tiles
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether no tile was captured
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Positioning,
    Stabilizing,
    Capturing,
    BottomCheck,
    Advance,
    Done(StopReason),
}

/// Tile Capture state machine settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileCapture {
    overlap: u32,
    min_step: u32,
    growth_threshold: f64,
    stable_rounds_to_stop: u32,
    max_rounds: u32,
    settle_ms: u64,
    at_bottom_ms: u64,
    network_quiet_ms: u64,
}

impl Default for TileCapture {
    fn default() -> Self {
        Self::new(&TileConfig::default(), &TimingConfig::default())
    }
}

impl TileCapture {
    /// Build from the tile and timing sections
    pub fn new(tiles: &TileConfig, timing: &TimingConfig) -> Self {
        Self {
            overlap: tiles.overlap,
            min_step: tiles.min_step,
            growth_threshold: tiles.growth_threshold,
            stable_rounds_to_stop: tiles.stable_rounds_to_stop.max(1),
            max_rounds: tiles.max_tiles.max(1),
            settle_ms: timing.tile_settle_ms,
            at_bottom_ms: timing.at_bottom_ms,
            network_quiet_ms: timing.network_quiet_ms,
        }
    }

    /// Build from a full configuration
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(&config.tiles, &config.timing)
    }

    /// Scroll step for a given client height: `max(min_step, client_height - overlap)`
    pub fn step_for(&self, client_height: f64) -> f64 {
        (client_height - f64::from(self.overlap)).max(f64::from(self.min_step))
    }

    /// Whether a bottom re-measurement counts as growth
    pub fn grew(&self, before: f64, after: f64) -> bool {
        after > before + self.growth_threshold
    }

    /// Traverse `container`, writing tiles into `tile_dir`
    #[instrument(skip(self, renderer))]
    pub async fn run<R: Renderer>(
        &self,
        renderer: &mut R,
        container: &ScrollContainer,
        tile_dir: &Path,
    ) -> Result<TileSequence> {
        output::ensure_dir(tile_dir).await?;

        let mut tiles: Vec<Tile> = Vec::new();
        let mut phase = Phase::Positioning;
        let mut y = 0.0_f64;
        let mut stable = 0u32;
        let mut rounds = 0u32;
        let mut metrics = ScrollMetrics::default();

        let stop = loop {
            phase = match phase {
                Phase::Positioning => {
                    metrics = renderer.scroll_metrics(container).await?;
                    y = y.min(metrics.max_scroll_top());
                    renderer.scroll_to(container, y).await?;
                    Phase::Stabilizing
                }
                Phase::Stabilizing => {
                    renderer.wait_settle(self.settle_ms).await;
                    if !renderer.wait_network_quiet(self.network_quiet_ms).await {
                        debug!("Network not quiet at y={}", y);
                    }
                    Phase::Capturing
                }
                Phase::Capturing => {
                    let bytes = renderer.capture_viewport().await?;
                    let tile = self.store_tile(&tiles, &bytes, y, &metrics, tile_dir).await?;
                    match tiles.last_mut() {
                        Some(last) if last.index == tile.index => *last = tile,
                        _ => tiles.push(tile),
                    }
                    if y >= metrics.max_scroll_top() {
                        Phase::BottomCheck
                    } else {
                        Phase::Advance
                    }
                }
                Phase::BottomCheck => {
                    renderer.wait_settle(self.at_bottom_ms).await;
                    let after = renderer.scroll_metrics(container).await?;
                    if self.grew(metrics.scroll_height, after.scroll_height) {
                        debug!(
                            "Container grew {} -> {}, continuing",
                            metrics.scroll_height, after.scroll_height
                        );
                        stable = 0;
                    } else {
                        stable += 1;
                        debug!("Bottom stable round {}/{}", stable, self.stable_rounds_to_stop);
                    }
                    metrics = after;
                    self.end_round(&mut rounds, stable)
                }
                Phase::Advance => {
                    y += self.step_for(metrics.client_height);
                    self.end_round(&mut rounds, stable)
                }
                Phase::Done(reason) => break reason,
            };
        };

        if stop == StopReason::MaxRounds {
            warn!("Stopped after {} rounds without the bottom stabilizing", rounds);
        }
        info!(
            "Captured {} tiles in {} rounds (scrollHeight {})",
            tiles.len(),
            rounds,
            metrics.scroll_height
        );

        Ok(TileSequence {
            tiles,
            rounds,
            final_scroll_height: metrics.scroll_height,
            stop,
        })
    }

    fn end_round(&self, rounds: &mut u32, stable: u32) -> Phase {
        *rounds += 1;
        if stable >= self.stable_rounds_to_stop {
            Phase::Done(StopReason::Stable)
        } else if *rounds >= self.max_rounds {
            Phase::Done(StopReason::MaxRounds)
        } else {
            Phase::Positioning
        }
    }

    /// Write a tile. A capture at the same offset as the previous tile
    /// reuses its index and file, so held bottom positions never duplicate rows.
    async fn store_tile(
        &self,
        tiles: &[Tile],
        bytes: &[u8],
        y: f64,
        metrics: &ScrollMetrics,
        tile_dir: &Path,
    ) -> Result<Tile> {
        let index = match tiles.last() {
            Some(last) if last.scroll_top == y => last.index,
            Some(last) => last.index + 1,
            None => 0,
        };
        let (width, height) = png_dimensions(bytes)?;
        let path = tile_dir.join(output::tile_file_name(index));
        output::write_file(&path, bytes).await?;
        Ok(Tile {
            index,
            scroll_top: y,
            client_height: metrics.client_height,
            width,
            height,
            path,
        })
    }
}

/// Pixel dimensions of an encoded image without decoding it fully
pub fn png_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CaptureError::InvalidData(e.to_string()))?;
    Ok(reader.into_dimensions()?)
}
