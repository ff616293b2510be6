//! Tile stitching
//!
//! Every tile but the first loses a top band before tiles are stacked with
//! no gaps and no horizontal offset. The band is the overlap that guaranteed
//! no content was skipped by a scroll step; it is removed exactly once.

use super::renderer::{Renderer, ScrollContainer, ViewportSize};
use super::tiles::{Tile, TileCapture, TileSequence};
use crate::config::CaptureConfig;
use crate::error::{Error, GeometryError, Result, SegmentError};
use crate::output::{self, RunKind, RunManifest};
use image::{imageops, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// How the band removed from each tile is sized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeamMode {
    /// `min(overlap × dpr, height − 1)` for every tile after the first
    #[default]
    FixedOverlap,
    /// The overlap actually shared with the previous tile, from the recorded
    /// scroll offsets. Exact when the last step was clamped at the bottom.
    ScrollOffsets,
}

/// A tile with its decoded pixels
#[derive(Debug, Clone)]
pub struct DecodedTile {
    /// Capture metadata
    pub meta: Tile,
    /// Pixels
    pub image: RgbaImage,
}

/// Assembles tiles into one image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stitcher {
    /// Overlap between tiles, CSS pixels
    pub overlap: u32,
    /// Device pixel ratio tiles were captured at
    pub device_pixel_ratio: f64,
    /// Seam sizing
    pub mode: SeamMode,
}

impl Stitcher {
    /// Fixed-overlap stitcher
    pub fn new(overlap: u32, device_pixel_ratio: f64) -> Self {
        Self {
            overlap,
            device_pixel_ratio,
            mode: SeamMode::FixedOverlap,
        }
    }

    /// Use a different seam mode
    pub fn with_mode(mut self, mode: SeamMode) -> Self {
        self.mode = mode;
        self
    }

    /// Rows cropped from the top of `tile`, given the tile before it
    pub fn crop_for(&self, previous: Option<&Tile>, tile: &Tile) -> u32 {
        let Some(previous) = previous else {
            return 0;
        };
        let logical = match self.mode {
            SeamMode::FixedOverlap => f64::from(self.overlap),
            SeamMode::ScrollOffsets => {
                (previous.scroll_top + previous.client_height - tile.scroll_top).max(0.0)
            }
        };
        let physical = (logical * self.device_pixel_ratio).floor() as u32;
        physical.min(tile.height.saturating_sub(1))
    }

    /// Height of the stitched image: first tile plus every later tile minus its crop
    pub fn stitched_height(&self, tiles: &[Tile]) -> u32 {
        tiles
            .iter()
            .enumerate()
            .map(|(i, tile)| {
                let previous = i.checked_sub(1).map(|p| &tiles[p]);
                tile.height - self.crop_for(previous, tile)
            })
            .sum()
    }

    /// Stack decoded tiles. Output width is the first tile's width.
    pub fn stitch(&self, tiles: &[DecodedTile]) -> Result<RgbaImage> {
        let first = tiles.first().ok_or(SegmentError::EmptyTileSequence)?;
        let width = first.image.width();
        if width == 0 {
            return Err(GeometryError::EmptyRegion("first tile has zero width".into()).into());
        }

        let metas: Vec<Tile> = tiles
            .iter()
            .map(|t| Tile {
                width: t.image.width(),
                height: t.image.height(),
                ..t.meta.clone()
            })
            .collect();
        let height = self.stitched_height(&metas);
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        let mut top = 0i64;
        for (i, tile) in tiles.iter().enumerate() {
            let crop = self.crop_for(i.checked_sub(1).map(|p| &metas[p]), &metas[i]);
            let band = imageops::crop_imm(
                &tile.image,
                0,
                crop,
                tile.image.width().min(width),
                tile.image.height() - crop,
            )
            .to_image();
            imageops::replace(&mut canvas, &band, 0, top);
            debug!("Tile {} cropped {}px, placed at {}", tile.meta.index, crop, top);
            top += i64::from(band.height());
        }

        Ok(canvas)
    }

    /// Decode every tile of a sequence from disk and stitch them
    #[instrument(skip(self, sequence), fields(tiles = sequence.len()))]
    pub async fn stitch_sequence(&self, sequence: &TileSequence) -> Result<RgbaImage> {
        if sequence.is_empty() {
            return Err(SegmentError::EmptyTileSequence.into());
        }
        let mut decoded = Vec::with_capacity(sequence.len());
        for tile in &sequence.tiles {
            let bytes = tokio::fs::read(&tile.path).await?;
            let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.to_rgba8();
            decoded.push(DecodedTile {
                meta: tile.clone(),
                image,
            });
        }
        self.stitch(&decoded)
    }

    /// Stitch a sequence and write it as PNG
    pub async fn stitch_to_file(
        &self,
        sequence: &TileSequence,
        path: &Path,
    ) -> Result<(u32, u32)> {
        let image = self.stitch_sequence(sequence).await?;
        let dims = image.dimensions();
        if let Some(parent) = path.parent() {
            output::ensure_dir(parent).await?;
        }
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || image.save_with_format(&path, ImageFormat::Png))
            .await
            .map_err(|e| Error::generic(format!("encode task failed: {e}")))??;
        info!("Stitched {} tiles into {}x{}", sequence.len(), dims.0, dims.1);
        Ok(dims)
    }
}

/// Where a stitched capture went
#[derive(Debug, Clone, PartialEq)]
pub struct StitchedCapture {
    /// The stitched PNG
    pub path: PathBuf,
    /// Its pixel dimensions
    pub dimensions: (u32, u32),
    /// The retained tiles
    pub sequence: TileSequence,
}

/// Traverse `container` with the tile viewport, keep the tiles in
/// `tile_dir` and write the stitched image to `out_path`.
#[instrument(skip(renderer, config))]
pub async fn capture_stitched<R: Renderer>(
    renderer: &mut R,
    config: &CaptureConfig,
    container: &ScrollContainer,
    tile_dir: &Path,
    out_path: &Path,
    mode: SeamMode,
) -> Result<StitchedCapture> {
    let removed = output::clear_tiles(tile_dir).await?;
    if removed > 0 {
        debug!("Removed {} stale tiles from {}", removed, tile_dir.display());
    }

    let tile_viewport = ViewportSize::new(config.viewport.width, config.tiles.viewport_height);
    if renderer.viewport_size() != tile_viewport {
        renderer.set_viewport_size(tile_viewport).await?;
        renderer.wait_settle(config.timing.resize_settle_ms).await;
    }

    let sequence = TileCapture::from_config(config)
        .run(renderer, container, tile_dir)
        .await?;
    let stitcher =
        Stitcher::new(config.tiles.overlap, renderer.device_pixel_ratio()).with_mode(mode);
    let dimensions = stitcher.stitch_to_file(&sequence, out_path).await?;

    let mut manifest = RunManifest::new(RunKind::Tiles);
    manifest.tiles = Some(sequence.len());
    manifest.stitched = out_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    manifest.finish(tile_dir).await?;

    Ok(StitchedCapture {
        path: out_path.to_path_buf(),
        dimensions,
        sequence,
    })
}
