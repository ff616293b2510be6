//! Capture configuration
//!
//! All knobs are numeric and overridable. Every section deserializes with
//! `#[serde(default)]`, so a JSON file only needs the values it changes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete configuration for a capture run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Base viewport
    pub viewport: ViewportConfig,
    /// Row Clustering Paginator settings
    pub grid: GridConfig,
    /// Tile Capture & Stitcher settings
    pub tiles: TileConfig,
    /// Stabilization waits
    pub timing: TimingConfig,
}

/// Base viewport the browser is launched with and restored to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Width in CSS pixels (default: 1440)
    pub width: u32,
    /// Height in CSS pixels (default: 3200)
    pub height: u32,
    /// Device pixel ratio (default: 2)
    pub device_scale_factor: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 3200,
            device_scale_factor: 2.0,
        }
    }
}

/// Row Clustering Paginator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// CSS selector matching one catalog item
    pub item_selector: String,
    /// Maximum rows per segment (default: 5)
    pub max_rows_per_segment: usize,
    /// Vertical tolerance for row clustering, in px (default: 6)
    pub row_tolerance: f64,
    /// Padding added on every side of a segment's bounding box (default: 10)
    pub segment_padding: f64,
    /// Distance kept between the viewport top and the segment top after aligning (default: 8)
    pub align_offset: f64,
    /// Margin below which a segment is considered to overflow the viewport (default: 6)
    pub overflow_check_margin: f64,
    /// Extra height added beyond the segment bottom when growing the viewport (default: 60)
    pub overflow_growth_margin: f64,
    /// Hard cap on viewport growth (default: 9000)
    pub viewport_height_cap: u32,
    /// Rounds spent materializing a missing item (default: 40)
    pub ensure_rounds: u32,
    /// Maximum scroll rounds for the best-effort full load (default: 260)
    pub max_scroll_rounds: u32,
    /// Unchanged item-count rounds that end the full load (default: 7)
    pub stable_rounds_to_stop: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            item_selector: ".product-item".to_string(),
            max_rows_per_segment: 5,
            row_tolerance: 6.0,
            segment_padding: 10.0,
            align_offset: 8.0,
            overflow_check_margin: 6.0,
            overflow_growth_margin: 60.0,
            viewport_height_cap: 9000,
            ensure_rounds: 40,
            max_scroll_rounds: 260,
            stable_rounds_to_stop: 7,
        }
    }
}

/// Tile Capture & Stitcher settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    /// Overlap between consecutive tiles in CSS pixels (default: 160)
    pub overlap: u32,
    /// Smallest scroll step (default: 120)
    pub min_step: u32,
    /// scrollHeight growth that counts as "still loading" (default: 80)
    pub growth_threshold: f64,
    /// Consecutive non-growing bottom rounds that end traversal (default: 5)
    pub stable_rounds_to_stop: u32,
    /// Hard ceiling on traversal rounds (default: 1500)
    pub max_tiles: u32,
    /// Viewport height used for tile traversal (default: 900)
    pub viewport_height: u32,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            overlap: 160,
            min_step: 120,
            growth_threshold: 80.0,
            stable_rounds_to_stop: 5,
            max_tiles: 1500,
            viewport_height: 900,
        }
    }
}

/// Stabilization waits, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// After the initial navigation (default: 5000)
    pub after_goto_ms: u64,
    /// After every scroll-to-bottom while loading items (default: 1600)
    pub after_scroll_ms: u64,
    /// After positioning a tile (default: 1300)
    pub tile_settle_ms: u64,
    /// At the bottom, before re-measuring growth (default: 3500)
    pub at_bottom_ms: u64,
    /// Network quiescence budget (default: 3000)
    pub network_quiet_ms: u64,
    /// After aligning a segment or item into view (default: 700)
    pub align_settle_ms: u64,
    /// After growing the viewport (default: 300)
    pub resize_settle_ms: u64,
    /// After restoring the base viewport (default: 150)
    pub restore_settle_ms: u64,
    /// After switching unit (default: 2500)
    pub after_switch_ms: u64,
    /// After scrolling back to the top once loading finished (default: 800)
    pub after_load_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            after_goto_ms: 5000,
            after_scroll_ms: 1600,
            tile_settle_ms: 1300,
            at_bottom_ms: 3500,
            network_quiet_ms: 3000,
            align_settle_ms: 700,
            resize_settle_ms: 300,
            restore_settle_ms: 150,
            after_switch_ms: 2500,
            after_load_ms: 800,
        }
    }
}

impl CaptureConfig {
    /// Create a new config builder
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder::default()
    }

    /// Load a config from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: CaptureConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engine loop forever or divide by zero
    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::config("viewport dimensions must be non-zero"));
        }
        if !(self.viewport.device_scale_factor > 0.0) {
            return Err(Error::config("device scale factor must be positive"));
        }
        if self.grid.max_rows_per_segment == 0 {
            return Err(Error::config("max_rows_per_segment must be at least 1"));
        }
        if self.grid.item_selector.trim().is_empty() {
            return Err(Error::config("item selector cannot be empty"));
        }
        if self.grid.viewport_height_cap < self.viewport.height {
            return Err(Error::config(format!(
                "viewport_height_cap {} is below the base height {}",
                self.grid.viewport_height_cap, self.viewport.height
            )));
        }
        if self.tiles.viewport_height == 0 || self.tiles.overlap >= self.tiles.viewport_height {
            return Err(Error::config(format!(
                "tile overlap {} must be smaller than the tile viewport height {}",
                self.tiles.overlap, self.tiles.viewport_height
            )));
        }
        if self.tiles.min_step == 0 {
            return Err(Error::config("min_step must be at least 1"));
        }
        Ok(())
    }
}

/// Builder for CaptureConfig
#[derive(Default)]
pub struct CaptureConfigBuilder {
    config: CaptureConfig,
}

impl CaptureConfigBuilder {
    /// Set base viewport dimensions
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport.width = width;
        self.config.viewport.height = height;
        self
    }

    /// Set device pixel ratio
    pub fn device_scale_factor(mut self, dpr: f64) -> Self {
        self.config.viewport.device_scale_factor = dpr;
        self
    }

    /// Set the item selector
    pub fn item_selector<S: Into<String>>(mut self, selector: S) -> Self {
        self.config.grid.item_selector = selector.into();
        self
    }

    /// Set rows per segment
    pub fn max_rows_per_segment(mut self, rows: usize) -> Self {
        self.config.grid.max_rows_per_segment = rows;
        self
    }

    /// Set the row clustering tolerance
    pub fn row_tolerance(mut self, tolerance: f64) -> Self {
        self.config.grid.row_tolerance = tolerance;
        self
    }

    /// Set the viewport growth cap
    pub fn viewport_height_cap(mut self, cap: u32) -> Self {
        self.config.grid.viewport_height_cap = cap;
        self
    }

    /// Set tile overlap
    pub fn overlap(mut self, overlap: u32) -> Self {
        self.config.tiles.overlap = overlap;
        self
    }

    /// Set the tile growth threshold
    pub fn growth_threshold(mut self, threshold: f64) -> Self {
        self.config.tiles.growth_threshold = threshold;
        self
    }

    /// Set stable rounds for tile traversal
    pub fn tile_stable_rounds(mut self, rounds: u32) -> Self {
        self.config.tiles.stable_rounds_to_stop = rounds;
        self
    }

    /// Set the tile round ceiling
    pub fn max_tiles(mut self, max: u32) -> Self {
        self.config.tiles.max_tiles = max;
        self
    }

    /// Replace all waits
    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.config.timing = timing;
        self
    }

    /// Build the config
    pub fn build(self) -> CaptureConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_config_default() {
        let config = CaptureConfig::default();
        assert_eq!(config.viewport.width, 1440);
        assert_eq!(config.viewport.height, 3200);
        assert_eq!(config.viewport.device_scale_factor, 2.0);
        assert_eq!(config.grid.max_rows_per_segment, 5);
        assert_eq!(config.grid.row_tolerance, 6.0);
        assert_eq!(config.grid.viewport_height_cap, 9000);
        assert_eq!(config.grid.ensure_rounds, 40);
        assert_eq!(config.grid.max_scroll_rounds, 260);
        assert_eq!(config.tiles.overlap, 160);
        assert_eq!(config.tiles.max_tiles, 1500);
        assert_eq!(config.timing.after_scroll_ms, 1600);
        assert_eq!(config.timing.at_bottom_ms, 3500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capture_config_builder() {
        let config = CaptureConfig::builder()
            .viewport(1280, 2400)
            .device_scale_factor(1.0)
            .item_selector(".card")
            .max_rows_per_segment(3)
            .overlap(100)
            .build();

        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.viewport.height, 2400);
        assert_eq!(config.grid.item_selector, ".card");
        assert_eq!(config.grid.max_rows_per_segment, 3);
        assert_eq!(config.tiles.overlap, 100);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "grid": { "max_rows_per_segment": 4 }, "tiles": { "overlap": 200 } }"#;
        let config: CaptureConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.grid.max_rows_per_segment, 4);
        assert_eq!(config.grid.row_tolerance, 6.0);
        assert_eq!(config.tiles.overlap, 200);
        assert_eq!(config.tiles.min_step, 120);
        assert_eq!(config.viewport, ViewportConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_rows = CaptureConfig::builder().max_rows_per_segment(0).build();
        assert!(zero_rows.validate().is_err());

        let low_cap = CaptureConfig::builder().viewport_height_cap(1000).build();
        assert!(low_cap.validate().is_err());

        let huge_overlap = CaptureConfig::builder().overlap(900).build();
        assert!(huge_overlap.validate().is_err());

        let no_dpr = CaptureConfig::builder().device_scale_factor(0.0).build();
        assert!(no_dpr.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");
        std::fs::write(&path, r#"{ "viewport": { "width": 1024 } }"#).unwrap();

        let config = CaptureConfig::from_json_file(&path).unwrap();
        assert_eq!(config.viewport.width, 1024);
        assert_eq!(config.viewport.height, 3200);
    }
}
