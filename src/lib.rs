//! Gridshot - Geometry-Driven Capture of Long Catalog Pages
//!
//! This crate turns an unbounded, lazily-loaded product grid into a bounded
//! sequence of images, each holding whole rows of items, or into one tall
//! image stitched from overlapping viewport tiles.
//!
//! # Features
//!
//! - **Row Pagination**: clusters item rectangles into visual rows and
//!   captures at most N whole rows per image, never splitting a row
//! - **Overflow Handling**: grows the viewport (up to a cap) when a segment
//!   is taller than what the viewport can show
//! - **Tile Capture**: scrolls a container top to bottom with overlap, waiting
//!   out infinite-scroll growth, and stitches the tiles seamlessly
//! - **Multi-Unit Runs**: captures one subdirectory per locale, isolating
//!   failures to the unit that caused them
//!
//! # Architecture
//!
//! ```text
//! CLI ──▶ Browser Controller (CDP) ──▶ CdpRenderer ──┐
//!                                                    ▼
//!            ┌──────────────────── engine ─────────────────────┐
//!            │ loader ─▶ paginator ─▶ geometry ─▶ overflow      │
//!            │ tiles ─▶ stitch            units (Navigator)     │
//!            └───────────────────────┬─────────────────────────┘
//!                                    ▼
//!                    page_NNN.png / stitched PNG + manifest.json
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gridshot::browser::{BrowserController, CdpRenderer, PageNavigator};
//! use gridshot::engine::{capture_grid, ViewportSize};
//! use gridshot::CaptureConfig;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CaptureConfig::default();
//!     let controller = BrowserController::new().await?;
//!     let page = controller.new_page().await?;
//!     PageNavigator::goto(&page, "https://shop.example.com/#/list", None).await?;
//!
//!     let viewport = ViewportSize::new(config.viewport.width, config.viewport.height);
//!     let mut renderer =
//!         CdpRenderer::attach(page, viewport, config.viewport.device_scale_factor).await?;
//!     let report = capture_grid(&mut renderer, &config, Path::new("grid"), None).await?;
//!
//!     println!("Wrote {} images", report.shots.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod browser;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;

// Re-exports for convenience
pub use browser::{BrowserController, CdpRenderer};
pub use config::CaptureConfig;
pub use engine::{Renderer, RowPaginator, TileCapture, UnitRunner};
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
