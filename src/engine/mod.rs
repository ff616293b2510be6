//! Capture Segmentation Engine
//!
//! Geometry-driven capture of long, lazily-loaded pages. The engine decides
//! what region of a live layout to capture next and how to assemble pixels,
//! talking to the page only through the [`Renderer`] capability trait.

pub mod geometry;
pub mod loader;
pub mod overflow;
pub mod paginator;
pub mod renderer;
pub mod stitch;
pub mod tiles;
pub mod units;

pub use geometry::{
    cluster_rows, compute_segment, GeometrySnapshot, ItemRect, Rect, Row, Segment, SegmentParams,
};
pub use loader::{ItemLoader, LoadReport};
pub use overflow::{OverflowOutcome, OverflowResolver};
pub use paginator::{CaptureCursor, PaginationReport, RowPaginator};
pub use renderer::{ClipRect, Renderer, ScrollContainer, ScrollMetrics, ViewportSize};
pub use stitch::{capture_stitched, DecodedTile, SeamMode, StitchedCapture, Stitcher};
pub use tiles::{StopReason, Tile, TileCapture, TileSequence};
pub use units::{capture_grid, Navigator, UnitOutcome, UnitRunner, UnitStatus};
