//! Error types for gridshot
//!
//! This module provides the error hierarchy using `thiserror`. Failures that
//! are local to one segment or one capture unit are kept apart from failures
//! in the geometry and stitching math, which must always be surfaced.

use thiserror::Error;

/// The main error type for gridshot operations
#[derive(Error, Debug)]
pub enum Error {
    /// Browser-related errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// Capture errors (screenshots, pixel buffers)
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Segmentation engine errors
    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),

    /// Malformed geometry
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image decode/encode errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Browser lifecycle and control errors
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Browser configuration error
    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    /// Failed to create new page/tab
    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    /// Script evaluation failed or returned an unexpected shape
    #[error("Script evaluation failed: {0}")]
    ScriptFailed(String),
}

/// Navigation errors
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation timeout
    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),

    /// Page load failed
    #[error("Page load failed: {0}")]
    LoadFailed(String),

    /// Switching to a capture unit (e.g. a locale) failed
    #[error("Switch to unit {key} failed: {reason}")]
    SwitchFailed {
        /// Unit key
        key: String,
        /// Why the switch failed
        reason: String,
    },
}

/// Capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Screenshot failed
    #[error("Screenshot capture failed: {0}")]
    ScreenshotFailed(String),

    /// Viewport resize failed
    #[error("Viewport resize failed: {0}")]
    ResizeFailed(String),

    /// Captured bytes could not be decoded
    #[error("Invalid capture data: {0}")]
    InvalidData(String),
}

/// Segmentation engine errors
#[derive(Error, Debug)]
pub enum SegmentError {
    /// Selector yields zero items after materialization attempts
    #[error("No items found for selector {selector:?}")]
    NoItemsFound {
        /// The item selector
        selector: String,
    },

    /// An expected item index never appeared
    #[error("Item {index} not materialized after {rounds} rounds")]
    MaterializationTimeout {
        /// The awaited item index
        index: usize,
        /// Rounds attempted
        rounds: u32,
    },

    /// Segment still taller than the viewport after hitting the growth cap
    #[error("Segment needs {needed}px of viewport but growth is capped at {cap}px")]
    OverflowUnresolved {
        /// Viewport height the segment needs
        needed: u32,
        /// The hard growth cap
        cap: u32,
    },

    /// Stitch requested with zero tiles
    #[error("Cannot stitch an empty tile sequence")]
    EmptyTileSequence,
}

/// Malformed geometry reported by the renderer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// A coordinate is NaN or infinite
    #[error("Item {index} has non-finite coordinates")]
    NonFinite {
        /// Item index
        index: usize,
    },

    /// right < left or bottom < top
    #[error("Item {index} has an inverted rect")]
    Inverted {
        /// Item index
        index: usize,
    },

    /// Item indices are not strictly increasing
    #[error("Item index {index} is out of order (previous {previous})")]
    OutOfOrder {
        /// Offending index
        index: usize,
        /// Index before it
        previous: usize,
    },

    /// Clip or tile with no area
    #[error("Empty region: {0}")]
    EmptyRegion(String),
}

/// Result type alias for gridshot operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Create a config error from a string
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Whether a multi-unit run may log this error and move on to the next unit.
    ///
    /// Geometry and stitching math failures, and configuration problems, are
    /// never unit-local.
    pub fn is_unit_local(&self) -> bool {
        !matches!(
            self,
            Error::Geometry(_)
                | Error::Config(_)
                | Error::Segment(SegmentError::EmptyTileSequence)
        )
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}
