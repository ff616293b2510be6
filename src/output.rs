//! Output artifacts
//!
//! One directory per capture run, optionally one subdirectory per unit key.
//! Segment shots are `page_NNN.png` (1-based, zero-padded to 3), tiles are
//! `tile_NNNNN.png` (0-based, zero-padded to 5). Each directory gets a
//! `manifest.json` describing what was written.

use crate::engine::renderer::ClipRect;
use crate::error::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Manifest file name
pub const MANIFEST_FILE: &str = "manifest.json";

/// Directory under the run root that receives failure snapshots
pub const ERRORS_DIR: &str = "_errors";

/// File name of the `shot`-th segment image
pub fn shot_file_name(shot: u32) -> String {
    format!("page_{:03}.png", shot)
}

/// File name of the `index`-th tile
pub fn tile_file_name(index: usize) -> String {
    format!("tile_{:05}.png", index)
}

/// Replace characters that are invalid in file names on common platforms
pub fn sanitize_file_name(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let re = INVALID.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("static regex"));
    re.replace_all(name.trim(), "_").into_owned()
}

/// Subdirectory for one unit key
pub fn unit_dir(root: &Path, key: &str) -> PathBuf {
    root.join(sanitize_file_name(key))
}

/// Path of the diagnostic snapshot for a failed unit
pub fn error_snapshot_path(root: &Path, key: &str) -> PathBuf {
    root.join(ERRORS_DIR)
        .join(format!("{}_switch.png", sanitize_file_name(key)))
}

/// Create a directory and its parents
pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

/// Write bytes, creating the parent directory if needed
pub async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Remove stale `tile_*.png` files; returns how many were removed
pub async fn clear_tiles(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("tile_") && name.ends_with(".png") {
            // Best effort: a file we cannot delete is overwritten later anyway.
            if tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// One written segment image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotRecord {
    /// 1-based shot number
    pub shot: u32,
    /// File name relative to the output directory
    pub file: String,
    /// First item index the segment was computed from
    pub start: usize,
    /// One past the highest item index included
    pub next_start: usize,
    /// Rows in the segment
    pub rows: usize,
    /// Region that was captured
    pub clip: ClipRect,
    /// Whether the segment still exceeded the viewport after growth hit its cap
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub overflow_unresolved: bool,
}

/// Kind of capture run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Row-chunk images
    Grid,
    /// Stitched scrolling capture
    Tiles,
    /// Single full-page screenshot
    Shot,
}

/// Per-directory record of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// What produced this directory
    pub kind: RunKind,
    /// Page URL, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Unit key (e.g. locale), when captured by a multi-unit run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Segment images written
    #[serde(default)]
    pub shots: Vec<ShotRecord>,
    /// Tiles captured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiles: Option<usize>,
    /// Stitched image file name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stitched: Option<String>,
    /// Why the run stopped before covering every item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incomplete: Option<String>,
}

impl RunManifest {
    /// Start a manifest now
    pub fn new(kind: RunKind) -> Self {
        Self {
            kind,
            url: None,
            unit: None,
            started_at: Utc::now(),
            finished_at: None,
            shots: Vec::new(),
            tiles: None,
            stitched: None,
            incomplete: None,
        }
    }

    /// Set the page URL
    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the unit key
    pub fn with_unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Stamp the finish time and write `manifest.json` into `dir`
    pub async fn finish(mut self, dir: &Path) -> Result<PathBuf> {
        self.finished_at = Some(Utc::now());
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(&self)?;
        write_file(&path, &json).await?;
        Ok(path)
    }
}
