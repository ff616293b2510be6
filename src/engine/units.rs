//! Capture units
//!
//! A run may cover several independent units (typically one locale or
//! country each). A [`Navigator`] switches the page to a unit; the runner
//! then loads and paginates it into its own subdirectory. Unit-local
//! failures are logged, a diagnostic snapshot is written, and the run moves
//! on. The session is explicitly reset between units so no viewport or
//! scroll state leaks from one to the next.

use super::loader::ItemLoader;
use super::paginator::{PaginationReport, RowPaginator};
use super::renderer::{Renderer, ScrollContainer, ViewportSize};
use crate::config::CaptureConfig;
use crate::error::{Error, NavigationError, Result, SegmentError};
use crate::output::{self, RunKind, RunManifest};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

/// Result of switching to a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitStatus {
    /// The switch succeeded
    pub ok: bool,
    /// The unit has no items to capture
    pub empty: bool,
}

impl UnitStatus {
    /// Switched, with items
    pub fn ready() -> Self {
        Self {
            ok: true,
            empty: false,
        }
    }

    /// Switched, nothing to capture
    pub fn empty() -> Self {
        Self {
            ok: true,
            empty: true,
        }
    }
}

/// Switches the page between capture units
#[allow(async_fn_in_trait)]
pub trait Navigator<R: Renderer> {
    /// Make `key` the active unit
    async fn switch_unit(&mut self, renderer: &mut R, key: &str) -> Result<UnitStatus>;

    /// Called after a successful switch, before loading and capturing
    async fn before_capture(&mut self, _renderer: &mut R, _key: &str) -> Result<()> {
        Ok(())
    }

    /// Called after capturing, whether or not it succeeded
    async fn after_capture(&mut self, _renderer: &mut R, _key: &str) -> Result<()> {
        Ok(())
    }
}

/// What happened to one unit
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    /// Images were written
    Captured {
        /// Unit key
        key: String,
        /// Output directory
        dir: PathBuf,
        /// Pagination details
        report: PaginationReport,
    },
    /// The unit had nothing to capture
    Skipped {
        /// Unit key
        key: String,
    },
    /// The unit failed; the run went on
    Failed {
        /// Unit key
        key: String,
        /// Error message
        error: String,
        /// Diagnostic snapshot, if one could be written
        snapshot: Option<PathBuf>,
    },
}

impl UnitOutcome {
    /// Unit key
    pub fn key(&self) -> &str {
        match self {
            UnitOutcome::Captured { key, .. }
            | UnitOutcome::Skipped { key }
            | UnitOutcome::Failed { key, .. } => key,
        }
    }

    /// Whether the unit failed
    pub fn is_failed(&self) -> bool {
        matches!(self, UnitOutcome::Failed { .. })
    }
}

/// Load all items, paginate them into `out_dir` and write the manifest
#[instrument(skip(renderer, config))]
pub async fn capture_grid<R: Renderer>(
    renderer: &mut R,
    config: &CaptureConfig,
    out_dir: &Path,
    unit: Option<&str>,
) -> Result<PaginationReport> {
    let loader = ItemLoader::from_config(config);
    let paginator = RowPaginator::from_config(config);

    loader.load_all_items(renderer).await?;
    let report = paginator.run(renderer, out_dir).await?;

    let mut manifest = RunManifest::new(RunKind::Grid);
    if let Some(unit) = unit {
        manifest = manifest.with_unit(unit);
    }
    manifest.shots = report.shots.clone();
    manifest.incomplete = report.incomplete.clone();
    manifest.finish(out_dir).await?;
    Ok(report)
}

/// Runs the paginator once per unit key
#[derive(Debug, Clone)]
pub struct UnitRunner {
    config: CaptureConfig,
    root: PathBuf,
}

impl UnitRunner {
    /// Runner writing into `root/<key>/`
    pub fn new(config: CaptureConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            root: root.into(),
        }
    }

    /// Run root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Capture every unit in order. Unit-local failures are recorded and
    /// skipped; geometry failures abort the run.
    pub async fn run<R, N>(
        &self,
        renderer: &mut R,
        navigator: &mut N,
        keys: &[String],
    ) -> Result<Vec<UnitOutcome>>
    where
        R: Renderer,
        N: Navigator<R>,
    {
        output::ensure_dir(&self.root).await?;
        let mut outcomes = Vec::with_capacity(keys.len());

        for key in keys {
            info!("=== Unit {} ===", key);
            let outcome = match self.run_unit(renderer, navigator, key).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_unit_local() => {
                    error!("[{}] failed: {}", key, e);
                    let snapshot = self.write_failure_snapshot(renderer, key).await;
                    self.reset_session(renderer).await;
                    UnitOutcome::Failed {
                        key: key.clone(),
                        error: e.to_string(),
                        snapshot,
                    }
                }
                Err(e) => return Err(e),
            };
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        info!(
            "Finished {} units ({} failed) under {}",
            outcomes.len(),
            failed,
            self.root.display()
        );
        Ok(outcomes)
    }

    async fn run_unit<R, N>(
        &self,
        renderer: &mut R,
        navigator: &mut N,
        key: &str,
    ) -> Result<UnitOutcome>
    where
        R: Renderer,
        N: Navigator<R>,
    {
        let status = navigator.switch_unit(renderer, key).await?;
        if !status.ok {
            return Err(NavigationError::SwitchFailed {
                key: key.to_string(),
                reason: "navigator reported failure".to_string(),
            }
            .into());
        }

        let count = renderer.item_count(&self.config.grid.item_selector).await?;
        if status.empty || count == 0 {
            info!("[{}] no items, skipping", key);
            return Ok(UnitOutcome::Skipped {
                key: key.to_string(),
            });
        }

        let dir = output::unit_dir(&self.root, key);
        navigator.before_capture(renderer, key).await?;
        let result = capture_grid(renderer, &self.config, &dir, Some(key)).await;
        if let Err(e) = navigator.after_capture(renderer, key).await {
            warn!("[{}] cleanup after capture failed: {}", key, e);
        }
        self.reset_session(renderer).await;

        match result {
            Ok(report) => Ok(UnitOutcome::Captured {
                key: key.to_string(),
                dir,
                report,
            }),
            Err(Error::Segment(SegmentError::NoItemsFound { .. })) => {
                info!("[{}] no items after loading, skipping", key);
                Ok(UnitOutcome::Skipped {
                    key: key.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Restore base viewport and scroll position
    async fn reset_session<R: Renderer>(&self, renderer: &mut R) {
        let base = ViewportSize::new(self.config.viewport.width, self.config.viewport.height);
        if let Err(e) = renderer.set_viewport_size(base).await {
            warn!("Failed to restore viewport: {}", e);
        }
        if let Err(e) = renderer.scroll_to(&ScrollContainer::Document, 0.0).await {
            warn!("Failed to reset scroll: {}", e);
        }
        renderer
            .wait_settle(self.config.timing.restore_settle_ms)
            .await;
    }

    async fn write_failure_snapshot<R: Renderer>(
        &self,
        renderer: &mut R,
        key: &str,
    ) -> Option<PathBuf> {
        let path = output::error_snapshot_path(&self.root, key);
        let bytes = match renderer.capture_diagnostic().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("[{}] diagnostic snapshot failed: {}", key, e);
                return None;
            }
        };
        match output::write_file(&path, &bytes).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("[{}] could not write {}: {}", key, path.display(), e);
                None
            }
        }
    }
}
