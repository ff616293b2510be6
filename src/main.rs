//! Gridshot CLI
//!
//! Captures long catalog pages as row-aligned image segments, per-locale
//! segment sets, stitched full-length images, or a plain full-page shot.

use anyhow::{bail, Context};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use gridshot::browser::{
    detect_scroll_container, BrowserConfig, BrowserController, CdpLocaleNavigator, CdpRenderer,
    FixedChrome, LocaleOptions, NavigationOptions, PageNavigator, StyleOverrides, WaitUntil,
};
use gridshot::engine::{
    capture_grid, capture_stitched, ScrollContainer, SeamMode, UnitOutcome, UnitRunner,
    ViewportSize,
};
use gridshot::output;
use gridshot::CaptureConfig;
use std::path::PathBuf;
use tracing::{info, warn};

/// Gridshot
#[derive(Parser, Debug)]
#[command(name = "gridshot")]
#[command(version)]
#[command(about = "Geometry-driven capture of long, lazily-loaded catalog pages")]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file; flags below override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to Chrome/Chromium executable
    #[arg(long, global = true)]
    chrome_path: Option<String>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    /// Disable the Chrome sandbox (containers, CI)
    #[arg(long, global = true)]
    no_sandbox: bool,

    /// Viewport width
    #[arg(long, env = "WIDTH", global = true)]
    width: Option<u32>,

    /// Device pixel ratio
    #[arg(long, env = "DPR", global = true)]
    dpr: Option<f64>,

    /// Render time after navigation, ms
    #[arg(long, env = "WAIT_AFTER_GOTO_MS", global = true)]
    wait_after_goto_ms: Option<u64>,

    /// Page readiness condition after navigation
    #[arg(
        long,
        env = "WAIT_UNTIL",
        value_enum,
        default_value_t = ReadyState::Domcontentloaded,
        global = true
    )]
    wait_until: ReadyState,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ReadyState {
    Load,
    Domcontentloaded,
    Networkidle,
}

impl From<ReadyState> for WaitUntil {
    fn from(state: ReadyState) -> Self {
        match state {
            ReadyState::Load => WaitUntil::Load,
            ReadyState::Domcontentloaded => WaitUntil::DomContentLoaded,
            ReadyState::Networkidle => WaitUntil::NetworkIdle,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a catalog grid as images of whole rows
    Grid(GridArgs),
    /// Capture the grid once per locale, one subdirectory each
    Units(UnitsArgs),
    /// Scroll a container top to bottom in overlapping tiles and stitch them
    Tiles(TilesArgs),
    /// Plain full-page screenshot
    Shot(ShotArgs),
}

#[derive(ClapArgs, Debug)]
struct GridArgs {
    /// Page URL
    url: String,

    /// Output directory
    #[arg(default_value = "grid_pages")]
    out: PathBuf,

    /// Base viewport height
    #[arg(long, env = "HEIGHT")]
    height: Option<u32>,

    /// CSS selector of one catalog item
    #[arg(long)]
    item_selector: Option<String>,

    /// Maximum rows per image
    #[arg(long)]
    rows: Option<usize>,

    /// Force the item list into this many columns
    #[arg(long)]
    columns: Option<u32>,

    /// CSS selector of the item list, for --columns
    #[arg(long, default_value = ".product-list")]
    list_selector: String,

    /// Wait after each scroll-to-bottom, ms
    #[arg(long, env = "WAIT_AFTER_SCROLL_MS")]
    wait_after_scroll_ms: Option<u64>,

    /// Unchanged-count rounds that end loading
    #[arg(long, env = "STABLE_ROUNDS_TO_STOP")]
    stable_rounds: Option<u32>,

    /// Maximum scroll rounds while loading
    #[arg(long, env = "MAX_SCROLL_ROUNDS")]
    max_scroll_rounds: Option<u32>,

    /// Rounds spent materializing a missing item
    #[arg(long, env = "ENSURE_ROUNDS")]
    ensure_rounds: Option<u32>,

    /// Leave fixed/sticky headers and footers visible
    #[arg(long)]
    keep_fixed: bool,
}

#[derive(ClapArgs, Debug)]
struct UnitsArgs {
    #[command(flatten)]
    grid: GridArgs,

    /// Locale codes to capture, comma separated (default: all)
    #[arg(long, env = "COUNTRIES", value_delimiter = ',')]
    countries: Vec<String>,

    /// Attempts per locale switch
    #[arg(long, env = "SWITCH_RETRIES", default_value_t = 3)]
    switch_retries: u32,

    /// Wait for the first item after a switch, ms
    #[arg(long, env = "ITEM_VISIBLE_TIMEOUT_MS", default_value_t = 120_000)]
    item_visible_timeout_ms: u64,

    /// Settle time after a switch, ms
    #[arg(long, env = "WAIT_AFTER_SWITCH_MS")]
    wait_after_switch_ms: Option<u64>,
}

#[derive(ClapArgs, Debug)]
struct TilesArgs {
    /// Page URL
    url: String,

    /// Stitched output file
    #[arg(default_value = "fullpage_stitched.png")]
    out: String,

    /// Tile viewport height
    #[arg(long, env = "HEIGHT")]
    height: Option<u32>,

    /// Overlap between tiles, CSS px
    #[arg(long, env = "OVERLAP")]
    overlap: Option<u32>,

    /// Settle time after each scroll, ms
    #[arg(long, env = "WAIT_AFTER_SCROLL_MS")]
    wait_after_scroll_ms: Option<u64>,

    /// Wait at the bottom before re-measuring, ms
    #[arg(long, env = "WAIT_AT_BOTTOM_MS")]
    wait_at_bottom_ms: Option<u64>,

    /// Non-growing bottom rounds that end traversal
    #[arg(long, env = "STABLE_ROUNDS_TO_STOP")]
    stable_rounds: Option<u32>,

    /// Hard ceiling on traversal rounds
    #[arg(long, env = "MAX_TILES")]
    max_tiles: Option<u32>,

    /// Scroll this element instead of detecting the scroll container
    #[arg(long)]
    container: Option<String>,

    /// Directory for the retained tiles
    #[arg(long, default_value = "tiles")]
    tile_dir: PathBuf,

    /// Leave fixed/sticky headers and footers visible
    #[arg(long, env = "KEEP_FIXED")]
    keep_fixed: bool,

    /// Crop seams by recorded scroll offsets instead of the fixed overlap
    #[arg(long)]
    exact_seams: bool,
}

#[derive(ClapArgs, Debug)]
struct ShotArgs {
    /// Page URL
    url: String,

    /// Output file
    #[arg(default_value = "fullpage.png")]
    out: String,

    /// Viewport height
    #[arg(long, default_value_t = 900)]
    height: u32,

    /// Render time after navigation, ms
    #[arg(long, default_value_t = 3000)]
    settle_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if args.verbose {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &args.config {
        Some(path) => CaptureConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CaptureConfig::default(),
    };
    if let Some(width) = args.width {
        config.viewport.width = width;
    }
    if let Some(dpr) = args.dpr {
        config.viewport.device_scale_factor = dpr;
    }
    if let Some(ms) = args.wait_after_goto_ms {
        config.timing.after_goto_ms = ms;
    }

    match &args.command {
        Command::Grid(grid) => {
            apply_grid_args(&mut config, grid);
            config.validate()?;
            run_grid(&args, &config, grid).await
        }
        Command::Units(units) => {
            apply_grid_args(&mut config, &units.grid);
            if let Some(ms) = units.wait_after_switch_ms {
                config.timing.after_switch_ms = ms;
            }
            config.validate()?;
            run_units(&args, &config, units).await
        }
        Command::Tiles(tiles) => {
            apply_tile_args(&mut config, tiles);
            config.validate()?;
            run_tiles(&args, &config, tiles).await
        }
        Command::Shot(shot) => run_shot(&args, &config, shot).await,
    }
}

fn apply_grid_args(config: &mut CaptureConfig, grid: &GridArgs) {
    if let Some(height) = grid.height {
        config.viewport.height = height;
    }
    if let Some(selector) = &grid.item_selector {
        config.grid.item_selector = selector.clone();
    }
    if let Some(rows) = grid.rows {
        config.grid.max_rows_per_segment = rows;
    }
    if let Some(ms) = grid.wait_after_scroll_ms {
        config.timing.after_scroll_ms = ms;
    }
    if let Some(rounds) = grid.stable_rounds {
        config.grid.stable_rounds_to_stop = rounds;
    }
    if let Some(rounds) = grid.max_scroll_rounds {
        config.grid.max_scroll_rounds = rounds;
    }
    if let Some(rounds) = grid.ensure_rounds {
        config.grid.ensure_rounds = rounds;
    }
}

fn apply_tile_args(config: &mut CaptureConfig, tiles: &TilesArgs) {
    if let Some(height) = tiles.height {
        config.tiles.viewport_height = height;
    }
    if let Some(overlap) = tiles.overlap {
        config.tiles.overlap = overlap;
    }
    if let Some(ms) = tiles.wait_after_scroll_ms {
        config.timing.tile_settle_ms = ms;
    }
    if let Some(ms) = tiles.wait_at_bottom_ms {
        config.timing.at_bottom_ms = ms;
    }
    if let Some(rounds) = tiles.stable_rounds {
        config.tiles.stable_rounds_to_stop = rounds;
    }
    if let Some(max) = tiles.max_tiles {
        config.tiles.max_tiles = max;
    }
}

/// Launch the browser, open `url` and wrap the page in a renderer
async fn open(
    args: &Args,
    url: &str,
    viewport: ViewportSize,
    dpr: f64,
    settle_ms: u64,
) -> anyhow::Result<(BrowserController, CdpRenderer)> {
    let mut builder = BrowserConfig::builder()
        .headless(!args.headed)
        .sandbox(!args.no_sandbox)
        .viewport(viewport.width, viewport.height)
        .device_scale_factor(dpr);
    if let Some(path) = &args.chrome_path {
        builder = builder.chrome_path(path.clone());
    }

    let controller = BrowserController::with_config(builder.build()).await?;
    let page = controller.new_page().await?;
    let nav = PageNavigator::goto(
        &page,
        url,
        Some(NavigationOptions {
            settle_ms,
            wait_until: args.wait_until.into(),
            ..Default::default()
        }),
    )
    .await?;
    info!(
        "Loaded {} ({}) in {}ms",
        nav.final_url,
        nav.title.as_deref().unwrap_or(""),
        nav.duration_ms
    );

    let renderer = CdpRenderer::attach(page, viewport, dpr).await?;
    Ok((controller, renderer))
}

fn base_viewport(config: &CaptureConfig) -> ViewportSize {
    ViewportSize::new(config.viewport.width, config.viewport.height)
}

async fn apply_columns(
    renderer: &CdpRenderer,
    config: &CaptureConfig,
    grid: &GridArgs,
) -> anyhow::Result<()> {
    if let Some(columns) = grid.columns {
        let css = StyleOverrides::grid_columns_css(
            &grid.list_selector,
            &config.grid.item_selector,
            columns,
            14,
        );
        StyleOverrides::add(renderer, "GRID_STYLE", &css).await?;
    }
    Ok(())
}

async fn run_grid(args: &Args, config: &CaptureConfig, grid: &GridArgs) -> anyhow::Result<()> {
    let (controller, mut renderer) = open(
        args,
        &grid.url,
        base_viewport(config),
        config.viewport.device_scale_factor,
        config.timing.after_goto_ms,
    )
    .await?;

    apply_columns(&renderer, config, grid).await?;
    if !grid.keep_fixed {
        FixedChrome::hide(&renderer, Some(&config.grid.item_selector)).await?;
    }

    let result = capture_grid(&mut renderer, config, &grid.out, None).await;
    if let Err(e) = FixedChrome::restore(&renderer).await {
        warn!("Failed to restore page chrome: {}", e);
    }
    controller.close().await?;

    let report = result?;
    if let Some(reason) = &report.incomplete {
        warn!("Capture incomplete: {}", reason);
    }
    info!(
        "Done: {} images in {}",
        report.shots.len(),
        grid.out.display()
    );
    Ok(())
}

async fn run_units(args: &Args, config: &CaptureConfig, units: &UnitsArgs) -> anyhow::Result<()> {
    let grid = &units.grid;
    let mut options = LocaleOptions {
        item_selector: config.grid.item_selector.clone(),
        switch_retries: units.switch_retries,
        item_visible_timeout_ms: units.item_visible_timeout_ms,
        after_switch_ms: config.timing.after_switch_ms,
        keep_fixed: grid.keep_fixed,
        ..Default::default()
    };
    let keys: Vec<String> = if units.countries.is_empty() {
        options.codes.clone()
    } else {
        units
            .countries
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    };
    for key in &keys {
        if !options.codes.contains(key) {
            options.codes.push(key.clone());
        }
    }

    let (controller, mut renderer) = open(
        args,
        &grid.url,
        base_viewport(config),
        config.viewport.device_scale_factor,
        config.timing.after_goto_ms,
    )
    .await?;
    apply_columns(&renderer, config, grid).await?;

    let mut navigator = CdpLocaleNavigator::new(options);
    let runner = UnitRunner::new(config.clone(), &grid.out);
    let result = runner.run(&mut renderer, &mut navigator, &keys).await;
    controller.close().await?;

    let outcomes = result?;
    for outcome in &outcomes {
        match outcome {
            UnitOutcome::Captured { key, dir, report } => info!(
                "[{}] {} images in {}",
                key,
                report.shots.len(),
                dir.display()
            ),
            UnitOutcome::Skipped { key } => info!("[{}] skipped (no items)", key),
            UnitOutcome::Failed { key, error, snapshot } => warn!(
                "[{}] failed: {} (snapshot: {})",
                key,
                error,
                snapshot
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "none".to_string())
            ),
        }
    }
    info!("All units done. Output: {}", grid.out.display());
    Ok(())
}

async fn run_tiles(args: &Args, config: &CaptureConfig, tiles: &TilesArgs) -> anyhow::Result<()> {
    let out_name = output::sanitize_file_name(&tiles.out);
    if out_name.is_empty() {
        bail!("output file name is empty");
    }
    let viewport = ViewportSize::new(config.viewport.width, config.tiles.viewport_height);
    let (controller, mut renderer) = open(
        args,
        &tiles.url,
        viewport,
        config.viewport.device_scale_factor,
        config.timing.after_goto_ms,
    )
    .await?;

    let container = match &tiles.container {
        Some(selector) => ScrollContainer::Selector(selector.clone()),
        None => {
            detect_scroll_container(&renderer).await?;
            ScrollContainer::Auto
        }
    };
    if !tiles.keep_fixed {
        let hidden = FixedChrome::hide(&renderer, None).await?;
        info!("Hid {} fixed/sticky elements", hidden);
    }

    let mode = if tiles.exact_seams {
        SeamMode::ScrollOffsets
    } else {
        SeamMode::FixedOverlap
    };
    let result = capture_stitched(
        &mut renderer,
        config,
        &container,
        &tiles.tile_dir,
        &PathBuf::from(&out_name),
        mode,
    )
    .await;
    controller.close().await?;

    let stitched = result?;
    info!(
        "Stitched {} tiles into {} ({}x{}); tiles kept in {}",
        stitched.sequence.len(),
        stitched.path.display(),
        stitched.dimensions.0,
        stitched.dimensions.1,
        tiles.tile_dir.display()
    );
    Ok(())
}

async fn run_shot(args: &Args, config: &CaptureConfig, shot: &ShotArgs) -> anyhow::Result<()> {
    let out_name = output::sanitize_file_name(&shot.out);
    if out_name.is_empty() {
        bail!("output file name is empty");
    }
    let viewport = ViewportSize::new(config.viewport.width, shot.height);
    let (controller, mut renderer) = open(
        args,
        &shot.url,
        viewport,
        config.viewport.device_scale_factor,
        shot.settle_ms,
    )
    .await?;

    let result = renderer.capture_full_page().await;
    controller.close().await?;

    let bytes = result?;
    let path = PathBuf::from(&out_name);
    output::write_file(&path, &bytes).await?;
    info!("Wrote {}", path.display());
    Ok(())
}
