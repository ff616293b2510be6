//! Row Clustering Paginator tests against a simulated catalog page

mod common;

use common::{config, page_row, read_png, MockRenderer};
use gridshot::engine::{capture_grid, ItemLoader, RowPaginator, ViewportSize};
use gridshot::error::{Error, SegmentError};
use gridshot::output::{RunManifest, MANIFEST_FILE};
use pretty_assertions::assert_eq;

fn starts(report: &gridshot::engine::PaginationReport) -> Vec<(usize, usize, usize)> {
    report
        .shots
        .iter()
        .map(|s| (s.start, s.next_start, s.rows))
        .collect()
}

// ============================================================================
// Segment boundaries
// ============================================================================

#[tokio::test]
async fn test_short_grid_is_one_capture() {
    // 18 items, 4 per row: rows of 4,4,4,4,2 fit one segment.
    let dir = tempfile::tempdir().unwrap();
    let config = config(1440, 3200);
    let mut page = MockRenderer::grid(18, ViewportSize::new(1440, 3200));

    let report = RowPaginator::from_config(&config)
        .run(&mut page, dir.path())
        .await
        .unwrap();

    assert_eq!(starts(&report), vec![(0, 18, 5)]);
    assert_eq!(report.shots[0].file, "page_001.png");
    assert!(dir.path().join("page_001.png").exists());
    assert!(!dir.path().join("page_002.png").exists());
}

#[tokio::test]
async fn test_eleven_rows_make_three_captures() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(1440, 3200);
    let mut page = MockRenderer::grid(44, ViewportSize::new(1440, 3200));

    let report = RowPaginator::from_config(&config)
        .run(&mut page, dir.path())
        .await
        .unwrap();

    // The trailing single row is its own segment, neither merged nor split.
    assert_eq!(starts(&report), vec![(0, 20, 5), (20, 40, 5), (40, 44, 1)]);
    assert_eq!(report.total_items, 44);
    assert_eq!(report.covered_until(), 44);
    assert!(report.incomplete.is_none());
    for name in ["page_001.png", "page_002.png", "page_003.png"] {
        assert!(dir.path().join(name).exists(), "{name} missing");
    }
    assert_eq!(page.clipped_regions, 0);
}

#[tokio::test]
async fn test_segments_are_aligned_below_viewport_top() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(1440, 3200);
    let mut page = MockRenderer::grid(44, ViewportSize::new(1440, 3200));

    RowPaginator::from_config(&config)
        .run(&mut page, dir.path())
        .await
        .unwrap();

    // First segment scrolled so its padded top sits at the align offset.
    let first = page.regions[0];
    assert_eq!(first.y, 8);
    // Five 400px rows with 14px gaps plus 10px padding on both sides.
    assert_eq!(first.height, 5 * 400 + 4 * 14 + 20);
    assert_eq!(first.x, 10);
    assert_eq!(first.width, 4 * 300 + 3 * 14 + 20);
}

#[tokio::test]
async fn test_captured_pixels_start_at_segment_top() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(1440, 3200);
    let mut page = MockRenderer::grid(18, ViewportSize::new(1440, 3200));

    RowPaginator::from_config(&config)
        .run(&mut page, dir.path())
        .await
        .unwrap();

    // Item 0 sits at page y=120; the padded segment starts 10px above it.
    // The page is too short to scroll, so the segment is captured in place.
    let image = read_png(&dir.path().join("page_001.png"));
    assert_eq!(page_row(image.get_pixel(0, 0)), 110);
    assert_eq!(page_row(image.get_pixel(0, 1)), 120);
    assert_eq!(page.regions[0].y, 110);
    // 2076 CSS px captured at a 0.1 pixel scale
    assert_eq!(image.height(), 208);
}

#[tokio::test]
async fn test_start_mid_grid() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(1440, 3200);
    let mut page = MockRenderer::grid(44, ViewportSize::new(1440, 3200));

    let report = RowPaginator::from_config(&config)
        .run_from(&mut page, dir.path(), 20)
        .await
        .unwrap();

    assert_eq!(starts(&report), vec![(20, 40, 5), (40, 44, 1)]);
    assert_eq!(report.shots[0].file, "page_001.png");
}

// ============================================================================
// Viewport overflow
// ============================================================================

#[tokio::test]
async fn test_tall_segment_grows_viewport_then_restores() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(1440, 1200);
    let mut page = MockRenderer::grid(44, ViewportSize::new(1440, 1200));

    let report = RowPaginator::from_config(&config)
        .run(&mut page, dir.path())
        .await
        .unwrap();

    assert_eq!(starts(&report), vec![(0, 20, 5), (20, 40, 5), (40, 44, 1)]);
    assert_eq!(page.clipped_regions, 0);
    assert!(report.shots.iter().all(|s| !s.overflow_unresolved));

    let tallest = page.viewport_history.iter().map(|v| v.height).max().unwrap();
    assert!(tallest > 2076, "viewport only grew to {tallest}");
    assert!(tallest <= 9000);
    assert_eq!(page.viewport, ViewportSize::new(1440, 1200));
}

#[tokio::test]
async fn test_growth_cap_captures_anyway() {
    let dir = tempfile::tempdir().unwrap();
    let config = gridshot::CaptureConfig::builder()
        .viewport(1440, 1200)
        .device_scale_factor(1.0)
        .viewport_height_cap(1500)
        .build();
    let mut page = MockRenderer::grid(44, ViewportSize::new(1440, 1200));

    let report = RowPaginator::from_config(&config)
        .run(&mut page, dir.path())
        .await
        .unwrap();

    // Every segment is still captured; the first two carry the clipping risk.
    assert_eq!(report.shots.len(), 3);
    assert!(report.shots[0].overflow_unresolved);
    assert!(report.shots[1].overflow_unresolved);
    assert!(!report.shots[2].overflow_unresolved);
    assert!(page.viewport_history.iter().all(|v| v.height <= 1500));
    assert!(page.clipped_regions >= 2);
}

// ============================================================================
// Incremental loading
// ============================================================================

#[tokio::test]
async fn test_items_appearing_during_capture_are_covered() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(1440, 3200);
    let mut page = MockRenderer::grid(44, ViewportSize::new(1440, 3200));
    page.grow_after_captures = Some((3, 8));

    let report = RowPaginator::from_config(&config)
        .run(&mut page, dir.path())
        .await
        .unwrap();

    assert_eq!(
        starts(&report),
        vec![(0, 20, 5), (20, 40, 5), (40, 44, 1), (44, 52, 2)]
    );
    assert_eq!(report.total_items, 52);
}

#[tokio::test]
async fn test_materialization_timeout_keeps_flushed_shots() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(1440, 3200);
    let mut page = MockRenderer::grid(44, ViewportSize::new(1440, 3200));
    // Count reads: initial total, ensure(1), total after shot 1; then the list collapses.
    page.stall_after_calls = Some((3, 10));

    let report = RowPaginator::from_config(&config)
        .run(&mut page, dir.path())
        .await
        .unwrap();

    assert_eq!(starts(&report), vec![(0, 20, 5)]);
    assert_eq!(
        report.incomplete.as_deref(),
        Some("Item 20 not materialized after 40 rounds")
    );
    assert!(dir.path().join("page_001.png").exists());
    assert_eq!(page.viewport, ViewportSize::new(1440, 3200));
}

#[tokio::test]
async fn test_ensure_rendered_scrolls_until_item_exists() {
    let config = config(1440, 3200);
    let mut page = MockRenderer::lazy(44, 8, 8, ViewportSize::new(1440, 3200));

    ItemLoader::from_config(&config)
        .ensure_rendered(&mut page, 30)
        .await
        .unwrap();

    assert!(page.rendered >= 30);
}

#[tokio::test]
async fn test_ensure_rendered_times_out() {
    let config = config(1440, 3200);
    let mut page = MockRenderer::grid(10, ViewportSize::new(1440, 3200));

    let err = ItemLoader::from_config(&config)
        .ensure_rendered(&mut page, 12)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Segment(SegmentError::MaterializationTimeout {
            index: 11,
            rounds: 40
        })
    ));
}

#[tokio::test]
async fn test_load_all_items_until_stable() {
    let config = config(1440, 3200);
    let mut page = MockRenderer::lazy(44, 12, 8, ViewportSize::new(1440, 3200));

    let report = ItemLoader::from_config(&config)
        .load_all_items(&mut page)
        .await
        .unwrap();

    assert_eq!(report.count, 44);
    assert!(report.stabilized);
    // Four loading rounds, then seven unchanged counts.
    assert_eq!(report.rounds, 4 + 7);
    assert_eq!(page.scroll_top, 0.0);
}

#[tokio::test]
async fn test_load_all_items_gives_up_at_round_limit() {
    let config = gridshot::CaptureConfig {
        grid: gridshot::config::GridConfig {
            max_scroll_rounds: 3,
            ..Default::default()
        },
        ..config(1440, 3200)
    };
    let mut page = MockRenderer::lazy(400, 8, 8, ViewportSize::new(1440, 3200));

    let report = ItemLoader::from_config(&config)
        .load_all_items(&mut page)
        .await
        .unwrap();

    assert!(!report.stabilized);
    assert_eq!(report.rounds, 3);
    assert_eq!(report.count, 32);
}

#[tokio::test]
async fn test_empty_page_reports_no_items() {
    let config = config(1440, 3200);
    let mut page = MockRenderer::grid(0, ViewportSize::new(1440, 3200));

    let err = ItemLoader::from_config(&config)
        .load_all_items(&mut page)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Segment(SegmentError::NoItemsFound { ref selector }) if selector == ".product-item"
    ));
}

// ============================================================================
// Full grid workflow
// ============================================================================

#[tokio::test]
async fn test_capture_grid_loads_paginates_and_writes_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(1440, 3200);
    let mut page = MockRenderer::lazy(44, 12, 8, ViewportSize::new(1440, 3200));

    let report = capture_grid(&mut page, &config, dir.path(), Some("US"))
        .await
        .unwrap();

    assert_eq!(report.shots.len(), 3);
    let raw = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
    let manifest: RunManifest = serde_json::from_str(&raw).unwrap();
    assert_eq!(manifest.unit.as_deref(), Some("US"));
    assert_eq!(manifest.shots, report.shots);
    assert!(manifest.finished_at.is_some());
}
