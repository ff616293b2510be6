//! Property-based testing for row clustering and segment computation.
//!
//! Uses proptest to generate item layouts and verify that clustering is
//! order-independent and that chained segments cover a grid exactly once.

use gridshot::engine::{
    cluster_rows, compute_segment, GeometrySnapshot, ItemRect, Rect, SegmentParams,
};
use proptest::prelude::*;

// ============================================================================
// STRATEGIES
// ============================================================================

/// Arbitrary cards with distinct indices, in index order
pub fn arb_items() -> impl Strategy<Value = Vec<ItemRect>> {
    prop::collection::vec((0.0f64..3000.0, 0.0f64..1400.0), 1..60).prop_map(|tops| {
        tops.into_iter()
            .enumerate()
            .map(|(index, (top, left))| {
                ItemRect::new(index, Rect::new(left, top, left + 300.0, top + 400.0))
            })
            .collect()
    })
}

/// A regular grid: `(items, columns, rows per segment)`. Card tops jitter by
/// up to 3px, inside the default clustering tolerance.
pub fn arb_grid() -> impl Strategy<Value = (Vec<ItemRect>, usize, usize)> {
    (1usize..120, 1usize..6, 1usize..8).prop_flat_map(|(count, cols, max_rows)| {
        prop::collection::vec(0.0f64..=3.0, count).prop_map(move |jitter| {
            let items = jitter
                .into_iter()
                .enumerate()
                .map(|(i, dy)| {
                    let left = 20.0 + (i % cols) as f64 * 314.0;
                    let top = 120.0 + (i / cols) as f64 * 414.0 + dy;
                    ItemRect::new(i, Rect::new(left, top, left + 300.0, top + 400.0))
                })
                .collect();
            (items, cols, max_rows)
        })
    })
}

// ============================================================================
// CLUSTERING PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_clustering_ignores_input_order(
        (items, shuffled) in arb_items().prop_flat_map(|items| {
            (Just(items.clone()), Just(items).prop_shuffle())
        })
    ) {
        prop_assert_eq!(cluster_rows(&items, 6.0), cluster_rows(&shuffled, 6.0));
    }

    #[test]
    fn prop_clustering_keeps_every_item_once(items in arb_items()) {
        let rows = cluster_rows(&items, 6.0);
        let mut seen: Vec<usize> = rows
            .iter()
            .flat_map(|row| row.items.iter().map(|item| item.index))
            .collect();
        seen.sort_unstable();
        let expected: Vec<usize> = (0..items.len()).collect();
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn prop_rows_ascend_and_members_stay_near_anchor(items in arb_items()) {
        let rows = cluster_rows(&items, 6.0);
        for pair in rows.windows(2) {
            prop_assert!(pair[0].top < pair[1].top);
        }
        for row in &rows {
            for item in &row.items {
                prop_assert!((item.rect.top - row.top).abs() <= 6.0);
            }
            prop_assert!(row.items.windows(2).all(|w| w[0].index < w[1].index));
        }
    }
}

// ============================================================================
// SEGMENT PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_segments_chain_over_whole_rows((items, cols, max_rows) in arb_grid()) {
        let snapshot = GeometrySnapshot::new(items.clone()).unwrap();
        let params = SegmentParams { max_rows, ..SegmentParams::default() };
        let total_rows = items.len().div_ceil(cols);

        let mut start = 0;
        let mut segments = 0;
        while let Some(segment) = compute_segment(&snapshot, start, params) {
            prop_assert_eq!(segment.start, start);
            prop_assert!(segment.row_count() >= 1);
            prop_assert!(segment.row_count() <= max_rows);
            // Segments begin on a row boundary and take whole rows.
            prop_assert_eq!(start % cols, 0);
            prop_assert_eq!(segment.next_start, start + segment.item_count());
            prop_assert!(segment.next_start > start);
            prop_assert!(segment.top() >= 0.0);

            start = segment.next_start;
            segments += 1;
        }

        prop_assert_eq!(start, items.len());
        prop_assert_eq!(segments, total_rows.div_ceil(max_rows));
    }

    #[test]
    fn prop_segment_box_contains_its_items((items, _cols, max_rows) in arb_grid()) {
        let snapshot = GeometrySnapshot::new(items).unwrap();
        let params = SegmentParams { max_rows, ..SegmentParams::default() };
        let segment = compute_segment(&snapshot, 0, params).unwrap();

        for row in &segment.rows {
            for item in &row.items {
                prop_assert!(item.rect.left >= segment.bounds.left);
                prop_assert!(item.rect.top >= segment.bounds.top);
                prop_assert!(item.rect.right <= segment.bounds.right);
                prop_assert!(item.rect.bottom <= segment.bounds.bottom);
            }
        }
        let clip = segment.clip().unwrap();
        prop_assert!(clip.width >= 1 && clip.height >= 1);
    }
}
