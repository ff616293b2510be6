//! Geometry snapshots, row clustering and segment computation
//!
//! Everything here is pure: a [`GeometrySnapshot`] is a value copied out of
//! the renderer at one instant, and it is only meaningful until the next
//! scroll or resize. Coordinates are viewport-relative CSS pixels.

use super::renderer::ClipRect;
use crate::error::GeometryError;
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub left: f64,
    /// Top edge
    pub top: f64,
    /// Right edge
    pub right: f64,
    /// Bottom edge
    pub bottom: f64,
}

impl Rect {
    /// Create a rect from its edges
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Width
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// Height
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Smallest rect containing both
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Grow by `pad` on every side; left and top never go below 0
    pub fn padded(&self, pad: f64) -> Rect {
        Rect {
            left: (self.left - pad).max(0.0),
            top: (self.top - pad).max(0.0),
            right: self.right + pad,
            bottom: self.bottom + pad,
        }
    }

    fn is_finite(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.right.is_finite()
            && self.bottom.is_finite()
    }
}

/// One catalog item and where it is on screen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemRect {
    /// Position of the item in document order
    pub index: usize,
    /// Viewport-relative bounding rect
    pub rect: Rect,
}

impl ItemRect {
    /// Create an item rect
    pub fn new(index: usize, rect: Rect) -> Self {
        Self { index, rect }
    }
}

/// Validated item geometry captured at one instant
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeometrySnapshot {
    items: Vec<ItemRect>,
}

impl GeometrySnapshot {
    /// Validate renderer output. Rects must be finite and non-inverted, and
    /// indices strictly increasing.
    pub fn new(items: Vec<ItemRect>) -> Result<Self, GeometryError> {
        let mut previous: Option<usize> = None;
        for item in &items {
            if !item.rect.is_finite() {
                return Err(GeometryError::NonFinite { index: item.index });
            }
            if item.rect.right < item.rect.left || item.rect.bottom < item.rect.top {
                return Err(GeometryError::Inverted { index: item.index });
            }
            if let Some(prev) = previous {
                if item.index <= prev {
                    return Err(GeometryError::OutOfOrder {
                        index: item.index,
                        previous: prev,
                    });
                }
            }
            previous = Some(item.index);
        }
        Ok(Self { items })
    }

    /// Items in index order
    pub fn items(&self) -> &[ItemRect] {
        &self.items
    }

    /// Whether the snapshot holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Rect of a specific item, if present
    pub fn get(&self, index: usize) -> Option<&ItemRect> {
        self.items
            .binary_search_by_key(&index, |item| item.index)
            .ok()
            .map(|pos| &self.items[pos])
    }
}

/// Items sharing an on-screen vertical position
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Anchor top: the smallest top among the members
    pub top: f64,
    /// Members, ordered by index
    pub items: Vec<ItemRect>,
}

impl Row {
    /// Union of the members' rects
    pub fn bounds(&self) -> Rect {
        let mut iter = self.items.iter();
        let first = iter.next().map(|item| item.rect).unwrap_or_default();
        iter.fold(first, |acc, item| acc.union(&item.rect))
    }

    /// Highest item index in the row
    pub fn max_index(&self) -> Option<usize> {
        self.items.iter().map(|item| item.index).max()
    }
}

/// Group items into rows whose tops lie within `tolerance` of the row anchor.
///
/// Items are sorted by `(top, index)` before the sweep, so the result does not
/// depend on input order. Rows come out in ascending `top`.
pub fn cluster_rows(items: &[ItemRect], tolerance: f64) -> Vec<Row> {
    let mut sorted: Vec<ItemRect> = items.to_vec();
    sorted.sort_by(|a, b| {
        a.rect
            .top
            .total_cmp(&b.rect.top)
            .then(a.index.cmp(&b.index))
    });

    let mut rows: Vec<Row> = Vec::new();
    for item in sorted {
        match rows.last_mut() {
            Some(row) if (item.rect.top - row.top).abs() <= tolerance => row.items.push(item),
            _ => rows.push(Row {
                top: item.rect.top,
                items: vec![item],
            }),
        }
    }

    for row in &mut rows {
        row.items.sort_by_key(|item| item.index);
    }
    rows
}

/// Knobs for [`compute_segment`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentParams {
    /// Maximum rows in one segment
    pub max_rows: usize,
    /// Row clustering tolerance
    pub tolerance: f64,
    /// Padding around the bounding box
    pub padding: f64,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            max_rows: 5,
            tolerance: 6.0,
            padding: 10.0,
        }
    }
}

/// A bounded run of whole rows captured as one image
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Index the segment was computed from
    pub start: usize,
    /// Rows taken, in ascending top
    pub rows: Vec<Row>,
    /// Padded bounding box, viewport-relative
    pub bounds: Rect,
    /// One past the highest item index included
    pub next_start: usize,
    /// Rows visible from `start` when the segment was computed
    pub rows_found: usize,
}

impl Segment {
    /// Number of rows in this segment
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of items in this segment
    pub fn item_count(&self) -> usize {
        self.rows.iter().map(|row| row.items.len()).sum()
    }

    /// Top of the padded box
    pub fn top(&self) -> f64 {
        self.bounds.top
    }

    /// Bottom of the padded box
    pub fn bottom(&self) -> f64 {
        self.bounds.bottom
    }

    /// Height of the padded box
    pub fn height(&self) -> f64 {
        self.bounds.height()
    }

    /// Whole-pixel capture region: edges floored, extent at least 1px
    pub fn clip(&self) -> Result<ClipRect, GeometryError> {
        let b = &self.bounds;
        if !b.is_finite() {
            return Err(GeometryError::EmptyRegion(format!(
                "segment from {} has non-finite bounds",
                self.start
            )));
        }
        Ok(ClipRect {
            x: b.left.max(0.0).floor() as u32,
            y: b.top.max(0.0).floor() as u32,
            width: b.width().floor().max(1.0) as u32,
            height: b.height().floor().max(1.0) as u32,
        })
    }
}

/// Take the first `min(max_rows, rows)` rows of the items at or after `start`.
///
/// Returns `None` when no such items exist. A trailing remainder shorter than
/// `max_rows` is returned whole, never split.
pub fn compute_segment(
    snapshot: &GeometrySnapshot,
    start: usize,
    params: SegmentParams,
) -> Option<Segment> {
    let candidates: Vec<ItemRect> = snapshot
        .items()
        .iter()
        .filter(|item| item.index >= start)
        .copied()
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let mut rows = cluster_rows(&candidates, params.tolerance);
    let rows_found = rows.len();
    rows.truncate(params.max_rows.max(1).min(rows_found));

    let mut bounds: Option<Rect> = None;
    let mut last_index = start;
    for row in &rows {
        let row_bounds = row.bounds();
        bounds = Some(match bounds {
            Some(acc) => acc.union(&row_bounds),
            None => row_bounds,
        });
        if let Some(max) = row.max_index() {
            last_index = last_index.max(max);
        }
    }

    Some(Segment {
        start,
        rows,
        bounds: bounds.unwrap_or_default().padded(params.padding),
        next_start: last_index + 1,
        rows_found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Lay out `count` items `cols` per row, 300x400 cards with a 14px gap.
    fn grid(count: usize, cols: usize, offset_y: f64) -> Vec<ItemRect> {
        (0..count)
            .map(|i| {
                let row = (i / cols) as f64;
                let col = (i % cols) as f64;
                let left = 20.0 + col * 314.0;
                let top = offset_y + row * 414.0;
                ItemRect::new(i, Rect::new(left, top, left + 300.0, top + 400.0))
            })
            .collect()
    }

    fn snapshot(items: Vec<ItemRect>) -> GeometrySnapshot {
        GeometrySnapshot::new(items).unwrap()
    }

    #[test]
    fn test_rect_padding_clamps_at_origin() {
        let r = Rect::new(4.0, 3.0, 100.0, 50.0).padded(10.0);
        assert_eq!(r, Rect::new(0.0, 0.0, 110.0, 60.0));
    }

    #[test]
    fn test_cluster_rows_with_jitter() {
        let items = vec![
            ItemRect::new(0, Rect::new(0.0, 100.0, 10.0, 120.0)),
            ItemRect::new(1, Rect::new(20.0, 104.0, 30.0, 124.0)),
            ItemRect::new(2, Rect::new(40.0, 98.5, 50.0, 118.0)),
            ItemRect::new(3, Rect::new(0.0, 200.0, 10.0, 220.0)),
        ];
        let rows = cluster_rows(&items, 6.0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].top, 98.5);
        let indices: Vec<usize> = rows[0].items.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(rows[1].items.len(), 1);
    }

    #[test]
    fn test_cluster_rows_tolerance_boundary() {
        let items = vec![
            ItemRect::new(0, Rect::new(0.0, 0.0, 10.0, 10.0)),
            ItemRect::new(1, Rect::new(20.0, 6.0, 30.0, 16.0)),
            ItemRect::new(2, Rect::new(40.0, 6.5, 50.0, 16.0)),
        ];
        let rows = cluster_rows(&items, 6.0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].items.len(), 2);
        assert_eq!(rows[1].items[0].index, 2);
    }

    #[test]
    fn test_cluster_rows_order_independent() {
        let items = grid(10, 4, 0.0);
        let mut reversed = items.clone();
        reversed.reverse();
        assert_eq!(cluster_rows(&items, 6.0), cluster_rows(&reversed, 6.0));
    }

    #[test]
    fn test_scenario_a_single_segment() {
        // 18 items, 4 per row: rows of 4,4,4,4,2
        let snap = snapshot(grid(18, 4, 0.0));
        let seg = compute_segment(&snap, 0, SegmentParams::default()).unwrap();
        assert_eq!(seg.row_count(), 5);
        assert_eq!(seg.rows_found, 5);
        assert_eq!(seg.item_count(), 18);
        assert_eq!(seg.next_start, 18);
        assert!(compute_segment(&snap, 18, SegmentParams::default()).is_none());
    }

    #[test]
    fn test_scenario_b_three_segments() {
        let snap = snapshot(grid(44, 4, 0.0));
        let params = SegmentParams::default();

        let first = compute_segment(&snap, 0, params).unwrap();
        assert_eq!(first.row_count(), 5);
        assert_eq!(first.next_start, 20);

        let second = compute_segment(&snap, first.next_start, params).unwrap();
        assert_eq!(second.row_count(), 5);
        assert_eq!(second.next_start, 40);

        let third = compute_segment(&snap, second.next_start, params).unwrap();
        assert_eq!(third.row_count(), 1);
        assert_eq!(third.item_count(), 4);
        assert_eq!(third.next_start, 44);
    }

    #[test]
    fn test_segment_bounds_are_padded_union() {
        let snap = snapshot(grid(8, 4, 50.0));
        let seg = compute_segment(&snap, 0, SegmentParams::default()).unwrap();
        assert_eq!(seg.bounds, Rect::new(10.0, 40.0, 20.0 + 3.0 * 314.0 + 310.0, 874.0));
        assert_eq!(seg.height(), 834.0);
    }

    #[test]
    fn test_segment_clip_floors_and_clamps() {
        let seg = Segment {
            start: 0,
            rows: Vec::new(),
            bounds: Rect::new(10.7, 20.2, 11.1, 500.9),
            next_start: 1,
            rows_found: 1,
        };
        let clip = seg.clip().unwrap();
        assert_eq!(
            clip,
            ClipRect {
                x: 10,
                y: 20,
                width: 1,
                height: 480
            }
        );
    }

    #[test]
    fn test_next_start_covers_highest_index() {
        // A short item from a later index lands in the first row.
        let items = vec![
            ItemRect::new(5, Rect::new(0.0, 0.0, 10.0, 10.0)),
            ItemRect::new(6, Rect::new(0.0, 100.0, 10.0, 110.0)),
            ItemRect::new(7, Rect::new(20.0, 2.0, 30.0, 12.0)),
        ];
        let snap = snapshot(items);
        let params = SegmentParams {
            max_rows: 1,
            ..Default::default()
        };
        let seg = compute_segment(&snap, 5, params).unwrap();
        assert_eq!(seg.row_count(), 1);
        assert_eq!(seg.next_start, 8);
    }

    #[test]
    fn test_snapshot_rejects_malformed_rects() {
        let nan = vec![ItemRect::new(0, Rect::new(f64::NAN, 0.0, 1.0, 1.0))];
        assert_eq!(
            GeometrySnapshot::new(nan),
            Err(GeometryError::NonFinite { index: 0 })
        );

        let inverted = vec![ItemRect::new(2, Rect::new(10.0, 0.0, 1.0, 1.0))];
        assert_eq!(
            GeometrySnapshot::new(inverted),
            Err(GeometryError::Inverted { index: 2 })
        );

        let unordered = vec![
            ItemRect::new(3, Rect::new(0.0, 0.0, 1.0, 1.0)),
            ItemRect::new(3, Rect::new(0.0, 0.0, 1.0, 1.0)),
        ];
        assert!(matches!(
            GeometrySnapshot::new(unordered),
            Err(GeometryError::OutOfOrder { index: 3, previous: 3 })
        ));
    }

    #[test]
    fn test_snapshot_lookup() {
        let snap = snapshot(grid(6, 3, 0.0));
        assert_eq!(snap.len(), 6);
        assert_eq!(snap.get(4).map(|i| i.index), Some(4));
        assert!(snap.get(9).is_none());
    }
}
