//! Shared test fixtures: an in-memory page that behaves like a lazily-loaded
//! catalog grid rendered in a browser.

#![allow(dead_code)]

use gridshot::engine::{
    ClipRect, ItemRect, Navigator, Rect, Renderer, ScrollContainer, ScrollMetrics, UnitStatus,
    ViewportSize,
};
use gridshot::error::{NavigationError, Result};
use gridshot::{CaptureConfig, Error};
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;

/// Card layout of the simulated grid, CSS pixels
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub cols: usize,
    pub card_width: f64,
    pub card_height: f64,
    pub gap: f64,
    pub left: f64,
    pub top: f64,
    pub footer: f64,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            cols: 4,
            card_width: 300.0,
            card_height: 400.0,
            gap: 14.0,
            left: 20.0,
            top: 120.0,
            footer: 200.0,
        }
    }
}

/// Simulated page: a grid of `total` items, of which `rendered` exist in the
/// DOM. Scrolling to the bottom renders `batch` more.
pub struct MockRenderer {
    pub layout: Layout,
    pub total: usize,
    pub rendered: usize,
    pub batch: usize,
    /// Fixed document height, overriding the grid-derived one
    pub fixed_height: Option<f64>,
    /// Document height after the n-th viewport capture; the last entry holds
    pub height_script: Vec<f64>,
    pub viewport: ViewportSize,
    pub dpr: f64,
    /// Extra downscale of captured images, keeps grid captures small
    pub pixel_scale: f64,
    pub scroll_top: f64,
    /// After this many `item_count` calls, report `.1` items
    pub stall_after_calls: Option<(usize, usize)>,
    /// After this many region captures, `.1` more items appear
    pub grow_after_captures: Option<(usize, usize)>,
    pub item_count_calls: usize,
    pub viewport_history: Vec<ViewportSize>,
    pub regions: Vec<ClipRect>,
    pub viewport_captures: usize,
    pub diagnostic_captures: usize,
    pub metrics_calls: usize,
    /// Region captures that extended past the viewport bottom
    pub clipped_regions: usize,
    pub settled_ms: u64,
}

impl MockRenderer {
    /// Fully rendered grid of `total` items in a viewport
    pub fn grid(total: usize, viewport: ViewportSize) -> Self {
        Self {
            layout: Layout::default(),
            total,
            rendered: total,
            batch: 0,
            fixed_height: None,
            height_script: Vec::new(),
            viewport,
            dpr: 1.0,
            pixel_scale: 0.1,
            scroll_top: 0.0,
            stall_after_calls: None,
            grow_after_captures: None,
            item_count_calls: 0,
            viewport_history: Vec::new(),
            regions: Vec::new(),
            viewport_captures: 0,
            diagnostic_captures: 0,
            metrics_calls: 0,
            clipped_regions: 0,
            settled_ms: 0,
        }
    }

    /// Grid showing `initial` items, loading `batch` more per bottom hit
    pub fn lazy(total: usize, initial: usize, batch: usize, viewport: ViewportSize) -> Self {
        Self {
            rendered: initial.min(total),
            batch,
            ..Self::grid(total, viewport)
        }
    }

    /// A plain document of fixed height with no items
    pub fn document(height: f64, viewport: ViewportSize, dpr: f64) -> Self {
        Self {
            fixed_height: Some(height),
            dpr,
            pixel_scale: 1.0,
            ..Self::grid(0, viewport)
        }
    }

    /// A document whose height follows `script`, one entry per viewport capture
    pub fn scripted(initial: f64, script: &[f64], viewport: ViewportSize) -> Self {
        Self {
            height_script: script.to_vec(),
            ..Self::document(initial, viewport, 1.0)
        }
    }

    /// Replace the page content, as a locale switch would
    pub fn load_page(&mut self, total: usize) {
        self.total = total;
        self.rendered = total;
        self.scroll_top = 0.0;
    }

    pub fn item_page_rect(&self, index: usize) -> Rect {
        let l = &self.layout;
        let col = (index % l.cols) as f64;
        let row = (index / l.cols) as f64;
        let left = l.left + col * (l.card_width + l.gap);
        let top = l.top + row * (l.card_height + l.gap);
        Rect::new(left, top, left + l.card_width, top + l.card_height)
    }

    pub fn scroll_height(&self) -> f64 {
        let content = match self.fixed_height {
            Some(h) => h,
            None => {
                let l = &self.layout;
                let rows = self.rendered.div_ceil(l.cols) as f64;
                l.top + rows * (l.card_height + l.gap) + l.footer
            }
        };
        content.max(f64::from(self.viewport.height))
    }

    pub fn max_scroll_top(&self) -> f64 {
        (self.scroll_height() - f64::from(self.viewport.height)).max(0.0)
    }

    fn natural_count(&self) -> usize {
        self.rendered
    }

    /// PNG whose pixel rows encode the page row they show: red = y % 256,
    /// green = y / 256, both in CSS pixels.
    fn render(&self, page_top: f64, width: u32, height: u32) -> Vec<u8> {
        let scale = self.dpr * self.pixel_scale;
        let pw = ((f64::from(width) * scale).round() as u32).max(1);
        let ph = ((f64::from(height) * scale).round() as u32).max(1);
        let img = RgbaImage::from_fn(pw, ph, |_, y| {
            let css = (page_top + f64::from(y) / scale).floor() as u32;
            Rgba([(css % 256) as u8, ((css / 256) % 256) as u8, 0, 255])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .expect("encode mock capture");
        out.into_inner()
    }
}

/// Page row encoded in a captured pixel
pub fn page_row(pixel: &Rgba<u8>) -> u32 {
    u32::from(pixel[0]) + 256 * u32::from(pixel[1])
}

impl Renderer for MockRenderer {
    async fn query_item_rects(
        &mut self,
        _selector: &str,
        from_index: usize,
    ) -> Result<Vec<ItemRect>> {
        let scroll = self.scroll_top;
        Ok((from_index..self.rendered)
            .map(|i| {
                let r = self.item_page_rect(i);
                ItemRect::new(
                    i,
                    Rect::new(r.left, r.top - scroll, r.right, r.bottom - scroll),
                )
            })
            .collect())
    }

    async fn item_count(&mut self, _selector: &str) -> Result<usize> {
        self.item_count_calls += 1;
        if let Some((after, count)) = self.stall_after_calls {
            if self.item_count_calls > after {
                return Ok(count.min(self.natural_count()));
            }
        }
        Ok(self.natural_count())
    }

    async fn scroll_to(&mut self, _container: &ScrollContainer, y: f64) -> Result<()> {
        self.scroll_top = y.clamp(0.0, self.max_scroll_top());
        if self.batch > 0 && self.scroll_top >= self.max_scroll_top() - 1.0 {
            self.rendered = (self.rendered + self.batch).min(self.total);
        }
        Ok(())
    }

    async fn scroll_metrics(&mut self, _container: &ScrollContainer) -> Result<ScrollMetrics> {
        self.metrics_calls += 1;
        Ok(ScrollMetrics {
            scroll_top: self.scroll_top,
            scroll_height: self.scroll_height(),
            client_height: f64::from(self.viewport.height),
        })
    }

    async fn set_viewport_size(&mut self, size: ViewportSize) -> Result<()> {
        self.viewport = size;
        self.viewport_history.push(size);
        self.scroll_top = self.scroll_top.min(self.max_scroll_top());
        Ok(())
    }

    fn viewport_size(&self) -> ViewportSize {
        self.viewport
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.dpr
    }

    async fn wait_settle(&mut self, ms: u64) {
        self.settled_ms += ms;
    }

    async fn wait_network_quiet(&mut self, _timeout_ms: u64) -> bool {
        true
    }

    async fn capture_region(&mut self, clip: ClipRect) -> Result<Vec<u8>> {
        if clip.y + clip.height > self.viewport.height {
            self.clipped_regions += 1;
        }
        self.regions.push(clip);
        if let Some((after, extra)) = self.grow_after_captures {
            if self.regions.len() == after {
                self.total += extra;
                self.rendered += extra;
            }
        }
        Ok(self.render(self.scroll_top + f64::from(clip.y), clip.width, clip.height))
    }

    async fn capture_viewport(&mut self) -> Result<Vec<u8>> {
        self.viewport_captures += 1;
        let bytes = self.render(self.scroll_top, self.viewport.width, self.viewport.height);
        let next = self
            .height_script
            .get(self.viewport_captures - 1)
            .or(self.height_script.last())
            .copied();
        if let Some(height) = next {
            self.fixed_height = Some(height);
        }
        Ok(bytes)
    }

    async fn capture_diagnostic(&mut self) -> Result<Vec<u8>> {
        self.diagnostic_captures += 1;
        let height = self.scroll_height().round() as u32;
        Ok(self.render(0.0, self.viewport.width, height))
    }
}

/// What the scripted navigator does for a key
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Switch succeeds and the page shows this many items
    Items(usize),
    /// Switch succeeds, catalog is empty
    Empty,
    /// Switch reports `ok: false`
    NotOk,
    /// Switch raises an error
    Fail,
}

#[derive(Debug, Default)]
pub struct ScriptedNavigator {
    pub scripts: HashMap<String, Script>,
    pub switched: Vec<String>,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

impl ScriptedNavigator {
    pub fn new(scripts: &[(&str, Script)]) -> Self {
        Self {
            scripts: scripts
                .iter()
                .map(|(k, s)| (k.to_string(), *s))
                .collect(),
            ..Default::default()
        }
    }
}

impl Navigator<MockRenderer> for ScriptedNavigator {
    async fn switch_unit(&mut self, renderer: &mut MockRenderer, key: &str) -> Result<UnitStatus> {
        self.switched.push(key.to_string());
        match self.scripts.get(key).copied().unwrap_or(Script::Fail) {
            Script::Items(n) => {
                renderer.load_page(n);
                Ok(UnitStatus::ready())
            }
            Script::Empty => {
                renderer.load_page(0);
                Ok(UnitStatus::empty())
            }
            Script::NotOk => Ok(UnitStatus::default()),
            Script::Fail => Err(Error::from(NavigationError::SwitchFailed {
                key: key.to_string(),
                reason: "modal never opened".to_string(),
            })),
        }
    }

    async fn before_capture(&mut self, _renderer: &mut MockRenderer, key: &str) -> Result<()> {
        self.before.push(key.to_string());
        Ok(())
    }

    async fn after_capture(&mut self, _renderer: &mut MockRenderer, key: &str) -> Result<()> {
        self.after.push(key.to_string());
        Ok(())
    }
}

/// Config for a mock viewport at device scale 1
pub fn config(width: u32, height: u32) -> CaptureConfig {
    CaptureConfig::builder()
        .viewport(width, height)
        .device_scale_factor(1.0)
        .build()
}

/// Decode a PNG written by a capture
pub fn read_png(path: &std::path::Path) -> RgbaImage {
    image::open(path).expect("decode png").to_rgba8()
}
