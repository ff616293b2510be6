//! Renderer over a live Chromium page
//!
//! Geometry and scroll state are read with small scripts that return JSON;
//! viewport changes go through device metrics emulation and pixels through
//! `Page.captureScreenshot`.

use crate::browser::navigation::js_string;
use crate::browser::PageHandle;
use crate::engine::{ClipRect, ItemRect, Renderer, ScrollContainer, ScrollMetrics, ViewportSize};
use crate::error::{BrowserError, CaptureError, Result};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::page::ScreenshotParams;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Resolves a serialized [`ScrollContainer`] to an element
const RESOLVE_SCROLLER: &str = r#"
    const __resolveScroller = (c) => {
        const root = document.scrollingElement || document.documentElement;
        if (c.kind === 'selector') return document.querySelector(c.selector) || root;
        if (c.kind === 'auto') return window.__gridshot_scroller || root;
        return root;
    };
"#;

#[derive(Debug, Deserialize)]
struct ScrollOffset {
    x: f64,
    y: f64,
}

/// [`Renderer`] implemented over a chromiumoxide page
pub struct CdpRenderer {
    page: PageHandle,
    viewport: ViewportSize,
    device_pixel_ratio: f64,
}

impl CdpRenderer {
    /// Take over `page`, emulating `viewport` at `device_pixel_ratio`
    #[instrument(skip(page))]
    pub async fn attach(
        page: PageHandle,
        viewport: ViewportSize,
        device_pixel_ratio: f64,
    ) -> Result<Self> {
        let mut renderer = Self {
            page,
            viewport,
            device_pixel_ratio,
        };
        renderer.set_viewport_size(viewport).await?;
        Ok(renderer)
    }

    /// The underlying page
    pub fn page(&self) -> &PageHandle {
        &self.page
    }

    /// Evaluate a script and deserialize its result
    pub async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        self.page
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptFailed(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::ScriptFailed(e.to_string()).into())
    }

    /// Screenshot of the whole document, beyond the viewport
    #[instrument(skip(self))]
    pub async fn capture_full_page(&mut self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .from_surface(true)
            .capture_beyond_viewport(true)
            .full_page(true)
            .build();
        self.screenshot(params).await
    }

    async fn screenshot(&self, params: ScreenshotParams) -> Result<Vec<u8>> {
        let data = self
            .page
            .page
            .screenshot(params)
            .await
            .map_err(|e| CaptureError::ScreenshotFailed(e.to_string()))?;
        debug!("Screenshot captured: {} bytes", data.len());
        Ok(data)
    }

    fn container_json(container: &ScrollContainer) -> Result<String> {
        Ok(serde_json::to_string(container)?)
    }
}

impl Renderer for CdpRenderer {
    async fn query_item_rects(
        &mut self,
        selector: &str,
        from_index: usize,
    ) -> Result<Vec<ItemRect>> {
        let script = format!(
            r#"(() => {{
                const items = document.querySelectorAll({});
                const out = [];
                for (let i = {}; i < items.length; i++) {{
                    const r = items[i].getBoundingClientRect();
                    out.push({{ index: i, rect: {{ left: r.left, top: r.top, right: r.right, bottom: r.bottom }} }});
                }}
                return out;
            }})()"#,
            js_string(selector),
            from_index
        );
        self.evaluate(&script).await
    }

    async fn item_count(&mut self, selector: &str) -> Result<usize> {
        let script = format!(
            "document.querySelectorAll({}).length",
            js_string(selector)
        );
        self.evaluate(&script).await
    }

    async fn scroll_to(&mut self, container: &ScrollContainer, y: f64) -> Result<()> {
        let script = format!(
            r#"(() => {{
                {}
                const c = {};
                if (c.kind === 'document') {{
                    window.scrollTo(0, {});
                }} else {{
                    __resolveScroller(c).scrollTop = {};
                }}
                return true;
            }})()"#,
            RESOLVE_SCROLLER,
            Self::container_json(container)?,
            y,
            y
        );
        self.evaluate::<bool>(&script).await?;
        Ok(())
    }

    async fn scroll_metrics(&mut self, container: &ScrollContainer) -> Result<ScrollMetrics> {
        let script = format!(
            r#"(() => {{
                {}
                const el = __resolveScroller({});
                return {{
                    scrollTop: el.scrollTop,
                    scrollHeight: el.scrollHeight,
                    clientHeight: el.clientHeight
                }};
            }})()"#,
            RESOLVE_SCROLLER,
            Self::container_json(container)?
        );
        self.evaluate(&script).await
    }

    async fn set_viewport_size(&mut self, size: ViewportSize) -> Result<()> {
        let params = SetDeviceMetricsOverrideParams::new(
            i64::from(size.width),
            i64::from(size.height),
            self.device_pixel_ratio,
            false,
        );
        self.page
            .page
            .execute(params)
            .await
            .map_err(|e| CaptureError::ResizeFailed(e.to_string()))?;
        debug!("Viewport set to {}x{}", size.width, size.height);
        self.viewport = size;
        Ok(())
    }

    fn viewport_size(&self) -> ViewportSize {
        self.viewport
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    async fn wait_settle(&mut self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn wait_network_quiet(&mut self, timeout_ms: u64) -> bool {
        // Resource entries are appended as requests finish; 500ms without a
        // new entry counts as quiet.
        let script = format!(
            r#"new Promise(resolve => {{
                const deadline = Date.now() + {};
                let last = performance.getEntriesByType('resource').length;
                let quietSince = Date.now();
                const tick = () => {{
                    const now = performance.getEntriesByType('resource').length;
                    if (now !== last) {{
                        last = now;
                        quietSince = Date.now();
                    }}
                    if (Date.now() - quietSince >= 500) return resolve(true);
                    if (Date.now() > deadline) return resolve(false);
                    setTimeout(tick, 100);
                }};
                tick();
            }})"#,
            timeout_ms
        );
        let guard = Duration::from_millis(timeout_ms + 1000);
        match tokio::time::timeout(guard, self.evaluate::<bool>(&script)).await {
            Ok(Ok(quiet)) => quiet,
            Ok(Err(e)) => {
                debug!("Network quiet check failed: {}", e);
                false
            }
            Err(_) => false,
        }
    }

    async fn capture_region(&mut self, clip: ClipRect) -> Result<Vec<u8>> {
        // Screenshot clips are document coordinates.
        let offset: ScrollOffset = self
            .evaluate("({ x: window.scrollX, y: window.scrollY })")
            .await?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .from_surface(true)
            .capture_beyond_viewport(false)
            .clip(Viewport {
                x: offset.x + f64::from(clip.x),
                y: offset.y + f64::from(clip.y),
                width: f64::from(clip.width),
                height: f64::from(clip.height),
                scale: 1.0,
            })
            .build();
        self.screenshot(params).await
    }

    async fn capture_viewport(&mut self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .from_surface(true)
            .capture_beyond_viewport(false)
            .build();
        self.screenshot(params).await
    }

    async fn capture_diagnostic(&mut self) -> Result<Vec<u8>> {
        self.capture_full_page().await
    }
}

impl std::fmt::Debug for CdpRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpRenderer")
            .field("viewport", &self.viewport)
            .field("device_pixel_ratio", &self.device_pixel_ratio)
            .finish_non_exhaustive()
    }
}
