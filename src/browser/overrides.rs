//! Page overrides applied around a capture
//!
//! Style sheets are injected with a marker comment so they can be found and
//! removed later. Fixed and sticky page chrome (headers, footers, floating
//! bars) is hidden while capturing so it does not repeat in every image, and
//! elements are tagged so the change can be undone exactly.

use crate::browser::navigation::js_string;
use crate::browser::CdpRenderer;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Attribute set on elements hidden by [`FixedChrome::hide`]
pub const HIDDEN_ATTR: &str = "data-gridshot-hidden";

/// Minimum size of a fixed element to be treated as page chrome, CSS pixels
const CHROME_MIN_HEIGHT: u32 = 40;
const CHROME_MIN_WIDTH: u32 = 200;

/// Marker comment that tags an injected style sheet
pub fn style_marker(marker: &str) -> String {
    format!("/*__{}__*/", marker)
}

/// Style sheet injection and removal
pub struct StyleOverrides;

impl StyleOverrides {
    /// Append a `<style>` element tagged with `marker`
    #[instrument(skip(renderer, css))]
    pub async fn add(renderer: &CdpRenderer, marker: &str, css: &str) -> Result<()> {
        let content = format!("{}\n{}", style_marker(marker), css);
        let script = format!(
            r#"(() => {{
                const style = document.createElement('style');
                style.textContent = {};
                (document.head || document.documentElement).appendChild(style);
                return true;
            }})()"#,
            js_string(&content)
        );
        renderer.evaluate::<bool>(&script).await?;
        debug!("Injected style {}", marker);
        Ok(())
    }

    /// Remove every `<style>` element tagged with `marker`; returns how many
    #[instrument(skip(renderer))]
    pub async fn remove(renderer: &CdpRenderer, marker: &str) -> Result<usize> {
        let script = format!(
            r#"(() => {{
                const tag = {};
                let n = 0;
                for (const s of Array.from(document.querySelectorAll('style'))) {{
                    if ((s.textContent || '').includes(tag)) {{
                        s.remove();
                        n += 1;
                    }}
                }}
                return n;
            }})()"#,
            js_string(&style_marker(marker))
        );
        renderer.evaluate(&script).await
    }

    /// CSS forcing the item list into `columns` equal columns
    pub fn grid_columns_css(
        list_selector: &str,
        item_selector: &str,
        columns: u32,
        gap_px: u32,
    ) -> String {
        format!(
            "{list}{{\n  display: grid !important;\n  grid-template-columns: repeat({columns}, 1fr) !important;\n  gap: {gap_px}px !important;\n  align-items: stretch !important;\n}}\n{item}{{ width: 100% !important; }}\n",
            list = list_selector,
            item = item_selector,
        )
    }
}

/// Fixed and sticky page chrome
pub struct FixedChrome;

impl FixedChrome {
    /// Hide visible fixed/sticky elements at least 40x200 px. Elements inside
    /// the item list (the parent of the first `item_selector` match) are kept.
    /// Previously hidden elements are restored first. Returns how many were hidden.
    #[instrument(skip(renderer))]
    pub async fn hide(renderer: &CdpRenderer, item_selector: Option<&str>) -> Result<usize> {
        let item_selector = item_selector
            .map(js_string)
            .unwrap_or_else(|| "null".to_string());
        let script = format!(
            r#"(() => {{
                const attr = {attr};
                for (const el of Array.from(document.querySelectorAll('[' + attr + ']'))) {{
                    el.style.visibility = '';
                    el.removeAttribute(attr);
                }}

                const itemSel = {item_selector};
                const anyItem = itemSel ? document.querySelector(itemSel) : null;
                const itemRoot = anyItem ? (anyItem.closest('.product-list') || anyItem.parentElement) : null;

                let n = 0;
                for (const el of Array.from(document.querySelectorAll('*'))) {{
                    if (!(el instanceof HTMLElement)) continue;
                    const st = getComputedStyle(el);
                    if (st.position !== 'fixed' && st.position !== 'sticky') continue;
                    if (st.display === 'none' || st.visibility === 'hidden' || st.opacity === '0') continue;
                    if (itemRoot && itemRoot.contains(el)) continue;
                    const r = el.getBoundingClientRect();
                    if (r.height < {min_h} || r.width < {min_w}) continue;
                    el.setAttribute(attr, '1');
                    el.style.visibility = 'hidden';
                    n += 1;
                }}
                return n;
            }})()"#,
            attr = js_string(HIDDEN_ATTR),
            item_selector = item_selector,
            min_h = CHROME_MIN_HEIGHT,
            min_w = CHROME_MIN_WIDTH,
        );
        let hidden: usize = renderer.evaluate(&script).await?;
        debug!("Hid {} fixed/sticky elements", hidden);
        Ok(hidden)
    }

    /// Undo [`FixedChrome::hide`]; returns how many elements were restored
    #[instrument(skip(renderer))]
    pub async fn restore(renderer: &CdpRenderer) -> Result<usize> {
        let script = format!(
            r#"(() => {{
                const attr = {};
                let n = 0;
                for (const el of Array.from(document.querySelectorAll('[' + attr + ']'))) {{
                    el.style.visibility = '';
                    el.removeAttribute(attr);
                    n += 1;
                }}
                return n;
            }})()"#,
            js_string(HIDDEN_ATTR)
        );
        renderer.evaluate(&script).await
    }
}

/// The element chosen by [`detect_scroll_container`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollerInfo {
    /// Tag name
    pub tag: String,
    /// Element id, empty when absent
    pub id: String,
    /// Class attribute
    pub class_name: String,
    /// Full scrollable extent
    pub scroll_height: f64,
    /// Visible extent
    pub client_height: f64,
}

impl ScrollerInfo {
    /// Scrollable distance
    pub fn delta(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }
}

/// Pick the element most likely to scroll the page content and remember it
/// for [`ScrollContainer::Auto`](crate::engine::ScrollContainer::Auto).
///
/// Candidates have `overflow-y` auto or scroll, a client height of at least
/// 200 px and more than 300 px to scroll; the one with the largest scrollable
/// distance wins over the document scrolling element.
#[instrument(skip(renderer))]
pub async fn detect_scroll_container(renderer: &CdpRenderer) -> Result<ScrollerInfo> {
    let script = r#"(() => {
        const isScrollable = (el) => {
            const oy = getComputedStyle(el).overflowY;
            return (oy === 'auto' || oy === 'scroll') && el.scrollHeight - el.clientHeight > 300;
        };

        let best = document.scrollingElement || document.documentElement;
        let bestDelta = (best.scrollHeight - best.clientHeight) || 0;

        for (const el of Array.from(document.querySelectorAll('*'))) {
            if (!(el instanceof HTMLElement)) continue;
            if (el.clientHeight < 200) continue;
            if (!isScrollable(el)) continue;
            const delta = el.scrollHeight - el.clientHeight;
            if (delta > bestDelta) {
                best = el;
                bestDelta = delta;
            }
        }

        window.__gridshot_scroller = best;
        return {
            tag: best.tagName,
            id: best.id || '',
            className: (best.className && best.className.toString) ? best.className.toString() : '',
            scrollHeight: best.scrollHeight,
            clientHeight: best.clientHeight
        };
    })()"#;
    let info: ScrollerInfo = renderer.evaluate(script).await?;
    info!(
        "Using scroll container <{}> id={:?} class={:?} (scrollable {}px)",
        info.tag,
        info.id,
        info.class_name,
        info.delta()
    );
    Ok(info)
}
