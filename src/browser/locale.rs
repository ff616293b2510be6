//! Locale switching over the storefront "Location" modal
//!
//! The current locale is shown as a short code near the top-left corner of
//! the page. Clicking it opens a modal titled "Location" listing the codes;
//! clicking one reloads the catalog. Each switch is retried, dismissing the
//! modal and reloading the page between attempts.

use crate::browser::navigation::{js_string, PageNavigator};
use crate::browser::overrides::FixedChrome;
use crate::browser::CdpRenderer;
use crate::engine::{Navigator, Renderer, ScrollContainer, UnitStatus};
use crate::error::{Error, NavigationError, Result};
use chromiumoxide::layout::Point;
use tracing::{debug, info, instrument, warn};

/// Locale codes a storefront shows by default
pub const DEFAULT_LOCALES: [&str; 8] = ["US", "UK", "DE", "FR", "IT", "ES", "CA", "JP"];

/// Settings for [`CdpLocaleNavigator`]
#[derive(Debug, Clone)]
pub struct LocaleOptions {
    /// Every code that may label the current locale
    pub codes: Vec<String>,
    /// Catalog item selector
    pub item_selector: String,
    /// Modal title text
    pub heading: String,
    /// Selector of an "empty catalog" placeholder
    pub empty_selector: String,
    /// Attempts per switch (default: 3)
    pub switch_retries: u32,
    /// How long to wait for the first item after switching (default: 120000)
    pub item_visible_timeout_ms: u64,
    /// How long to wait for the modal to open (default: 20000)
    pub modal_timeout_ms: u64,
    /// Extra settle time after a switch (default: 2500)
    pub after_switch_ms: u64,
    /// Leave fixed/sticky chrome visible while capturing
    pub keep_fixed: bool,
}

impl Default for LocaleOptions {
    fn default() -> Self {
        Self {
            codes: DEFAULT_LOCALES.iter().map(|c| c.to_string()).collect(),
            item_selector: ".product-item".to_string(),
            heading: "Location".to_string(),
            empty_selector: ".van-empty, .empty, [class*='empty']".to_string(),
            switch_retries: 3,
            item_visible_timeout_ms: 120_000,
            modal_timeout_ms: 20_000,
            after_switch_ms: 2500,
            keep_fixed: false,
        }
    }
}

/// [`Navigator`] that switches locales through the page's Location modal
#[derive(Debug, Clone, Default)]
pub struct CdpLocaleNavigator {
    options: LocaleOptions,
}

impl CdpLocaleNavigator {
    /// Navigator with the given options
    pub fn new(options: LocaleOptions) -> Self {
        Self { options }
    }

    /// Options in use
    pub fn options(&self) -> &LocaleOptions {
        &self.options
    }

    async fn attempt(&self, renderer: &mut CdpRenderer, key: &str) -> Result<UnitStatus> {
        self.open_modal(renderer).await?;
        self.choose(renderer, key).await?;
        self.wait_items_or_empty(renderer).await
    }

    /// Click the current-locale label, falling back to probing the header area
    async fn open_modal(&self, renderer: &mut CdpRenderer) -> Result<()> {
        renderer.scroll_to(&ScrollContainer::Document, 0.0).await?;
        renderer.wait_settle(500).await;

        let codes = serde_json::to_string(&self.options.codes)?;
        let script = format!(
            r#"(() => {{
                const codes = {};
                const candidates = [];
                for (const el of Array.from(document.querySelectorAll('*'))) {{
                    const t = (el.textContent || '').trim();
                    if (!codes.includes(t)) continue;
                    const r = el.getBoundingClientRect();
                    const st = getComputedStyle(el);
                    if (r.width <= 0 || r.height <= 0 || st.visibility === 'hidden' || st.display === 'none') continue;
                    if (r.left < 320 && r.top < 140 && r.right > 0 && r.bottom > 0) candidates.push({{ el, r }});
                }}
                candidates.sort((a, b) => (a.r.top - b.r.top) || (a.r.left - b.r.left));
                if (!candidates.length) return false;
                candidates[0].el.click();
                return true;
            }})()"#,
            codes
        );
        let clicked: bool = renderer.evaluate(&script).await?;

        if !clicked {
            debug!("No locale label found, probing the header area");
            'scan: for y in (20..=110).step_by(15) {
                for x in (20..=240).step_by(20) {
                    let point = Point {
                        x: f64::from(x),
                        y: f64::from(y),
                    };
                    if renderer.page().inner().click(point).await.is_err() {
                        continue;
                    }
                    if self.heading_visible(renderer).await? {
                        break 'scan;
                    }
                    renderer.wait_settle(120).await;
                }
            }
        }

        if !self
            .wait_heading(renderer, true, self.options.modal_timeout_ms)
            .await?
        {
            return Err(NavigationError::Timeout(self.options.modal_timeout_ms).into());
        }
        Ok(())
    }

    /// Click `key` inside the open modal and wait for the catalog to reload
    async fn choose(&self, renderer: &mut CdpRenderer, key: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const heading = {heading};
                const code = {code};
                const visible = (el) => el.getBoundingClientRect().height > 0;
                const title = Array.from(document.querySelectorAll('*'))
                    .find((el) => (el.textContent || '').trim() === heading && visible(el));
                const container = title
                    ? (title.closest('.van-popup') || title.closest('.van-dialog')
                        || title.closest("[role='dialog']") || title.parentElement)
                    : null;
                const scope = container || document;
                const target = Array.from(scope.querySelectorAll('*'))
                    .find((el) => (el.textContent || '').trim() === code && visible(el));
                if (!target) return false;
                target.click();
                return true;
            }})()"#,
            heading = js_string(&self.options.heading),
            code = js_string(key),
        );
        let chosen: bool = renderer.evaluate(&script).await?;
        if !chosen {
            return Err(NavigationError::SwitchFailed {
                key: key.to_string(),
                reason: format!("option {} not found in the {} modal", key, self.options.heading),
            }
            .into());
        }

        if !self.wait_heading(renderer, false, 15_000).await? {
            debug!("Modal still visible after choosing {}", key);
        }
        renderer.wait_settle(800).await;
        renderer.wait_network_quiet(8000).await;
        renderer.wait_settle(self.options.after_switch_ms).await;
        Ok(())
    }

    /// Wait for the first item; when none appears, decide whether the catalog is empty
    async fn wait_items_or_empty(&self, renderer: &mut CdpRenderer) -> Result<UnitStatus> {
        let waited = PageNavigator::wait_for_selector(
            renderer.page(),
            &self.options.item_selector,
            self.options.item_visible_timeout_ms,
        )
        .await;
        if waited.is_ok() {
            return Ok(UnitStatus::ready());
        }

        let script = format!(
            r#"(() => {{
                const el = document.querySelector({});
                if (!el) return false;
                const r = el.getBoundingClientRect();
                return r.width > 0 && r.height > 0;
            }})()"#,
            js_string(&self.options.empty_selector)
        );
        let empty_state = renderer.evaluate::<bool>(&script).await;
        let count = renderer.item_count(&self.options.item_selector).await;
        status_after_item_timeout(empty_state, count)
    }

    async fn heading_visible(&self, renderer: &CdpRenderer) -> Result<bool> {
        let script = format!(
            r#"Array.from(document.querySelectorAll('*')).some((el) =>
                (el.textContent || '').trim() === {} && el.getBoundingClientRect().height > 0)"#,
            js_string(&self.options.heading)
        );
        renderer.evaluate(&script).await
    }

    /// Poll until the heading's visibility equals `visible`; `false` on timeout
    async fn wait_heading(
        &self,
        renderer: &CdpRenderer,
        visible: bool,
        timeout_ms: u64,
    ) -> Result<bool> {
        let script = format!(
            r#"new Promise(resolve => {{
                const heading = {};
                const want = {};
                const deadline = Date.now() + {};
                const check = () => {{
                    const shown = Array.from(document.querySelectorAll('*')).some((el) =>
                        (el.textContent || '').trim() === heading && el.getBoundingClientRect().height > 0);
                    if (shown === want) return resolve(true);
                    if (Date.now() > deadline) return resolve(false);
                    setTimeout(check, 150);
                }};
                check();
            }})"#,
            js_string(&self.options.heading),
            visible,
            timeout_ms
        );
        renderer.evaluate(&script).await
    }

    /// Press Escape, then reload, so the next attempt starts clean
    async fn recover(&self, renderer: &mut CdpRenderer) {
        let escape = r#"(() => {
            const target = document.activeElement || document.body;
            for (const type of ['keydown', 'keyup']) {
                target.dispatchEvent(new KeyboardEvent(type, { key: 'Escape', code: 'Escape', bubbles: true }));
            }
            return true;
        })()"#;
        if let Err(e) = renderer.evaluate::<bool>(escape).await {
            debug!("Escape failed: {}", e);
        }
        renderer.wait_settle(800).await;
        if let Err(e) = PageNavigator::reload(renderer.page()).await {
            warn!("Reload failed: {}", e);
        }
        renderer.wait_settle(1200).await;
    }
}

impl Navigator<CdpRenderer> for CdpLocaleNavigator {
    #[instrument(skip(self, renderer))]
    async fn switch_unit(&mut self, renderer: &mut CdpRenderer, key: &str) -> Result<UnitStatus> {
        // Hidden chrome may contain the locale label.
        FixedChrome::restore(renderer).await?;
        renderer.scroll_to(&ScrollContainer::Document, 0.0).await?;
        renderer.wait_settle(700).await;

        let retries = self.options.switch_retries.max(1);
        let mut last_error: Option<Error> = None;
        for attempt in 1..=retries {
            match self.attempt(renderer, key).await {
                Ok(status) if status.ok => {
                    if status.empty {
                        info!("[{}] catalog looks empty", key);
                    }
                    return Ok(status);
                }
                Ok(_) => {
                    last_error = Some(
                        NavigationError::SwitchFailed {
                            key: key.to_string(),
                            reason: "no items appeared after switching".to_string(),
                        }
                        .into(),
                    );
                }
                Err(e) => last_error = Some(e),
            }

            if attempt < retries {
                if let Some(e) = &last_error {
                    warn!("[{}] switch attempt {}/{} failed: {}", key, attempt, retries, e);
                }
                self.recover(renderer).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            NavigationError::SwitchFailed {
                key: key.to_string(),
                reason: "no attempts made".to_string(),
            }
            .into()
        }))
    }

    async fn before_capture(&mut self, renderer: &mut CdpRenderer, key: &str) -> Result<()> {
        if self.options.keep_fixed {
            return Ok(());
        }
        let hidden = FixedChrome::hide(renderer, Some(&self.options.item_selector)).await?;
        debug!("[{}] hid {} chrome elements", key, hidden);
        renderer.wait_settle(400).await;
        Ok(())
    }

    async fn after_capture(&mut self, renderer: &mut CdpRenderer, _key: &str) -> Result<()> {
        FixedChrome::restore(renderer).await?;
        renderer.wait_settle(200).await;
        Ok(())
    }
}

/// Unit status once the first item never showed up. A visible placeholder or
/// zero items means an empty catalog; a failed page query fails the switch.
fn status_after_item_timeout(
    empty_state: Result<bool>,
    count: Result<usize>,
) -> Result<UnitStatus> {
    if empty_state? {
        return Ok(UnitStatus::empty());
    }
    let count = count?;
    debug!("No item became visible; {} in the DOM", count);
    if count == 0 {
        Ok(UnitStatus::empty())
    } else {
        Ok(UnitStatus::default())
    }
}
