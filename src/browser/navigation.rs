//! Page navigation functionality
//!
//! This module handles URL navigation with retry logic, timeout handling,
//! and waiting for elements to appear.

use crate::browser::PageHandle;
use crate::error::{Error, NavigationError, Result};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Options for page navigation
#[derive(Debug, Clone)]
pub struct NavigationOptions {
    /// Timeout in milliseconds (default: 120000)
    pub timeout_ms: u64,
    /// Wait until condition (default: DOMContentLoaded)
    pub wait_until: WaitUntil,
    /// Number of retry attempts (default: 2)
    pub retries: u32,
    /// Delay between retries in ms (default: 1000)
    pub retry_delay_ms: u64,
    /// Extra render time after the wait condition, for client-side apps (default: 5000)
    pub settle_ms: u64,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            wait_until: WaitUntil::DomContentLoaded,
            retries: 2,
            retry_delay_ms: 1000,
            settle_ms: 5000,
        }
    }
}

/// Condition to wait for after navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    /// Wait until load event fires
    Load,
    /// Wait until DOMContentLoaded event fires
    DomContentLoaded,
    /// Wait until load, then a short quiet period
    NetworkIdle,
}

/// Result of a navigation operation
#[derive(Debug)]
pub struct NavigationResult {
    /// Final URL after any redirects
    pub final_url: String,
    /// Page title
    pub title: Option<String>,
    /// Navigation duration in milliseconds
    pub duration_ms: u64,
}

/// URL validation utilities
pub struct UrlValidator;

impl UrlValidator {
    /// Maximum accepted URL length
    pub const MAX_LEN: usize = 2048;

    /// Validate a URL for navigation
    pub fn validate(url: &str) -> std::result::Result<Url, String> {
        if url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }

        if url.len() > Self::MAX_LEN {
            return Err(format!(
                "URL exceeds maximum length of {} characters",
                Self::MAX_LEN
            ));
        }

        let parsed = Url::parse(url).map_err(|e| format!("URL is malformed: {} ({})", url, e))?;
        match parsed.scheme() {
            "http" | "https" | "file" => Ok(parsed),
            other => Err(format!(
                "URL must start with http://, https://, or file://: {} (scheme {})",
                url, other
            )),
        }
    }
}

/// Page navigator with retrying navigation
pub struct PageNavigator;

impl PageNavigator {
    /// Navigate to a URL
    #[instrument(skip(page, options))]
    pub async fn goto(
        page: &PageHandle,
        url: &str,
        options: Option<NavigationOptions>,
    ) -> Result<NavigationResult> {
        let opts = options.unwrap_or_default();
        let start = std::time::Instant::now();

        UrlValidator::validate(url).map_err(NavigationError::InvalidUrl)?;

        info!("Navigating to: {}", url);

        let mut last_error = None;
        for attempt in 0..=opts.retries {
            if attempt > 0 {
                warn!("Navigation retry attempt {} of {}", attempt, opts.retries);
                tokio::time::sleep(Duration::from_millis(opts.retry_delay_ms)).await;
            }

            match Self::navigate_once(&page.page, url, &opts).await {
                Ok(result) => {
                    page.set_url(result.final_url.clone()).await;

                    if opts.settle_ms > 0 {
                        debug!("Letting the page render for {}ms", opts.settle_ms);
                        tokio::time::sleep(Duration::from_millis(opts.settle_ms)).await;
                    }

                    let duration_ms = start.elapsed().as_millis() as u64;
                    return Ok(NavigationResult {
                        duration_ms,
                        ..result
                    });
                }
                Err(e) => {
                    warn!("Navigation attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            NavigationError::LoadFailed("Navigation failed after all retries".to_string()).into()
        }))
    }

    /// Perform a single navigation attempt
    async fn navigate_once(
        page: &chromiumoxide::Page,
        url: &str,
        opts: &NavigationOptions,
    ) -> Result<NavigationResult> {
        let timeout = Duration::from_millis(opts.timeout_ms);

        tokio::time::timeout(timeout, page.goto(url))
            .await
            .map_err(|_| NavigationError::Timeout(opts.timeout_ms))?
            .map_err(|e| NavigationError::LoadFailed(e.to_string()))?;

        Self::wait_for_ready(page, opts).await?;

        let final_url = page
            .url()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?
            .unwrap_or_else(|| url.to_string());

        let title = page
            .evaluate("document.title")
            .await
            .ok()
            .and_then(|v| v.into_value::<String>().ok());

        debug!("Navigation complete: {} -> {}", url, final_url);

        Ok(NavigationResult {
            final_url,
            title,
            duration_ms: 0,
        })
    }

    /// Wait for page to be ready based on wait_until condition
    async fn wait_for_ready(page: &chromiumoxide::Page, opts: &NavigationOptions) -> Result<()> {
        let script = match opts.wait_until {
            WaitUntil::Load => {
                r#"
                    new Promise(resolve => {
                        if (document.readyState === 'complete') {
                            resolve(true);
                        } else {
                            window.addEventListener('load', () => resolve(true));
                        }
                    })
                "#
            }
            WaitUntil::DomContentLoaded => {
                r#"
                    new Promise(resolve => {
                        if (document.readyState !== 'loading') {
                            resolve(true);
                        } else {
                            document.addEventListener('DOMContentLoaded', () => resolve(true));
                        }
                    })
                "#
            }
            WaitUntil::NetworkIdle => {
                r#"
                    new Promise(resolve => {
                        if (document.readyState === 'complete') {
                            setTimeout(() => resolve(true), 500);
                        } else {
                            window.addEventListener('load', () => {
                                setTimeout(() => resolve(true), 500);
                            });
                        }
                    })
                "#
            }
        };

        let timeout = Duration::from_millis(opts.timeout_ms);
        tokio::time::timeout(timeout, page.evaluate(script))
            .await
            .map_err(|_| NavigationError::Timeout(opts.timeout_ms))?
            .map_err(|e| Error::cdp(e.to_string()))?;

        Ok(())
    }

    /// Reload the current page and wait for DOMContentLoaded
    #[instrument(skip(page))]
    pub async fn reload(page: &PageHandle) -> Result<()> {
        page.page
            .reload()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        let opts = NavigationOptions::default();
        Self::wait_for_ready(&page.page, &opts).await
    }

    /// Wait for an element matching `selector` to be rendered with a non-empty box
    #[instrument(skip(page))]
    pub async fn wait_for_selector(
        page: &PageHandle,
        selector: &str,
        timeout_ms: u64,
    ) -> Result<()> {
        let script = format!(
            r#"
                new Promise((resolve, reject) => {{
                    const timeout = {};
                    const start = Date.now();

                    function check() {{
                        const el = document.querySelector({});
                        const r = el ? el.getBoundingClientRect() : null;
                        if (r && r.width > 0 && r.height > 0) {{
                            resolve(true);
                        }} else if (Date.now() - start > timeout) {{
                            reject(new Error('Timeout waiting for selector'));
                        }} else {{
                            setTimeout(check, 100);
                        }}
                    }}
                    check();
                }})
            "#,
            timeout_ms,
            js_string(selector)
        );

        let timeout = Duration::from_millis(timeout_ms + 1000);
        tokio::time::timeout(timeout, page.page.evaluate(script.as_str()))
            .await
            .map_err(|_| NavigationError::Timeout(timeout_ms))?
            .map_err(|_| NavigationError::Timeout(timeout_ms))?;

        Ok(())
    }
}

/// Quote a value as a JavaScript string literal
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
