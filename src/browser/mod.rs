//! Browser automation module
//!
//! This module drives a real Chromium through ChromiumOxide: lifecycle
//! management, navigation, page overrides, and the live [`Renderer`] and
//! [`Navigator`] the capture engine runs against.
//!
//! [`Renderer`]: crate::engine::Renderer
//! [`Navigator`]: crate::engine::Navigator

pub mod controller;
pub mod locale;
pub mod navigation;
pub mod overrides;
pub mod renderer;

pub use controller::{BrowserConfig, BrowserController, PageHandle};
pub use locale::{CdpLocaleNavigator, LocaleOptions, DEFAULT_LOCALES};
pub use navigation::{NavigationOptions, NavigationResult, PageNavigator, UrlValidator, WaitUntil};
pub use overrides::{detect_scroll_container, FixedChrome, ScrollerInfo, StyleOverrides};
pub use renderer::CdpRenderer;
