//! Page automation capability.
//!
//! The analyzer and detectors only talk to a [`Page`]. The production
//! implementation in [`chromium`] drives Chrome over the DevTools protocol;
//! tests substitute an in-memory page.

mod chromium;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BrowserConfig;
use crate::error_handling::BrowserError;
use crate::models::{ContentAnalyzable, ElementBox};

pub use chromium::ChromiumLauncher;

/// Init script recording `navigator.credentials` calls into `window.__navcredCalls`.
pub const NAVCRED_TRACKER_JS: &str = include_str!("js/navcred_tracker.js");

/// Expression returning the calls recorded by [`NAVCRED_TRACKER_JS`].
pub const NAVCRED_CALLS_EXPR: &str = "window.__navcredCalls || []";

/// Expression telling whether the WebAuthn API is available in the page.
pub const WEBAUTHN_AVAILABLE_EXPR: &str = "typeof PublicKeyCredential !== 'undefined' && !!navigator.credentials && typeof navigator.credentials.create === 'function' && typeof navigator.credentials.get === 'function'";

/// Init script silencing blocking dialogs.
pub const DIALOG_OVERRIDES_JS: &str =
    "window.alert = () => {}; window.confirm = () => {}; window.prompt = () => {}; window.print = () => {};";

/// Extension directory name of the LastPass extension under the extensions path.
pub const LASTPASS_EXTENSION: &str = "lastpass";

/// Result of a navigation or reload.
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    /// URL after redirects
    pub url: String,
    /// HTTP status of the main document, when the browser reports one
    pub status: Option<u16>,
}

impl Navigation {
    pub fn is_success(&self) -> bool {
        self.status.is_none_or(|s| (200..400).contains(&s))
    }
}

/// A DOM element reduced to what detectors need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub bounding_box: Option<ElementBox>,
    #[serde(default)]
    pub visible: bool,
}

impl ElementInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Visible text plus the attributes that usually carry a label.
    pub fn label(&self) -> String {
        let mut parts = vec![self.text.as_str()];
        for name in ["aria-label", "title", "alt", "value", "data-provider", "id", "class", "href"] {
            if let Some(v) = self.attr(name) {
                parts.push(v);
            }
        }
        parts.join(" ")
    }
}

/// The main document or one iframe of a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub url: String,
    /// Serialized document; `None` for cross-origin frames
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// A request issued by the page while capture was active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub url: String,
    pub method: String,
    pub post_data: Option<String>,
}

/// A browser tab as seen by the analyzer.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigates and waits for the configured settle period.
    async fn navigate(&self, url: &str) -> Result<Navigation, BrowserError>;

    /// Reloads and waits for the configured settle period.
    async fn reload(&self) -> Result<Navigation, BrowserError>;

    async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError>;

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementInfo>, BrowserError>;

    /// PNG screenshot of the full page.
    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    async fn content(&self) -> Result<String, BrowserError>;

    async fn url(&self) -> Result<String, BrowserError>;

    async fn title(&self) -> Result<Option<String>, BrowserError>;

    /// `document.contentType` of the main frame.
    async fn content_type(&self) -> Result<Option<String>, BrowserError>;

    /// Main frame first, then iframes in document order.
    async fn frames(&self) -> Result<Vec<FrameInfo>, BrowserError>;

    /// Registers a script run in every new document before page scripts.
    async fn add_init_script(&self, source: &str) -> Result<(), BrowserError>;

    /// Clears the capture buffer and starts recording requests.
    async fn start_request_capture(&self) -> Result<(), BrowserError>;

    /// Stops recording and returns what was captured since the last start.
    async fn take_captured_requests(&self) -> Vec<CapturedRequest>;

    /// Clicks a viewport point. Returns `true` if a popup opened within `popup_timeout`.
    ///
    /// Requests of the popup join the capture buffer, starting with its opening URL.
    async fn click_at(&self, x: f64, y: f64, popup_timeout: Duration) -> Result<bool, BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// Everything needed to start a browser for one task.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub browser: BrowserConfig,
    pub chrome_path: Option<PathBuf>,
    pub user_data_dir: PathBuf,
    /// Unpacked extension directories
    pub extension_dirs: Vec<PathBuf>,
    /// Sources registered with [`Page::add_init_script`] right after launch
    pub init_scripts: Vec<String>,
}

/// Starts a browser and hands out its page.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Page>, BrowserError>;
}

/// Compresses a PNG with zlib and encodes it as base64.
pub fn encode_screenshot(png: &[u8]) -> std::io::Result<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(png)?;
    let compressed = encoder.finish()?;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Decides whether a loaded page can be inspected by DOM detectors.
pub fn content_analyzable(url: &str, content_type: Option<&str>) -> ContentAnalyzable {
    let error = if url == "about:blank" {
        Some("page is about:blank")
    } else {
        match content_type {
            None => Some("could not determine content type of page"),
            Some(ct) if !ct.to_lowercase().contains("html") => Some("content type of page is not html"),
            Some(_) => None,
        }
    };
    ContentAnalyzable {
        valid: error.is_none(),
        error: error.map(str::to_string),
    }
}
