//! Chrome DevTools Protocol implementation of [`Page`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventRequestWillBeSent, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::error::CdpError;
use chromiumoxide::layout::Point;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::task::JoinHandle;

use super::{
    BrowserLauncher, CapturedRequest, ElementInfo, FrameInfo, LaunchOptions, Navigation, Page,
};
use crate::config::analysis::BrowserEngine;
use crate::config::{BrowserConfig, MAX_CLICKABLES};
use crate::error_handling::BrowserError;

const COLLECT_ELEMENTS_JS: &str = include_str!("js/collect_elements.js");
const COLLECT_FRAMES_JS: &str = include_str!("js/collect_frames.js");
const NAVIGATION_STATUS_JS: &str = "(() => { const e = performance.getEntriesByType('navigation')[0]; return e && e.responseStatus ? e.responseStatus : null; })()";
const RESOURCE_COUNT_JS: &str = "performance.getEntriesByType('resource').length";
const NETWORK_IDLE_POLL: Duration = Duration::from_millis(500);
const POPUP_POLL: Duration = Duration::from_millis(100);

fn protocol(e: CdpError) -> BrowserError {
    match e {
        CdpError::Timeout => BrowserError::Timeout,
        other => BrowserError::Protocol(other.to_string()),
    }
}

/// Launches Chromium through `chromiumoxide`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Page>, BrowserError> {
        let cfg = &options.browser;
        if cfg.name != BrowserEngine::Chromium {
            warn!("Browser engine {:?} is not supported, using Chromium", cfg.name);
        }

        let mut builder = ChromeConfig::builder()
            .window_size(cfg.width, cfg.height)
            .user_data_dir(&options.user_data_dir)
            .request_timeout(Duration::from_secs(cfg.timeout_default))
            .arg(format!("--lang={}", cfg.locale));
        if !cfg.headless {
            builder = builder.with_head();
        } else if !options.extension_dirs.is_empty() {
            // Extensions only load in the new headless mode
            builder = builder.new_headless_mode();
        }
        if let Some(path) = &options.chrome_path {
            builder = builder.chrome_executable(path);
        }
        for dir in &options.extension_dirs {
            builder = builder.extension(dir.to_string_lossy().to_string());
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        info!("Launching Chromium ({}x{}, headless={})", cfg.width, cfg.height, cfg.headless);
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(BrowserError::Launch(e.to_string()));
            }
        };
        page.set_user_agent(SetUserAgentOverrideParams::new(cfg.user_agent.clone()))
            .await
            .map_err(protocol)?;

        let capture = Arc::new(RequestCapture::default());
        let listener = spawn_request_listener(&page, Arc::clone(&capture)).await?;

        let chromium_page = ChromiumPage {
            browser: tokio::sync::Mutex::new(browser),
            page,
            handler,
            listener,
            popup_listeners: Mutex::new(Vec::new()),
            capture,
            config: cfg.clone(),
        };
        for script in &options.init_scripts {
            chromium_page.add_init_script(script).await?;
        }
        Ok(Box::new(chromium_page))
    }
}

/// Enables network events on `page` and records its requests into `capture`.
async fn spawn_request_listener(
    page: &chromiumoxide::Page,
    capture: Arc<RequestCapture>,
) -> Result<JoinHandle<()>, BrowserError> {
    page.execute(EnableParams::default()).await.map_err(protocol)?;
    let mut events = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(protocol)?;
    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let entries = event.request.post_data_entries.iter().flatten();
            let post_data = decode_post_entries(
                entries
                    .filter_map(|entry| entry.bytes.as_ref())
                    .map(|b| AsRef::<str>::as_ref(b)),
            );
            capture.record(CapturedRequest {
                url: event.request.url.clone(),
                method: event.request.method.clone(),
                post_data,
            });
        }
    }))
}

/// Joins base64-encoded request body entries into one body.
///
/// Entries that are not valid base64 are skipped. Returns `None` when nothing decoded.
fn decode_post_entries<'a>(entries: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut body = Vec::new();
    for entry in entries {
        match base64::engine::general_purpose::STANDARD.decode(entry) {
            Ok(bytes) => body.extend(bytes),
            Err(e) => debug!("Skipping undecodable post data entry: {}", e),
        }
    }
    if body.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&body).into_owned())
    }
}

#[derive(Default)]
struct RequestCapture {
    active: AtomicBool,
    requests: Mutex<Vec<CapturedRequest>>,
}

impl RequestCapture {
    fn record(&self, request: CapturedRequest) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
    }
}

/// One Chromium instance with a single tab.
pub struct ChromiumPage {
    browser: tokio::sync::Mutex<Browser>,
    page: chromiumoxide::Page,
    handler: JoinHandle<()>,
    listener: JoinHandle<()>,
    /// Request listeners of popups opened by [`Page::click_at`]
    popup_listeners: Mutex<Vec<JoinHandle<()>>>,
    capture: Arc<RequestCapture>,
    config: BrowserConfig,
}

impl ChromiumPage {
    async fn wait_for_page_load(&self) {
        let cfg = &self.config;
        debug!("Sleeping {}s after onload", cfg.sleep_after_onload);
        tokio::time::sleep(Duration::from_secs(cfg.sleep_after_onload)).await;
        if !cfg.wait_for_networkidle {
            return;
        }

        let deadline = Instant::now() + Duration::from_secs(cfg.timeout_networkidle);
        let mut last = None;
        loop {
            let count = self.evaluate(RESOURCE_COUNT_JS).await.ok().and_then(|v| v.as_u64());
            if count.is_some() && count == last {
                debug!("Page is on networkidle, sleeping {}s", cfg.sleep_after_networkidle);
                tokio::time::sleep(Duration::from_secs(cfg.sleep_after_networkidle)).await;
                return;
            }
            if Instant::now() >= deadline {
                debug!("Timeout after {}s while waiting for networkidle", cfg.timeout_networkidle);
                return;
            }
            last = count;
            tokio::time::sleep(NETWORK_IDLE_POLL).await;
        }
    }

    async fn target_ids(&self) -> Result<HashSet<TargetId>, BrowserError> {
        let pages = self.browser.lock().await.pages().await.map_err(protocol)?;
        Ok(pages.iter().map(|p| p.target_id().clone()).collect())
    }

    /// Starts capturing the requests of a popup; its opening URL counts as the first.
    async fn follow_popup(&self, popup: chromiumoxide::Page) {
        if let Ok(Some(url)) = popup.url().await {
            info!("Popup opened: {}", url);
            self.capture.record(CapturedRequest {
                url,
                method: "GET".to_string(),
                post_data: None,
            });
        }
        match spawn_request_listener(&popup, Arc::clone(&self.capture)).await {
            Ok(listener) => {
                if let Ok(mut listeners) = self.popup_listeners.lock() {
                    listeners.push(listener);
                }
            }
            Err(e) => debug!("Could not follow popup requests: {}", e),
        }
    }

    fn abort_listeners(&self) {
        self.listener.abort();
        if let Ok(mut listeners) = self.popup_listeners.lock() {
            for listener in listeners.drain(..) {
                listener.abort();
            }
        }
        self.handler.abort();
    }

    async fn navigation_outcome(&self) -> Result<Navigation, BrowserError> {
        let url = self.url().await?;
        let status = self
            .evaluate(NAVIGATION_STATUS_JS)
            .await
            .ok()
            .and_then(|v| v.as_u64())
            .and_then(|s| u16::try_from(s).ok());
        Ok(Navigation { url, status })
    }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<Navigation, BrowserError> {
        info!("Page loads url: {}", url);
        let timeout = Duration::from_secs(self.config.timeout_navigation);
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Err(_) => return Err(BrowserError::Timeout),
            Ok(Err(CdpError::Timeout)) => return Err(BrowserError::Timeout),
            Ok(Err(e)) => return Err(BrowserError::Navigation(e.to_string())),
            Ok(Ok(_)) => {}
        }
        self.wait_for_page_load().await;
        self.navigation_outcome().await
    }

    async fn reload(&self) -> Result<Navigation, BrowserError> {
        info!("Page reload");
        let timeout = Duration::from_secs(self.config.timeout_navigation);
        match tokio::time::timeout(timeout, self.page.reload()).await {
            Err(_) => return Err(BrowserError::Timeout),
            Ok(Err(e)) => return Err(protocol(e)),
            Ok(Ok(_)) => {}
        }
        self.wait_for_page_load().await;
        self.navigation_outcome().await
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementInfo>, BrowserError> {
        let selector = serde_json::to_string(selector)
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?;
        let expression = format!("({})({}, {})", COLLECT_ELEMENTS_JS.trim(), selector, MAX_CLICKABLES);
        let value = self.evaluate(&expression).await?;
        serde_json::from_value(value).map_err(|e| BrowserError::Evaluation(e.to_string()))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page.screenshot(params).await.map_err(protocol)
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.page.content().await.map_err(protocol)
    }

    async fn url(&self) -> Result<String, BrowserError> {
        Ok(self
            .page
            .url()
            .await
            .map_err(protocol)?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn title(&self) -> Result<Option<String>, BrowserError> {
        self.page.get_title().await.map_err(protocol)
    }

    async fn content_type(&self) -> Result<Option<String>, BrowserError> {
        Ok(self
            .evaluate("document.contentType")
            .await?
            .as_str()
            .map(str::to_string))
    }

    async fn frames(&self) -> Result<Vec<FrameInfo>, BrowserError> {
        let value = self.evaluate(COLLECT_FRAMES_JS).await?;
        serde_json::from_value(value).map_err(|e| BrowserError::Evaluation(e.to_string()))
    }

    async fn add_init_script(&self, source: &str) -> Result<(), BrowserError> {
        self.page
            .evaluate_on_new_document(source.to_string())
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn start_request_capture(&self) -> Result<(), BrowserError> {
        if let Ok(mut requests) = self.capture.requests.lock() {
            requests.clear();
        }
        self.capture.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn take_captured_requests(&self) -> Vec<CapturedRequest> {
        self.capture.active.store(false, Ordering::SeqCst);
        match self.capture.requests.lock() {
            Ok(mut requests) => std::mem::take(&mut *requests),
            Err(_) => Vec::new(),
        }
    }

    async fn click_at(&self, x: f64, y: f64, popup_timeout: Duration) -> Result<bool, BrowserError> {
        let before = self.target_ids().await?;
        info!("Clicking on coordinate ({}, {})", x, y);
        self.page.click(Point::new(x, y)).await.map_err(protocol)?;

        let deadline = Instant::now() + popup_timeout;
        loop {
            let pages = self.browser.lock().await.pages().await.map_err(protocol)?;
            if let Some(popup) = pages.into_iter().find(|p| !before.contains(p.target_id())) {
                self.follow_popup(popup).await;
                return Ok(true);
            }
            if Instant::now() >= deadline {
                debug!("No popup within {:?}", popup_timeout);
                return Ok(false);
            }
            tokio::time::sleep(POPUP_POLL).await;
        }
    }

    async fn close(&self) -> Result<(), BrowserError> {
        info!("Closing browser");
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await.map_err(protocol);
        if let Err(e) = browser.wait().await {
            debug!("Browser process did not exit cleanly: {}", e);
        }
        self.abort_listeners();
        closed.map(|_| ())
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.abort_listeners();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_post_entries_joins_chunks() {
        // "username=al" + "ice&password=x"
        let body = decode_post_entries(["dXNlcm5hbWU9YWw=", "aWNlJnBhc3N3b3JkPXg="].into_iter());
        assert_eq!(body.as_deref(), Some("username=alice&password=x"));
    }

    #[test]
    fn test_decode_post_entries_skips_garbage() {
        assert_eq!(decode_post_entries(std::iter::empty()), None);
        assert_eq!(decode_post_entries(["%%%"].into_iter()), None);
        assert_eq!(
            decode_post_entries(["%%%", "ZW1haWw9YQ=="].into_iter()).as_deref(),
            Some("email=a")
        );
    }
}
