//! Loading one login page and capturing its snapshot.

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::browser::{
    content_analyzable, encode_screenshot, Page, NAVCRED_CALLS_EXPR, WEBAUTHN_AVAILABLE_EXPR,
};
use crate::config::CLICKABLE_SELECTOR;
use crate::detectors::PageSnapshot;
use crate::models::{ContentAnalyzable, LoginPageCandidate, ResolvedOutcome};
use crate::utils::format_error_chain;

/// Outcome of loading one candidate URL, shared by every candidate with that URL.
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub resolved: ResolvedOutcome,
    pub content_type: Option<String>,
    pub content_analyzable: Option<ContentAnalyzable>,
    pub screenshot: Option<String>,
    /// Present only for reachable, analyzable pages
    pub snapshot: Option<PageSnapshot>,
}

impl PageAnalysis {
    fn unreachable(resolved: ResolvedOutcome) -> Self {
        Self {
            resolved,
            content_type: None,
            content_analyzable: None,
            screenshot: None,
            snapshot: None,
        }
    }

    /// Copies the shared outcome onto one provenance record.
    pub fn apply_to(&self, candidate: &mut LoginPageCandidate) {
        candidate.resolved = Some(self.resolved.clone());
        candidate.content_type = self.content_type.clone();
        candidate.content_analyzable = self.content_analyzable.clone();
        candidate.login_page_candidate_screenshot = self.screenshot.clone();
    }
}

#[derive(Debug, Deserialize)]
struct RecordedCall {
    function_name: String,
    #[serde(default)]
    function_params: Value,
}

async fn navcred_calls(page: &dyn Page) -> Vec<(String, Value)> {
    let value = match page.evaluate(NAVCRED_CALLS_EXPR).await {
        Ok(v) => v,
        Err(e) => {
            debug!("Could not read navigator.credentials calls: {}", e);
            return Vec::new();
        }
    };
    match serde_json::from_value::<Vec<RecordedCall>>(value) {
        Ok(calls) => calls
            .into_iter()
            .map(|c| (c.function_name, c.function_params))
            .collect(),
        Err(e) => {
            warn!("Unexpected navigator.credentials call record: {}", e);
            Vec::new()
        }
    }
}

/// Loads `url`, records its outcome, and captures a snapshot when analyzable.
///
/// # Arguments
///
/// * `page` - The browser tab shared by the analysis
/// * `url` - Normalized candidate URL
/// * `store_screenshot` - Whether to attach a compressed screenshot
pub async fn analyze_page(page: &dyn Page, url: &str, store_screenshot: bool) -> PageAnalysis {
    info!("Analyzing login page candidate {}", url);

    page.start_request_capture().await.ok();
    let navigation = page.navigate(url).await;
    let first_load_requests = page.take_captured_requests().await;

    let navigation = match navigation {
        Ok(nav) => nav,
        Err(e) => {
            warn!("Login page candidate {} unreachable: {}", url, e);
            return PageAnalysis::unreachable(ResolvedOutcome::unreachable(
                e.short_message(),
                Some(format_error_chain(&e)),
            ));
        }
    };
    // Login pages often answer 401 or 403 and still render a login form.
    if !navigation.is_success() {
        info!(
            "Login page candidate {} answered status {:?}, analyzing anyway",
            url, navigation.status
        );
    }

    let title = page.title().await.ok().flatten();
    let content_type = page.content_type().await.ok().flatten();
    let analyzable = content_analyzable(&navigation.url, content_type.as_deref());
    let mut analysis = PageAnalysis {
        resolved: ResolvedOutcome::reachable(&navigation.url, title).with_status(navigation.status),
        content_type: content_type.clone(),
        content_analyzable: Some(analyzable.clone()),
        screenshot: None,
        snapshot: None,
    };
    if !analyzable.valid {
        info!(
            "Login page candidate {} is not analyzable: {}",
            url,
            analyzable.error.as_deref().unwrap_or_default()
        );
        return analysis;
    }

    if store_screenshot {
        match page.screenshot().await {
            Ok(png) => match encode_screenshot(&png) {
                Ok(encoded) => analysis.screenshot = Some(encoded),
                Err(e) => warn!("Could not encode screenshot of {}: {}", url, e),
            },
            Err(e) => warn!("Could not take screenshot of {}: {}", url, e),
        }
    }

    let frames = match page.frames().await {
        // Frames keep their index; unanalyzable ones lose their content.
        Ok(frames) => frames
            .into_iter()
            .map(|mut f| {
                if !content_analyzable(&f.url, f.content_type.as_deref()).valid {
                    f.html = None;
                }
                f
            })
            .collect(),
        Err(e) => {
            warn!("Could not read frames of {}: {}", url, e);
            Vec::new()
        }
    };
    let navcred_calls = navcred_calls(page).await;
    let webauthn_available = page
        .evaluate(WEBAUTHN_AVAILABLE_EXPR)
        .await
        .ok()
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let html = page.content().await.unwrap_or_else(|e| {
        warn!("Could not read content of {}: {}", url, e);
        String::new()
    });
    let clickables = page
        .query_selector_all(CLICKABLE_SELECTOR)
        .await
        .unwrap_or_else(|e| {
            warn!("Could not collect clickables of {}: {}", url, e);
            Vec::new()
        });

    page.start_request_capture().await.ok();
    let reload = page.reload().await;
    let reload_requests = page.take_captured_requests().await;
    if let Err(e) = reload {
        warn!("Reload of {} failed: {}", url, e);
    }

    analysis.snapshot = Some(PageSnapshot {
        url: url.to_string(),
        final_url: navigation.url,
        html,
        frames,
        clickables,
        first_load_requests,
        reload_requests,
        navcred_calls,
        webauthn_available,
    });
    analysis
}
