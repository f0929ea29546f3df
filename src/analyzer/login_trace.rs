//! Login trace of one login element.
//!
//! The trace opens the login page, activates the element the landscape
//! analysis found (or waits for Google One Tap), and records where the IdP
//! surfaced, which IdP login requests were issued, and which authentication
//! methods the flow revealed.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use super::{load_scripts, new_profile_dir, remove_profile};
use crate::browser::{
    encode_screenshot, BrowserLauncher, CapturedRequest, LaunchOptions, Page, DIALOG_OVERRIDES_JS,
};
use crate::config::{
    AnalysisEnvironment, LoginTraceConfig, GOOGLE_ONE_TAP, LOGIN_TRACE_IDP_WAIT,
    LOGIN_TRACE_POPUP_TIMEOUT, LOGIN_TRACE_SETTLE_DELAY, SECOND_FACTOR_IDPS,
};
use crate::detectors::detect_second_factor;
use crate::error_handling::BrowserError;
use crate::models::{AuthMethod, IdpFrame, LoginTraceResult};
use crate::rules::{match_request, IdpRule, IdpRuleTable};
use crate::utils::{sanitize_and_truncate_error_message, StageTimer, MAX_ERROR_MESSAGE_LENGTH};

/// Waits applied during a trace.
#[derive(Debug, Clone, Copy)]
pub struct TraceWaits {
    /// After the login page loaded
    pub settle: Duration,
    /// For a popup after the click
    pub popup: Duration,
    /// For the IdP flow after the click or for One Tap
    pub idp: Duration,
}

impl Default for TraceWaits {
    fn default() -> Self {
        Self {
            settle: LOGIN_TRACE_SETTLE_DELAY,
            popup: LOGIN_TRACE_POPUP_TIMEOUT,
            idp: LOGIN_TRACE_IDP_WAIT,
        }
    }
}

/// URLs of the requests matching the login-request rule of `idp`.
pub fn idp_login_requests(idp: &IdpRule, requests: &[CapturedRequest]) -> Vec<String> {
    requests
        .iter()
        .filter(|r| match_request(&r.url, r.post_data.as_deref(), &idp.login_request_rule))
        .map(|r| r.url.clone())
        .collect()
}

/// Runs the login trace analysis for one login element.
pub struct LoginTraceAnalyzer {
    domain: String,
    config: LoginTraceConfig,
    launcher: Arc<dyn BrowserLauncher>,
    rules: Arc<IdpRuleTable>,
    environment: AnalysisEnvironment,
    waits: TraceWaits,
}

impl LoginTraceAnalyzer {
    pub fn new(
        domain: impl Into<String>,
        config: LoginTraceConfig,
        launcher: Arc<dyn BrowserLauncher>,
        rules: Arc<IdpRuleTable>,
        environment: AnalysisEnvironment,
    ) -> Self {
        Self {
            domain: domain.into(),
            config,
            launcher,
            rules,
            environment,
            waits: TraceWaits::default(),
        }
    }

    pub fn with_waits(mut self, waits: TraceWaits) -> Self {
        self.waits = waits;
        self
    }

    fn launch_options(&self) -> LaunchOptions {
        let env = &self.environment;
        let browser = &self.config.browser_config;
        let mut init_scripts = vec![DIALOG_OVERRIDES_JS.to_string()];
        init_scripts.extend(load_scripts(&browser.scripts, &env.extensions_path));
        LaunchOptions {
            browser: browser.clone(),
            chrome_path: env.chrome_path.clone(),
            user_data_dir: new_profile_dir(env),
            extension_dirs: browser
                .extensions
                .iter()
                .map(|name| env.extensions_path.join(name))
                .collect(),
            init_scripts,
        }
    }

    /// Runs the trace.
    ///
    /// Failures inside the trace become the `{error}` form of the result.
    ///
    /// # Errors
    ///
    /// Returns a `BrowserError` only if the browser cannot be launched.
    pub async fn run(&self) -> Result<LoginTraceResult, BrowserError> {
        let total = StageTimer::start("total");
        info!(
            "Starting login trace analysis of {} for idp {} on: {}",
            self.domain, self.config.idp_name, self.config.login_page_url
        );
        let options = self.launch_options();
        let page = match self.launcher.launch(&options).await {
            Ok(page) => page,
            Err(e) => {
                remove_profile(&options.user_data_dir);
                return Err(e);
            }
        };

        let mut result = match self.trace(page.as_ref()).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    "Error during login trace analysis for idp {} on {}: {}",
                    self.config.idp_name, self.config.login_page_url, e
                );
                LoginTraceResult::failed(sanitize_and_truncate_error_message(
                    &e.to_string(),
                    MAX_ERROR_MESSAGE_LENGTH,
                ))
            }
        };

        if let Err(e) = page.close().await {
            warn!("Closing browser failed: {}", e);
        }
        remove_profile(&options.user_data_dir);
        if result.error.is_none() {
            let elapsed = total.record(&mut result.timings);
            info!("Login trace of {} finished in {:.2}s", self.domain, elapsed);
        }
        Ok(result)
    }

    async fn trace(&self, page: &dyn Page) -> Result<LoginTraceResult, BrowserError> {
        let config = &self.config;
        let idp = self.rules.get(&config.idp_name);
        if idp.is_none() {
            warn!("No rules for idp {}, login requests are not recorded", config.idp_name);
        }
        let matching = |requests: &[CapturedRequest]| {
            idp.map(|idp| idp_login_requests(idp, requests))
                .unwrap_or_default()
        };

        let mut result = LoginTraceResult::started();
        page.start_request_capture().await?;
        info!("Navigate to login page: {}", config.login_page_url);
        page.navigate(&config.login_page_url).await?;
        tokio::time::sleep(self.waits.settle).await;

        if let Some(method) = AuthMethod::for_idp(&config.idp_name) {
            result.mark(method);
        }

        let mut login_requests;
        if config.idp_integration.as_deref() == Some(GOOGLE_ONE_TAP) {
            tokio::time::sleep(self.waits.idp).await;
            login_requests = matching(&page.take_captured_requests().await);
            if login_requests.is_empty() {
                info!("No One Tap login request yet, reloading");
                page.start_request_capture().await?;
                page.reload().await?;
                tokio::time::sleep(self.waits.idp).await;
                login_requests = matching(&page.take_captured_requests().await);
            }
            result.idp_frame = Some(IdpFrame::Iframe);
        } else {
            let (x, y) = config.element_center();
            let popup = page.click_at(x, y, self.waits.popup).await?;
            if popup {
                info!("Popup opened after clicking coordinate, waiting for it to load");
            } else {
                info!("No popup opened after clicking coordinate, waiting for page to load");
            }
            tokio::time::sleep(self.waits.idp).await;
            login_requests = matching(&page.take_captured_requests().await);
            result.idp_frame = Some(if popup { IdpFrame::Popup } else { IdpFrame::Topmost });
        }
        result.idp_login_request = login_requests.first().cloned();
        result.idp_login_requests = login_requests;

        match page.screenshot().await.map(|png| encode_screenshot(&png)) {
            Ok(Ok(encoded)) => result.login_trace_screenshot = Some(encoded),
            Ok(Err(e)) => warn!("Could not encode login trace screenshot: {}", e),
            Err(e) => warn!("Could not take login trace screenshot: {}", e),
        }

        if SECOND_FACTOR_IDPS.contains(&config.idp_name.as_str()) {
            self.check_second_factor(page, &mut result).await;
        }
        Ok(result)
    }

    /// Classifies the second factor of the page the flow ended on, if it left the login page.
    async fn check_second_factor(&self, page: &dyn Page, result: &mut LoginTraceResult) {
        match page.url().await {
            Ok(url) if url != self.config.login_page_url => {}
            Ok(_) => return,
            Err(e) => {
                warn!("Error while detecting second factor: {}", e);
                return;
            }
        }
        info!("Checking for second authentication factor");
        match page.content().await {
            Ok(html) => {
                if let Some(method) = detect_second_factor(&html) {
                    info!("Second factor detected: {:?}", method);
                    result.mark(method);
                }
            }
            Err(e) => warn!("Error while detecting second factor: {}", e),
        }
    }
}
