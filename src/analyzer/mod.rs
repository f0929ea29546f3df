//! Landscape analysis of one domain.
//!
//! This module provides:
//! - Domain resolution (https first, then http)
//! - Login-page discovery across the configured strategies
//! - Grouped login-page analysis, navigating each distinct URL once
//! - Recognition, SDK attribution, and metadata probing
//! - Login traces of a single login element ([`LoginTraceAnalyzer`])
//!
//! Stages run strictly in order and every stage after resolution is skipped
//! when the domain is unreachable. Per-page and per-detector failures are
//! recorded in the result; only a browser that cannot be launched fails the
//! whole analysis.

mod candidates;
mod login_trace;
mod page;
mod recognition;
mod resolve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::browser::{
    BrowserLauncher, LaunchOptions, Page, DIALOG_OVERRIDES_JS, LASTPASS_EXTENSION,
    NAVCRED_TRACKER_JS,
};
use crate::config::{
    AnalysisConfig, AnalysisEnvironment, RecognitionStrategy, LASTPASS_INIT_DELAY,
};
use crate::detectors::{detect_metadata, DetectionContext, PageSnapshot};
use crate::discovery::{Discovery, DiscoveryInput};
use crate::error_handling::BrowserError;
use crate::models::LandscapeResult;
use crate::rules::IdpRuleTable;
use crate::utils::StageTimer;

pub use candidates::{discover_candidates, group_candidates};
pub use login_trace::{idp_login_requests, LoginTraceAnalyzer, TraceWaits};
pub use page::{analyze_page, PageAnalysis};
pub use recognition::{match_sdks, recognize, NO_INTEGRATION};
pub use resolve::{resolve_domain, Resolution};

/// Shared dependencies of every analysis run by one process.
#[derive(Clone)]
pub struct AnalyzerContext {
    pub launcher: Arc<dyn BrowserLauncher>,
    pub discovery: Discovery,
    pub rules: Arc<IdpRuleTable>,
    pub environment: AnalysisEnvironment,
}

/// Runs the landscape analysis for one domain.
pub struct LandscapeAnalyzer {
    domain: String,
    config: AnalysisConfig,
    ctx: AnalyzerContext,
}

impl LandscapeAnalyzer {
    pub fn new(domain: impl Into<String>, config: AnalysisConfig, ctx: AnalyzerContext) -> Self {
        Self {
            domain: domain.into(),
            config,
            ctx,
        }
    }

    fn in_scope(&self, strategy: RecognitionStrategy) -> bool {
        self.config.recognition_strategy_config.contains(strategy)
    }

    fn launch_options(&self, profile_dir: PathBuf) -> LaunchOptions {
        let env = &self.ctx.environment;
        let browser = &self.config.browser_config;

        let mut extension_dirs: Vec<PathBuf> = browser
            .extensions
            .iter()
            .map(|name| env.extensions_path.join(name))
            .collect();
        let lastpass = env.extensions_path.join(LASTPASS_EXTENSION);
        if self.in_scope(RecognitionStrategy::LastpassIcon) && !extension_dirs.contains(&lastpass) {
            extension_dirs.push(lastpass);
        }

        let mut init_scripts = vec![DIALOG_OVERRIDES_JS.to_string()];
        if self.in_scope(RecognitionStrategy::NavigatorCredentials) || self.in_scope(RecognitionStrategy::Passkey) {
            init_scripts.push(NAVCRED_TRACKER_JS.to_string());
        }
        init_scripts.extend(load_scripts(&browser.scripts, &env.extensions_path));

        LaunchOptions {
            browser: browser.clone(),
            chrome_path: env.chrome_path.clone(),
            user_data_dir: profile_dir,
            extension_dirs,
            init_scripts,
        }
    }

    /// Runs all stages.
    ///
    /// # Errors
    ///
    /// Returns a `BrowserError` only if the browser cannot be launched.
    pub async fn run(&self) -> Result<LandscapeResult, BrowserError> {
        let total = StageTimer::start("total");
        let profile_dir = new_profile_dir(&self.ctx.environment);

        info!("Starting landscape analysis of {}", self.domain);
        let launched = self.ctx.launcher.launch(&self.launch_options(profile_dir.clone())).await;
        let page = match launched {
            Ok(page) => page,
            Err(e) => {
                remove_profile(&profile_dir);
                return Err(e);
            }
        };

        let mut result = LandscapeResult::default();
        self.run_stages(page.as_ref(), &mut result).await;

        if let Err(e) = page.close().await {
            warn!("Closing browser failed: {}", e);
        }
        remove_profile(&profile_dir);
        let elapsed = total.record(&mut result.timings);
        info!("Landscape analysis of {} finished in {:.2}s", self.domain, elapsed);
        Ok(result)
    }

    async fn run_stages(&self, page: &dyn Page, result: &mut LandscapeResult) {
        if self.in_scope(RecognitionStrategy::LastpassIcon) {
            if let Err(e) = page.navigate("about:blank").await {
                warn!("Could not open blank page for extension start: {}", e);
            }
            tokio::time::sleep(LASTPASS_INIT_DELAY).await;
        }

        let timer = StageTimer::start("resolve");
        let resolution = resolve_domain(page, &self.domain).await;
        timer.record(&mut result.timings);
        result.resolved = resolution.outcome.clone();
        let Some(resolved_url) = resolution.outcome.url.clone().filter(|_| resolution.outcome.reachable) else {
            info!("{} is unreachable, skipping remaining stages", self.domain);
            return;
        };

        let login_page_config = &self.config.login_page_config;
        let input = DiscoveryInput {
            domain: &self.domain,
            resolved_url: &resolved_url,
            homepage_html: resolution.homepage_html.as_deref(),
            config: login_page_config,
        };
        let timer = StageTimer::start("login_page_detection");
        result.login_page_candidates =
            discover_candidates(&self.ctx.discovery, &input, login_page_config, &mut result.timings).await;
        timer.record(&mut result.timings);

        let snapshots = self.analyze_candidates(page, result).await;

        let ctx = DetectionContext {
            rules: &self.ctx.rules,
            idp_config: &self.config.idp_config,
            mode: self.config.recognition_strategy_config.recognition_mode,
        };
        let timer = StageTimer::start("sso_button_detection");
        recognize(&snapshots, &self.config.recognition_strategy_config, &ctx, result);
        timer.record(&mut result.timings);

        if self.in_scope(RecognitionStrategy::Metadata) {
            let timer = StageTimer::start("metadata_detection");
            let metadata = detect_metadata(self.ctx.discovery.client(), &resolved_url, &self.config.idp_config).await;
            timer.record(&mut result.timings);
            result.recognized_idps.extend(metadata.idps);
            result.recognized_metadata = metadata.findings;
        }

        let timer = StageTimer::start("sdk_detection");
        match_sdks(&mut result.recognized_idps, &self.ctx.rules);
        timer.record(&mut result.timings);
    }

    /// Navigates each distinct candidate URL once and fans the outcome out to its records.
    async fn analyze_candidates(&self, page: &dyn Page, result: &mut LandscapeResult) -> Vec<PageSnapshot> {
        let timer = StageTimer::start("login_page_analysis");
        let store_screenshot = self.config.artifacts_config.store_login_page_candidate_screenshot;
        let mut snapshots = Vec::new();

        for (url, indices) in group_candidates(&result.login_page_candidates) {
            let analysis = analyze_page(page, &url, store_screenshot).await;
            for index in indices {
                if let Some(candidate) = result.login_page_candidates.get_mut(index) {
                    analysis.apply_to(candidate);
                }
            }
            snapshots.extend(analysis.snapshot);
        }
        timer.record(&mut result.timings);
        snapshots
    }
}

/// Creates a fresh browser profile directory under the temporary path.
fn new_profile_dir(env: &AnalysisEnvironment) -> PathBuf {
    let dir = env.tmp_path.join(format!(
        "sso_landscape-{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_micros()
    ));
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Could not create browser profile {}: {}", dir.display(), e);
    }
    dir
}

/// Reads configured init scripts from `dir`; unreadable ones are skipped.
fn load_scripts(names: &[String], dir: &Path) -> Vec<String> {
    names
        .iter()
        .filter_map(|name| match std::fs::read_to_string(dir.join(name)) {
            Ok(source) => Some(source),
            Err(e) => {
                warn!("Skipping init script {}: {}", name, e);
                None
            }
        })
        .collect()
}

fn remove_profile(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        log::debug!("Could not remove browser profile {}: {}", dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_scripts_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("hook.js")).unwrap();
        writeln!(file, "window.hooked = true;").unwrap();

        let scripts = load_scripts(&["hook.js".to_string(), "missing.js".to_string()], dir.path());
        assert_eq!(scripts, vec!["window.hooked = true;\n".to_string()]);
    }
}
