//! The `analyze` side of the job protocol.

use std::sync::Arc;

use anyhow::Context;
use log::{info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::AnalysisJob;
use crate::analyzer::{AnalyzerContext, LandscapeAnalyzer, LoginTraceAnalyzer};
use crate::browser::{BrowserLauncher, ChromiumLauncher};
use crate::config::{AnalysisConfig, AnalyzeOptions, LoginTraceConfig};
use crate::discovery::Discovery;
use crate::initialization::init_discovery_client;
use crate::models::{AnalysisKind, AnalysisOutcome};
use crate::rules::idp_rules;

/// Caps the virtual memory of the current process (and its future children).
///
/// A limit of 0 leaves the process unrestricted.
#[cfg(target_os = "linux")]
pub fn apply_memory_limit(max_memory_mb: u64) -> Result<(), nix::Error> {
    use nix::sys::resource::{setrlimit, Resource};

    if max_memory_mb == 0 {
        return Ok(());
    }
    let bytes = max_memory_mb.saturating_mul(1024 * 1024);
    log::debug!("Applying RLIMIT_AS: {} bytes", bytes);
    setrlimit(Resource::RLIMIT_AS, bytes, bytes)
}

#[cfg(not(target_os = "linux"))]
pub fn apply_memory_limit(_max_memory_mb: u64) -> Result<(), nix::Error> {
    warn!("Memory limits are not available on this platform");
    Ok(())
}

/// Runs one job with the given browser launcher.
pub async fn run_job(job: AnalysisJob, launcher: Arc<dyn BrowserLauncher>) -> AnalysisOutcome {
    match job.kind {
        AnalysisKind::LandscapeAnalysis => run_landscape(job, launcher).await,
        AnalysisKind::LoginTraceAnalysis => run_login_trace(job, launcher).await,
        other => AnalysisOutcome::exception(format!("Unsupported analysis: {}", other)),
    }
}

fn completed<T: serde::Serialize>(result: &T) -> AnalysisOutcome {
    match serde_json::to_value(result) {
        Ok(value) => AnalysisOutcome::Completed(value),
        Err(e) => AnalysisOutcome::exception(format!("Result serialization failed: {}", e)),
    }
}

async fn run_landscape(job: AnalysisJob, launcher: Arc<dyn BrowserLauncher>) -> AnalysisOutcome {
    let config: AnalysisConfig = match serde_json::from_value(job.config) {
        Ok(config) => config,
        Err(e) => {
            return AnalysisOutcome::exception(format!("Invalid {}: {}", job.kind.config_key(), e))
        }
    };
    let client = match init_discovery_client(Some(&config.browser_config.user_agent)) {
        Ok(client) => client,
        Err(e) => return AnalysisOutcome::exception(format!("HTTP client initialization error: {}", e)),
    };
    let ctx = AnalyzerContext {
        launcher,
        discovery: Discovery::new(client, job.environment.searxng_url.clone()),
        rules: idp_rules(),
        environment: job.environment,
    };

    match LandscapeAnalyzer::new(job.domain, config, ctx).run().await {
        Ok(result) => completed(&result),
        Err(e) => AnalysisOutcome::exception(e.to_string()),
    }
}

async fn run_login_trace(job: AnalysisJob, launcher: Arc<dyn BrowserLauncher>) -> AnalysisOutcome {
    let config = serde_json::from_value::<LoginTraceConfig>(job.config)
        .map_err(|e| e.to_string())
        .and_then(|config| config.validate().map(|()| config));
    let config = match config {
        Ok(config) => config,
        Err(e) => return AnalysisOutcome::exception(format!("Invalid {}: {}", job.kind.config_key(), e)),
    };

    let analyzer = LoginTraceAnalyzer::new(job.domain, config, launcher, idp_rules(), job.environment);
    match analyzer.run().await {
        Ok(result) => completed(&result),
        Err(e) => AnalysisOutcome::exception(e.to_string()),
    }
}

/// Entry point of the `analyze` subcommand.
///
/// Reads the job from stdin and writes exactly one JSON outcome to stdout.
///
/// # Errors
///
/// Returns an error only if stdin cannot be read or stdout cannot be written.
pub async fn run_analysis(options: &AnalyzeOptions) -> anyhow::Result<()> {
    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("Failed to read analysis job from stdin")?;

    let outcome = match serde_json::from_slice::<AnalysisJob>(&input) {
        Ok(job) => {
            if !options.no_memory_limit {
                if let Err(e) = apply_memory_limit(job.environment.max_memory_mb) {
                    warn!("Could not apply memory limit: {}", e);
                }
            }
            info!("Analysis process started for {}", job.domain);
            run_job(job, Arc::new(ChromiumLauncher)).await
        }
        Err(e) => AnalysisOutcome::exception(format!("Invalid analysis job: {}", e)),
    };

    let body = serde_json::to_vec(&outcome.into_value()).context("Failed to serialize outcome")?;
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&body).await.context("Failed to write outcome")?;
    stdout.flush().await.context("Failed to flush outcome")?;
    Ok(())
}
