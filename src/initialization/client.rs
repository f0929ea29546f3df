//! HTTP client initialization.
//!
//! This module builds the two `reqwest` clients the worker needs: one for
//! replies to the brain and one for discovery and metadata requests.

use std::sync::Arc;
use std::time::Duration;

use reqwest::ClientBuilder;

use crate::config::{DEFAULT_USER_AGENT, DISCOVERY_HTTP_TIMEOUT_SECS, REPLY_TIMEOUT_SECS};

/// Initializes the client used to PUT task results back to the brain.
///
/// # Errors
///
/// Returns a `reqwest::Error` if client creation fails.
pub fn init_reply_client() -> Result<Arc<reqwest::Client>, reqwest::Error> {
    let client = ClientBuilder::new()
        .timeout(Duration::from_secs(REPLY_TIMEOUT_SECS))
        .user_agent(concat!("sso_landscape/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(Arc::new(client))
}

/// Initializes the client used by discovery strategies and metadata detection.
///
/// Follows up to 10 redirects and presents a browser User-Agent, since several
/// sites serve robots.txt and sitemaps differently to unknown agents.
///
/// # Errors
///
/// Returns a `reqwest::Error` if client creation fails.
pub fn init_discovery_client(user_agent: Option<&str>) -> Result<Arc<reqwest::Client>, reqwest::Error> {
    let client = ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::limited(10))
        .timeout(Duration::from_secs(DISCOVERY_HTTP_TIMEOUT_SECS))
        .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT).to_string())
        .build()?;
    Ok(Arc::new(client))
}
