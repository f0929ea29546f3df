//! Configuration constants.
//!
//! This module defines the operational constants used throughout the worker:
//! retry schedules, pool sizing, timeouts, and detector thresholds.

use std::time::Duration;

// Task execution
/// Hard wall-clock limit for one analysis child process (3 hours).
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 3 * 60 * 60;
/// Virtual memory ceiling applied to the analysis child process, in megabytes.
/// A value of 0 disables the limit.
pub const DEFAULT_TASK_MAX_MEMORY_MB: u64 = 4096;
/// Exact exception text reported when the analysis child is killed on timeout.
pub const PROCESS_TIMEOUT_MESSAGE: &str = "Process timeout";
/// Number of trailing child stderr lines kept for the exception of a failed child.
pub const STDERR_TAIL_LINES: usize = 5;
/// Maximum number of tasks executing concurrently inside one consumer process.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 2;

// Broker
/// Durable queue consumed by default.
pub const DEFAULT_QUEUE: &str = "landscape_analysis_treq";
/// Suffix that separates the analysis name from its task request queue.
pub const TASK_QUEUE_SUFFIX: &str = "_treq";
/// Prefetch count per channel. One unacked message in flight per consumer.
pub const CONSUMER_PREFETCH: u16 = 1;
/// Consumer tag announced to the broker.
pub const CONSUMER_TAG: &str = "sso_landscape_worker";

// Connection pool
/// Number of connections pre-warmed in the publisher pool.
pub const POOL_SIZE: usize = 4;
/// Connections idle longer than this are evicted by the maintenance loop.
pub const POOL_MAX_IDLE: Duration = Duration::from_secs(300);
/// Interval between pool maintenance passes.
pub const POOL_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);
/// How long `get_connection` waits for a returned connection once the pool is exhausted.
pub const POOL_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

// Publish retry
/// Publish attempts before giving up with a structured failure.
pub const PUBLISH_MAX_ATTEMPTS: usize = 3;
/// Base delay for publish retries in milliseconds.
pub const PUBLISH_BASE_DELAY_MS: u64 = 1000;
/// Growth factor for publish retry delays.
pub const PUBLISH_BACKOFF_FACTOR: f64 = 1.5;

// Reply retry (HTTP PUT to the brain)
/// Initial delay before retrying a failed reply, in milliseconds.
pub const RETRY_INITIAL_DELAY_MS: u64 = 1000;
/// Exponential factor applied to the reply retry delay.
pub const RETRY_FACTOR: u64 = 2;
/// Maximum delay between reply retries in seconds.
pub const RETRY_MAX_DELAY_SECS: u64 = 60;
/// Reply attempts before the task is left unacknowledged for redelivery.
pub const RETRY_MAX_ATTEMPTS: usize = 5;
/// Timeout for a single reply request.
pub const REPLY_TIMEOUT_SECS: u64 = 60;

// Reconnect
/// Reconnect attempts before the outer loop sleeps for the cooldown.
pub const RECONNECT_MAX_ATTEMPTS: usize = 5;
/// Initial reconnect delay in milliseconds.
pub const RECONNECT_INITIAL_DELAY_MS: u64 = 2000;
/// Cooldown after reconnect attempts are exhausted.
pub const RECONNECT_COOLDOWN: Duration = Duration::from_secs(30);

// Memory monitor
/// Sampling interval for the process memory monitor.
pub const MEMORY_MONITOR_INTERVAL: Duration = Duration::from_secs(60);
/// Resident memory above which the monitor logs a warning, in megabytes.
pub const MEMORY_WARN_THRESHOLD_MB: u64 = 2048;

// Discovery
/// Timeout for HTTP requests made by discovery strategies and metadata detection.
pub const DISCOVERY_HTTP_TIMEOUT_SECS: u64 = 10;
/// Maximum body size read from robots.txt, sitemaps, and well-known documents (2MB).
pub const MAX_DISCOVERY_BODY_SIZE: usize = 2 * 1024 * 1024;
/// Maximum number of nested sitemaps fetched from a sitemap index.
pub const MAX_NESTED_SITEMAPS: usize = 5;

// Browser
/// Default User-Agent for the browser and discovery clients.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
/// Schemes tried in order when resolving a bare domain.
pub const RESOLVE_SCHEMES: &[&str] = &["https", "http"];
/// Time given to the LastPass extension to initialize before the first navigation.
pub const LASTPASS_INIT_DELAY: Duration = Duration::from_secs(5);
/// Wait after the login page of a trace loaded
pub const LOGIN_TRACE_SETTLE_DELAY: Duration = Duration::from_secs(5);
/// How long a click may take to open an IdP popup
pub const LOGIN_TRACE_POPUP_TIMEOUT: Duration = Duration::from_secs(2);
/// Wait for the IdP flow to run after the login element was activated
pub const LOGIN_TRACE_IDP_WAIT: Duration = Duration::from_secs(30);
/// IdPs whose trace is followed by a second-factor check
pub const SECOND_FACTOR_IDPS: &[&str] = &["PASSWORD_BASED", "GOOGLE", "FACEBOOK", "APPLE", "MICROSOFT"];
/// Integration traced by waiting for the One Tap prompt instead of clicking
pub const GOOGLE_ONE_TAP: &str = "GOOGLE_ONE_TAP";
/// Maximum characters of page text scanned by DOM detectors.
pub const MAX_PAGE_TEXT_CHARS: usize = 50_000;
/// Selector used to collect clickable elements from a loaded page.
pub const CLICKABLE_SELECTOR: &str =
    "button, a, [role='button'], input[type='submit'], input[type='button']";
/// Maximum number of clickable elements kept per page.
pub const MAX_CLICKABLES: usize = 500;

// Confidence scoring
/// Combined confidence at which a passkey or MFA finding is reported (MEDIUM).
pub const CONFIDENCE_MEDIUM_THRESHOLD: f64 = 0.5;
/// Combined confidence at which a finding is HIGH.
pub const CONFIDENCE_HIGH_THRESHOLD: f64 = 0.8;
/// Bonus added per corroborating signal category beyond the strongest one.
pub const CONFIDENCE_CORROBORATION_BONUS: f64 = 0.05;
