//! Error categorization and retry strategies.
//!
//! This module maps errors to [`ErrorType`] counters and builds the retry
//! schedules used by the reply, publish, and reconnect paths.

use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};

use super::stats::ProcessingStats;
use super::types::{ErrorType, ReplyError};

/// Creates the retry schedule for replies to the brain.
///
/// Delays grow exponentially from `RETRY_INITIAL_DELAY_MS` by `RETRY_FACTOR`,
/// capped at `RETRY_MAX_DELAY_SECS`. The iterator yields the delays between
/// attempts, so the total number of attempts is `RETRY_MAX_ATTEMPTS`.
pub fn get_retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(crate::config::RETRY_FACTOR)
        .factor(crate::config::RETRY_INITIAL_DELAY_MS)
        .max_delay(Duration::from_secs(crate::config::RETRY_MAX_DELAY_SECS))
        .take(crate::config::RETRY_MAX_ATTEMPTS.saturating_sub(1))
}

/// Creates the publish retry schedule: `base × 1.5^n` for each retry.
///
/// With the default `PUBLISH_MAX_ATTEMPTS` of 3 this yields two delays,
/// `base` and `1.5 × base`.
pub fn publish_backoff(base: Duration) -> impl Iterator<Item = Duration> {
    let factor = crate::config::PUBLISH_BACKOFF_FACTOR;
    (0..crate::config::PUBLISH_MAX_ATTEMPTS.saturating_sub(1) as i32)
        .map(move |n| base.mul_f64(factor.powi(n)))
}

/// Creates the reconnect schedule used by the consumer's outer loop.
pub fn reconnect_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(crate::config::RECONNECT_INITIAL_DELAY_MS / 2)
        .max_delay(crate::config::RECONNECT_COOLDOWN)
        .map(jitter)
        .take(crate::config::RECONNECT_MAX_ATTEMPTS)
}

/// Categorizes a reply failure into an `ErrorType`.
pub fn categorize_reply_error(error: &ReplyError) -> ErrorType {
    match error {
        ReplyError::Status(_) => ErrorType::ReplyStatusError,
        ReplyError::Http(_) | ReplyError::Serialize(_) => ErrorType::ReplyHttpError,
    }
}

/// Records a reply failure in the processing statistics.
pub fn update_reply_stats(stats: &ProcessingStats, error: &ReplyError) {
    stats.increment_error(categorize_reply_error(error));
}
