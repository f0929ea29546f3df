//! Error handling and processing statistics.
//!
//! This module provides:
//! - Error type definitions for every subsystem
//! - Processing statistics tracking
//! - Retry strategy configuration
//! - Error categorization for statistics

mod categorization;
mod stats;
mod types;

// Re-export public API
pub use categorization::{
    categorize_reply_error, get_retry_strategy, publish_backoff, reconnect_strategy,
    update_reply_stats,
};
pub use stats::ProcessingStats;
pub use types::{
    BrowserError, DiscoveryError, ErrorType, ExecutorError, InitializationError, QueueError,
    ReplyError,
};
