//! Processing statistics tracking.
//!
//! Thread-safe counters for failure categories and task throughput, shared by
//! the consumer supervisor and its workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use super::types::ErrorType;

/// Thread-safe processing statistics tracker.
///
/// All error types are initialized to zero on creation so that lookups never
/// miss. Share it across tasks with `Arc`.
pub struct ProcessingStats {
    errors: HashMap<ErrorType, AtomicUsize>,
    received: AtomicUsize,
    acked: AtomicUsize,
}

impl Default for ProcessingStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStats {
    pub fn new() -> Self {
        let mut errors = HashMap::new();
        for error in ErrorType::iter() {
            errors.insert(error, AtomicUsize::new(0));
        }

        ProcessingStats {
            errors,
            received: AtomicUsize::new(0),
            acked: AtomicUsize::new(0),
        }
    }

    /// Increment an error counter.
    pub fn increment_error(&self, error: ErrorType) {
        if let Some(counter) = self.errors.get(&error) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment error counter for {:?} which is not in the map",
                error
            );
        }
    }

    pub fn get_error_count(&self, error: ErrorType) -> usize {
        self.errors
            .get(&error)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Get total error count across all error types.
    pub fn total_errors(&self) -> usize {
        ErrorType::iter().map(|e| self.get_error_count(e)).sum()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }

    /// Logs a one-line summary followed by every non-zero error counter.
    pub fn log_summary(&self) {
        log::info!(
            "Tasks received: {}, acknowledged: {}, errors: {}",
            self.received(),
            self.acked(),
            self.total_errors()
        );
        for error_type in ErrorType::iter() {
            let count = self.get_error_count(error_type);
            if count > 0 {
                log::info!("   {}: {}", error_type, count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_stats_initialization() {
        let stats = ProcessingStats::new();
        for error_type in ErrorType::iter() {
            assert_eq!(stats.get_error_count(error_type), 0);
        }
        assert_eq!(stats.received(), 0);
        assert_eq!(stats.acked(), 0);
    }

    #[test]
    fn test_processing_stats_totals() {
        let stats = ProcessingStats::new();
        stats.increment_error(ErrorType::TaskTimeout);
        stats.increment_error(ErrorType::TaskTimeout);
        stats.increment_error(ErrorType::ReplyStatusError);
        stats.record_received();
        stats.record_acked();

        assert_eq!(stats.get_error_count(ErrorType::TaskTimeout), 2);
        assert_eq!(stats.total_errors(), 3);
        assert_eq!(stats.received(), 1);
        assert_eq!(stats.acked(), 1);
    }
}
