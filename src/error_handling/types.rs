//! Error type definitions.
//!
//! This module defines the error enums used throughout the worker and the
//! countable failure categories tracked by [`ProcessingStats`](super::ProcessingStats).

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),
}

/// Errors raised by the broker layer.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Establishing the connection or channel failed.
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// A protocol operation on an open channel failed.
    #[error("Broker channel error: {0}")]
    Channel(String),

    /// No pooled connection became available in time.
    #[error("Timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(std::time::Duration),

    /// The pool has been shut down.
    #[error("Connection pool is closed")]
    PoolClosed,

    /// The delivery stream ended (channel or connection closed by the broker).
    #[error("Delivery stream closed")]
    StreamClosed,
}

impl From<lapin::Error> for QueueError {
    fn from(e: lapin::Error) -> Self {
        match e {
            lapin::Error::IOError(_) | lapin::Error::InvalidConnectionState(_) => {
                QueueError::Connection(e.to_string())
            }
            other => QueueError::Channel(other.to_string()),
        }
    }
}

/// Errors raised while replying to the brain.
#[derive(Error, Debug)]
pub enum ReplyError {
    #[error("Reply request failed: {0}")]
    Http(#[from] ReqwestError),

    /// The brain answered with something other than 200.
    #[error("Reply rejected with status {0}")]
    Status(u16),

    #[error("Reply body serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised while running an analysis child process.
///
/// The executor converts every variant into an `{exception}` payload; these
/// never reach the consumer.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to spawn analysis process: {0}")]
    Spawn(std::io::Error),

    #[error("Analysis process failed: {0}")]
    Wait(std::io::Error),

    /// The wall-clock limit expired and the process group was killed.
    #[error("Process timeout")]
    Timeout,

    #[error("Analysis process exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("Invalid analysis process output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Errors raised by the browser capability.
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// Navigation exceeded its timeout.
    #[error("Timeout")]
    Timeout,

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),
}

impl BrowserError {
    /// Short message recorded as `error_msg` in resolved outcomes.
    pub fn short_message(&self) -> String {
        match self {
            BrowserError::Timeout => "Timeout".to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors raised by login-page discovery strategies.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Discovery request failed: {0}")]
    Http(#[from] ReqwestError),

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid search response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure categories counted while consuming tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorType {
    // Broker
    BrokerConnectError,
    BrokerStreamError,
    InvalidTaskPayload,
    AckError,
    // Execution
    TaskTimeout,
    TaskException,
    // Reply
    ReplyHttpError,
    ReplyStatusError,
    ReplyExhausted,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::BrokerConnectError => "Broker connect error",
            ErrorType::BrokerStreamError => "Broker stream error",
            ErrorType::InvalidTaskPayload => "Invalid task payload",
            ErrorType::AckError => "Acknowledge error",
            ErrorType::TaskTimeout => "Task timeout",
            ErrorType::TaskException => "Task exception",
            ErrorType::ReplyHttpError => "Reply HTTP error",
            ErrorType::ReplyStatusError => "Reply status error",
            ErrorType::ReplyExhausted => "Reply retries exhausted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_error_type_as_str_unique() {
        let mut seen = std::collections::HashSet::new();
        for error_type in ErrorType::iter() {
            assert!(!error_type.as_str().is_empty());
            assert!(
                seen.insert(error_type.as_str()),
                "duplicate label for {:?}",
                error_type
            );
        }
    }

    #[test]
    fn test_browser_timeout_short_message() {
        assert_eq!(BrowserError::Timeout.short_message(), "Timeout");
        assert_eq!(
            BrowserError::Navigation("net::ERR_NAME_NOT_RESOLVED".to_string()).short_message(),
            "Navigation failed: net::ERR_NAME_NOT_RESOLVED"
        );
    }

    #[test]
    fn test_executor_exit_status_display() {
        let err = ExecutorError::ExitStatus {
            status: "exit status: 3".to_string(),
            stderr: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Analysis process exited with exit status: 3: boom"
        );
    }
}
