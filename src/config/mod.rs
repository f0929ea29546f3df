//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (timeouts, retry schedules, thresholds)
//! - CLI option types and parsing
//! - The per-task analysis configuration sent by the brain

pub mod analysis;
mod constants;
mod types;

pub use analysis::{
    AnalysisConfig, BrowserConfig, LoginPageStrategy, LoginTraceConfig, RecognitionMode,
    RecognitionStrategy, RecognitionStrategyConfig,
};
// Re-export all constants
pub use constants::*;
pub use types::{
    AnalysisEnvironment, AnalyzeOptions, BrokerOptions, Command, ConsumeOptions, LogFormat,
    LogLevel, Opt, SendOptions,
};
