//! Configuration types and CLI options.
//!
//! This module defines the enums and structs used for command-line parsing.
//! Every option can also be supplied through the environment, which is how the
//! worker is configured inside its container.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::constants::{
    DEFAULT_MAX_CONCURRENT_TASKS, DEFAULT_QUEUE, DEFAULT_TASK_MAX_MEMORY_MB,
    DEFAULT_TASK_TIMEOUT_SECS, TASK_QUEUE_SUFFIX,
};

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Command-line options for the worker binary.
#[derive(Debug, Parser)]
#[command(
    name = "sso_landscape",
    about = "Consumes SSO landscape analysis tasks and reports the login methods of each domain."
)]
pub struct Opt {
    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, env = "LOG_LEVEL", default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value_t = LogFormat::Plain, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Worker subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Consume tasks from the broker until terminated
    Consume(ConsumeOptions),
    /// Run a single analysis job read from stdin and print the outcome to stdout
    Analyze(AnalyzeOptions),
    /// Publish a task file to a queue
    Send(SendOptions),
}

/// Broker connection settings.
#[derive(Debug, Clone, Args)]
pub struct BrokerOptions {
    /// Broker host
    #[arg(long, env = "RABBITMQ_HOST", default_value = "rabbitmq")]
    pub rabbitmq_host: String,

    /// Broker port
    #[arg(long, env = "RABBITMQ_PORT", default_value_t = 5672)]
    pub rabbitmq_port: u16,

    /// Use TLS (amqps) when set to 1
    #[arg(long, env = "RABBITMQ_TLS", default_value = "0")]
    pub rabbitmq_tls: String,

    /// Broker user
    #[arg(long, env = "RABBITMQ_USER", default_value = "guest")]
    pub rabbitmq_user: String,

    /// Broker password
    #[arg(long, env = "RABBITMQ_PASS", default_value = "guest", hide_env_values = true)]
    pub rabbitmq_pass: String,
}

impl BrokerOptions {
    /// Builds the AMQP URI for these settings.
    pub fn uri(&self) -> String {
        let scheme = if self.tls_enabled() { "amqps" } else { "amqp" };
        format!(
            "{}://{}:{}@{}:{}/%2f",
            scheme, self.rabbitmq_user, self.rabbitmq_pass, self.rabbitmq_host, self.rabbitmq_port
        )
    }

    /// Returns true if `RABBITMQ_TLS` is "1" or "true".
    pub fn tls_enabled(&self) -> bool {
        matches!(self.rabbitmq_tls.trim(), "1" | "true" | "TRUE" | "True")
    }
}

/// Options for the `consume` subcommand.
#[derive(Debug, Clone, Args)]
pub struct ConsumeOptions {
    #[command(flatten)]
    pub broker: BrokerOptions,

    /// Queue to consume; the analysis kind is derived by stripping `_treq`
    #[arg(long, env = "RABBITMQ_QUEUE", default_value = DEFAULT_QUEUE)]
    pub rabbitmq_queue: String,

    /// Base URL of the brain service that receives replies
    #[arg(long, env = "BRAIN_URL", default_value = "http://flask:8080")]
    pub brain_url: String,

    /// User for basic auth against the brain
    #[arg(long, env = "ADMIN_USER", default_value = "admin")]
    pub admin_user: String,

    /// Password for basic auth against the brain
    #[arg(long, env = "ADMIN_PASS", default_value = "changeme", hide_env_values = true)]
    pub admin_pass: String,

    /// Hard timeout per task in seconds
    #[arg(long, env = "TASK_TIMEOUT_SECS", default_value_t = DEFAULT_TASK_TIMEOUT_SECS)]
    pub task_timeout_secs: u64,

    /// Maximum tasks executing at once in this process
    #[arg(long, env = "MAX_CONCURRENT_TASKS", default_value_t = DEFAULT_MAX_CONCURRENT_TASKS)]
    pub max_concurrent_tasks: usize,

    #[command(flatten)]
    pub analysis: AnalysisEnvironment,
}

impl ConsumeOptions {
    /// Analysis name served by this consumer (`landscape_analysis_treq` -> `landscape_analysis`).
    pub fn analysis_name(&self) -> &str {
        self.rabbitmq_queue
            .strip_suffix(TASK_QUEUE_SUFFIX)
            .unwrap_or(&self.rabbitmq_queue)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

/// Settings handed from the consumer to every analysis child process.
#[derive(Debug, Clone, Args, serde::Serialize, serde::Deserialize)]
pub struct AnalysisEnvironment {
    /// Base URL of the SearXNG instance used by the metasearch strategy
    #[arg(long, env = "SEARXNG_URL", default_value = "http://searxng:8080")]
    pub searxng_url: String,

    /// Directory for temporary browser profiles
    #[arg(long, env = "TMP_PATH", default_value = "/tmp")]
    pub tmp_path: PathBuf,

    /// Virtual memory limit for analysis children in MB (0 disables)
    #[arg(long, env = "TASK_MAX_MEMORY_MB", default_value_t = DEFAULT_TASK_MAX_MEMORY_MB)]
    pub max_memory_mb: u64,

    /// Chrome/Chromium executable (auto-detected when unset)
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Directory holding unpacked browser extensions, one subdirectory each
    #[arg(long, env = "EXTENSIONS_PATH", default_value = "/app/extensions")]
    pub extensions_path: PathBuf,
}

impl Default for AnalysisEnvironment {
    fn default() -> Self {
        Self {
            searxng_url: "http://searxng:8080".to_string(),
            tmp_path: std::env::temp_dir(),
            max_memory_mb: DEFAULT_TASK_MAX_MEMORY_MB,
            chrome_path: None,
            extensions_path: PathBuf::from("/app/extensions"),
        }
    }
}

/// Options for the `analyze` subcommand (internal child mode).
#[derive(Debug, Clone, Args)]
pub struct AnalyzeOptions {
    /// Skip applying the virtual memory limit
    #[arg(long)]
    pub no_memory_limit: bool,
}

/// Options for the `send` subcommand.
#[derive(Debug, Clone, Args)]
pub struct SendOptions {
    #[command(flatten)]
    pub broker: BrokerOptions,

    /// Target queue
    #[arg(long, default_value = DEFAULT_QUEUE)]
    pub queue: String,

    /// Reply path on the brain (PUT target)
    #[arg(long, default_value = "")]
    pub reply_to: String,

    /// Correlation id (usually the task id)
    #[arg(long, default_value = "")]
    pub correlation_id: String,

    /// JSON file holding the task request
    #[arg(value_parser)]
    pub file: PathBuf,
}
