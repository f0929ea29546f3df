//! Per-task analysis configuration.
//!
//! The brain sends one of these under `<analysis>_config` in every task request.
//! Every field has a default so that partial documents from older brain versions
//! still deserialize.

use serde::{Deserialize, Serialize};

use crate::config::constants::DEFAULT_USER_AGENT;

/// Complete configuration for one landscape analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub browser_config: BrowserConfig,
    pub artifacts_config: ArtifactsConfig,
    pub login_page_config: LoginPageConfig,
    pub recognition_strategy_config: RecognitionStrategyConfig,
    pub idp_config: IdpConfig,
}

/// Browser engine requested by the brain.
///
/// Only Chromium is driven by this worker; other engines fall back to it with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub name: BrowserEngine,
    pub user_agent: String,
    pub locale: String,
    pub headless: bool,
    pub width: u32,
    pub height: u32,
    /// Extension directories to load (unpacked)
    pub extensions: Vec<String>,
    /// Init scripts injected into every document, by file name
    pub scripts: Vec<String>,
    /// Default action timeout in seconds
    pub timeout_default: u64,
    /// Navigation timeout in seconds
    pub timeout_navigation: u64,
    /// Seconds to wait after the load event
    pub sleep_after_onload: u64,
    pub wait_for_networkidle: bool,
    /// Upper bound in seconds for the network-idle wait
    pub timeout_networkidle: u64,
    /// Seconds to wait after the network went idle
    pub sleep_after_networkidle: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            name: BrowserEngine::Chromium,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            locale: "en-US".to_string(),
            headless: true,
            width: 1920,
            height: 1080,
            extensions: Vec::new(),
            scripts: Vec::new(),
            timeout_default: 30,
            timeout_navigation: 30,
            sleep_after_onload: 5,
            wait_for_networkidle: true,
            timeout_networkidle: 10,
            sleep_after_networkidle: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub store_login_page_candidate_screenshot: bool,
    /// Accepted for compatibility; HAR capture is not performed by this worker.
    pub store_login_page_analysis_har: bool,
}

/// Login-page discovery strategies, in the order they are listed in the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoginPageStrategy {
    Homepage,
    Manual,
    Paths,
    Crawling,
    Sitemap,
    Robots,
    Metasearch,
    #[serde(other)]
    Unknown,
}

impl LoginPageStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginPageStrategy::Homepage => "HOMEPAGE",
            LoginPageStrategy::Manual => "MANUAL",
            LoginPageStrategy::Paths => "PATHS",
            LoginPageStrategy::Crawling => "CRAWLING",
            LoginPageStrategy::Sitemap => "SITEMAP",
            LoginPageStrategy::Robots => "ROBOTS",
            LoginPageStrategy::Metasearch => "METASEARCH",
            LoginPageStrategy::Unknown => "UNKNOWN",
        }
    }

    /// Suffix used in timing keys (`login_page_detection_<suffix>_duration_seconds`).
    pub fn timing_name(&self) -> String {
        self.as_str().to_lowercase()
    }
}

/// A regex that marks a URL as login-like, with the priority it confers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlPriorityRegex {
    pub regex: String,
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginPageConfig {
    pub login_page_strategy_scope: Vec<LoginPageStrategy>,
    pub login_page_url_regexes: Vec<UrlPriorityRegex>,
    pub manual_strategy_config: ManualStrategyConfig,
    pub paths_strategy_config: PathsStrategyConfig,
    pub crawling_strategy_config: KeywordStrategyConfig,
    pub sitemap_strategy_config: KeywordStrategyConfig,
    pub robots_strategy_config: KeywordStrategyConfig,
    pub metasearch_strategy_config: MetasearchStrategyConfig,
}

impl Default for LoginPageConfig {
    fn default() -> Self {
        Self {
            login_page_strategy_scope: vec![
                LoginPageStrategy::Homepage,
                LoginPageStrategy::Paths,
                LoginPageStrategy::Crawling,
            ],
            login_page_url_regexes: vec![
                UrlPriorityRegex {
                    regex: r"(?i)(log-?in|sign-?in|log-?on)".to_string(),
                    priority: 100,
                },
                UrlPriorityRegex {
                    regex: r"(?i)(auth|sso|oauth|session)".to_string(),
                    priority: 50,
                },
                UrlPriorityRegex {
                    regex: r"(?i)(account|user|member|profile)".to_string(),
                    priority: 20,
                },
            ],
            manual_strategy_config: ManualStrategyConfig::default(),
            paths_strategy_config: PathsStrategyConfig::default(),
            crawling_strategy_config: KeywordStrategyConfig::default(),
            sitemap_strategy_config: KeywordStrategyConfig::default(),
            robots_strategy_config: KeywordStrategyConfig::default(),
            metasearch_strategy_config: MetasearchStrategyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualStrategyConfig {
    pub login_page_candidates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsStrategyConfig {
    /// Well-known paths tried on the resolved origin
    pub paths: Vec<String>,
    /// Subdomains tried on the resolved registrable domain
    pub subdomains: Vec<String>,
}

impl Default for PathsStrategyConfig {
    fn default() -> Self {
        Self {
            paths: ["/login", "/signin", "/sign-in", "/account/login", "/auth/login", "/user/login"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            subdomains: ["login", "auth", "accounts", "sso", "id"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Shared settings for strategies that filter discovered URLs by keyword.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordStrategyConfig {
    pub max_candidates: usize,
    pub keywords: Vec<String>,
}

impl Default for KeywordStrategyConfig {
    fn default() -> Self {
        Self {
            max_candidates: 3,
            keywords: default_login_keywords(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetasearchStrategyConfig {
    pub search_engines: Vec<String>,
    pub max_candidates: usize,
    /// Query template; `{domain}` is replaced by the analyzed domain
    pub query: String,
}

impl Default for MetasearchStrategyConfig {
    fn default() -> Self {
        Self {
            search_engines: vec!["google".to_string(), "bing".to_string(), "duckduckgo".to_string()],
            max_candidates: 3,
            query: "site:{domain} login".to_string(),
        }
    }
}

fn default_login_keywords() -> Vec<String> {
    ["login", "log-in", "signin", "sign-in", "logon", "auth", "sso", "account"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Auth-method recognition strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecognitionStrategy {
    #[serde(alias = "KEYWORD")]
    SsoButton,
    Request,
    #[serde(alias = "PASSWORD-FORM")]
    PasswordForm,
    #[serde(alias = "PASSKEY-KEYWORD", alias = "PASSKEY-API")]
    Passkey,
    #[serde(alias = "MFA-MULTIPHASE")]
    Mfa,
    NavigatorCredentials,
    LastpassIcon,
    Metadata,
    #[serde(other)]
    Unknown,
}

impl RecognitionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionStrategy::SsoButton => "SSO_BUTTON",
            RecognitionStrategy::Request => "REQUEST",
            RecognitionStrategy::PasswordForm => "PASSWORD_FORM",
            RecognitionStrategy::Passkey => "PASSKEY",
            RecognitionStrategy::Mfa => "MFA",
            RecognitionStrategy::NavigatorCredentials => "NAVIGATOR_CREDENTIALS",
            RecognitionStrategy::LastpassIcon => "LASTPASS_ICON",
            RecognitionStrategy::Metadata => "METADATA",
            RecognitionStrategy::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for RecognitionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecognitionMode {
    #[default]
    All,
    #[serde(alias = "first-match", alias = "FIRST-MATCH")]
    FirstMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionStrategyConfig {
    pub recognition_strategy_scope: Vec<RecognitionStrategy>,
    pub recognition_mode: RecognitionMode,
}

impl Default for RecognitionStrategyConfig {
    fn default() -> Self {
        Self {
            recognition_strategy_scope: vec![
                RecognitionStrategy::SsoButton,
                RecognitionStrategy::Request,
                RecognitionStrategy::PasswordForm,
                RecognitionStrategy::Passkey,
                RecognitionStrategy::Mfa,
                RecognitionStrategy::NavigatorCredentials,
            ],
            recognition_mode: RecognitionMode::All,
        }
    }
}

impl RecognitionStrategyConfig {
    pub fn contains(&self, strategy: RecognitionStrategy) -> bool {
        self.recognition_strategy_scope.contains(&strategy)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdpConfig {
    /// IdPs to recognize; empty means every IdP in the rule table
    pub idp_scope: Vec<String>,
}

impl IdpConfig {
    pub fn in_scope(&self, idp_name: &str) -> bool {
        self.idp_scope.is_empty() || self.idp_scope.iter().any(|i| i == idp_name)
    }
}

/// Configuration of one login trace: which element to activate on which page.
///
/// IdP credentials and cookie stores sent by the brain are ignored; this
/// worker never signs in to an IdP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginTraceConfig {
    pub browser_config: BrowserConfig,
    pub idp_name: String,
    pub idp_integration: Option<String>,
    pub login_page_url: String,
    pub element_coordinates_x: f64,
    pub element_coordinates_y: f64,
    pub element_width: f64,
    pub element_height: f64,
}

impl LoginTraceConfig {
    /// Center of the login element in viewport coordinates.
    pub fn element_center(&self) -> (f64, f64) {
        (
            self.element_coordinates_x + self.element_width / 2.0,
            self.element_coordinates_y + self.element_height / 2.0,
        )
    }

    /// Checks the fields a trace cannot run without.
    pub fn validate(&self) -> Result<(), String> {
        if self.login_page_url.trim().is_empty() {
            return Err("missing login_page_url".to_string());
        }
        if self.idp_name.trim().is_empty() {
            return Err("missing idp_name".to_string());
        }
        Ok(())
    }
}
