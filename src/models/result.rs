//! Analysis result types.
//!
//! These structs serialize to the JSON document the brain stores for a
//! landscape analysis. Optional fields are omitted until a stage fills them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{LoginPageStrategy, RecognitionStrategy};
use crate::utils::{sanitize_and_truncate_error_message, MAX_ERROR_MESSAGE_LENGTH};

/// Reachability outcome of a domain or login page candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOutcome {
    pub reachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// HTTP status of the loaded document, when the browser reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolvedOutcome {
    /// A reachable outcome; `domain` is the host (and port, if any) of `url`.
    pub fn reachable(url: &str, title: Option<String>) -> Self {
        let domain = url::Url::parse(url).ok().and_then(|u| {
            u.host_str().map(|h| match u.port() {
                Some(p) => format!("{}:{}", h, p),
                None => h.to_string(),
            })
        });
        Self {
            reachable: true,
            domain,
            url: Some(url.to_string()),
            title,
            status_code: None,
            error_msg: None,
            error: None,
        }
    }

    pub fn with_status(mut self, status_code: Option<u16>) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn unreachable(error_msg: impl Into<String>, error: Option<String>) -> Self {
        Self {
            reachable: false,
            error_msg: Some(error_msg.into()),
            error,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalyzable {
    pub valid: bool,
    pub error: Option<String>,
}

/// A URL hypothesized to be a login page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginPageCandidate {
    pub login_page_candidate: String,
    pub login_page_strategy: LoginPageStrategy,
    pub login_page_priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<ResolvedOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_analyzable: Option<ContentAnalyzable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_page_candidate_screenshot: Option<String>,
}

impl LoginPageCandidate {
    pub fn new(url: String, strategy: LoginPageStrategy, priority: i64) -> Self {
        Self {
            login_page_candidate: url,
            login_page_strategy: strategy,
            login_page_priority: priority,
            resolved: None,
            content_type: None,
            content_analyzable: None,
            login_page_candidate_screenshot: None,
        }
    }

    /// True once analysis found the page reachable and its content analyzable.
    pub fn is_analyzable(&self) -> bool {
        self.resolved.as_ref().is_some_and(|r| r.reachable)
            && self.content_analyzable.as_ref().is_some_and(|c| c.valid)
    }
}

/// Certainty of a recognition, ordered LOW < MEDIUM < HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Validity {
    Low,
    Medium,
    High,
}

/// MFA factor classes recognized on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MfaType {
    AuthenticatorApp,
    SmsCode,
    EmailCode,
    BackupCode,
    SecurityKey,
    Generic,
}

/// Layout box of the element that triggered a recognition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One recognized identity provider or authentication method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedIdp {
    pub idp_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp_integration: Option<String>,
    pub recognition_strategy: RecognitionStrategy,
    pub element_validity: Validity,
    pub login_page_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp_login_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp_frame: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_coordinates_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_coordinates_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mfa_types: Vec<MfaType>,
}

impl RecognizedIdp {
    pub fn new(
        idp_name: impl Into<String>,
        strategy: RecognitionStrategy,
        validity: Validity,
        login_page_url: impl Into<String>,
    ) -> Self {
        Self {
            idp_name: idp_name.into(),
            idp_integration: None,
            recognition_strategy: strategy,
            element_validity: validity,
            login_page_url: login_page_url.into(),
            idp_login_request: None,
            idp_frame: None,
            element_coordinates_x: None,
            element_coordinates_y: None,
            element_width: None,
            element_height: None,
            confidence: None,
            signals: Vec::new(),
            mfa_types: Vec::new(),
        }
    }

    pub fn with_integration(mut self, integration: impl Into<String>) -> Self {
        self.idp_integration = Some(integration.into());
        self
    }

    pub fn with_login_request(mut self, request_url: impl Into<String>) -> Self {
        self.idp_login_request = Some(request_url.into());
        self
    }

    pub fn with_element_box(mut self, element: Option<ElementBox>) -> Self {
        if let Some(b) = element {
            self.element_coordinates_x = Some(b.x);
            self.element_coordinates_y = Some(b.y);
            self.element_width = Some(b.width);
            self.element_height = Some(b.height);
        }
        self
    }
}

/// A call to `navigator.credentials.*` observed on a login page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavCredCall {
    pub login_page_url: String,
    pub function_name: String,
    pub function_params: Value,
}

/// A LastPass icon injected into a frame of a login page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastpassIcon {
    pub login_page_url: String,
    pub frame_index: usize,
    pub frame_url: String,
    pub icon_count: usize,
}

/// A well-known discovery document found during metadata detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFinding {
    pub well_known: String,
    pub url: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
}

/// Aggregate result of one landscape analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandscapeResult {
    pub resolved: ResolvedOutcome,
    pub timings: BTreeMap<String, f64>,
    pub login_page_candidates: Vec<LoginPageCandidate>,
    pub recognized_idps: Vec<RecognizedIdp>,
    pub recognized_navcreds: Vec<NavCredCall>,
    pub recognized_lastpass_icons: Vec<LastpassIcon>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recognized_metadata: Vec<MetadataFinding>,
}

/// Failure payload returned in place of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisFailure {
    pub exception: String,
}

/// What a task produced: a result document or an `{exception}` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Failed(AnalysisFailure),
    Completed(Value),
}

impl AnalysisOutcome {
    /// A failed outcome. The message is stripped of control characters and bounded in length.
    pub fn exception(message: impl Into<String>) -> Self {
        AnalysisOutcome::Failed(AnalysisFailure {
            exception: sanitize_and_truncate_error_message(&message.into(), MAX_ERROR_MESSAGE_LENGTH),
        })
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, AnalysisOutcome::Failed(_))
    }

    pub fn into_value(self) -> Value {
        match self {
            AnalysisOutcome::Failed(f) => serde_json::json!({ "exception": f.exception }),
            AnalysisOutcome::Completed(v) => v,
        }
    }
}
