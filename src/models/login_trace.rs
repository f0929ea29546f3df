//! Login trace result types.
//!
//! A trace either completes with the fields below or fails with only
//! `{"error": ...}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Validity;

/// Where the IdP login surfaced after the login element was activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdpFrame {
    Popup,
    Topmost,
    Iframe,
}

/// Authentication methods tracked by a login trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMethod {
    Passkey,
    Totp,
    Sms,
    Email,
    App,
    Password,
}

impl AuthMethod {
    /// The method implied by the traced IdP itself, if any.
    pub fn for_idp(idp_name: &str) -> Option<Self> {
        match idp_name {
            "PASSWORD_BASED" => Some(AuthMethod::Password),
            "PASSKEY" => Some(AuthMethod::Passkey),
            "MFA_GENERIC" => Some(AuthMethod::Totp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMethodFinding {
    pub detected: bool,
    pub validity: Validity,
}

impl Default for AuthMethodFinding {
    fn default() -> Self {
        Self {
            detected: false,
            validity: Validity::Low,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthMethods {
    pub passkey: AuthMethodFinding,
    pub totp: AuthMethodFinding,
    pub sms: AuthMethodFinding,
    pub email: AuthMethodFinding,
    pub app: AuthMethodFinding,
    pub password: AuthMethodFinding,
}

impl AuthMethods {
    fn slot(&mut self, method: AuthMethod) -> &mut AuthMethodFinding {
        match method {
            AuthMethod::Passkey => &mut self.passkey,
            AuthMethod::Totp => &mut self.totp,
            AuthMethod::Sms => &mut self.sms,
            AuthMethod::Email => &mut self.email,
            AuthMethod::App => &mut self.app,
            AuthMethod::Password => &mut self.password,
        }
    }

    /// Records `method` as detected with HIGH validity.
    pub fn mark(&mut self, method: AuthMethod) {
        *self.slot(method) = AuthMethodFinding {
            detected: true,
            validity: Validity::High,
        };
    }

    pub fn get(&self, method: AuthMethod) -> AuthMethodFinding {
        match method {
            AuthMethod::Passkey => self.passkey,
            AuthMethod::Totp => self.totp,
            AuthMethod::Sms => self.sms,
            AuthMethod::Email => self.email,
            AuthMethod::App => self.app,
            AuthMethod::Password => self.password,
        }
    }
}

/// Result of one login trace analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginTraceResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_methods: Option<AuthMethods>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp_frame: Option<IdpFrame>,
    /// First request matching the traced IdP's login-request rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp_login_request: Option<String>,
    /// Every matching request, in the order they were issued
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub idp_login_requests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_trace_screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub timings: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginTraceResult {
    pub fn started() -> Self {
        Self {
            auth_methods: Some(AuthMethods::default()),
            ..Default::default()
        }
    }

    /// The error-only form a failed trace is reported as.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn mark(&mut self, method: AuthMethod) {
        self.auth_methods
            .get_or_insert_with(AuthMethods::default)
            .mark(method);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_trace_serializes_error_only() {
        let value = serde_json::to_value(LoginTraceResult::failed("Timeout")).unwrap();
        assert_eq!(value, json!({"error": "Timeout"}));
    }

    #[test]
    fn test_started_trace_lists_every_method_undetected() {
        let value = serde_json::to_value(LoginTraceResult::started()).unwrap();
        assert_eq!(value["auth_methods"]["sms"], json!({"detected": false, "validity": "LOW"}));
        assert_eq!(value["auth_methods"].as_object().unwrap().len(), 6);
    }

    #[test]
    fn test_mark_sets_high_validity() {
        let mut result = LoginTraceResult::started();
        result.mark(AuthMethod::Sms);
        let methods = result.auth_methods.unwrap();
        assert!(methods.get(AuthMethod::Sms).detected);
        assert_eq!(methods.get(AuthMethod::Sms).validity, Validity::High);
        assert!(!methods.get(AuthMethod::Totp).detected);
    }

    #[test]
    fn test_idp_implied_methods() {
        assert_eq!(AuthMethod::for_idp("PASSWORD_BASED"), Some(AuthMethod::Password));
        assert_eq!(AuthMethod::for_idp("PASSKEY"), Some(AuthMethod::Passkey));
        assert_eq!(AuthMethod::for_idp("MFA_GENERIC"), Some(AuthMethod::Totp));
        assert_eq!(AuthMethod::for_idp("GOOGLE"), None);
    }
}
