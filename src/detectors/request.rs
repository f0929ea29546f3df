//! Login-request recognition over captured network traffic.

use std::collections::HashSet;

use super::{Detection, DetectionContext, Detector, PageSnapshot};
use crate::config::RecognitionStrategy;
use crate::models::{RecognizedIdp, Validity};
use crate::rules::{match_request, IdpKind};

/// Recognizes IdPs from the requests a login page issues on load and reload.
///
/// Active matches use each entry's login-request rule. Passive matches use
/// the passive rule of SSO entries only; first-party methods declare a
/// catch-all passive rule that would match every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestDetector;

impl Detector for RequestDetector {
    fn strategy(&self) -> RecognitionStrategy {
        RecognitionStrategy::Request
    }

    fn detect(&self, snapshot: &PageSnapshot, ctx: &DetectionContext<'_>) -> Detection {
        let mut detection = Detection::default();
        let mut active: HashSet<&str> = HashSet::new();

        for idp in ctx.rules.iter().filter(|r| ctx.idp_config.in_scope(&r.name)) {
            let Some(request) = snapshot
                .requests()
                .find(|r| match_request(&r.url, r.post_data.as_deref(), &idp.login_request_rule))
            else {
                continue;
            };
            log::debug!("Login request for {} on {}: {}", idp.name, snapshot.url, request.url);
            active.insert(&idp.name);
            detection.idps.push(
                RecognizedIdp::new(&idp.name, RecognitionStrategy::Request, Validity::High, &snapshot.url)
                    .with_login_request(&request.url),
            );
            if ctx.first_match() {
                return detection;
            }
        }

        for idp in ctx
            .rules
            .iter()
            .filter(|r| r.kind == IdpKind::Sso && ctx.idp_config.in_scope(&r.name))
            .filter(|r| !active.contains(r.name.as_str()))
        {
            let Some(rule) = &idp.passive_login_request_rule else {
                continue;
            };
            let Some(request) = snapshot
                .requests()
                .find(|r| match_request(&r.url, r.post_data.as_deref(), rule))
            else {
                continue;
            };
            log::debug!("Passive login request for {} on {}: {}", idp.name, snapshot.url, request.url);
            detection.passive_idps.push(
                RecognizedIdp::new(&idp.name, RecognitionStrategy::Request, Validity::Medium, &snapshot.url)
                    .with_login_request(&request.url),
            );
            if ctx.first_match() {
                break;
            }
        }
        detection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::CapturedRequest;
    use crate::config::analysis::IdpConfig;
    use crate::config::RecognitionMode;
    use crate::rules::idp_rules;

    fn get(url: &str) -> CapturedRequest {
        CapturedRequest {
            url: url.to_string(),
            method: "GET".to_string(),
            post_data: None,
        }
    }

    fn detect(snapshot: &PageSnapshot) -> Detection {
        let rules = idp_rules();
        let idp_config = IdpConfig::default();
        let ctx = DetectionContext {
            rules: &rules,
            idp_config: &idp_config,
            mode: RecognitionMode::All,
        };
        RequestDetector.detect(snapshot, &ctx)
    }

    #[test]
    fn test_active_request_on_reload() {
        let snapshot = PageSnapshot {
            url: "https://shop.test/login".to_string(),
            first_load_requests: vec![get("https://shop.test/app.js")],
            reload_requests: vec![get(
                "https://appleid.apple.com/auth/authorize?client_id=com.shop&frame_id=abc",
            )],
            ..Default::default()
        };
        let detection = detect(&snapshot);
        assert_eq!(detection.idps.len(), 1);
        assert_eq!(detection.idps[0].idp_name, "APPLE");
        assert_eq!(detection.idps[0].element_validity, Validity::High);
        assert!(detection.passive_idps.is_empty());
    }

    #[test]
    fn test_google_one_tap_is_passive() {
        let snapshot = PageSnapshot {
            url: "https://shop.test/".to_string(),
            first_load_requests: vec![
                get("https://shop.test/"),
                get("https://accounts.google.com/gsi/status?client_id=1.apps"),
            ],
            ..Default::default()
        };
        let detection = detect(&snapshot);
        assert!(detection.idps.is_empty());
        assert_eq!(detection.passive_idps.len(), 1);
        assert_eq!(detection.passive_idps[0].idp_name, "GOOGLE");
        assert_eq!(detection.passive_idps[0].element_validity, Validity::Medium);
    }

    #[test]
    fn test_iframerpc_is_not_a_login_request() {
        let snapshot = PageSnapshot {
            url: "https://shop.test/".to_string(),
            first_load_requests: vec![get(
                "https://accounts.google.com/o/oauth2/iframerpc?action=checkOrigin&client_id=1",
            )],
            ..Default::default()
        };
        assert!(detect(&snapshot).is_empty());
    }
}
