//! `navigator.credentials` call recognition.

use std::collections::HashSet;

use serde_json::Value;

use super::{Detection, DetectionContext, Detector, PageSnapshot};
use crate::config::RecognitionStrategy;
use crate::models::{NavCredCall, RecognizedIdp, Validity};
use crate::rules::IdpKind;

const WEBAUTHN_INTEGRATION: &str = "WEBAUTHN";

/// True if any argument object carries a `publicKey` member.
pub(super) fn has_public_key(params: &Value) -> bool {
    match params {
        Value::Array(args) => args.iter().any(has_public_key),
        Value::Object(map) => map.contains_key("publicKey"),
        _ => false,
    }
}

fn is_webauthn_call(function_name: &str, params: &Value) -> bool {
    matches!(function_name, "create" | "get") && has_public_key(params)
}

/// Reports credential-management calls and recognizes WebAuthn from them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NavigatorCredentialsDetector;

impl Detector for NavigatorCredentialsDetector {
    fn strategy(&self) -> RecognitionStrategy {
        RecognitionStrategy::NavigatorCredentials
    }

    fn detect(&self, snapshot: &PageSnapshot, ctx: &DetectionContext<'_>) -> Detection {
        let mut detection = Detection::default();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut webauthn = false;

        for (function_name, params) in &snapshot.navcred_calls {
            webauthn |= is_webauthn_call(function_name, params);
            if !seen.insert(function_name.as_str()) {
                continue;
            }
            detection.navcreds.push(NavCredCall {
                login_page_url: snapshot.url.clone(),
                function_name: function_name.clone(),
                function_params: params.clone(),
            });
        }

        let passkey = ctx
            .rules
            .iter()
            .find(|r| r.kind == IdpKind::Passkey && ctx.idp_config.in_scope(&r.name));
        if let (true, Some(idp)) = (webauthn, passkey) {
            log::debug!("WebAuthn call observed on {}", snapshot.url);
            detection.idps.push(
                RecognizedIdp::new(
                    &idp.name,
                    RecognitionStrategy::NavigatorCredentials,
                    Validity::High,
                    &snapshot.url,
                )
                .with_integration(WEBAUTHN_INTEGRATION),
            );
        }
        detection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::analysis::IdpConfig;
    use crate::config::RecognitionMode;
    use crate::rules::idp_rules;
    use serde_json::json;

    fn detect(calls: Vec<(&str, Value)>) -> Detection {
        let rules = idp_rules();
        let idp_config = IdpConfig::default();
        let ctx = DetectionContext {
            rules: &rules,
            idp_config: &idp_config,
            mode: RecognitionMode::All,
        };
        let snapshot = PageSnapshot {
            url: "https://shop.test/login".to_string(),
            navcred_calls: calls.into_iter().map(|(n, p)| (n.to_string(), p)).collect(),
            ..Default::default()
        };
        NavigatorCredentialsDetector.detect(&snapshot, &ctx)
    }

    #[test]
    fn test_calls_are_deduplicated_by_function() {
        let detection = detect(vec![
            ("get", json!([{"password": true}])),
            ("get", json!([{"password": true}])),
            ("preventSilentAccess", json!([])),
        ]);
        assert_eq!(detection.navcreds.len(), 2);
        assert!(detection.idps.is_empty());
    }

    #[test]
    fn test_public_key_get_is_webauthn() {
        let detection = detect(vec![
            ("get", json!([{"publicKey": {"challenge": "abc"}, "mediation": "conditional"}])),
            ("create", json!([{"publicKey": {}}])),
        ]);
        assert_eq!(detection.idps.len(), 1);
        let record = &detection.idps[0];
        assert_eq!(record.idp_name, "PASSKEY");
        assert_eq!(record.recognition_strategy, RecognitionStrategy::NavigatorCredentials);
        assert_eq!(record.idp_integration.as_deref(), Some("WEBAUTHN"));
    }

    #[test]
    fn test_store_with_public_key_is_not_webauthn() {
        assert!(!is_webauthn_call("store", &json!([{"publicKey": {}}])));
        assert!(has_public_key(&json!({"publicKey": null})));
    }
}
