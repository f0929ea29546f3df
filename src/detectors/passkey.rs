//! Passkey (WebAuthn) recognition.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::scoring::Evidence;
use super::{inline_scripts, page_text, Detection, DetectionContext, Detector, PageSnapshot};
use crate::browser::ElementInfo;
use crate::config::RecognitionStrategy;
use crate::models::{ElementBox, RecognizedIdp};
use crate::rules::IdpKind;
use crate::utils::{contains_word, normalize_text, parse_selector_with_fallback};

pub(super) const WEIGHT_API: f64 = 0.1;
pub(super) const WEIGHT_KEYWORD: f64 = 0.3;
pub(super) const WEIGHT_SCRIPT: f64 = 0.6;
pub(super) const WEIGHT_ICON: f64 = 0.7;
pub(super) const WEIGHT_BUTTON: f64 = 0.85;

const WEBAUTHN_INTEGRATION: &str = "WEBAUTHN";

/// Page wording that hints at passkeys without being an affordance.
const PASSKEY_TERMS: &[&str] = &[
    "passkey",
    "passkeys",
    "passwordless",
    "webauthn",
    "fido2",
    "security key",
    "face id",
    "touch id",
    "windows hello",
    "biometric",
    "fingerprint",
];

/// Button labels that offer passkey sign-in.
const BUTTON_TERMS: &[&str] = &[
    "passkey",
    "use a passkey",
    "sign in with a passkey",
    "security key",
    "face id",
    "touch id",
    "windows hello",
];

/// Substrings of icon alt, src, title, or class attributes.
const ICON_HINTS: &[&str] = &[
    "passkey",
    "fingerprint",
    "biometric",
    "face-id",
    "face id",
    "faceid",
    "touch-id",
    "touch id",
    "touchid",
];

static SCRIPT_CALL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    match Regex::new(r"navigator\.credentials\.(create|get)\s*\(|PublicKeyCredential") {
        Ok(re) => Some(re),
        Err(e) => {
            log::error!("Failed to compile passkey script regex: {e}");
            None
        }
    }
});

static ICON: LazyLock<Option<Selector>> =
    LazyLock::new(|| parse_selector_with_fallback("img, svg, i", "passkey icons"));

fn has_passkey_icon(doc: &Html) -> bool {
    let Some(selector) = ICON.as_ref() else {
        return false;
    };
    doc.select(selector).any(|el| {
        let v = el.value();
        let mut attrs = ["alt", "src", "title", "class", "aria-label"]
            .into_iter()
            .filter_map(|a| v.attr(a))
            .map(str::to_lowercase)
            .collect::<Vec<_>>();
        if v.name() == "svg" {
            attrs.push(el.text().collect::<String>().to_lowercase());
        }
        attrs.iter().any(|a| ICON_HINTS.iter().any(|h| a.contains(h)))
    })
}

fn has_webauthn_script(doc: &Html, snapshot: &PageSnapshot) -> bool {
    let in_scripts = SCRIPT_CALL.as_ref().is_some_and(|re| {
        inline_scripts(doc)
            .iter()
            .any(|s| re.is_match(s) && (s.contains("publicKey") || s.contains("PublicKeyCredential")))
    });
    in_scripts
        || snapshot
            .navcred_calls
            .iter()
            .any(|(_, params)| super::navigator_credentials::has_public_key(params))
}

fn passkey_button(snapshot: &PageSnapshot) -> Option<&ElementInfo> {
    snapshot.clickables.iter().filter(|el| el.visible).find(|el| {
        let label = normalize_text(&el.label());
        BUTTON_TERMS.iter().any(|t| contains_word(&label, t))
    })
}

/// Gathers passkey evidence from a page. The returned box belongs to the strongest element.
pub(super) fn passkey_evidence(snapshot: &PageSnapshot) -> (Evidence, Option<ElementBox>) {
    let mut evidence = Evidence::new();
    let mut element = None;

    if snapshot.webauthn_available {
        evidence.add("webauthn_api", WEIGHT_API);
    }
    for html in snapshot.documents() {
        let doc = Html::parse_document(html);
        let text = page_text(&doc);
        if PASSKEY_TERMS.iter().any(|t| contains_word(&text, t)) {
            evidence.add("keyword", WEIGHT_KEYWORD);
        }
        if has_webauthn_script(&doc, snapshot) {
            evidence.add("script", WEIGHT_SCRIPT);
        }
        if has_passkey_icon(&doc) {
            evidence.add("icon", WEIGHT_ICON);
        }
    }
    if let Some(button) = passkey_button(snapshot) {
        evidence.add("button", WEIGHT_BUTTON);
        element = button.bounding_box;
    }
    (evidence, element)
}

/// Recognizes passkey sign-in from buttons, icons, scripts, and page wording.
#[derive(Debug, Default, Clone, Copy)]
pub struct PasskeyDetector;

impl Detector for PasskeyDetector {
    fn strategy(&self) -> RecognitionStrategy {
        RecognitionStrategy::Passkey
    }

    fn detect(&self, snapshot: &PageSnapshot, ctx: &DetectionContext<'_>) -> Detection {
        let mut detection = Detection::default();
        let Some(idp) = ctx
            .rules
            .iter()
            .find(|r| r.kind == IdpKind::Passkey && ctx.idp_config.in_scope(&r.name))
        else {
            return detection;
        };

        let (evidence, element) = passkey_evidence(snapshot);
        let Some(validity) = evidence.validity() else {
            if !evidence.is_empty() {
                log::debug!(
                    "Passkey evidence on {} below threshold: {:?} ({:.2})",
                    snapshot.url,
                    evidence.signal_names(),
                    evidence.confidence()
                );
            }
            return detection;
        };

        let mut record = RecognizedIdp::new(&idp.name, RecognitionStrategy::Passkey, validity, &snapshot.url)
            .with_integration(WEBAUTHN_INTEGRATION)
            .with_element_box(element);
        record.confidence = Some(evidence.confidence());
        record.signals = evidence.signal_names();
        detection.idps.push(record);
        detection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::analysis::IdpConfig;
    use crate::config::RecognitionMode;
    use crate::models::Validity;
    use crate::rules::idp_rules;

    fn detect(snapshot: &PageSnapshot) -> Detection {
        let rules = idp_rules();
        let idp_config = IdpConfig::default();
        let ctx = DetectionContext {
            rules: &rules,
            idp_config: &idp_config,
            mode: RecognitionMode::All,
        };
        PasskeyDetector.detect(snapshot, &ctx)
    }

    fn page(html: &str) -> PageSnapshot {
        PageSnapshot {
            url: "https://shop.test/login".to_string(),
            html: html.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_keyword_alone_is_not_reported() {
        let mut snapshot = page("<p>We now support passkeys for faster login.</p>");
        snapshot.webauthn_available = true;
        assert!(detect(&snapshot).is_empty());
    }

    #[test]
    fn test_button_is_high() {
        let mut snapshot = page("<p>Welcome back</p>");
        snapshot.clickables.push(ElementInfo {
            tag: "button".to_string(),
            text: "Sign in with a passkey".to_string(),
            visible: true,
            ..Default::default()
        });
        let detection = detect(&snapshot);
        let record = &detection.idps[0];
        assert_eq!(record.idp_name, "PASSKEY");
        assert_eq!(record.element_validity, Validity::High);
        assert_eq!(record.idp_integration.as_deref(), Some("WEBAUTHN"));
        assert_eq!(record.signals, vec!["button"]);
    }

    #[test]
    fn test_icon_and_script_are_medium() {
        let snapshot = page(
            r#"<img src="/img/fingerprint.svg" alt="">
               <script>navigator.credentials.get({ publicKey: opts })</script>"#,
        );
        let detection = detect(&snapshot);
        let record = &detection.idps[0];
        assert_eq!(record.element_validity, Validity::Medium);
        assert!(record.signals.contains(&"icon".to_string()));
        assert!(record.signals.contains(&"script".to_string()));
        assert!(record.confidence.unwrap() < 0.8);
    }

    #[test]
    fn test_out_of_scope() {
        let rules = idp_rules();
        let idp_config = IdpConfig {
            idp_scope: vec!["GOOGLE".to_string()],
        };
        let ctx = DetectionContext {
            rules: &rules,
            idp_config: &idp_config,
            mode: RecognitionMode::All,
        };
        let snapshot = page(r#"<img alt="Passkey">"#);
        assert!(PasskeyDetector.detect(&snapshot, &ctx).is_empty());
    }
}
