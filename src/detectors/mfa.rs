//! Multi-factor authentication recognition.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::scoring::Evidence;
use super::{element_text, page_text, Detection, DetectionContext, Detector, PageSnapshot};
use crate::config::RecognitionStrategy;
use crate::models::{MfaType, RecognizedIdp, Validity};
use crate::rules::{IdpKind, IdpRule};
use crate::utils::{parse_selector_with_fallback, parse_selectors};

pub(super) const WEIGHT_KEYWORD: f64 = 0.3;
pub(super) const WEIGHT_TEXT_NEAR_INPUT: f64 = 0.6;
pub(super) const WEIGHT_CODE_GROUP: f64 = 0.75;
pub(super) const WEIGHT_SELECTOR: f64 = 0.8;

/// Minimum number of single-character inputs forming a split code field.
const MIN_CODE_GROUP: usize = 4;
/// Ancestor levels searched for wording around a code input.
const NEAR_INPUT_DEPTH: usize = 4;
/// Characters of page text kept on each side of an MFA phrase for classification.
const CONTEXT_RADIUS: usize = 80;

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            log::error!("Failed to compile MFA regex: {e}");
            None
        }
    }
}

static MFA_TEXT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"(?i)\b(two[- ]?factor|2fa|multi[- ]?factor|mfa|2-step|two[- ]step|verification code|one[- ]time (code|password|passcode)|authentication code|security code|totp|authenticator app|sms code|email code|backup code|recovery code|security key)\b",
    )
});

static CODE_ATTR: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)(code|verification|otp|totp|2fa|mfa|one-time)"));

static MFA_TYPES: LazyLock<Vec<(MfaType, Regex)>> = LazyLock::new(|| {
    [
        (MfaType::AuthenticatorApp, r"(?i)authenticator|totp"),
        (MfaType::SmsCode, r"(?i)\bsms\b|phone|text message"),
        (MfaType::EmailCode, r"(?i)e-?mail"),
        (MfaType::BackupCode, r"(?i)backup|recovery code"),
        (MfaType::SecurityKey, r"(?i)security key|passkey|webauthn|yubikey"),
    ]
    .into_iter()
    .filter_map(|(t, p)| compile(p).map(|re| (t, re)))
    .collect()
});

static INPUT: LazyLock<Option<Selector>> =
    LazyLock::new(|| parse_selector_with_fallback("input", "mfa inputs"));

static ONE_TIME_CODE: LazyLock<Option<Selector>> = LazyLock::new(|| {
    parse_selector_with_fallback("input[autocomplete='one-time-code']", "mfa one-time-code")
});

fn is_match(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

fn max_length(input: &ElementRef<'_>) -> Option<usize> {
    input.value().attr("maxlength").and_then(|m| m.trim().parse().ok())
}

fn is_text_like(input: &ElementRef<'_>) -> bool {
    matches!(
        input.value().attr("type").unwrap_or("text").to_lowercase().as_str(),
        "text" | "tel" | "number"
    )
}

/// Inputs shaped like a verification code field.
fn is_code_input(input: &ElementRef<'_>) -> bool {
    if !is_text_like(input) {
        return false;
    }
    let v = input.value();
    if max_length(input).is_some_and(|m| (4..=8).contains(&m)) {
        return true;
    }
    if v.attr("pattern").is_some_and(|p| p.contains(r"\d") || p.contains("[0-9]")) {
        return true;
    }
    ["name", "id", "placeholder", "autocomplete"]
        .into_iter()
        .filter_map(|a| v.attr(a))
        .any(|a| is_match(&CODE_ATTR, a))
}

fn is_numeric(input: &ElementRef<'_>) -> bool {
    let v = input.value();
    v.attr("inputmode").is_some_and(|m| m.eq_ignore_ascii_case("numeric"))
        || v.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("number") || t.eq_ignore_ascii_case("tel"))
        || v.attr("pattern").is_some_and(|p| p.contains(r"\d") || p.contains("[0-9]"))
}

/// True if at least [`MIN_CODE_GROUP`] single-character inputs share a parent.
fn has_code_group(inputs: &[ElementRef<'_>]) -> bool {
    let mut per_parent = HashMap::new();
    for parent in inputs
        .iter()
        .filter(|i| is_text_like(i) && max_length(i) == Some(1))
        .filter_map(|i| i.parent())
    {
        *per_parent.entry(parent.id()).or_insert(0usize) += 1;
    }
    per_parent.values().any(|count| *count >= MIN_CODE_GROUP)
}

/// Wording of the nearest enclosing block of `input` that mentions MFA.
fn text_near(input: &ElementRef<'_>) -> Option<String> {
    input
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take(NEAR_INPUT_DEPTH)
        .map(element_text)
        .find(|text| is_match(&MFA_TEXT, text))
}

fn context_windows(text: &str) -> Vec<String> {
    let Some(re) = MFA_TEXT.as_ref() else {
        return Vec::new();
    };
    re.find_iter(text)
        .map(|m| {
            let mut start = m.start().saturating_sub(CONTEXT_RADIUS);
            while !text.is_char_boundary(start) {
                start -= 1;
            }
            let mut end = (m.end() + CONTEXT_RADIUS).min(text.len());
            while !text.is_char_boundary(end) {
                end += 1;
            }
            text[start..end].to_string()
        })
        .collect()
}

/// Factor classes mentioned in MFA wording; `Generic` when none is specific.
pub(super) fn classify_mfa_types(contexts: &[String]) -> Vec<MfaType> {
    let mut types: Vec<MfaType> = MFA_TYPES
        .iter()
        .filter(|(_, re)| contexts.iter().any(|c| re.is_match(c)))
        .map(|(t, _)| *t)
        .collect();
    if types.is_empty() {
        types.push(MfaType::Generic);
    }
    types
}

/// Evidence gathered from one page, plus the wording used for classification.
pub(super) struct MfaEvidence {
    pub evidence: Evidence,
    pub numeric_code: bool,
    pub contexts: Vec<String>,
}

pub(super) fn mfa_evidence(snapshot: &PageSnapshot, idp: &IdpRule) -> MfaEvidence {
    let mut evidence = Evidence::new();
    let mut numeric_code = false;
    let mut contexts = Vec::new();
    let rule_selectors: Vec<&str> = idp.mfa_selectors.iter().map(String::as_str).collect();
    let rule_selectors = parse_selectors(&rule_selectors, "mfa rule selectors");

    for html in snapshot.documents() {
        let doc = Html::parse_document(html);
        let text = page_text(&doc);
        if is_match(&MFA_TEXT, &text) {
            evidence.add("keyword", WEIGHT_KEYWORD);
            contexts.extend(context_windows(&text));
        }

        let inputs: Vec<ElementRef<'_>> = match INPUT.as_ref() {
            Some(selector) => doc
                .select(selector)
                .filter(|i| !i.value().attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")))
                .collect(),
            None => Vec::new(),
        };
        let code_inputs: Vec<&ElementRef<'_>> = inputs.iter().filter(|i| is_code_input(i)).collect();

        for input in &code_inputs {
            if let Some(near) = text_near(input) {
                evidence.add("text_near_input", WEIGHT_TEXT_NEAR_INPUT);
                contexts.push(near);
                break;
            }
        }
        if has_code_group(&inputs) {
            evidence.add("code_group", WEIGHT_CODE_GROUP);
            numeric_code = true;
        }
        let one_time_code = ONE_TIME_CODE.as_ref().is_some_and(|s| doc.select(s).next().is_some());
        if one_time_code || rule_selectors.iter().any(|s| doc.select(s).next().is_some()) {
            evidence.add("selector", WEIGHT_SELECTOR);
        }
        numeric_code |= code_inputs.iter().any(|i| is_numeric(i));
    }

    MfaEvidence {
        evidence,
        numeric_code,
        contexts,
    }
}

/// Recognizes MFA prompts from code inputs and the wording around them.
#[derive(Debug, Default, Clone, Copy)]
pub struct MfaDetector;

impl Detector for MfaDetector {
    fn strategy(&self) -> RecognitionStrategy {
        RecognitionStrategy::Mfa
    }

    fn detect(&self, snapshot: &PageSnapshot, ctx: &DetectionContext<'_>) -> Detection {
        let mut detection = Detection::default();
        let Some(idp) = ctx
            .rules
            .iter()
            .find(|r| r.kind == IdpKind::Mfa && ctx.idp_config.in_scope(&r.name))
        else {
            return detection;
        };

        let found = mfa_evidence(snapshot, idp);
        let Some(mut validity) = found.evidence.validity() else {
            return detection;
        };
        // Digit-only code fields are the strongest layout hint.
        if found.numeric_code {
            validity = Validity::High;
        }
        log::debug!(
            "MFA on {}: {:?} ({:.2})",
            snapshot.url,
            found.evidence.signal_names(),
            found.evidence.confidence()
        );

        let mut record = RecognizedIdp::new(&idp.name, RecognitionStrategy::Mfa, validity, &snapshot.url);
        record.confidence = Some(found.evidence.confidence());
        record.signals = found.evidence.signal_names();
        record.mfa_types = classify_mfa_types(&found.contexts);
        detection.idps.push(record);
        detection
    }
}
