//! SSO button recognition over clickable elements.

use std::sync::LazyLock;

use regex::Regex;

use super::{Detection, DetectionContext, Detector, PageSnapshot};
use crate::browser::ElementInfo;
use crate::config::RecognitionStrategy;
use crate::models::{RecognizedIdp, Validity};
use crate::rules::{match_request, IdpRule};
use crate::utils::{contains_word, normalize_text};

const MAX_BARE_LABEL_CHARS: usize = 40;

/// Phrases that turn a provider keyword into a login affordance.
static LOGIN_PHRASE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i)\b(sign|log)\s?(in|on|up)\s+(with|via|using|through)\b|\bcontinue\s+(with|via|using)\b|\b(connect|login|authenticate)\s+(with|via|using)\b")
});

/// Words that put an element in an auth context without the full phrase.
static AUTH_CONTEXT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i)\b(sign|log)[\s-]?(in|on|up)\b|\blogin\b|\bauth|\boauth|\bsso\b|\baccount\b|\bcontinue\b|\bconnect\b")
});

/// Share, follow, and like widgets mention providers but do not log anyone in.
static SOCIAL_NOISE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i)\b(share|shared|sharing|follow|like us|tweet|retweet|post to|pin it|subscribe)\b")
});

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            log::error!("Failed to compile SSO button regex: {e}");
            None
        }
    }
}

fn is_match(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

/// Validity of `element` as a login button for `idp`, or `None` if it is not one.
fn classify(element: &ElementInfo, idp: &IdpRule) -> Option<Validity> {
    if !element.visible {
        return None;
    }
    let label = normalize_text(&element.label());
    if !idp.keywords.iter().any(|k| contains_word(&label, k)) {
        return None;
    }
    if is_match(&SOCIAL_NOISE, &label) {
        return None;
    }

    if is_match(&LOGIN_PHRASE, &label) {
        return Some(Validity::High);
    }
    if is_match(&AUTH_CONTEXT, &label) {
        return Some(Validity::Medium);
    }
    // A bare provider name is only worth reporting on a short control.
    (element.text.chars().count() <= MAX_BARE_LABEL_CHARS).then_some(Validity::Low)
}

/// Recognizes SSO providers by the buttons and links offering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct SsoButtonDetector;

impl Detector for SsoButtonDetector {
    fn strategy(&self) -> RecognitionStrategy {
        RecognitionStrategy::SsoButton
    }

    fn detect(&self, snapshot: &PageSnapshot, ctx: &DetectionContext<'_>) -> Detection {
        let mut detection = Detection::default();
        for idp in ctx.rules.sso().filter(|r| ctx.idp_config.in_scope(&r.name)) {
            let best = snapshot
                .clickables
                .iter()
                .filter_map(|el| classify(el, idp).map(|v| (v, el)))
                .max_by_key(|(v, _)| *v);
            let Some((validity, element)) = best else {
                continue;
            };

            log::debug!(
                "SSO button for {} on {} ({:?}): {:?}",
                idp.name,
                snapshot.url,
                validity,
                element.text
            );
            let mut record = RecognizedIdp::new(
                &idp.name,
                RecognitionStrategy::SsoButton,
                validity,
                &snapshot.url,
            )
            .with_element_box(element.bounding_box);
            if let Some(request) = snapshot
                .requests()
                .find(|r| match_request(&r.url, r.post_data.as_deref(), &idp.login_request_rule))
            {
                record = record.with_login_request(&request.url);
            }
            detection.idps.push(record);

            if ctx.first_match() {
                break;
            }
        }
        detection
    }
}
