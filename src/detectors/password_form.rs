//! Username/password form recognition.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::{Detection, DetectionContext, Detector, PageSnapshot};
use crate::config::RecognitionStrategy;
use crate::models::{RecognizedIdp, Validity};
use crate::rules::{FormRule, IdpKind};
use crate::utils::parse_selector_with_fallback;

static INPUT: LazyLock<Option<Selector>> =
    LazyLock::new(|| parse_selector_with_fallback("input", "password form inputs"));
static SUBMIT: LazyLock<Option<Selector>> = LazyLock::new(|| {
    parse_selector_with_fallback(
        "form, button[type='submit'], input[type='submit']",
        "password form submit",
    )
});

/// Integration reported for plain HTML credential forms.
const BASIC_INTEGRATION: &str = "BASIC";

fn identifying_attrs<'a>(input: &ElementRef<'a>) -> impl Iterator<Item = String> + 'a {
    let el = input.value();
    ["name", "id", "placeholder", "autocomplete"]
        .into_iter()
        .filter_map(move |a| el.attr(a))
        .map(str::to_lowercase)
}

fn matches_tokens(input: &ElementRef<'_>, tokens: &[String]) -> bool {
    identifying_attrs(input).any(|v| tokens.iter().any(|t| v.contains(&t.to_lowercase())))
}

fn input_type(input: &ElementRef<'_>) -> String {
    input
        .value()
        .attr("type")
        .unwrap_or("text")
        .to_lowercase()
}

/// True if `html` holds a username field, a password field, and a way to submit them.
pub(super) fn has_password_form(html: &str, rule: &FormRule) -> bool {
    let (Some(input), Some(submit)) = (INPUT.as_ref(), SUBMIT.as_ref()) else {
        return false;
    };
    let doc = Html::parse_document(html);
    let inputs: Vec<ElementRef<'_>> = doc.select(input).collect();

    let username = inputs.iter().any(|i| {
        matches!(input_type(i).as_str(), "text" | "email") && matches_tokens(i, &rule.username)
    });
    let password = inputs.iter().any(|i| {
        let ty = input_type(i);
        ty == "password" || (ty != "hidden" && matches_tokens(i, &rule.password))
    });
    username && password && doc.select(submit).next().is_some()
}

/// Recognizes first-party credential forms.
#[derive(Debug, Default, Clone, Copy)]
pub struct PasswordFormDetector;

impl Detector for PasswordFormDetector {
    fn strategy(&self) -> RecognitionStrategy {
        RecognitionStrategy::PasswordForm
    }

    fn detect(&self, snapshot: &PageSnapshot, ctx: &DetectionContext<'_>) -> Detection {
        let mut detection = Detection::default();
        let Some(idp) = ctx
            .rules
            .iter()
            .find(|r| r.kind == IdpKind::Password && ctx.idp_config.in_scope(&r.name))
        else {
            return detection;
        };
        let Some(rule) = &idp.form_rule else {
            return detection;
        };

        let found = snapshot
            .frames
            .iter()
            .filter_map(|f| f.html.as_deref().map(|html| (f.url.as_str(), html)))
            .chain(snapshot.frames.is_empty().then_some((snapshot.url.as_str(), snapshot.html.as_str())))
            .find(|(_, html)| has_password_form(html, rule));

        if let Some((frame_url, _)) = found {
            log::debug!("Password form on {} (frame {})", snapshot.url, frame_url);
            let mut record = RecognizedIdp::new(
                &idp.name,
                RecognitionStrategy::PasswordForm,
                Validity::High,
                &snapshot.url,
            )
            .with_integration(BASIC_INTEGRATION);
            if frame_url != snapshot.url && frame_url != snapshot.final_url {
                record.idp_frame = Some(frame_url.to_string());
            }
            detection.idps.push(record);
        }
        detection
    }
}
