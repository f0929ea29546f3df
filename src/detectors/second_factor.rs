//! Second-factor recognition on the page reached after a login trace.

use std::sync::LazyLock;

use scraper::{Html, Node, Selector};

use crate::models::AuthMethod;
use crate::utils::parse_selector_with_fallback;

/// Bounds on the number of short inputs forming a split one-time code.
const SPLIT_CODE_INPUTS: std::ops::RangeInclusive<usize> = 4..=8;

static SHORT_INPUT: LazyLock<Option<Selector>> = LazyLock::new(|| {
    parse_selector_with_fallback(
        r#"input[maxlength="1"], input[maxlength="2"]"#,
        "second factor short inputs",
    )
});

static CODE_INPUT: LazyLock<Option<Selector>> = LazyLock::new(|| {
    parse_selector_with_fallback(
        r#"input[name*="code"], input[id*="code"], input[placeholder*="code"]"#,
        "second factor code input",
    )
});

fn count(doc: &Html, selector: &LazyLock<Option<Selector>>) -> usize {
    selector.as_ref().map_or(0, |s| doc.select(s).count())
}

/// Text nodes outside scripts and styles, as written (case is significant).
fn text_nodes(doc: &Html) -> impl Iterator<Item = &str> {
    doc.root_element().descendants().filter_map(|node| {
        let Node::Text(text) = node.value() else {
            return None;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "template"));
        (!hidden).then_some(&**text)
    })
}

/// Classifies the second factor a page asks for.
///
/// Code inputs win over wording; among wordings SMS beats email, which
/// beats app approval.
pub fn detect_second_factor(html: &str) -> Option<AuthMethod> {
    let doc = Html::parse_document(html);

    if SPLIT_CODE_INPUTS.contains(&count(&doc, &SHORT_INPUT)) || count(&doc, &CODE_INPUT) > 0 {
        return Some(AuthMethod::Totp);
    }

    let texts: Vec<&str> = text_nodes(&doc).collect();
    let mentions = |pred: fn(&str) -> bool| texts.iter().any(|t| pred(t));
    if mentions(|t| t.contains("SMS") || t.contains("text message")) {
        Some(AuthMethod::Sms)
    } else if mentions(|t| t.contains("email") && t.contains("verification")) {
        Some(AuthMethod::Email)
    } else if mentions(|t| t.contains("authenticator app") || t.contains("approve in app")) {
        Some(AuthMethod::App)
    } else {
        None
    }
}
