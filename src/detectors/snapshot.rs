//! Everything recognition needs from one loaded login page.

use scraper::{ElementRef, Html, Node};
use serde_json::Value;

use crate::browser::{CapturedRequest, ElementInfo, FrameInfo};
use crate::config::MAX_PAGE_TEXT_CHARS;

/// State captured from a login page during analysis.
///
/// A snapshot is taken once per distinct URL, so every provenance record of
/// that URL shares the same recognition input.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    /// The candidate URL that was navigated
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    /// Serialized main document
    pub html: String,
    /// Analyzable frames, main frame first
    pub frames: Vec<FrameInfo>,
    /// Clickable elements with labels and layout
    pub clickables: Vec<ElementInfo>,
    /// Requests issued during the first load
    pub first_load_requests: Vec<CapturedRequest>,
    /// Requests issued during the reload
    pub reload_requests: Vec<CapturedRequest>,
    /// `(function_name, function_params)` recorded by the navcred tracker
    pub navcred_calls: Vec<(String, Value)>,
    /// Whether `PublicKeyCredential` and `navigator.credentials.create/get` exist
    pub webauthn_available: bool,
}

impl PageSnapshot {
    /// First-load requests followed by reload requests.
    pub fn requests(&self) -> impl Iterator<Item = &CapturedRequest> {
        self.first_load_requests.iter().chain(self.reload_requests.iter())
    }

    /// HTML of every analyzable frame; the main document when no frames were captured.
    pub fn documents(&self) -> Vec<&str> {
        let docs: Vec<&str> = self.frames.iter().filter_map(|f| f.html.as_deref()).collect();
        if docs.is_empty() {
            vec![self.html.as_str()]
        } else {
            docs
        }
    }
}

/// Visible text of a document, skipping scripts and styles, lowercased.
pub fn page_text(doc: &Html) -> String {
    element_text(doc.root_element())
}

/// Text below `element`, skipping scripts and styles, lowercased and capped.
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "template"));
        if hidden {
            continue;
        }
        let t = text.trim();
        if !t.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(t);
        }
        if out.len() >= MAX_PAGE_TEXT_CHARS {
            break;
        }
    }
    crate::utils::truncate_chars(&out, MAX_PAGE_TEXT_CHARS).to_lowercase()
}

/// Inline script sources of a document.
pub fn inline_scripts(doc: &Html) -> Vec<String> {
    let Some(selector) = crate::utils::parse_selector_with_fallback("script", "inline scripts")
    else {
        return Vec::new();
    };
    doc.select(&selector)
        .map(|s| s.text().collect::<String>())
        .filter(|s| !s.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_text_skips_scripts() {
        let doc = Html::parse_document(
            "<html><body><h1>Sign In</h1><script>var secret = 1;</script><p>Use  your passkey</p></body></html>",
        );
        let text = page_text(&doc);
        assert!(text.contains("sign in"));
        assert!(text.contains("passkey"));
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_documents_fall_back_to_main_html() {
        let mut snapshot = PageSnapshot {
            html: "<p>main</p>".to_string(),
            ..Default::default()
        };
        assert_eq!(snapshot.documents(), vec!["<p>main</p>"]);

        snapshot.frames.push(FrameInfo {
            url: "https://x.test/".to_string(),
            html: Some("<p>frame</p>".to_string()),
            content_type: Some("text/html".to_string()),
        });
        snapshot.frames.push(FrameInfo {
            url: "https://other.test/".to_string(),
            html: None,
            content_type: None,
        });
        assert_eq!(snapshot.documents(), vec!["<p>frame</p>"]);
    }
}
