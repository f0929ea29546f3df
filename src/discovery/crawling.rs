use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use crate::config::analysis::KeywordStrategyConfig;
use crate::utils::{contains_any, parse_selector_with_fallback};

use super::same_site;

static ANCHOR_SELECTOR: LazyLock<Option<Selector>> =
    LazyLock::new(|| parse_selector_with_fallback("a[href]", "crawling anchors"));

/// On-site links of the homepage whose URL or text contains a login keyword.
///
/// Links are returned in document order, without duplicates, at most
/// `max_candidates` of them.
pub fn crawl_links(html: &str, base: &Url, config: &KeywordStrategyConfig) -> Vec<String> {
    let Some(selector) = ANCHOR_SELECTOR.as_ref() else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for anchor in document.select(selector) {
        if out.len() >= config.max_candidates {
            break;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(mut url) = base.join(href.trim()) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") || !same_site(base, &url) {
            continue;
        }
        url.set_fragment(None);

        let text: String = anchor.text().collect::<Vec<_>>().join(" ");
        let haystack = format!("{} {} {}", url.path(), url.query().unwrap_or_default(), text);
        if contains_any(&haystack, &config.keywords) && seen.insert(url.to_string()) {
            out.push(url.to_string());
        }
    }
    out
}
