use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use url::Url;

use crate::config::analysis::KeywordStrategyConfig;
use crate::config::MAX_NESTED_SITEMAPS;
use crate::error_handling::DiscoveryError;
use crate::utils::contains_any;

use super::{fetch_text, same_site};

static LOC_REGEX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?is)<loc>\s*(?:<!\[CDATA\[)?\s*(.*?)\s*(?:\]\]>)?\s*</loc>")
        .map_err(|e| log::error!("Failed to compile sitemap loc regex: {}", e))
        .ok()
});

/// A parsed sitemap: either a list of page URLs or an index of sitemaps.
#[derive(Debug, Clone, PartialEq)]
pub enum SitemapDocument {
    Urls(Vec<String>),
    Index(Vec<String>),
}

/// Extracts `<loc>` entries from a sitemap or sitemap index.
pub fn parse_sitemap(body: &str) -> SitemapDocument {
    let locs: Vec<String> = LOC_REGEX
        .as_ref()
        .map(|re| {
            re.captures_iter(body)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().replace("&amp;", "&"))
                .collect()
        })
        .unwrap_or_default();
    if body.contains("<sitemapindex") {
        SitemapDocument::Index(locs)
    } else {
        SitemapDocument::Urls(locs)
    }
}

/// Login-like URLs from `/sitemap.xml`, following one level of sitemap index.
pub async fn sitemap_candidates(
    client: &reqwest::Client,
    base: &Url,
    config: &KeywordStrategyConfig,
) -> Result<Vec<String>, DiscoveryError> {
    let root = base.join("/sitemap.xml")?;
    let body = fetch_text(client, root.as_str()).await?;

    let urls = match parse_sitemap(&body) {
        SitemapDocument::Urls(urls) => urls,
        SitemapDocument::Index(children) => {
            let mut urls = Vec::new();
            for child in children.iter().take(MAX_NESTED_SITEMAPS) {
                match fetch_text(client, child).await {
                    Ok(body) => {
                        if let SitemapDocument::Urls(found) = parse_sitemap(&body) {
                            urls.extend(found);
                        }
                    }
                    Err(e) => debug!("Skipping nested sitemap {}: {}", child, e),
                }
            }
            urls
        }
    };

    Ok(urls
        .into_iter()
        .filter(|u| Url::parse(u).is_ok_and(|parsed| same_site(base, &parsed)))
        .filter(|u| contains_any(u, &config.keywords))
        .take(config.max_candidates)
        .collect())
}
