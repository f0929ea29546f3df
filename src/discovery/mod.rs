//! Login-page candidate discovery.
//!
//! Each strategy turns what is known about the resolved site into candidate
//! URLs. Strategies never deduplicate against each other: the analyzer keeps
//! every (url, strategy) pair as its own provenance record and groups by URL
//! later.

mod crawling;
mod metasearch;
mod paths;
mod robots;
mod sitemap;

use std::sync::Arc;

use log::{debug, warn};
use regex::Regex;
use url::Url;

use crate::config::analysis::{LoginPageConfig, UrlPriorityRegex};
use crate::config::{LoginPageStrategy, MAX_DISCOVERY_BODY_SIZE};
use crate::error_handling::DiscoveryError;

pub use crawling::crawl_links;
pub use metasearch::search_candidates;
pub use paths::path_candidates;
pub use robots::{parse_robots, robots_candidates};
pub use sitemap::{parse_sitemap, sitemap_candidates, SitemapDocument};

/// Compiled `login_page_url_regexes`.
#[derive(Debug, Clone, Default)]
pub struct PriorityRules {
    rules: Vec<(Regex, i64)>,
}

impl PriorityRules {
    /// Compiles the configured regexes; invalid ones are logged and skipped.
    pub fn new(regexes: &[UrlPriorityRegex]) -> Self {
        let rules = regexes
            .iter()
            .filter_map(|r| match Regex::new(&r.regex) {
                Ok(re) => Some((re, r.priority)),
                Err(e) => {
                    warn!("Ignoring invalid login page regex '{}': {}", r.regex, e);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Highest priority among matching regexes, or 0.
    pub fn priority_of(&self, url: &str) -> i64 {
        self.rules
            .iter()
            .filter(|(re, _)| re.is_match(url))
            .map(|(_, p)| *p)
            .max()
            .unwrap_or(0)
    }
}

/// Normalizes a candidate URL: parsed, fragment removed.
///
/// Unparsable input is returned trimmed so it still shows up in results.
pub fn normalize_url(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.trim().to_string(),
    }
}

/// Host with a leading `www.` removed, used to keep discovery on-site.
pub fn site_host(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.strip_prefix("www.").unwrap_or(h).to_lowercase())
}

/// True if `candidate` is on the same site as `base` (same host or a subdomain).
pub fn same_site(base: &Url, candidate: &Url) -> bool {
    match (site_host(base), candidate.host_str()) {
        (Some(site), Some(host)) => {
            let host = host.to_lowercase();
            host == site || host.ends_with(&format!(".{}", site))
        }
        _ => false,
    }
}

/// What the strategies know about the site.
#[derive(Debug, Clone)]
pub struct DiscoveryInput<'a> {
    pub domain: &'a str,
    /// Final URL of the resolved homepage
    pub resolved_url: &'a str,
    /// Homepage HTML captured while resolving
    pub homepage_html: Option<&'a str>,
    pub config: &'a LoginPageConfig,
}

/// Runs discovery strategies that need network access or page content.
#[derive(Debug, Clone)]
pub struct Discovery {
    client: Arc<reqwest::Client>,
    searxng_url: String,
}

impl Discovery {
    pub fn new(client: Arc<reqwest::Client>, searxng_url: impl Into<String>) -> Self {
        Self {
            client,
            searxng_url: searxng_url.into(),
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Candidate URLs produced by one strategy, before normalization and ranking.
    pub async fn run(
        &self,
        strategy: LoginPageStrategy,
        input: &DiscoveryInput<'_>,
    ) -> Result<Vec<String>, DiscoveryError> {
        let base = Url::parse(input.resolved_url)?;
        let cfg = input.config;
        let urls = match strategy {
            LoginPageStrategy::Homepage => vec![input.resolved_url.to_string()],
            LoginPageStrategy::Manual => cfg.manual_strategy_config.login_page_candidates.clone(),
            LoginPageStrategy::Paths => path_candidates(&base, &cfg.paths_strategy_config),
            LoginPageStrategy::Crawling => match input.homepage_html {
                Some(html) => crawl_links(html, &base, &cfg.crawling_strategy_config),
                None => {
                    debug!("No homepage content captured, crawling yields nothing");
                    Vec::new()
                }
            },
            LoginPageStrategy::Sitemap => {
                sitemap_candidates(&self.client, &base, &cfg.sitemap_strategy_config).await?
            }
            LoginPageStrategy::Robots => {
                robots_candidates(&self.client, &base, &cfg.robots_strategy_config).await?
            }
            LoginPageStrategy::Metasearch => {
                search_candidates(
                    &self.client,
                    &self.searxng_url,
                    input.domain,
                    &base,
                    &cfg.metasearch_strategy_config,
                )
                .await?
            }
            LoginPageStrategy::Unknown => {
                warn!("Skipping unknown login page strategy");
                Vec::new()
            }
        };
        Ok(urls)
    }
}

/// GETs `url` and returns its body as text, bounded in size.
pub(crate) async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, DiscoveryError> {
    debug!("Discovery fetch: {}", url);
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DiscoveryError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let bytes = response.bytes().await?;
    let body = &bytes[..bytes.len().min(MAX_DISCOVERY_BODY_SIZE)];
    Ok(String::from_utf8_lossy(body).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_is_max_of_matches() {
        let rules = PriorityRules::new(&crate::config::analysis::LoginPageConfig::default().login_page_url_regexes);
        assert_eq!(rules.priority_of("https://example.com/account/login"), 100);
        assert_eq!(rules.priority_of("https://example.com/oauth/start"), 50);
        assert_eq!(rules.priority_of("https://example.com/profile"), 20);
        assert_eq!(rules.priority_of("https://example.com/"), 0);
    }

    #[test]
    fn test_invalid_priority_regex_is_skipped() {
        let rules = PriorityRules::new(&[
            UrlPriorityRegex {
                regex: "(".to_string(),
                priority: 500,
            },
            UrlPriorityRegex {
                regex: "login".to_string(),
                priority: 7,
            },
        ]);
        assert_eq!(rules.priority_of("https://a.b/login"), 7);
    }

    #[test]
    fn test_normalize_url_drops_fragment() {
        assert_eq!(normalize_url("https://example.com/login#top"), "https://example.com/login");
        assert_eq!(normalize_url("https://example.com"), "https://example.com/");
        assert_eq!(normalize_url("  not a url "), "not a url");
    }

    #[test]
    fn test_same_site() {
        let base = Url::parse("https://www.example.com/").unwrap();
        let sub = Url::parse("https://accounts.example.com/login").unwrap();
        let other = Url::parse("https://example.org/login").unwrap();
        let lookalike = Url::parse("https://notexample.com/").unwrap();
        assert!(same_site(&base, &sub));
        assert!(!same_site(&base, &other));
        assert!(!same_site(&base, &lookalike));
    }
}
