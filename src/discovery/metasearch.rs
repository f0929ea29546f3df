use serde::Deserialize;
use url::Url;

use crate::config::analysis::MetasearchStrategyConfig;
use crate::error_handling::DiscoveryError;

use super::same_site;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
}

/// Top on-site results of a SearXNG query for the domain's login page.
pub async fn search_candidates(
    client: &reqwest::Client,
    searxng_url: &str,
    domain: &str,
    base: &Url,
    config: &MetasearchStrategyConfig,
) -> Result<Vec<String>, DiscoveryError> {
    let mut search_url = Url::parse(searxng_url)?.join("search")?;
    search_url
        .query_pairs_mut()
        .append_pair("q", &config.query.replace("{domain}", domain))
        .append_pair("format", "json")
        .append_pair("engines", &config.search_engines.join(","));

    let response = client.get(search_url.as_str()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DiscoveryError::Status {
            url: search_url.to_string(),
            status: status.as_u16(),
        });
    }
    let body: SearchResponse = serde_json::from_slice(&response.bytes().await?)?;

    Ok(body
        .results
        .into_iter()
        .map(|r| r.url)
        .filter(|u| Url::parse(u).is_ok_and(|parsed| same_site(base, &parsed)))
        .take(config.max_candidates)
        .collect())
}
