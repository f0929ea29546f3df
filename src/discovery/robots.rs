use std::collections::HashSet;

use url::Url;

use crate::config::analysis::KeywordStrategyConfig;
use crate::error_handling::DiscoveryError;
use crate::utils::contains_any;

use super::fetch_text;

/// Paths listed in `Allow`/`Disallow` rules, without wildcards and duplicates.
pub fn parse_robots(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    body.lines()
        .filter_map(|line| {
            let line = line.split('#').next().unwrap_or_default().trim();
            let (key, value) = line.split_once(':')?;
            let key = key.trim().to_lowercase();
            if key != "allow" && key != "disallow" {
                return None;
            }
            let path = value.trim().split('*').next().unwrap_or_default().trim_end_matches('$');
            (path.starts_with('/') && path.len() > 1).then(|| path.to_string())
        })
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Login-like paths from the site's robots.txt.
pub async fn robots_candidates(
    client: &reqwest::Client,
    base: &Url,
    config: &KeywordStrategyConfig,
) -> Result<Vec<String>, DiscoveryError> {
    let robots_url = base.join("/robots.txt")?;
    let body = fetch_text(client, robots_url.as_str()).await?;
    Ok(parse_robots(&body)
        .into_iter()
        .filter(|p| contains_any(p, &config.keywords))
        .filter_map(|p| base.join(&p).ok().map(|u| u.to_string()))
        .take(config.max_candidates)
        .collect())
}
