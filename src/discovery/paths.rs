use url::Url;

use crate::config::analysis::PathsStrategyConfig;

use super::site_host;

/// Well-known login paths on the resolved origin plus login subdomains.
pub fn path_candidates(base: &Url, config: &PathsStrategyConfig) -> Vec<String> {
    let mut out = Vec::new();
    for path in &config.paths {
        if let Ok(url) = base.join(path) {
            out.push(url.to_string());
        }
    }
    if let Some(site) = site_host(base) {
        for sub in &config.subdomains {
            out.push(format!("{}://{}.{}/", base.scheme(), sub, site));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_and_subdomains() {
        let base = Url::parse("https://www.example.com/home").unwrap();
        let config = PathsStrategyConfig {
            paths: vec!["/login".to_string(), "signin".to_string()],
            subdomains: vec!["auth".to_string()],
        };
        assert_eq!(
            path_candidates(&base, &config),
            vec![
                "https://www.example.com/login",
                "https://www.example.com/signin",
                "https://auth.example.com/",
            ]
        );
    }
}
