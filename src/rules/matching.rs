//! URL and request matching against [`UrlRule`]s.

use serde_json::Value;
use url::Url;

use super::types::{IdpRule, UrlRule};

/// Returns true if `url` satisfies `rule`.
///
/// The domain regex is searched in the host, the path regex in the path, and
/// every param rule must be satisfied by at least one query parameter. An
/// unparsable URL never matches.
pub fn match_url(url: &str, rule: &UrlRule) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let params: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    match_parsed(&parsed, &params, rule)
}

/// Like [`match_url`], but parameters may also come from a request body.
///
/// Bodies are read as `application/x-www-form-urlencoded` or as a flat JSON
/// object; other bodies contribute no parameters.
pub fn match_request(url: &str, body: Option<&str>, rule: &UrlRule) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let mut params: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    if let Some(body) = body {
        params.extend(body_params(body));
    }
    match_parsed(&parsed, &params, rule)
}

fn match_parsed(url: &Url, params: &[(String, String)], rule: &UrlRule) -> bool {
    let host = url.host_str().unwrap_or_default();
    let path = url.path();

    if !rule.domain.is_match(host) || !rule.path.is_match(path) {
        return false;
    }
    if rule.path_exclude.as_ref().is_some_and(|ex| ex.is_match(path)) {
        return false;
    }
    rule.params.iter().all(|param| {
        params
            .iter()
            .any(|(name, value)| param.name.is_match(name) && param.value.is_match(value))
    })
}

fn body_params(body: &str) -> Vec<(String, String)> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') {
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) else {
            return Vec::new();
        };
        return map
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect();
    }
    url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect()
}

/// Name of the first SDK of `idp` whose rule matches the request, in declaration order.
pub fn match_sdk<'a>(idp: &'a IdpRule, request_url: &str, body: Option<&str>) -> Option<&'a str> {
    idp.sdks
        .iter()
        .find(|(_, rule)| match_request(request_url, body, rule))
        .map(|(name, _)| name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::types::UrlRuleSpec;

    fn google_oauth_rule() -> UrlRule {
        UrlRuleSpec::new(r"^accounts\.google\.com$", "/oauth2", &[("^client_id$", ".*")])
            .compile()
            .unwrap()
    }

    #[test]
    fn test_match_url_literal_cases() {
        let rule = google_oauth_rule();
        assert!(match_url("https://accounts.google.com/oauth2?client_id=abc", &rule));
        assert!(!match_url("https://accounts.google.com/oauth2", &rule));
        assert!(!match_url("https://evil.com/oauth2?client_id=abc", &rule));
    }

    #[test]
    fn test_param_value_regex() {
        let rule = UrlRuleSpec::new(
            r"^accounts\.google\.com$",
            "^/o/oauth2",
            &[("^redirect_uri$", "^storagerelay://")],
        )
        .compile()
        .unwrap();
        assert!(match_url(
            "https://accounts.google.com/o/oauth2/auth?redirect_uri=storagerelay://https/example.com",
            &rule
        ));
        assert!(!match_url(
            "https://accounts.google.com/o/oauth2/auth?redirect_uri=https://example.com/cb",
            &rule
        ));
    }

    #[test]
    fn test_path_exclude() {
        let rule = UrlRuleSpec::new(r"^accounts\.google\.com$", "(/gsi/select|/oauth2)", &[])
            .excluding("/iframerpc")
            .compile()
            .unwrap();
        assert!(match_url("https://accounts.google.com/o/oauth2/auth", &rule));
        assert!(!match_url(
            "https://accounts.google.com/o/oauth2/iframerpc?action=x",
            &rule
        ));
    }

    #[test]
    fn test_empty_params_matches_any_request() {
        let rule = UrlRuleSpec::any().compile().unwrap();
        assert!(match_url("https://whatever.example/x/y", &rule));
        assert!(!match_url("not a url", &rule));
    }

    #[test]
    fn test_match_request_reads_body_params() {
        let rule = UrlRuleSpec::new(".*", ".*(login|signin|auth).*", &[("^(username|email|password)$", ".*")])
            .compile()
            .unwrap();
        let url = "https://example.com/api/login";
        assert!(!match_url(url, &rule));
        assert!(match_request(url, Some("email=a%40b.c&remember=1"), &rule));
        assert!(match_request(url, Some(r#"{"password": "x", "n": 1}"#), &rule));
        assert!(!match_request(url, Some("<xml/>"), &rule));
    }
}
