//! Login-page candidate discovery and grouping.

use std::collections::BTreeMap;

use log::{info, warn};

use crate::config::analysis::LoginPageConfig;
use crate::discovery::{normalize_url, Discovery, DiscoveryInput, PriorityRules};
use crate::models::LoginPageCandidate;
use crate::utils::StageTimer;

/// Runs every strategy in scope, in scope order, and tags each URL it yields.
///
/// A failing strategy is logged and contributes no candidates.
pub async fn discover_candidates(
    discovery: &Discovery,
    input: &DiscoveryInput<'_>,
    config: &LoginPageConfig,
    timings: &mut BTreeMap<String, f64>,
) -> Vec<LoginPageCandidate> {
    let priorities = PriorityRules::new(&config.login_page_url_regexes);
    let mut candidates = Vec::new();

    for strategy in &config.login_page_strategy_scope {
        let timer = StageTimer::start(format!("login_page_detection_{}", strategy.timing_name()));
        let urls = match discovery.run(*strategy, input).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!("Login page strategy {} failed: {}", strategy.as_str(), e);
                Vec::new()
            }
        };
        let before = candidates.len();
        for url in urls {
            let url = normalize_url(&url);
            let priority = priorities.priority_of(&url);
            candidates.push(LoginPageCandidate::new(url, *strategy, priority));
        }
        let elapsed = timer.record(timings);
        info!(
            "Login page strategy {} found {} candidate(s) in {:.2}s",
            strategy.as_str(),
            candidates.len() - before,
            elapsed
        );
    }
    candidates
}

/// Groups candidate indices by URL.
///
/// Groups are ordered by descending maximum priority; ties keep the order in
/// which the URL first appeared.
pub fn group_candidates(candidates: &[LoginPageCandidate]) -> Vec<(String, Vec<usize>)> {
    let mut groups: Vec<(String, Vec<usize>, i64)> = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        let url = &candidate.login_page_candidate;
        match groups.iter_mut().find(|(u, _, _)| u == url) {
            Some((_, indices, priority)) => {
                indices.push(index);
                *priority = (*priority).max(candidate.login_page_priority);
            }
            None => groups.push((url.clone(), vec![index], candidate.login_page_priority)),
        }
    }
    // Stable sort keeps first-appearance order among equal priorities.
    groups.sort_by(|a, b| b.2.cmp(&a.2));
    groups.into_iter().map(|(url, indices, _)| (url, indices)).collect()
}
