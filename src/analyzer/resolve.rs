//! Domain resolution through the browser.

use log::{info, warn};

use crate::browser::Page;
use crate::config::RESOLVE_SCHEMES;
use crate::error_handling::BrowserError;
use crate::models::ResolvedOutcome;
use crate::utils::format_error_chain;

/// Outcome of resolving a domain, with the homepage content when reachable.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub outcome: ResolvedOutcome,
    pub homepage_html: Option<String>,
}

fn failure(error: &BrowserError) -> ResolvedOutcome {
    ResolvedOutcome::unreachable(error.short_message(), Some(format_error_chain(error)))
}

/// Tries `https://<domain>` then `http://<domain>`.
///
/// The first navigation answering with a status in `200..400` wins. When
/// every scheme fails, the outcome describes the last failure.
pub async fn resolve_domain(page: &dyn Page, domain: &str) -> Resolution {
    let mut last = ResolvedOutcome::unreachable("Not attempted", None);

    for scheme in RESOLVE_SCHEMES {
        let url = format!("{}://{}", scheme, domain);
        info!("Resolving {}", url);
        let navigation = match page.navigate(&url).await {
            Ok(nav) => nav,
            Err(e) => {
                warn!("Resolving {} failed: {}", url, e);
                last = failure(&e);
                continue;
            }
        };
        if !navigation.is_success() {
            let status = navigation.status.unwrap_or_default();
            warn!("Resolving {} answered status {}", url, status);
            last = ResolvedOutcome::unreachable(format!("Status code {}", status), None);
            continue;
        }

        let title = page.title().await.unwrap_or_else(|e| {
            warn!("Could not read title of {}: {}", navigation.url, e);
            None
        });
        let homepage_html = match page.content().await {
            Ok(html) => Some(html),
            Err(e) => {
                warn!("Could not read content of {}: {}", navigation.url, e);
                None
            }
        };
        info!("Resolved {} to {}", domain, navigation.url);
        return Resolution {
            outcome: ResolvedOutcome::reachable(&navigation.url, title).with_status(navigation.status),
            homepage_html,
        };
    }

    Resolution {
        outcome: last,
        homepage_html: None,
    }
}
