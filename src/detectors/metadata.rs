//! Well-known metadata probing.

use serde_json::Value;
use url::Url;

use crate::config::analysis::IdpConfig;
use crate::config::{RecognitionStrategy, MAX_DISCOVERY_BODY_SIZE};
use crate::models::{MetadataFinding, RecognizedIdp, Validity};

/// Well-known documents fetched from the resolved origin, in fetch order.
pub const WELL_KNOWN_PATHS: &[&str] = &[
    "/.well-known/openid-configuration",
    "/.well-known/oauth-authorization-server",
    "/.well-known/webauthn",
    "/.well-known/passkey-endpoints",
    "/.well-known/change-password",
];

const OIDC_PROVIDER: &str = "OIDC_PROVIDER";
const PASSKEY: &str = "PASSKEY";

/// Findings and the recognitions derived from them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataDetection {
    pub findings: Vec<MetadataFinding>,
    pub idps: Vec<RecognizedIdp>,
}

/// Recognition implied by a well-known document: `(idp_name, integration)`.
fn recognition_for(well_known: &str, document: Option<&Value>) -> Option<(&'static str, &'static str)> {
    match well_known {
        "/.well-known/openid-configuration" => document
            .filter(|d| d.get("issuer").is_some() || d.get("authorization_endpoint").is_some())
            .map(|_| (OIDC_PROVIDER, "OIDC")),
        "/.well-known/oauth-authorization-server" => document
            .filter(|d| d.get("issuer").is_some() || d.get("authorization_endpoint").is_some())
            .map(|_| (OIDC_PROVIDER, "OAUTH2")),
        "/.well-known/webauthn" | "/.well-known/passkey-endpoints" => {
            document.filter(|d| d.is_object()).map(|_| (PASSKEY, "WEBAUTHN"))
        }
        _ => None,
    }
}

/// Fetches every well-known path on the origin of `resolved_url`.
///
/// Failed requests and non-success statuses are skipped. Documents are kept
/// only when they parse as JSON.
pub async fn detect_metadata(
    client: &reqwest::Client,
    resolved_url: &str,
    idp_config: &IdpConfig,
) -> MetadataDetection {
    let mut detection = MetadataDetection::default();
    let Ok(base) = Url::parse(resolved_url) else {
        log::warn!("Metadata detection skipped, invalid URL: {}", resolved_url);
        return detection;
    };

    for well_known in WELL_KNOWN_PATHS {
        let Ok(url) = base.join(well_known) else {
            continue;
        };
        let response = match client.get(url.as_str()).send().await {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Metadata request for {} failed: {}", url, e);
                continue;
            }
        };
        let status = response.status();
        if !status.is_success() {
            log::debug!("Metadata {} answered {}", url, status);
            continue;
        }
        let final_url = response.url().to_string();
        let document = match response.bytes().await {
            Ok(bytes) => {
                serde_json::from_slice::<Value>(&bytes[..bytes.len().min(MAX_DISCOVERY_BODY_SIZE)]).ok()
            }
            Err(e) => {
                log::debug!("Metadata body for {} unreadable: {}", url, e);
                None
            }
        };

        if let Some((idp_name, integration)) = recognition_for(well_known, document.as_ref()) {
            if idp_config.in_scope(idp_name) {
                log::info!("Metadata {} recognized as {}", well_known, idp_name);
                detection.idps.push(
                    RecognizedIdp::new(idp_name, RecognitionStrategy::Metadata, Validity::High, resolved_url)
                        .with_integration(integration),
                );
            }
        }
        detection.findings.push(MetadataFinding {
            well_known: well_known.to_string(),
            url: final_url,
            status: status.as_u16(),
            document,
        });
    }
    detection
}
