//! Recognition and SDK matching over captured snapshots.

use log::{debug, info};

use crate::config::{RecognitionStrategy, RecognitionStrategyConfig};
use crate::detectors::{detector_for, Detection, DetectionContext, PageSnapshot};
use crate::models::{LandscapeResult, RecognizedIdp};
use crate::rules::{match_sdk, IdpRuleTable};
use crate::utils::StageTimer;

/// Integration reported when no SDK could be attributed.
pub const NO_INTEGRATION: &str = "N/A";

/// Runs every snapshot strategy in scope order and merges the findings into `result`.
///
/// Passive request findings are appended after all active findings.
pub fn recognize(
    snapshots: &[PageSnapshot],
    config: &RecognitionStrategyConfig,
    ctx: &DetectionContext<'_>,
    result: &mut LandscapeResult,
) {
    let mut passive = Vec::new();

    for strategy in &config.recognition_strategy_scope {
        let Some(detector) = detector_for(*strategy) else {
            if *strategy == RecognitionStrategy::Unknown {
                debug!("Skipping unknown recognition strategy");
            }
            continue;
        };
        let timer = StageTimer::start(format!("{}_detection", strategy.as_str().to_lowercase()));
        let mut found = Detection::default();
        for snapshot in snapshots {
            let mut detection = detector.detect(snapshot, ctx);
            detection.idps.retain(|r| ctx.idp_config.in_scope(&r.idp_name));
            detection.passive_idps.retain(|r| ctx.idp_config.in_scope(&r.idp_name));
            if ctx.first_match() {
                detection.truncate_to_first();
            }
            let hit = !detection.idps.is_empty() || !detection.passive_idps.is_empty();
            found.extend(detection);
            if hit && ctx.first_match() {
                break;
            }
        }
        let elapsed = timer.record(&mut result.timings);
        info!(
            "Strategy {} recognized {} IdP(s) in {:.2}s",
            strategy,
            found.idps.len() + found.passive_idps.len(),
            elapsed
        );

        result.recognized_idps.extend(found.idps);
        result.recognized_navcreds.extend(found.navcreds);
        result.recognized_lastpass_icons.extend(found.lastpass_icons);
        passive.extend(found.passive_idps);
    }

    result.recognized_idps.extend(passive);
}

/// Attributes each recognition to an SDK.
///
/// A recognition with a captured login request takes the first SDK of its IdP
/// whose rule matches. Otherwise it keeps a preset integration or gets `N/A`.
pub fn match_sdks(idps: &mut [RecognizedIdp], rules: &IdpRuleTable) {
    for record in idps {
        let sdk = record
            .idp_login_request
            .as_deref()
            .zip(rules.get(&record.idp_name))
            .and_then(|(request, rule)| match_sdk(rule, request, None));
        match sdk {
            Some(sdk) => record.idp_integration = Some(sdk.to_string()),
            None if record.idp_integration.is_none() => {
                record.idp_integration = Some(NO_INTEGRATION.to_string())
            }
            None => {}
        }
    }
}
