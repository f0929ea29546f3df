//! Auth-method recognition over captured login pages.
//!
//! This module provides:
//! - [`PageSnapshot`], the per-page recognition input
//! - The [`Detector`] trait and one implementation per recognition strategy
//! - Multi-signal confidence scoring for passkey and MFA findings
//! - Well-known metadata probing (the only detector that performs I/O)
//! - Second-factor classification of the page a login trace ends on
//!
//! Detectors are pure functions of a snapshot and the rule table. They never
//! fail: a selector that does not parse disables only the check using it.

mod lastpass_icon;
mod metadata;
mod mfa;
mod navigator_credentials;
mod passkey;
mod password_form;
mod request;
pub mod scoring;
mod second_factor;
mod snapshot;
mod sso_button;

use crate::config::analysis::IdpConfig;
use crate::config::{RecognitionMode, RecognitionStrategy};
use crate::models::{LastpassIcon, NavCredCall, RecognizedIdp};
use crate::rules::IdpRuleTable;

pub use lastpass_icon::LastpassIconDetector;
pub use metadata::{detect_metadata, MetadataDetection, WELL_KNOWN_PATHS};
pub use mfa::MfaDetector;
pub use navigator_credentials::NavigatorCredentialsDetector;
pub use passkey::PasskeyDetector;
pub use password_form::PasswordFormDetector;
pub use request::RequestDetector;
pub use second_factor::detect_second_factor;
pub use snapshot::{element_text, inline_scripts, page_text, PageSnapshot};
pub use sso_button::SsoButtonDetector;

/// Read-only inputs shared by all detectors of one analysis.
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext<'a> {
    pub rules: &'a IdpRuleTable,
    pub idp_config: &'a IdpConfig,
    pub mode: RecognitionMode,
}

impl DetectionContext<'_> {
    pub fn first_match(&self) -> bool {
        self.mode == RecognitionMode::FirstMatch
    }
}

/// Findings of one detector on one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub idps: Vec<RecognizedIdp>,
    /// Passive login requests, merged after all detectors ran
    pub passive_idps: Vec<RecognizedIdp>,
    pub navcreds: Vec<NavCredCall>,
    pub lastpass_icons: Vec<LastpassIcon>,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.idps.is_empty()
            && self.passive_idps.is_empty()
            && self.navcreds.is_empty()
            && self.lastpass_icons.is_empty()
    }

    pub fn extend(&mut self, other: Detection) {
        self.idps.extend(other.idps);
        self.passive_idps.extend(other.passive_idps);
        self.navcreds.extend(other.navcreds);
        self.lastpass_icons.extend(other.lastpass_icons);
    }

    /// Keeps only the first finding, for `FIRST_MATCH` mode.
    pub fn truncate_to_first(&mut self) {
        if !self.idps.is_empty() {
            self.idps.truncate(1);
            self.passive_idps.clear();
        } else {
            self.passive_idps.truncate(1);
        }
    }
}

/// One recognition strategy.
pub trait Detector: Send + Sync {
    fn strategy(&self) -> RecognitionStrategy;

    fn detect(&self, snapshot: &PageSnapshot, ctx: &DetectionContext<'_>) -> Detection;
}

/// The detector implementing a DOM or request strategy.
///
/// `METADATA` runs outside the snapshot loop and `UNKNOWN` has no detector.
pub fn detector_for(strategy: RecognitionStrategy) -> Option<Box<dyn Detector>> {
    match strategy {
        RecognitionStrategy::SsoButton => Some(Box::new(SsoButtonDetector)),
        RecognitionStrategy::Request => Some(Box::new(RequestDetector)),
        RecognitionStrategy::PasswordForm => Some(Box::new(PasswordFormDetector)),
        RecognitionStrategy::Passkey => Some(Box::new(PasskeyDetector)),
        RecognitionStrategy::Mfa => Some(Box::new(MfaDetector)),
        RecognitionStrategy::NavigatorCredentials => Some(Box::new(NavigatorCredentialsDetector)),
        RecognitionStrategy::LastpassIcon => Some(Box::new(LastpassIconDetector)),
        RecognitionStrategy::Metadata | RecognitionStrategy::Unknown => None,
    }
}
