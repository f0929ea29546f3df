//! LastPass autofill icon recognition.
//!
//! The LastPass extension decorates credential inputs it would autofill. Its
//! icons mark fields the password manager recognizes as a login form.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::{Detection, DetectionContext, Detector, PageSnapshot};
use crate::config::RecognitionStrategy;
use crate::models::LastpassIcon;
use crate::utils::parse_selector_with_fallback;

static LASTPASS_ICON: LazyLock<Option<Selector>> = LazyLock::new(|| {
    parse_selector_with_fallback(
        "[data-lastpass-icon-root], [data-lastpass-root], div[id^='__lpform_']",
        "lastpass icons",
    )
});

pub(super) fn count_icons(html: &str) -> usize {
    let Some(selector) = LASTPASS_ICON.as_ref() else {
        return 0;
    };
    Html::parse_document(html).select(selector).count()
}

/// Counts LastPass icons per inspectable frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct LastpassIconDetector;

impl Detector for LastpassIconDetector {
    fn strategy(&self) -> RecognitionStrategy {
        RecognitionStrategy::LastpassIcon
    }

    fn detect(&self, snapshot: &PageSnapshot, _ctx: &DetectionContext<'_>) -> Detection {
        let mut detection = Detection::default();
        for (frame_index, frame) in snapshot.frames.iter().enumerate() {
            let Some(html) = frame.html.as_deref() else {
                continue;
            };
            let icon_count = count_icons(html);
            if icon_count == 0 {
                continue;
            }
            log::debug!(
                "{} LastPass icon(s) in frame {} of {}",
                icon_count,
                frame_index,
                snapshot.url
            );
            detection.lastpass_icons.push(LastpassIcon {
                login_page_url: snapshot.url.clone(),
                frame_index,
                frame_url: frame.url.clone(),
                icon_count,
            });
        }
        detection
    }
}
