//! Multi-signal confidence scoring.
//!
//! Each signal belongs to a category with a fixed weight. A page's confidence
//! is the strongest category weight plus a small bonus for every other
//! distinct category that fired, capped at 1.0. Keyword-only evidence stays
//! below the reporting threshold.

use crate::config::{
    CONFIDENCE_CORROBORATION_BONUS, CONFIDENCE_HIGH_THRESHOLD, CONFIDENCE_MEDIUM_THRESHOLD,
};
use crate::models::Validity;

/// Evidence gathered for one auth method on one page.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    signals: Vec<(&'static str, f64)>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a signal category; repeated categories count once.
    pub fn add(&mut self, category: &'static str, weight: f64) {
        if !self.signals.iter().any(|(c, _)| *c == category) {
            self.signals.push((category, weight));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn confidence(&self) -> f64 {
        let strongest = self
            .signals
            .iter()
            .map(|(_, w)| *w)
            .fold(0.0_f64, f64::max);
        let corroborating = self.signals.len().saturating_sub(1) as f64;
        (strongest + corroborating * CONFIDENCE_CORROBORATION_BONUS).min(1.0)
    }

    /// `None` below the reporting threshold.
    pub fn validity(&self) -> Option<Validity> {
        validity_for(self.confidence())
    }

    pub fn signal_names(&self) -> Vec<String> {
        self.signals.iter().map(|(c, _)| c.to_string()).collect()
    }
}

pub fn validity_for(confidence: f64) -> Option<Validity> {
    if confidence >= CONFIDENCE_HIGH_THRESHOLD {
        Some(Validity::High)
    } else if confidence >= CONFIDENCE_MEDIUM_THRESHOLD {
        Some(Validity::Medium)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_only_is_not_reported() {
        let mut e = Evidence::new();
        e.add("keyword", 0.3);
        assert!(e.validity().is_none());
        e.add("webauthn_api", 0.1);
        assert!(e.validity().is_none());
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(validity_for(0.49), None);
        assert_eq!(validity_for(0.5), Some(Validity::Medium));
        assert_eq!(validity_for(0.8), Some(Validity::High));
    }

    #[test]
    fn test_stronger_signal_never_lowers_confidence() {
        let weights = [("api", 0.1), ("keyword", 0.3), ("script", 0.6), ("icon", 0.7), ("button", 0.85)];
        for i in 0..weights.len() {
            let mut base = Evidence::new();
            for (c, w) in &weights[..i] {
                base.add(c, *w);
            }
            let before = base.confidence();
            for (c, w) in &weights[i..] {
                let mut extended = base.clone();
                extended.add(c, *w);
                assert!(extended.confidence() >= before);
            }
        }
    }

    #[test]
    fn test_repeated_category_counts_once_and_caps() {
        let mut e = Evidence::new();
        e.add("button", 0.85);
        e.add("button", 0.85);
        assert_eq!(e.signal_names(), vec!["button"]);
        for c in ["a", "b", "c", "d", "e"] {
            e.add(c, 0.1);
        }
        assert!(e.confidence() <= 1.0);
    }
}
