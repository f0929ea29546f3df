//! CSS selector parsing utilities.

use scraper::Selector;

/// Parses a CSS selector, logging and returning `None` on failure.
///
/// Selectors come from the rule table and from detector constants. A bad one
/// disables only the check that uses it.
///
/// # Arguments
///
/// * `selector_str` - The CSS selector string to parse
/// * `context` - Context description for error logging (e.g., "mfa selectors")
pub fn parse_selector_with_fallback(selector_str: &str, context: &str) -> Option<Selector> {
    match Selector::parse(selector_str) {
        Ok(selector) => Some(selector),
        Err(e) => {
            log::error!(
                "Failed to parse CSS selector '{}' in {}: {}. Skipping.",
                selector_str,
                context,
                e
            );
            None
        }
    }
}

/// Parses a list of selectors, dropping the ones that fail.
pub fn parse_selectors(selectors: &[&str], context: &str) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| parse_selector_with_fallback(s, context))
        .collect()
}
