//! Utility functions.
//!
//! This module provides:
//! - CSS selector parsing with logging fallbacks
//! - Error message sanitization for result documents
//! - Stage timing
//! - Keyword and text matching

mod sanitize;
mod selector;
mod text;
mod timing;

pub use sanitize::{
    format_error_chain, sanitize_and_truncate_error_message, MAX_ERROR_MESSAGE_LENGTH,
};
pub use selector::{parse_selector_with_fallback, parse_selectors};
pub use text::{contains_any, contains_word, normalize_text, truncate_chars};
pub use timing::StageTimer;
