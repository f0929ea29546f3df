//! Utilities for sanitizing error messages.
//!
//! Error chains end up in result documents (`resolved.error`), so they are
//! stripped of control characters and bounded in length.

/// Upper bound for error text stored in a result.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 4000;

/// Sanitizes an error message by removing control characters.
///
/// Newlines, tabs, and carriage returns are kept; other characters below 0x20
/// are removed. Non-ASCII text is preserved.
pub fn sanitize_error_message(message: &str) -> String {
    message
        .chars()
        .filter(|c| {
            let code = *c as u32;
            code >= 0x20 || code == 0x09 || code == 0x0A || code == 0x0D
        })
        .collect()
}

/// Sanitizes and truncates an error message to at most `max_len` characters.
pub fn sanitize_and_truncate_error_message(message: &str, max_len: usize) -> String {
    let sanitized = sanitize_error_message(message);
    if sanitized.chars().count() <= max_len {
        return sanitized;
    }
    let truncated: String = sanitized.chars().take(max_len).collect();
    format!("{}... (truncated)", truncated)
}

/// Renders an error and its sources, one per line, for the `error` field of results.
pub fn format_error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut lines = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        lines.push(format!("Caused by: {}", cause));
        source = cause.source();
    }
    sanitize_and_truncate_error_message(&lines.join("\n"), MAX_ERROR_MESSAGE_LENGTH)
}
