//! Helpers for keeping credentials and bulky payloads out of logs and spans.
//!
//! Signed upload URLs carry their authorization in the query string, so they
//! must never be logged verbatim.

use std::path::Path;

/// Maximum length for response bodies quoted in errors and logs.
pub const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Drops the query string and fragment of a URL.
///
/// - `https://storage.googleapis.com/b/o.pdf?X-Goog-Signature=abc` → `https://storage.googleapis.com/b/o.pdf?<redacted>`
/// - `https://example.com/plain` → `https://example.com/plain` (no change)
pub fn redact_signed_url(url: &str) -> String {
    match url.find(|c| c == '?' || c == '#') {
        Some(pos) => format!("{}?<redacted>", &url[..pos]),
        None => url.to_string(),
    }
}

/// Returns only the filename component of a path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Truncates a response body on a char boundary so it is safe to quote.
pub fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}
