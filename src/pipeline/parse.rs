//! Structured-output parsing: turn a model's per-page extraction reply into
//! JSON.
//!
//! Even when told to "return only JSON", vision models regularly wrap the
//! object in ` ```json ` fences, prepend a sentence ("Here is the data:"),
//! or emit a BOM. The cleanup passes below are cheap and deterministic; any
//! reply that still fails to parse becomes a non-fatal
//! [`PageError::MalformedPageOutput`] and the page is excluded from merging.
//!
//! Passes (in order):
//! 1. Strip invisible Unicode (BOM, zero-width spaces)
//! 2. Strip outer code fences, with or without a language tag
//! 3. Parse; on failure, retry on the outermost `{ … }` span

use crate::error::PageError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n?```\s*$").unwrap());

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{FEFF}\u{200B}\u{200C}\u{200D}\u{2060}]").unwrap());

/// Parse one page's extraction reply.
///
/// Returns any JSON value; whether it is an object is the merger's concern.
/// `page` is the 1-based page number recorded in the error.
pub fn parse_extraction_response(page: usize, raw: &str) -> Result<Value, PageError> {
    let cleaned = RE_INVISIBLE.replace_all(raw, "");
    let body = strip_code_fences(cleaned.trim());

    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            if let Some(span) = outermost_object(body) {
                if let Ok(value) = serde_json::from_str::<Value>(span) {
                    debug!(page, "Recovered JSON object from surrounding prose");
                    return Ok(value);
                }
            }
            Err(PageError::MalformedPageOutput {
                page,
                detail: first_err.to_string(),
            })
        }
    }
}

fn strip_code_fences(input: &str) -> &str {
    match RE_OUTER_FENCES.captures(input) {
        Some(caps) => caps.get(1).map_or(input, |m| m.as_str().trim()),
        None => input,
    }
}

/// The span from the first `{` to the last `}`, if both exist in order.
fn outermost_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (end > start).then(|| &input[start..=end])
}
