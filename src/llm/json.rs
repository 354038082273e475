//! Strict JSON extraction from LLM responses.
//!
//! One validator shared by every JSON-emitting prompt: strips markdown
//! code fences, parses against the caller's schema type, and produces
//! a diagnostic [`EngineError::ResponseParse`] with a content preview
//! on mismatch. Callers own the one-retry-then-fallback policy.

use serde::de::DeserializeOwned;

use crate::error::EngineError;

/// Maximum bytes of response content included in parse diagnostics.
const PREVIEW_LEN: usize = 200;

/// Strips markdown code fences from a model response.
#[must_use]
pub fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    }
}

/// Parses a model response into `T` after fence stripping.
///
/// # Errors
///
/// Returns [`EngineError::ResponseParse`] with a bounded preview of
/// the offending content when the response does not match the schema.
pub fn parse_json_response<T: DeserializeOwned>(content: &str) -> Result<T, EngineError> {
    let json_str = strip_fences(content);

    serde_json::from_str::<T>(json_str).map_err(|e| {
        let mut preview_end = json_str.len().min(PREVIEW_LEN);
        while !json_str.is_char_boundary(preview_end) {
            preview_end -= 1;
        }
        let preview = &json_str[..preview_end];
        EngineError::ResponseParse {
            message: format!(
                "schema mismatch: {e}. Response length: {} bytes, preview: {preview:?}",
                json_str.len()
            ),
            content: content.to_string(),
        }
    })
}
