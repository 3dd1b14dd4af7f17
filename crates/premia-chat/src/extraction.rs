//! Extraction adapter: free-text model output to a structured slot update.
//!
//! Model output is decoded in layers:
//!
//! 1. strip a surrounding Markdown code fence,
//! 2. parse the whole text when it looks like a bare object,
//! 3. otherwise scan for the first balanced `{ ... }` and parse that.
//!
//! Any failure is reported as an [`ExtractionParseError`] and the turn
//! continues without an update.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ExtractionParseError, GatewayError};
use crate::gateway::LanguageModelGateway;
use crate::prompt;
use crate::slots::{ExtractionDelta, SlotState};

/// Upper bound on how far the brace scanner walks from the first `{`.
pub const MAX_SCAN_BYTES: usize = 16 * 1024;

static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```\s*$")
        .expect("Invalid code fence regex")
});

/// Remove a surrounding ```` ``` ```` / ```` ```json ```` fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    match CODE_FENCE_RE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text,
    }
}

/// Decode a JSON object from model output.
pub fn parse_structured(text: &str) -> Result<Map<String, Value>, ExtractionParseError> {
    parse_structured_bounded(text, MAX_SCAN_BYTES)
}

/// [`parse_structured`] with an explicit scan bound.
pub fn parse_structured_bounded(
    text: &str,
    max_scan: usize,
) -> Result<Map<String, Value>, ExtractionParseError> {
    let text = strip_code_fence(text).trim();
    if text.is_empty() {
        return Err(ExtractionParseError::Empty);
    }

    if text.starts_with('{') && text.ends_with('}') {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => return into_object(value),
            Err(e) => debug!(error = %e, "Direct decode failed, scanning for object"),
        }
    }

    let candidate = find_object(text, max_scan)?;
    let value = serde_json::from_str::<Value>(candidate)
        .map_err(|e| ExtractionParseError::Malformed(e.to_string()))?;
    into_object(value)
}

fn into_object(value: Value) -> Result<Map<String, Value>, ExtractionParseError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ExtractionParseError::NotAnObject),
    }
}

/// Slice from the first `{` to its matching `}`.
///
/// Braces inside string literals (including escaped quotes) are ignored.
fn find_object(text: &str, max_scan: usize) -> Result<&str, ExtractionParseError> {
    let start = text.find('{').ok_or(ExtractionParseError::NoObject)?;
    let bytes = &text.as_bytes()[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes.iter().enumerate() {
        if offset >= max_scan {
            return Err(ExtractionParseError::Unterminated(max_scan));
        }
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    Err(ExtractionParseError::Unterminated(bytes.len()))
}

// =============================================================================
// ExtractionAdapter
// =============================================================================

/// Turns one user utterance into an [`ExtractionDelta`] via the model.
pub struct ExtractionAdapter {
    gateway: Arc<dyn LanguageModelGateway>,
    max_scan: usize,
}

impl ExtractionAdapter {
    pub fn new(gateway: Arc<dyn LanguageModelGateway>) -> Self {
        Self {
            gateway,
            max_scan: MAX_SCAN_BYTES,
        }
    }

    /// Ask the model for slot values mentioned in `message`.
    ///
    /// Returns `Ok(None)` when the model output cannot be decoded. Gateway
    /// failures are returned as errors.
    pub async fn extract(
        &self,
        message: &str,
        state: &SlotState,
    ) -> Result<Option<ExtractionDelta>, GatewayError> {
        let prompt = prompt::extraction_prompt(message, state);
        let output = self.gateway.complete(&prompt).await?;

        match parse_structured_bounded(&output, self.max_scan) {
            Ok(object) => {
                let delta = ExtractionDelta::from_object(&object);
                debug!(fields = delta.len(), "Extraction decoded");
                Ok(Some(delta))
            }
            Err(e) => {
                warn!(error = %e, "Discarding undecodable extraction output");
                Ok(None)
            }
        }
    }
}
