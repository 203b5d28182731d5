//! Output cleaning: raw model text → JSON value.
//!
//! The layout model is asked for a JSON array of blocks, and mostly returns
//! one. The exceptions are the reason this module exists:
//!
//! - the array arrives wrapped in a ```` ```json ```` fence
//! - generation hits `max_new_tokens` and the array is cut off mid-object
//!
//! [`LayoutOutputCleaner`] handles both. Anything it cannot recover is an
//! error, and the recognizer decides whether the page failed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CleanError {
    #[error("model output is empty")]
    Empty,

    #[error("model output is not JSON and no complete block could be salvaged: {0}")]
    Unrecoverable(String),
}

/// Turns the accumulated response text of one page into a JSON value.
///
/// The recognizer only accepts a JSON array; cleaners may return other
/// values and let it reject them.
pub trait OutputCleaner: Send + Sync {
    fn clean(&self, raw: &str) -> Result<Value, CleanError>;
}

/// Default cleaner for layout-prompt output.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutOutputCleaner;

impl OutputCleaner for LayoutOutputCleaner {
    fn clean(&self, raw: &str) -> Result<Value, CleanError> {
        let body = strip_fences(raw.trim());
        if body.is_empty() {
            return Err(CleanError::Empty);
        }

        match serde_json::from_str::<Value>(body) {
            Ok(value) => Ok(value),
            Err(parse_err) => {
                let salvaged = salvage_objects(body);
                if salvaged.is_empty() {
                    return Err(CleanError::Unrecoverable(parse_err.to_string()));
                }
                debug!(
                    "Salvaged {} complete blocks from truncated output ({})",
                    salvaged.len(),
                    parse_err
                );
                Ok(Value::Array(salvaged))
            }
        }
    }
}

// ── Fences ───────────────────────────────────────────────────────────────

static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\s*```\s*$").unwrap());

// A fence that was opened but never closed, as in truncated output.
static RE_OPEN_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[A-Za-z]*[ \t]*\r?\n").unwrap());

fn strip_fences(input: &str) -> &str {
    if let Some(caps) = RE_FENCED.captures(input) {
        if let Some(inner) = caps.get(1) {
            return inner.as_str().trim();
        }
    }
    match RE_OPEN_FENCE.find(input) {
        Some(m) => input[m.end()..].trim(),
        None => input,
    }
}

// ── Salvage ──────────────────────────────────────────────────────────────

/// Every complete object directly inside the first top-level array of `s`.
///
/// Brace depth is tracked outside string literals only, so `{` or `}` inside
/// block text does not confuse the scan. Scanning stops at the array's
/// closing bracket or at the end of input.
fn salvage_objects(s: &str) -> Vec<Value> {
    let Some(start) = s.find('[') else {
        return Vec::new();
    };

    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut object_start = None;

    for (i, &b) in bytes.iter().enumerate().skip(start + 1) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                if depth == 0 && b == b'{' {
                    object_start = Some(i);
                }
                depth += 1;
            }
            b'}' | b']' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 && b == b'}' {
                    if let Some(from) = object_start.take() {
                        if let Ok(v) = serde_json::from_str::<Value>(&s[from..=i]) {
                            out.push(v);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    out
}
