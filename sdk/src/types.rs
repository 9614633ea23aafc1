//! Capability call and result types
//!
//! These are the two halves of the Capability Contract:
//! `execute(CapabilityCall) -> CapabilityResult`.

use serde::{Deserialize, Serialize};

/// A single capability invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCall {
    /// Wire name of the capability (e.g. `write_file`)
    pub name: String,

    /// JSON arguments, usually an object
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl CapabilityCall {
    /// Create a new capability call
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Get a required string argument
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }

    /// Get an optional u64 argument
    pub fn arg_u64(&self, key: &str) -> Option<u64> {
        self.arguments.get(key).and_then(|v| v.as_u64())
    }
}

/// Outcome of a capability invocation
///
/// Expected failure modes (bad arguments, denied operation, missing file) are
/// reported as `success = false` with a human-readable `output`, never as an
/// error value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResult {
    /// Whether the capability did what was asked
    pub success: bool,

    /// Text output or failure description
    pub output: String,

    /// Optional binary attachments (screenshots, downloads)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Vec<u8>>,
}

impl CapabilityResult {
    /// Create a successful result
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            attachments: Vec::new(),
        }
    }

    /// Create a failed result
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            attachments: Vec::new(),
        }
    }

    /// Attach binary data to the result
    pub fn with_attachment(mut self, data: Vec<u8>) -> Self {
        self.attachments.push(data);
        self
    }

    /// Return a copy whose output is at most `max_bytes` long.
    ///
    /// The cut lands on a char boundary and a marker with the original size is
    /// appended (the marker itself is not counted against the budget).
    pub fn truncated(mut self, max_bytes: usize) -> Self {
        let original = self.output.len();
        if original > max_bytes {
            let cut = floor_char_boundary(&self.output, max_bytes);
            self.output.truncate(cut);
            self.output
                .push_str(&format!("\n…[truncated, {} bytes total]", original));
        }
        self
    }
}

/// Largest index `<= max` that lies on a char boundary of `s`.
pub fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// First `max_chars` chars of `s`, with `…` appended when something was cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
