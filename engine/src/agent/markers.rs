//! Control-marker decoder
//!
//! The model has no structured output channel, so the orchestrator and the
//! model talk through a few textual markers: `[ABORT] reason`,
//! `[BLOCKED] reason`, `[PASS]`, `[FAIL] reason`, `[FATAL] reason`, plus a
//! JSON reflection object. All of that parsing lives here; the state machine
//! only ever sees the typed values below.

use crate::llm::{extract_json_value, parse_capability_calls, strip_capability_calls};
use regex::Regex;
use sdk::CapabilityCall;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

const NO_REASON: &str = "no reason given";
const MAX_REASON_CHARS: usize = 500;

/// What one ACT reply asks the orchestrator to do
#[derive(Debug, Clone, PartialEq)]
pub enum ActDecision {
    /// Stop the whole life cycle
    Abort(String),

    /// Cannot continue without the user
    Blocked(String),

    /// Execute these calls, in order, then ask again
    Calls(Vec<CapabilityCall>),

    /// No calls and no marker: the reply is the result
    Final(String),
}

/// VERIFY verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(String),
    Fatal(String),
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail(_) => "FAIL",
            Verdict::Fatal(_) => "FATAL",
        }
    }
}

/// Structured REFLECT output. Empty fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reflection {
    pub lesson: Option<String>,
    pub strategy_update: Option<String>,
    pub new_capability: Option<String>,
    pub safety_note: Option<String>,
}

impl Reflection {
    pub fn is_empty(&self) -> bool {
        self.lesson.is_none()
            && self.strategy_update.is_none()
            && self.new_capability.is_none()
            && self.safety_note.is_none()
    }

    /// Plain text of the reflection for the memory log, without field labels
    pub fn summary(&self) -> String {
        [
            &self.lesson,
            &self.strategy_update,
            &self.new_capability,
            &self.safety_note,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\[(ABORT|BLOCKED|PASS|FAIL|FATAL)\]").expect("Invalid marker pattern")
    })
}

/// Find the first occurrence of `marker` and return the text after it
fn find_marker(text: &str, marker: &str) -> Option<String> {
    marker_regex()
        .captures_iter(text)
        .find(|caps| caps[1].eq_ignore_ascii_case(marker))
        .and_then(|caps| caps.get(0))
        .map(|m| reason_after(&text[m.end()..]))
}

/// Reason text following a marker: the rest of the reply, trimmed and capped
fn reason_after(rest: &str) -> String {
    let rest = rest.trim_start_matches([':', ' ', '-']).trim();
    if rest.is_empty() {
        NO_REASON.to_string()
    } else {
        sdk::truncate_chars(rest, MAX_REASON_CHARS)
    }
}

/// Abort reason if the text carries `[ABORT]`
pub fn decode_abort(text: &str) -> Option<String> {
    find_marker(text, "ABORT")
}

/// Decode an ACT reply. Precedence: ABORT, BLOCKED, calls, final text.
///
/// Markers count only in the prose; text inside call arguments is data.
pub fn decode_act(text: &str) -> ActDecision {
    let prose = strip_capability_calls(text);
    if let Some(reason) = find_marker(&prose, "ABORT") {
        return ActDecision::Abort(reason);
    }
    if let Some(reason) = find_marker(&prose, "BLOCKED") {
        return ActDecision::Blocked(reason);
    }

    let calls = parse_capability_calls(text);
    if calls.is_empty() {
        ActDecision::Final(prose)
    } else {
        ActDecision::Calls(calls)
    }
}

/// Decode a VERIFY reply. When several verdict markers appear the most
/// severe one wins (FATAL, then FAIL, then PASS). `None` if there is none.
pub fn decode_verdict(text: &str) -> Option<Verdict> {
    if let Some(reason) = find_marker(text, "FATAL") {
        return Some(Verdict::Fatal(reason));
    }
    if let Some(reason) = find_marker(text, "FAIL") {
        return Some(Verdict::Fail(reason));
    }
    find_marker(text, "PASS").map(|_| Verdict::Pass)
}

fn field(object: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Array(items)) if !items.is_empty() => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("; "),
        )
        .filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Decode REFLECT output. Anything that is not a JSON object becomes the
/// lesson verbatim.
pub fn decode_reflection(text: &str) -> Reflection {
    match extract_json_value(text) {
        Some(Value::Object(object)) => Reflection {
            lesson: field(&object, "lesson"),
            strategy_update: field(&object, "strategy_update"),
            new_capability: field(&object, "new_capability"),
            safety_note: field(&object, "safety_note"),
        },
        _ => {
            let raw = text.trim();
            if !raw.is_empty() {
                warn!("Reflection was not a JSON object, keeping raw text as lesson");
            }
            Reflection {
                lesson: (!raw.is_empty()).then(|| sdk::truncate_chars(raw, MAX_REASON_CHARS)),
                ..Default::default()
            }
        }
    }
}
