//! Language-Model Gateway
//!
//! This module provides the uniform "complete a chat" interface the
//! orchestrator talks to. The `LLMProvider` trait is the transport seam
//! (Gemini in production, scripted mocks in tests), and `gateway::LLMGateway`
//! adds the hard timeout and the one-shot model fallback on capacity failures.
//!
//! It also owns the helpers that pull JSON out of model text: capability
//! calls, fenced blocks and balanced objects/arrays embedded in prose.

use async_trait::async_trait;
use regex::Regex;
use sdk::errors::EngineError;
use sdk::types::CapabilityCall;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

pub mod gateway;
pub mod gemini;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Provider overloaded: {0}")]
    Overloaded(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Primary and fallback models failed: {0}")]
    FallbackExhausted(String),
}

impl LLMError {
    /// Capacity failures are the only ones worth retrying on another model.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            Self::Overloaded(_) | Self::AuthenticationFailed(_) | Self::RateLimitExceeded | Self::Timeout
        )
    }
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::Timeout => EngineError::ModelTimeout,
            LLMError::FallbackExhausted(detail) => EngineError::ModelsExhausted(detail),
            LLMError::NetworkError(detail) => EngineError::Network(detail),
            other => EngineError::ModelUnavailable(other.to_string()),
        }
    }
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Who wrote the message
    pub role: Role,

    /// Text content
    pub text: String,
}

impl Message {
    /// Create a new user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Create a new model message
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Requester (or a synthetic turn written by the orchestrator)
    User,

    /// Language model
    Model,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

/// LLM Provider trait that all transports must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "gemini")
    fn name(&self) -> &str;

    /// Complete a chat with the given model
    ///
    /// # Arguments
    /// * `messages` - Ordered conversation, oldest first
    /// * `system_prompt` - Instructions sent out of band from the messages
    /// * `model` - Concrete model name
    async fn complete(&self, messages: &[Message], system_prompt: &str, model: &str)
        -> Result<String>;
}

fn call_start_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"\{\s*"function"\s*:"#).expect("Invalid call pattern"))
}

/// Parse every capability call embedded in model text, in order.
///
/// Calls are JSON objects of the form `{"function": "...", "arguments": {...}}`.
/// They may be the whole reply, sit in markdown fences, or be mixed with prose.
/// Objects that look like calls but fail to parse are skipped.
pub fn parse_capability_calls(content: &str) -> Vec<CapabilityCall> {
    call_spans(content)
        .into_iter()
        .filter_map(|span| try_parse_function_json(&content[span]))
        .collect()
}

/// Remove capability-call objects (and fences left empty by that) from text.
pub fn strip_capability_calls(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for span in call_spans(content) {
        out.push_str(&content[last..span.start]);
        last = span.end;
    }
    out.push_str(&content[last..]);

    let empty_fence = empty_fence_pattern();
    empty_fence.replace_all(&out, "").trim().to_string()
}

fn empty_fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"```[a-zA-Z]*\s*```").expect("Invalid fence pattern"))
}

/// Byte ranges of every balanced `{"function": ...}` object in the text.
fn call_spans(content: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut cursor = 0;

    while let Some(found) = call_start_pattern().find_at(content, cursor) {
        let start = found.start();
        match extract_balanced(&content[start..], '{', '}') {
            Some(json) if try_parse_function_json(json).is_some() => {
                spans.push(start..start + json.len());
                cursor = start + json.len();
            }
            _ => cursor = found.end(),
        }
    }

    spans
}

/// Try to parse a string as a `{"function": "...", "arguments": {...}}` call.
fn try_parse_function_json(s: &str) -> Option<CapabilityCall> {
    let json: serde_json::Value = serde_json::from_str(s).ok()?;
    let function = json.get("function")?.as_str()?;
    let arguments = json
        .get("arguments")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    Some(CapabilityCall::new(function, arguments))
}

/// Pull a JSON value out of model text.
///
/// Tries, in order: the whole text, the first fenced block, then the first
/// balanced object or array found in prose (whichever opens first).
pub fn extract_json_value(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Ok(value) = serde_json::from_str(inner.trim()) {
            return Some(value);
        }
    }

    let mut starts: Vec<(usize, char, char)> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| trimmed.find(open).map(|pos| (pos, open, close)))
        .collect();
    starts.sort_by_key(|(pos, _, _)| *pos);

    starts.into_iter().find_map(|(pos, open, close)| {
        let candidate = extract_balanced(&trimmed[pos..], open, close)?;
        serde_json::from_str(candidate).ok()
    })
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object or array starting at position 0 of `s`.
///
/// Counts `open` / `close` depth, respecting string literals, to find the
/// matching close delimiter.
fn extract_balanced(s: &str, open: char, close: char) -> Option<&str> {
    if !s.starts_with(open) {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
