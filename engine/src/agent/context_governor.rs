//! Context Window Governor
//!
//! Keeps the ACT transcript inside a character budget. When the transcript is
//! over budget, old capability-result messages above a size threshold are
//! replaced by a one-line-per-call summary that keeps only each call's name
//! and OK/FAILED marker. The last `keep_tail` messages are never touched and
//! a compressed message is never recognised as a result message again, so
//! running the governor twice changes nothing further.

use crate::llm::Message;
use regex::Regex;
use sdk::CapabilityResult;
use std::sync::OnceLock;

/// First line of every capability-result message
pub const RESULTS_HEADER: &str = "[CAPABILITY RESULTS]";

/// First line of a result message after compression
pub const COMPRESSED_HEADER: &str = "[CAPABILITY RESULTS:compressed]";

const NEXT_STEP: &str = "Decide the next step: call more capabilities, or reply with the final result (no calls) when the task is done.";

/// Budget parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorLimits {
    /// Total characters allowed across all messages
    pub budget_chars: usize,

    /// Number of trailing messages kept verbatim
    pub keep_tail: usize,

    /// Result messages at or below this size are left alone
    pub threshold_chars: usize,
}

fn chars(message: &Message) -> usize {
    message.text.chars().count()
}

/// Total characters of a transcript
pub fn total_chars(messages: &[Message]) -> usize {
    messages.iter().map(chars).sum()
}

/// Render the synthetic turn that reports one round of capability results
pub fn render_results(results: &[(String, CapabilityResult)]) -> String {
    let mut out = String::from(RESULTS_HEADER);
    for (name, result) in results {
        out.push_str(&format!(
            "\n--- {}: {} ---\n{}",
            name,
            if result.success { "OK" } else { "FAILED" },
            result.output
        ));
    }
    out.push_str("\n\n");
    out.push_str(NEXT_STEP);
    out
}

fn call_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^--- (\S+): (OK|FAILED) ---$").expect("Invalid result line pattern")
    })
}

fn is_result_message(message: &Message) -> bool {
    message.text.starts_with(RESULTS_HEADER) && !message.text.starts_with(COMPRESSED_HEADER)
}

fn compress(text: &str) -> String {
    let mut out = String::from(COMPRESSED_HEADER);
    for caps in call_line_regex().captures_iter(text) {
        out.push_str(&format!("\n- {}: {}", &caps[1], &caps[2]));
    }
    out
}

/// Apply the governor. Pure: the input is not modified.
pub fn govern(messages: &[Message], limits: GovernorLimits) -> Vec<Message> {
    if total_chars(messages) <= limits.budget_chars {
        return messages.to_vec();
    }

    let protected_from = messages.len().saturating_sub(limits.keep_tail);
    messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            if i < protected_from && is_result_message(message) && chars(message) > limits.threshold_chars {
                Message {
                    role: message.role,
                    text: compress(&message.text),
                }
            } else {
                message.clone()
            }
        })
        .collect()
}
