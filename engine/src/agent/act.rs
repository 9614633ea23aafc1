//! ACT: the bounded capability-calling sub-loop
//!
//! Each step drains interrupts, governs the transcript, asks the model once,
//! and either leaves the loop on a terminal signal or executes every requested
//! call and reports the results back. Capability failures are fed back to the
//! model as failed results; only a gateway failure (after fallback) escapes.

use super::context_governor::{govern, render_results, GovernorLimits};
use super::interrupts::InterruptQueue;
use super::markers::{decode_act, ActDecision};
use crate::config::AgentConfig;
use crate::llm::gateway::{LLMGateway, ModelChoice};
use crate::llm::{self, Message};
use crate::tools::CapabilityRegistry;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Calls made so far, per capability name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityUsage(BTreeMap<String, usize>);

impl CapabilityUsage {
    pub fn record(&mut self, name: &str) {
        *self.0.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }
}

impl fmt::Display for CapabilityUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no capabilities used");
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(name, count)| format!("{} x{}", name, count))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActOutcome {
    /// The model replied without calls; this is its result
    Done(String),

    /// Step ceiling reached without a terminal signal
    Exhausted,

    Aborted(String),

    Blocked(String),
}

#[derive(Debug, Clone)]
pub struct ActReport {
    pub outcome: ActOutcome,

    /// Capability-call rounds executed
    pub rounds: usize,

    pub usage: CapabilityUsage,

    pub transcript: Vec<Message>,
}

impl ActReport {
    /// Result text reported for this attempt
    pub fn result_text(&self, max_steps: usize) -> String {
        match &self.outcome {
            ActOutcome::Done(text) => text.clone(),
            ActOutcome::Exhausted => format!(
                "Stopped after {} steps without a final answer. Capability usage: {}",
                max_steps, self.usage
            ),
            ActOutcome::Aborted(reason) => format!("Aborted: {}", reason),
            ActOutcome::Blocked(reason) => format!("Blocked: {}", reason),
        }
    }
}

fn priority_message(texts: &[String]) -> String {
    format!(
        "[PRIORITY USER MESSAGE]\nThe user sent this while you were working:\n{}\n\nFollow it with priority. If the user wants you to stop, reply `[ABORT] <reason>`.",
        texts.join("\n")
    )
}

pub struct ActLoop<'a> {
    pub gateway: &'a LLMGateway,
    pub registry: &'a CapabilityRegistry,
    pub interrupts: &'a InterruptQueue,
    pub config: &'a AgentConfig,
}

impl ActLoop<'_> {
    fn limits(&self) -> GovernorLimits {
        GovernorLimits {
            budget_chars: self.config.context_budget_chars,
            keep_tail: self.config.keep_tail,
            threshold_chars: self.config.compress_threshold_chars,
        }
    }

    /// Run the sub-loop from an opening user message
    pub async fn run(
        &self,
        conversation_id: &str,
        system_prompt: &str,
        opening: String,
    ) -> llm::Result<ActReport> {
        let mut transcript = vec![Message::user(opening)];
        let mut usage = CapabilityUsage::default();
        let mut rounds = 0;

        for step in 1..=self.config.max_act_steps {
            let interrupts = self.interrupts.drain(conversation_id);
            if !interrupts.is_empty() {
                info!(step, count = interrupts.len(), "Folding interrupts into ACT transcript");
                transcript.push(Message::user(priority_message(&interrupts)));
            }

            transcript = govern(&transcript, self.limits());

            debug!(step, messages = transcript.len(), "ACT step");
            let reply = self
                .gateway
                .complete(&transcript, system_prompt, ModelChoice::Primary)
                .await?;
            let decision = decode_act(&reply);
            transcript.push(Message::model(reply));

            let outcome = match decision {
                ActDecision::Abort(reason) => ActOutcome::Aborted(reason),
                ActDecision::Blocked(reason) => ActOutcome::Blocked(reason),
                ActDecision::Final(text) => ActOutcome::Done(text),
                ActDecision::Calls(calls) => {
                    rounds += 1;
                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        let result = self
                            .registry
                            .execute(call)
                            .await
                            .truncated(self.config.tool_result_max_bytes);
                        if !result.success {
                            warn!(step, capability = %call.name, "Capability call failed");
                        }
                        usage.record(&call.name);
                        results.push((call.name.clone(), result));
                    }
                    transcript.push(Message::user(render_results(&results)));
                    continue;
                }
            };

            info!(step, rounds, ?outcome, "ACT finished");
            return Ok(ActReport {
                outcome,
                rounds,
                usage,
                transcript,
            });
        }

        warn!(rounds, %usage, "ACT step ceiling reached");
        Ok(ActReport {
            outcome: ActOutcome::Exhausted,
            rounds,
            usage,
            transcript,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_display() {
        let mut usage = CapabilityUsage::default();
        assert_eq!(usage.to_string(), "no capabilities used");
        usage.record("write_file");
        usage.record("read_file");
        usage.record("read_file");
        assert_eq!(usage.to_string(), "read_file x2, write_file x1");
        assert_eq!(usage.total(), 3);
        assert_eq!(usage.count("list_dir"), 0);
    }

    #[test]
    fn test_exhausted_result_text_lists_usage() {
        let mut usage = CapabilityUsage::default();
        usage.record("list_dir");
        let report = ActReport {
            outcome: ActOutcome::Exhausted,
            rounds: 15,
            usage,
            transcript: Vec::new(),
        };
        let text = report.result_text(15);
        assert!(text.contains("15 steps"));
        assert!(text.contains("list_dir x1"));
    }
}
