//! Task life cycle: THINK → ACT → VERIFY → REFLECT → EVOLVE
//!
//! One invocation is one run of this state machine, bounded by
//! `max_retries` re-entries into THINK. The terminal state is DONE or
//! ABORTED, and exactly one final message is sent for it.
//!
//! Decisions:
//! - `[ABORT]` in THINK or ACT ends in ABORTED without VERIFY
//! - `[BLOCKED]` in ACT ends in DONE with the blocked reason, without VERIFY
//! - VERIFY's verdict is authoritative; when it carries no verdict, an ACT
//!   `Done` counts as PASS and `Exhausted` as FAIL
//! - REFLECT runs for every terminal outcome; its failure is logged and
//!   EVOLVE still advances the cycle counter
//! - a gateway failure in THINK, ACT or VERIFY propagates to the caller

use super::act::{ActLoop, ActOutcome, ActReport};
use super::context_governor::{govern, GovernorLimits};
use super::identity::{Identity, IdentityStore};
use super::interrupts::InterruptQueue;
use super::markers::{decode_abort, decode_reflection, decode_verdict, Reflection, Verdict};
use super::orchestrator::ReplySink;
use super::prompt::{Mode, PromptBuilder};
use crate::config::AgentConfig;
use crate::llm::gateway::{LLMGateway, ModelChoice};
use crate::llm::{strip_capability_calls, Message};
use crate::memory::{MemoryRecord, TieredMemory};
use crate::tools::CapabilityRegistry;
use anyhow::{Context, Result};
use sdk::truncate_chars;
use std::fmt;
use tracing::{error, info, warn};

const TRANSCRIPT_TAIL: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Think,
    Act,
    Verify,
    Reflect,
    Evolve,
    Done,
    Aborted,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Think => "THINK",
            State::Act => "ACT",
            State::Verify => "VERIFY",
            State::Reflect => "REFLECT",
            State::Evolve => "EVOLVE",
            State::Done => "DONE",
            State::Aborted => "ABORTED",
        };
        write!(f, "{}", name)
    }
}

/// What one life cycle did
#[derive(Debug, Clone)]
pub struct LifeCycleReport {
    /// `Done` or `Aborted`
    pub terminal: State,

    /// The message sent to the requester
    pub final_message: String,

    /// Every state entered, in order
    pub path: Vec<State>,

    pub think_calls: usize,

    /// Capability-call rounds per attempt that reached ACT
    pub act_rounds: Vec<usize>,

    pub verdicts: Vec<Verdict>,

    pub reflection: Reflection,

    /// Record after EVOLVE; `None` if it could not be persisted
    pub identity: Option<Identity>,
}

/// Terminal decision made before REFLECT
struct Conclusion {
    terminal: State,
    result: String,
}

pub struct LifeCycle<'a> {
    pub gateway: &'a LLMGateway,
    pub registry: &'a CapabilityRegistry,
    pub interrupts: &'a InterruptQueue,
    pub identity: &'a IdentityStore,
    pub memory: &'a TieredMemory,
    pub sink: &'a dyn ReplySink,
    pub config: &'a AgentConfig,
}

impl LifeCycle<'_> {
    pub async fn run(
        &self,
        conversation_id: &str,
        task: &str,
        prompts: &PromptBuilder<'_>,
    ) -> Result<LifeCycleReport> {
        let mut path = Vec::new();
        let mut think_calls = 0;
        let mut act_rounds = Vec::new();
        let mut verdicts = Vec::new();
        let mut previous_failure: Option<String> = None;
        let attempts = self.config.max_retries + 1;

        let mut conclusion = None;
        for attempt in 1..=attempts {
            enter(&mut path, State::Think, attempt);
            think_calls += 1;
            let think = self
                .gateway
                .complete(
                    &[Message::user(think_request(task, previous_failure.as_deref()))],
                    &prompts.build(Mode::Think).render(),
                    ModelChoice::Primary,
                )
                .await
                .context("THINK call failed")?;

            if let Some(reason) = decode_abort(&think) {
                conclusion = Some(Conclusion {
                    terminal: State::Aborted,
                    result: reason,
                });
                break;
            }

            let plan = truncate_chars(&strip_capability_calls(&think), self.config.plan_max_chars);
            self.sink
                .send(
                    conversation_id,
                    &format!("📋 Plan (attempt {}/{}):\n{}", attempt, attempts, plan),
                )
                .await;

            enter(&mut path, State::Act, attempt);
            let act = ActLoop {
                gateway: self.gateway,
                registry: self.registry,
                interrupts: self.interrupts,
                config: self.config,
            }
            .run(
                conversation_id,
                &prompts.build(Mode::Act).render(),
                act_request(task, &plan, previous_failure.as_deref()),
            )
            .await
            .context("ACT call failed")?;
            act_rounds.push(act.rounds);

            let result = act.result_text(self.config.max_act_steps);
            match &act.outcome {
                ActOutcome::Aborted(reason) => {
                    conclusion = Some(Conclusion {
                        terminal: State::Aborted,
                        result: reason.clone(),
                    });
                    break;
                }
                ActOutcome::Blocked(_) => {
                    conclusion = Some(Conclusion {
                        terminal: State::Done,
                        result,
                    });
                    break;
                }
                ActOutcome::Done(_) | ActOutcome::Exhausted => {}
            }

            enter(&mut path, State::Verify, attempt);
            let verify = self
                .gateway
                .complete(
                    &[Message::user(self.verify_request(task, &plan, &act, &result))],
                    &prompts.build(Mode::Verify).render(),
                    ModelChoice::Primary,
                )
                .await
                .context("VERIFY call failed")?;

            let verdict = decode_verdict(&verify).unwrap_or_else(|| {
                warn!(attempt, "VERIFY reply carried no verdict, judging by ACT outcome");
                match act.outcome {
                    ActOutcome::Done(_) => Verdict::Pass,
                    _ => Verdict::Fail("no verdict and the step budget ran out".to_string()),
                }
            });
            info!(attempt, verdict = verdict.label(), "Verified");
            verdicts.push(verdict.clone());

            match verdict {
                Verdict::Pass => {
                    conclusion = Some(Conclusion {
                        terminal: State::Done,
                        result,
                    });
                    break;
                }
                Verdict::Fatal(reason) => {
                    conclusion = Some(Conclusion {
                        terminal: State::Aborted,
                        result: reason,
                    });
                    break;
                }
                Verdict::Fail(reason) if attempt == attempts => {
                    conclusion = Some(Conclusion {
                        terminal: State::Done,
                        result: format!("{}\n\nVerification failed: {}", result, reason),
                    });
                }
                Verdict::Fail(reason) => {
                    previous_failure = Some(reason);
                }
            }
        }

        let Conclusion { terminal, result } =
            conclusion.context("life cycle ended without a terminal outcome")?;

        let final_message = match terminal {
            State::Aborted => format!("⛔ Aborted: {}", result),
            _ => format!("✅ {}", result),
        };
        self.sink.send(conversation_id, &final_message).await;

        enter(&mut path, State::Reflect, think_calls);
        let reflection = match self
            .gateway
            .complete(
                &[Message::user(reflect_request(task, terminal, &result, think_calls))],
                &prompts.build(Mode::Reflect).render(),
                ModelChoice::Primary,
            )
            .await
        {
            Ok(text) => decode_reflection(&text),
            Err(e) => {
                warn!(error = %e, "REFLECT call failed, evolving with an empty reflection");
                Reflection::default()
            }
        };

        enter(&mut path, State::Evolve, think_calls);
        let identity = match self.identity.evolve(&reflection).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                error!(error = %e, "Failed to persist identity record");
                None
            }
        };
        let cycle = identity.as_ref().map(|i| i.cycle);

        if let Err(e) = self
            .memory
            .write_entry(&MemoryRecord {
                task: task.to_string(),
                result: final_message.clone(),
                reflection: reflection.summary(),
                cycle,
                ..Default::default()
            })
            .await
        {
            error!(error = %e, "Failed to write memory entry");
        }

        path.push(terminal);
        info!(
            outcome = %terminal,
            think_calls,
            ?cycle,
            "Life cycle finished"
        );

        Ok(LifeCycleReport {
            terminal,
            final_message,
            path,
            think_calls,
            act_rounds,
            verdicts,
            reflection,
            identity,
        })
    }

    fn verify_request(&self, task: &str, plan: &str, act: &ActReport, result: &str) -> String {
        let limits = GovernorLimits {
            budget_chars: self.config.context_budget_chars,
            keep_tail: self.config.keep_tail,
            threshold_chars: self.config.compress_threshold_chars,
        };
        let governed = govern(&act.transcript, limits);
        let start = governed.len().saturating_sub(TRANSCRIPT_TAIL);
        let transcript = governed[start..]
            .iter()
            .map(|m| format!("[{}] {}", m.role, m.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Task:\n{}\n\nPlan:\n{}\n\nACT outcome: {}\nCapability usage: {}\n\nResult:\n{}\n\nTranscript (most recent last):\n{}",
            task,
            plan,
            match act.outcome {
                ActOutcome::Done(_) => "done",
                _ => "exhausted",
            },
            act.usage,
            result,
            truncate_chars(&transcript, self.config.context_budget_chars)
        )
    }
}

fn enter(path: &mut Vec<State>, state: State, attempt: usize) {
    info!(state = %state, attempt, "Life cycle transition");
    path.push(state);
}

fn think_request(task: &str, previous_failure: Option<&str>) -> String {
    match previous_failure {
        None => format!("Task:\n{}", task),
        Some(failure) => format!(
            "Task:\n{}\n\nThe previous attempt failed verification:\n{}\nMake a new plan that fixes this.",
            task, failure
        ),
    }
}

fn act_request(task: &str, plan: &str, previous_failure: Option<&str>) -> String {
    let mut out = format!("Task:\n{}\n\nPlan:\n{}", task, plan);
    if let Some(failure) = previous_failure {
        out.push_str(&format!("\n\nPrevious attempt failed verification: {}", failure));
    }
    out
}

fn reflect_request(task: &str, terminal: State, result: &str, attempts: usize) -> String {
    format!(
        "Task:\n{}\n\nOutcome: {} after {} attempt(s)\nResult:\n{}",
        task, terminal, attempts, result
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_carry_previous_failure() {
        assert_eq!(think_request("do x", None), "Task:\ndo x");
        assert!(think_request("do x", Some("file empty")).contains("file empty"));
        assert!(act_request("do x", "1. a", Some("file empty")).ends_with("file empty"));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(State::Aborted.to_string(), "ABORTED");
        assert_eq!(State::Think.to_string(), "THINK");
    }
}
