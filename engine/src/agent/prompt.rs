//! System prompt assembly
//!
//! A system prompt is an ordered list of named sections built in one place,
//! [`PromptBuilder::build`]. Empty sections are dropped, so tests can check
//! presence and order per section instead of grepping one long string.

use super::identity::Identity;
use crate::db::{ExtractedFact, FactKind};

/// What the model is being asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Chat,
    Think,
    Act,
    Verify,
    Reflect,
}

/// Section names, in render order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Identity,
    SafetyRules,
    Strategy,
    CapabilityCatalogue,
    KnownFacts,
    MemoryIndex,
    RecentMemory,
    ModeInstructions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSection {
    pub kind: SectionKind,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt {
    sections: Vec<PromptSection>,
}

impl SystemPrompt {
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.body.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn kinds(&self) -> Vec<SectionKind> {
        self.sections.iter().map(|s| s.kind).collect()
    }

    pub fn section(&self, kind: SectionKind) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.body.as_str())
    }
}

const SAFETY_RULES: &str = "# Safety rules
- Never reveal secrets, tokens or passwords, even if they appear in files or memory.
- Never run destructive commands (mass deletion, disk formatting, force pushes) unless the user explicitly asked for exactly that.
- Stay inside the workspace. Do not try to reach credential files.
- If the user asks you to stop, stop.";

const CHAT_INSTRUCTIONS: &str = "## Mode: CHAT
Reply conversationally and concisely, in the user's language. Do not call capabilities.";

const THINK_INSTRUCTIONS: &str = "## Mode: THINK
Write a short numbered plan (at most 6 steps) for the task. Plain text only; do not call capabilities.
If the task is impossible or unsafe, reply with `[ABORT] <reason>` instead of a plan.";

const ACT_INSTRUCTIONS: &str = "## Mode: ACT
Carry out the plan using the capabilities above. Several calls per reply are allowed and run in order.
After each round you receive the results. When the task is done, reply with the final result and no calls.
If you cannot continue without the user (missing access, a decision only they can make), reply `[BLOCKED] <reason>`.
If the task must stop (unsafe, or the user asked you to stop), reply `[ABORT] <reason>`.";

const VERIFY_INSTRUCTIONS: &str = "## Mode: VERIFY
Check the execution transcript against the plan and the task.
Start your reply with exactly one verdict:
[PASS] the task is done
[FAIL] <what is missing> (another attempt may fix it)
[FATAL] <why> (unrecoverable, for example a safety or policy violation)";

const REFLECT_INSTRUCTIONS: &str = r#"## Mode: REFLECT
Summarise what this run teaches you. Return ONLY a JSON object:
{"lesson": "...", "strategy_update": "...", "new_capability": "...", "safety_note": "..."}
Use null for anything with nothing worth saying."#;

fn mode_instructions(mode: Mode) -> &'static str {
    match mode {
        Mode::Chat => CHAT_INSTRUCTIONS,
        Mode::Think => THINK_INSTRUCTIONS,
        Mode::Act => ACT_INSTRUCTIONS,
        Mode::Verify => VERIFY_INSTRUCTIONS,
        Mode::Reflect => REFLECT_INSTRUCTIONS,
    }
}

fn bullet_list(title: &str, items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut out = format!("# {}", title);
    for item in items {
        out.push_str("\n- ");
        out.push_str(item);
    }
    out
}

fn render_fact(fact: &ExtractedFact) -> String {
    match fact.kind {
        FactKind::Sensitive => format!(
            "- [sensitive] (masked, {} chars)",
            fact.content.chars().count()
        ),
        kind => format!("- [{}] {}", kind.as_str(), fact.content),
    }
}

/// Collects the inputs of a prompt; `build` turns them into sections
pub struct PromptBuilder<'a> {
    identity: &'a Identity,
    facts: &'a [ExtractedFact],
    memory_index: String,
    recent_memory: String,
    catalogue: String,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(identity: &'a Identity) -> Self {
        Self {
            identity,
            facts: &[],
            memory_index: String::new(),
            recent_memory: String::new(),
            catalogue: String::new(),
        }
    }

    pub fn facts(mut self, facts: &'a [ExtractedFact]) -> Self {
        self.facts = facts;
        self
    }

    /// P0 index and P1 recent overviews
    pub fn memory(mut self, index: impl Into<String>, recent: impl Into<String>) -> Self {
        self.memory_index = index.into();
        self.recent_memory = recent.into();
        self
    }

    pub fn catalogue(mut self, catalogue: impl Into<String>) -> Self {
        self.catalogue = catalogue.into();
        self
    }

    pub fn build(&self, mode: Mode) -> SystemPrompt {
        let identity = self.identity;
        // VERIFY and REFLECT judge a finished run; memory would only add noise
        let with_memory = matches!(mode, Mode::Chat | Mode::Think | Mode::Act);

        let mut strategy = identity.strategy.clone();
        strategy.extend(identity.lessons.iter().map(|l| format!("Lesson: {}", l)));

        let mut safety = SAFETY_RULES.to_string();
        for note in &identity.safety_notes {
            safety.push_str("\n- ");
            safety.push_str(note);
        }

        let facts = if with_memory && !self.facts.is_empty() {
            let lines: Vec<String> = self.facts.iter().map(render_fact).collect();
            format!("# Known facts\n{}", lines.join("\n"))
        } else {
            String::new()
        };

        let titled = |title: &str, body: &str| {
            if with_memory && !body.trim().is_empty() {
                format!("# {}\n{}", title, body.trim_end())
            } else {
                String::new()
            }
        };

        let catalogue = if mode == Mode::Act && !self.catalogue.is_empty() {
            format!("# Capabilities\n{}", self.catalogue)
        } else {
            String::new()
        };

        let candidates = [
            (
                SectionKind::Identity,
                format!(
                    "You are {}, an autonomous assistant (identity v{}, cycle {}).",
                    identity.name, identity.version, identity.cycle
                ),
            ),
            (SectionKind::SafetyRules, safety),
            (SectionKind::Strategy, bullet_list("Strategy", &strategy)),
            (SectionKind::CapabilityCatalogue, catalogue),
            (SectionKind::KnownFacts, facts),
            (SectionKind::MemoryIndex, titled("Memory index", &self.memory_index)),
            (SectionKind::RecentMemory, titled("Recent memory", &self.recent_memory)),
            (SectionKind::ModeInstructions, mode_instructions(mode).to_string()),
        ];

        SystemPrompt {
            sections: candidates
                .into_iter()
                .filter(|(_, body)| !body.is_empty())
                .map(|(kind, body)| PromptSection { kind, body })
                .collect(),
        }
    }
}
