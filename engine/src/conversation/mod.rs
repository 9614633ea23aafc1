//! Conversation store and compaction
//!
//! Every conversation is an append-only turn log persisted in SQLite and
//! mirrored in memory. When an append pushes a log above `history_max`, the
//! caller spawns [`ConversationStore::maybe_compact`]: all but the newest
//! `history_max - compact_batch` turns are rendered as dialogue, sent through
//! one extraction call, and deleted whether or not extraction worked. This is
//! the only way turns are forgotten; reads never trigger it.

use crate::config::ConversationConfig;
use crate::db::{ConversationTurn, ExtractedFact, FactKind, FactRepository, TurnRepository, TurnRole};
use crate::llm::gateway::{LLMGateway, ModelChoice};
use crate::llm::{extract_json_value, Message};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const EXTRACTION_PROMPT: &str = r#"You extract durable facts from an old chat transcript that is about to be deleted.

Return ONLY a JSON array, no prose, no markdown. Each element is {"kind": "...", "content": "..."}.
Kinds:
- key: decisions, preferences and facts about the user that matter later
- conclusion: outcomes that were agreed or established
- method: how something was done (commands, procedures)
- reference: URLs, file paths, document names
- identifier: account names, hostnames, project or ticket ids
- datum: numbers, dates, measurements
- sensitive: passwords, API keys, tokens or other secrets that appeared. Always include these; never drop them.
- other: anything else worth keeping

Return [] when nothing is worth keeping."#;

/// What one compaction did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    pub removed_turns: usize,
    pub extracted_facts: usize,
}

/// One conversation's in-memory mirror; `None` until first loaded
type TurnLog = Arc<Mutex<Option<Vec<ConversationTurn>>>>;

/// Per-conversation turn logs plus the fact store fed by compaction
pub struct ConversationStore {
    turns: TurnRepository,
    facts: FactRepository,
    gateway: Arc<LLMGateway>,
    config: ConversationConfig,
    logs: StdMutex<HashMap<String, TurnLog>>,
    compacting: StdMutex<HashSet<String>>,
}

/// Clears the in-flight flag when the compaction ends, however it ends
struct CompactionFlag<'a> {
    set: &'a StdMutex<HashSet<String>>,
    conversation_id: String,
}

impl Drop for CompactionFlag<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.conversation_id);
        }
    }
}

impl ConversationStore {
    pub fn new(
        turns: TurnRepository,
        facts: FactRepository,
        gateway: Arc<LLMGateway>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            turns,
            facts,
            gateway,
            config,
            logs: StdMutex::new(HashMap::new()),
            compacting: StdMutex::new(HashSet::new()),
        }
    }

    /// The conversation's own lock; the map lock is never held across an await
    fn log(&self, conversation_id: &str) -> TurnLog {
        let mut logs = self
            .logs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(logs.entry(conversation_id.to_string()).or_default())
    }

    async fn ensure_loaded<'a>(
        &self,
        slot: &'a mut Option<Vec<ConversationTurn>>,
        conversation_id: &str,
    ) -> Result<&'a mut Vec<ConversationTurn>> {
        if slot.is_none() {
            let loaded = self.turns.load(conversation_id).await?;
            debug!(conversation_id, turns = loaded.len(), "Loaded conversation log");
            *slot = Some(loaded);
        }
        slot.as_mut().context("conversation log missing after load")
    }

    /// Persist a turn. Returns true when the log is now above `history_max`
    /// and the caller should schedule compaction.
    pub async fn append(&self, conversation_id: &str, role: TurnRole, content: &str) -> Result<bool> {
        let slot = self.log(conversation_id);
        let mut guard = slot.lock().await;
        let log = self.ensure_loaded(&mut guard, conversation_id).await?;

        let turn = self
            .turns
            .append(conversation_id, role, content, chrono::Utc::now().timestamp())
            .await?;
        log.push(turn);

        Ok(log.len() > self.config.history_max)
    }

    /// Most recent turns in model message shape, oldest first
    pub async fn get_recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        let slot = self.log(conversation_id);
        let mut guard = slot.lock().await;
        let log = self.ensure_loaded(&mut guard, conversation_id).await?;

        let start = log.len().saturating_sub(limit);
        Ok(log[start..]
            .iter()
            .map(|t| match t.role {
                TurnRole::User => Message::user(&t.content),
                TurnRole::Assistant => Message::model(&t.content),
            })
            .collect())
    }

    /// Raw turns, oldest first
    pub async fn turns(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>> {
        let slot = self.log(conversation_id);
        let mut guard = slot.lock().await;
        Ok(self.ensure_loaded(&mut guard, conversation_id).await?.clone())
    }

    pub async fn turn_count(&self, conversation_id: &str) -> Result<usize> {
        let slot = self.log(conversation_id);
        let mut guard = slot.lock().await;
        Ok(self.ensure_loaded(&mut guard, conversation_id).await?.len())
    }

    /// Facts for prompt building, oldest first
    pub async fn recent_facts(&self) -> Result<Vec<ExtractedFact>> {
        self.facts.recent(self.config.prompt_fact_limit as i64).await
    }

    /// Run compaction in the background
    pub fn spawn_compaction(self: &Arc<Self>, conversation_id: &str) {
        let store = Arc::clone(self);
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.maybe_compact(&conversation_id).await {
                warn!(conversation_id = %conversation_id, error = %e, "Compaction failed");
            }
        });
    }

    /// Compact the log if it is above `history_max`.
    ///
    /// Returns `None` when there was nothing to do or another compaction of
    /// the same conversation is already running.
    pub async fn maybe_compact(&self, conversation_id: &str) -> Result<Option<CompactionReport>> {
        let Some(_flag) = self.claim(conversation_id) else {
            debug!(conversation_id, "Compaction already in flight");
            return Ok(None);
        };

        let keep = self.config.history_max - self.config.compact_batch;
        let slot = self.log(conversation_id);
        let dropped: Vec<ConversationTurn> = {
            let mut guard = slot.lock().await;
            let log = self.ensure_loaded(&mut guard, conversation_id).await?;
            if log.len() <= self.config.history_max {
                return Ok(None);
            }
            log[..log.len() - keep].to_vec()
        };

        let Some(last_id) = dropped.last().map(|t| t.id) else {
            return Ok(None);
        };

        info!(conversation_id, dropping = dropped.len(), keep, "Compacting conversation");

        let facts = self.extract(conversation_id, &dropped).await;
        if !facts.is_empty() {
            if let Err(e) = self.facts.insert_all(&facts).await {
                warn!(conversation_id, error = %e, "Failed to store extracted facts");
            }
        }

        self.turns.delete_through(conversation_id, last_id).await?;
        if let Some(log) = slot.lock().await.as_mut() {
            log.retain(|t| t.id > last_id);
        }

        Ok(Some(CompactionReport {
            removed_turns: dropped.len(),
            extracted_facts: facts.len(),
        }))
    }

    fn claim(&self, conversation_id: &str) -> Option<CompactionFlag<'_>> {
        let mut set = self.compacting.lock().ok()?;
        if !set.insert(conversation_id.to_string()) {
            return None;
        }
        Some(CompactionFlag {
            set: &self.compacting,
            conversation_id: conversation_id.to_string(),
        })
    }

    /// One extraction call; any failure degrades to zero facts
    async fn extract(&self, conversation_id: &str, turns: &[ConversationTurn]) -> Vec<ExtractedFact> {
        let dialogue = render_dialogue(turns);

        match self
            .gateway
            .complete(&[Message::user(dialogue)], EXTRACTION_PROMPT, ModelChoice::Cheap)
            .await
        {
            Ok(text) => parse_facts(&text, conversation_id, chrono::Utc::now().timestamp()),
            Err(e) => {
                warn!(conversation_id, error = %e, "Fact extraction call failed");
                Vec::new()
            }
        }
    }
}

/// Plain `role: content` dialogue, one turn per paragraph
pub fn render_dialogue(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parse the extraction reply; malformed output yields no facts
pub fn parse_facts(text: &str, conversation_id: &str, now: i64) -> Vec<ExtractedFact> {
    let Some(serde_json::Value::Array(items)) = extract_json_value(text) else {
        warn!(conversation_id, "Fact extraction returned no JSON array");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let content = item.get("content")?.as_str()?.trim();
            if content.is_empty() {
                return None;
            }
            let kind = item
                .get("kind")
                .and_then(|k| k.as_str())
                .map(FactKind::parse)
                .unwrap_or(FactKind::Other);
            Some(ExtractedFact {
                kind,
                content: content.to_string(),
                source_conversation_id: conversation_id.to_string(),
                extracted_at: now,
            })
        })
        .collect()
}
