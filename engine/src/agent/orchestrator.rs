//! Task orchestrator
//!
//! Entry point for one batched input: classify it, then either answer in a
//! single chat call or run the task life cycle. Both paths append the user and
//! assistant turns to the conversation store and schedule compaction in the
//! background when an append crossed the history limit.

use super::identity::IdentityStore;
use super::intent::{Intent, IntentClassifier};
use super::interrupts::InterruptQueue;
use super::lifecycle::{LifeCycle, LifeCycleReport};
use super::prompt::{Mode, PromptBuilder};
use crate::config::{AgentConfig, Config};
use crate::conversation::ConversationStore;
use crate::db::{Database, TurnRole};
use crate::intake::InputHandler;
use crate::llm::gateway::{LLMGateway, ModelChoice};
use crate::llm::{LLMError, LLMProvider};
use crate::memory::TieredMemory;
use crate::tools::CapabilityRegistry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::{EngineError, WispErrorExt};
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Outbound side of the messaging adapter. Fire-and-forget: delivery
/// failures are the adapter's to log.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, conversation_id: &str, text: &str);
}

/// What one invocation did
#[derive(Debug, Clone)]
pub enum Invocation {
    Chat { reply: String },
    Task(Box<LifeCycleReport>),
    /// A gateway failure ended the invocation; `message` was sent
    Failed { message: String },
}

impl Invocation {
    /// Text recorded as the assistant turn
    pub fn reply(&self) -> &str {
        match self {
            Invocation::Chat { reply } => reply,
            Invocation::Task(report) => &report.final_message,
            Invocation::Failed { message } => message,
        }
    }
}

/// User-facing text for an error that ended an invocation
pub fn failure_message(err: &anyhow::Error) -> String {
    let hint = match err.downcast_ref::<LLMError>() {
        Some(e) => EngineError::from(e.clone()).user_hint().to_string(),
        None => "Something went wrong while handling your message".to_string(),
    };
    format!("⚠️ {}", hint)
}

pub struct Orchestrator {
    gateway: Arc<LLMGateway>,
    classifier: IntentClassifier,
    registry: Arc<CapabilityRegistry>,
    conversations: Arc<ConversationStore>,
    memory: Arc<TieredMemory>,
    identity: Arc<IdentityStore>,
    interrupts: Arc<InterruptQueue>,
    sink: Arc<dyn ReplySink>,
    config: AgentConfig,
    history_turns: usize,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<LLMGateway>,
        registry: Arc<CapabilityRegistry>,
        conversations: Arc<ConversationStore>,
        memory: Arc<TieredMemory>,
        identity: Arc<IdentityStore>,
        sink: Arc<dyn ReplySink>,
        config: &Config,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(Arc::clone(&gateway), config.agent.min_classify_chars),
            gateway,
            registry,
            conversations,
            memory,
            identity,
            interrupts: Arc::new(InterruptQueue::new()),
            sink,
            config: config.agent.clone(),
            history_turns: config.conversation.prompt_history_turns,
        }
    }

    /// Wire every store and the capability registry from config
    pub async fn assemble(
        config: &Config,
        db: &Database,
        provider: Arc<dyn LLMProvider>,
        sink: Arc<dyn ReplySink>,
    ) -> Result<Self> {
        let gateway = Arc::new(LLMGateway::new(provider, &config.llm));
        let registry = CapabilityRegistry::from_config(&config.tools)
            .context("Failed to build capability registry")?;
        let conversations = ConversationStore::new(
            db.turns(),
            db.facts(),
            Arc::clone(&gateway),
            config.conversation.clone(),
        );
        let memory = TieredMemory::open(config.memory_dir(), config.memory.clone()).await?;
        let identity = IdentityStore::new(
            db.identity(),
            config.core.agent_name.clone(),
            config.memory.lesson_cap,
        );

        info!(
            capabilities = ?registry.available_names(),
            "Orchestrator assembled"
        );

        Ok(Self::new(
            gateway,
            Arc::new(registry),
            Arc::new(conversations),
            Arc::new(memory),
            Arc::new(identity),
            sink,
            config,
        ))
    }

    /// Queue shared with the intake debouncer
    pub fn interrupts(&self) -> Arc<InterruptQueue> {
        Arc::clone(&self.interrupts)
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    pub fn memory(&self) -> &Arc<TieredMemory> {
        &self.memory
    }

    pub fn identity(&self) -> &Arc<IdentityStore> {
        &self.identity
    }

    /// Handle one batched input end to end
    pub async fn handle(&self, conversation_id: &str, input: &str) -> Result<Invocation> {
        let span = info_span!("invocation", run_id = %Uuid::new_v4(), conversation_id);
        self.handle_inner(conversation_id, input).instrument(span).await
    }

    async fn handle_inner(&self, conversation_id: &str, input: &str) -> Result<Invocation> {
        let classification = self.classifier.classify(input).await;
        info!(
            intent = %classification.intent,
            decided_by = ?classification.decided_by,
            "Input classified"
        );

        let mut needs_compaction = self
            .conversations
            .append(conversation_id, TurnRole::User, &classification.text)
            .await?;

        let identity = self.identity.current().await?;
        let facts = self.conversations.recent_facts().await?;
        let prompts = PromptBuilder::new(&identity)
            .facts(&facts)
            .memory(self.memory.p0_index().await?, self.memory.p1_recent().await?)
            .catalogue(self.registry.catalogue());

        let invocation = match classification.intent {
            Intent::Chat => {
                let history = self
                    .conversations
                    .get_recent(conversation_id, self.history_turns)
                    .await?;
                match self
                    .gateway
                    .complete(&history, &prompts.build(Mode::Chat).render(), ModelChoice::Primary)
                    .await
                {
                    Ok(reply) => {
                        self.sink.send(conversation_id, &reply).await;
                        Invocation::Chat { reply }
                    }
                    Err(e) => self.fail(conversation_id, anyhow::Error::new(e)).await,
                }
            }
            Intent::Task => {
                let life_cycle = LifeCycle {
                    gateway: &self.gateway,
                    registry: &self.registry,
                    interrupts: &self.interrupts,
                    identity: &self.identity,
                    memory: &self.memory,
                    sink: self.sink.as_ref(),
                    config: &self.config,
                };
                match life_cycle
                    .run(conversation_id, &classification.text, &prompts)
                    .await
                {
                    Ok(report) => Invocation::Task(Box::new(report)),
                    Err(e) => self.fail(conversation_id, e).await,
                }
            }
        };

        needs_compaction |= self
            .conversations
            .append(conversation_id, TurnRole::Assistant, invocation.reply())
            .await?;
        if needs_compaction {
            self.conversations.spawn_compaction(conversation_id);
        }

        Ok(invocation)
    }

    async fn fail(&self, conversation_id: &str, err: anyhow::Error) -> Invocation {
        error!(error = %format!("{:#}", err), "Invocation failed");
        let message = failure_message(&err);
        self.sink.send(conversation_id, &message).await;
        Invocation::Failed { message }
    }
}

#[async_trait]
impl InputHandler for Orchestrator {
    async fn handle_input(&self, conversation_id: &str, text: String) {
        if let Err(e) = self.handle(conversation_id, &text).await {
            error!(conversation_id, error = %format!("{:#}", e), "Failed to handle input");
            self.sink.send(conversation_id, &failure_message(&e)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_uses_hint() {
        let err = anyhow::Error::new(LLMError::FallbackExhausted("a; b".to_string()))
            .context("THINK call failed");
        assert!(failure_message(&err).contains("Both the primary and fallback models failed"));

        let other = anyhow::anyhow!("disk full");
        assert!(failure_message(&other).contains("Something went wrong"));
    }
}
