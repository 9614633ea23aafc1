//! Command handlers for CLI operations
//!
//! - start: run the Telegram adapter feeding the debouncer
//! - run: push one input through the orchestrator
//! - history: show recent turns of a conversation
//! - memory: print P0/P1/P2 fragments or archive expired entries
//! - identity: show the identity record

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::agent::{IdentityStore, Invocation, Orchestrator, ReplySink};
use crate::bot::telegram::TelegramBot;
use crate::cli::MemoryAction;
use crate::config::Config;
use crate::db::Database;
use crate::intake::{InputHandler, IntakeDebouncer};
use crate::llm::gemini::GeminiProvider;
use crate::memory::TieredMemory;

const ARCHIVE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Reply sink that prints to stdout
pub struct StdoutSink {
    format: OutputFormat,
}

impl StdoutSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl ReplySink for StdoutSink {
    async fn send(&self, conversation_id: &str, text: &str) {
        match self.format {
            OutputFormat::Text => {
                println!("{}", text);
                println!();
            }
            OutputFormat::Json => {
                let line = json!({"conversation_id": conversation_id, "text": text});
                println!("{}", line);
            }
        }
    }
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::new(&config.db_path())
        .await
        .context("Failed to open database")
}

async fn build_orchestrator(
    config: &Config,
    db: &Database,
    sink: Arc<dyn ReplySink>,
) -> Result<Arc<Orchestrator>> {
    let provider = GeminiProvider::from_config(&config.llm)?;
    let orchestrator = Orchestrator::assemble(config, db, Arc::new(provider), sink).await?;
    Ok(Arc::new(orchestrator))
}

/// Run the Telegram adapter until Ctrl-C
pub async fn handle_start(config: &Config) -> Result<()> {
    if !config.telegram.enabled {
        bail!("Telegram is disabled. Set [telegram] enabled = true in config.toml");
    }
    let token = std::env::var(&config.telegram.token_env).with_context(|| {
        format!(
            "Environment variable {} is not set. Export your bot token there.",
            config.telegram.token_env
        )
    })?;

    let db = open_database(config).await?;
    let bot = TelegramBot::new(token, config.telegram.allowed_users.clone());
    let orchestrator = build_orchestrator(config, &db, Arc::new(bot.clone())).await?;
    let intake = IntakeDebouncer::new(
        Arc::clone(&orchestrator) as Arc<dyn InputHandler>,
        orchestrator.interrupts(),
        Duration::from_millis(config.agent.debounce_ms),
    );

    // First tick fires immediately, so archival also runs at start
    let memory = Arc::clone(orchestrator.memory());
    let archiver = tokio::spawn(async move {
        let mut interval = tokio::time::interval(ARCHIVE_INTERVAL);
        loop {
            interval.tick().await;
            match memory.archive_expired().await {
                Ok(count) => info!(archived = count, "Memory archival sweep finished"),
                Err(e) => error!(error = %e, "Memory archival sweep failed"),
            }
        }
    });

    println!("Wisp is listening on Telegram. Press Ctrl-C to stop.");
    let result = tokio::select! {
        polled = bot.start_polling(&intake) => polled,
        signal = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            signal.context("Failed to listen for Ctrl-C")
        }
    };

    archiver.abort();
    db.close().await?;
    result
}

/// Push one input through the orchestrator and print the outcome
pub async fn handle_run(
    text: String,
    conversation: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let db = open_database(config).await?;
    let orchestrator = build_orchestrator(config, &db, Arc::new(StdoutSink::new(format))).await?;

    let invocation = orchestrator.handle(&conversation, &text).await?;

    // The CLI exits right after, so compact in the foreground
    if let Some(report) = orchestrator
        .conversations()
        .maybe_compact(&conversation)
        .await?
    {
        info!(
            removed = report.removed_turns,
            facts = report.extracted_facts,
            "Conversation compacted"
        );
    }

    match format {
        OutputFormat::Text => match &invocation {
            Invocation::Chat { .. } => {}
            Invocation::Task(report) => {
                println!("Outcome: {}", report.terminal);
                println!("  THINK calls: {}", report.think_calls);
                println!("  Capability rounds: {:?}", report.act_rounds);
                if let Some(identity) = &report.identity {
                    println!("  Identity: v{} (cycle {})", identity.version, identity.cycle);
                }
            }
            Invocation::Failed { .. } => println!("✗ Invocation failed"),
        },
        OutputFormat::Json => {
            let output = match &invocation {
                Invocation::Chat { reply } => json!({
                    "status": "completed",
                    "intent": "chat",
                    "reply": reply,
                }),
                Invocation::Task(report) => json!({
                    "status": "completed",
                    "intent": "task",
                    "outcome": report.terminal.to_string(),
                    "reply": report.final_message,
                    "think_calls": report.think_calls,
                    "act_rounds": report.act_rounds,
                    "verdicts": report.verdicts.iter().map(|v| v.label()).collect::<Vec<_>>(),
                    "cycle": report.identity.as_ref().map(|i| i.cycle),
                }),
                Invocation::Failed { message } => json!({
                    "status": "failed",
                    "error": message,
                }),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    db.close().await?;
    Ok(())
}

/// Show recent turns of a conversation
pub async fn handle_history(
    conversation: String,
    limit: usize,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let db = open_database(config).await?;
    let turns = db
        .turns()
        .load(&conversation)
        .await
        .context("Failed to fetch conversation history")?;
    let recent = &turns[turns.len().saturating_sub(limit)..];

    match format {
        OutputFormat::Text => {
            if recent.is_empty() {
                println!("No turns in conversation {}", conversation);
            } else {
                println!("Conversation {} (last {} turns):", conversation, recent.len());
                println!();
                for turn in recent {
                    let created = chrono::DateTime::from_timestamp(turn.timestamp, 0)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "Unknown".to_string());
                    println!("[{}] {}:", created, turn.role.as_str());
                    println!("{}", turn.content);
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "conversation_id": conversation,
                "turns": recent,
                "count": recent.len(),
                "total": turns.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    db.close().await?;
    Ok(())
}

/// Print a tiered memory fragment or run archival
pub async fn handle_memory(action: MemoryAction, config: &Config, format: OutputFormat) -> Result<()> {
    let memory = TieredMemory::open(config.memory_dir(), config.memory.clone()).await?;

    let (label, body) = match action {
        MemoryAction::Index => ("index", memory.p0_index().await?),
        MemoryAction::Recent => ("recent", memory.p1_recent().await?),
        MemoryAction::Day { date } => {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date))?;
            let body = memory
                .p2_day(date)
                .await?
                .unwrap_or_else(|| format!("No memory recorded for {}", date));
            ("day", body)
        }
        MemoryAction::Archive => {
            let count = memory.archive_expired().await?;
            ("archive", format!("Archived {} expired entries", count))
        }
    };

    match format {
        OutputFormat::Text => {
            if body.is_empty() {
                println!("(empty)");
            } else {
                println!("{}", body);
            }
        }
        OutputFormat::Json => {
            let output = json!({ "fragment": label, "text": body });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show the identity and strategy record
pub async fn handle_identity(config: &Config, format: OutputFormat) -> Result<()> {
    let db = open_database(config).await?;
    let store = IdentityStore::new(
        db.identity(),
        config.core.agent_name.clone(),
        config.memory.lesson_cap,
    );
    let identity = store.current().await?;

    match format {
        OutputFormat::Text => {
            println!("{} v{} (cycle {})", identity.name, identity.version, identity.cycle);
            for (title, items) in [
                ("Strategy", &identity.strategy),
                ("Capabilities", &identity.capabilities),
                ("Safety notes", &identity.safety_notes),
                ("Lessons", &identity.lessons),
            ] {
                if items.is_empty() {
                    continue;
                }
                println!();
                println!("{}:", title);
                for item in items {
                    println!("  - {}", item);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&identity)?);
        }
    }

    db.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default_config();
        config.core.data_dir = dir.path().join("data");
        config.tools.workspace = dir.path().join("ws");
        config.validate_and_process().unwrap();
        config
    }

    #[tokio::test]
    async fn test_memory_day_rejects_bad_date() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);

        let err = handle_memory(
            MemoryAction::Day {
                date: "yesterday".to_string(),
            },
            &config,
            OutputFormat::Text,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[tokio::test]
    async fn test_identity_and_history_on_fresh_store() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);

        handle_identity(&config, OutputFormat::Json).await.unwrap();
        handle_history("nobody".to_string(), 5, &config, OutputFormat::Text)
            .await
            .unwrap();
        handle_memory(MemoryAction::Archive, &config, OutputFormat::Json)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_requires_enabled_adapter() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let err = handle_start(&config).await.unwrap_err();
        assert!(err.to_string().contains("Telegram is disabled"));
    }
}
