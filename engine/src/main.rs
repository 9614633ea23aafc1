// Wisp autonomous assistant
// Main entry point for the wisp binary

use clap::Parser;
use wisp_engine::cli::{Cli, Command};
use wisp_engine::config::Config;
use wisp_engine::handlers::{
    handle_history, handle_identity, handle_memory, handle_run, handle_start, OutputFormat,
};
use wisp_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log beats the config file; RUST_LOG beats both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");
    tracing::info!("Wisp v{} ({} - {})", version, commit, timestamp);

    match cli.command {
        Command::Start => {
            tracing::info!("Starting messaging adapter...");
            handle_start(&config).await
        }

        Command::Run { text, conversation } => {
            tracing::info!("Handling input for conversation {}", conversation);
            handle_run(text, conversation, &config, format).await
        }

        Command::History {
            conversation,
            limit,
        } => handle_history(conversation, limit, &config, format).await,

        Command::Memory { action } => {
            tracing::debug!("Memory action: {:?}", action);
            handle_memory(action, &config, format).await
        }

        Command::Identity => handle_identity(&config, format).await,
    }
}
