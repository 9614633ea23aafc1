//! CLI interface for Wisp
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Wisp autonomous assistant
///
/// Routes inbound messages to a chat reply or a multi-step task, and keeps
/// tiered memory across restarts.
#[derive(Parser, Debug)]
#[command(name = "wisp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the Telegram adapter until Ctrl-C
    Start,

    /// Push one input through the orchestrator and print the replies
    Run {
        /// The message text (prefix with /task or /chat to force a path)
        text: String,

        /// Conversation id the input belongs to
        #[arg(long, default_value = "cli")]
        conversation: String,
    },

    /// Show recent turns of a conversation
    History {
        /// Conversation id
        conversation: String,

        /// Number of turns to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Inspect or maintain tiered memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Show the identity and strategy record
    Identity,
}

/// Tiered memory actions
#[derive(Subcommand, Debug)]
pub enum MemoryAction {
    /// Print the always-on index of dated abstracts (P0)
    Index,

    /// Print overviews from the trailing window (P1)
    Recent,

    /// Print the raw log of one date (P2)
    Day {
        /// Date as YYYY-MM-DD
        date: String,
    },

    /// Move expired entries to the archive
    Archive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["wisp", "run", "/task create README"]);
        match cli.command {
            Command::Run { text, conversation } => {
                assert_eq!(text, "/task create README");
                assert_eq!(conversation, "cli");
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_history_with_limit() {
        let cli = Cli::parse_from(["wisp", "history", "42", "--limit", "5"]);
        match cli.command {
            Command::History {
                conversation,
                limit,
            } => {
                assert_eq!(conversation, "42");
                assert_eq!(limit, 5);
            }
            _ => panic!("Expected History command"),
        }
    }

    #[test]
    fn test_cli_parse_memory_day() {
        let cli = Cli::parse_from(["wisp", "memory", "day", "2026-01-02"]);
        match cli.command {
            Command::Memory {
                action: MemoryAction::Day { date },
            } => assert_eq!(date, "2026-01-02"),
            _ => panic!("Expected memory day"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from(["wisp", "identity", "--json", "--config", "/tmp/c.toml"]);
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Command::Identity));
    }
}
