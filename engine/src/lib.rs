//! Wisp Engine Library
//!
//! This library provides the core functionality of the Wisp assistant.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Workspace path confinement for file capabilities
pub mod fs_guard;

/// Allowlisted command execution
pub mod command_executor;

/// Database persistence module
pub mod db;

/// Language-model gateway and providers
pub mod llm;

/// Task orchestration: intent, life cycle, context governor, identity
pub mod agent;

/// Per-conversation turn logs and compaction
pub mod conversation;

/// File-backed tiered memory
pub mod memory;

/// Inbound message debouncing
pub mod intake;

/// Built-in capabilities and their registry
pub mod tools;

/// Messaging adapters
pub mod bot {
    pub mod telegram;
}

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
