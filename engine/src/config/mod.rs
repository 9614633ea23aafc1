//! Configuration management
//!
//! This module handles loading, validation, and management of the Wisp configuration.
//! Configuration is stored in TOML format at ~/.wisp/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory, log level
//! - **llm**: Model gateway endpoint, primary/fallback/cheap model names, timeout
//! - **agent**: Debounce window and life-cycle bounds
//! - **conversation**: History size and compaction batch
//! - **memory**: Tiered memory windows and retention
//! - **tools**: Workspace and capability enablement
//! - **telegram**: Messaging adapter settings (optional)
//!
//! # Examples
//!
//! ```no_run
//! use wisp_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Primary model: {}", config.llm.primary_model);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Language model gateway settings
    pub llm: LLMConfig,

    /// Orchestrator settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Conversation store settings
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Tiered memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Capability settings
    pub tools: ToolsConfig,

    /// Telegram adapter settings
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Name the assistant uses for itself in prompts
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
}

/// Language model gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Base URL of the generateContent API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for every call unless it hits a capacity failure
    #[serde(default = "default_primary_model")]
    pub primary_model: String,

    /// Model tried once when the primary hits a capacity failure
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Cheapest model, used for intent classification
    #[serde(default = "default_cheap_model")]
    pub cheap_model: String,

    /// Hard timeout per model call in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Quiet period before a batch of inbound messages is processed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Extra THINK attempts after a failed verification
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Capability-call rounds per ACT attempt
    #[serde(default = "default_max_act_steps")]
    pub max_act_steps: usize,

    /// Character budget of the ACT transcript
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,

    /// Messages at the end of the transcript that are never compressed
    #[serde(default = "default_keep_tail")]
    pub keep_tail: usize,

    /// Capability result transcripts above this size may be compressed
    #[serde(default = "default_compress_threshold")]
    pub compress_threshold_chars: usize,

    /// Byte budget per capability result
    #[serde(default = "default_tool_result_max_bytes")]
    pub tool_result_max_bytes: usize,

    /// Character budget of the plan surfaced to the requester
    #[serde(default = "default_plan_max_chars")]
    pub plan_max_chars: usize,

    /// Inputs shorter than this (in chars) are classified as chat
    #[serde(default = "default_min_classify_chars")]
    pub min_classify_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_retries: default_max_retries(),
            max_act_steps: default_max_act_steps(),
            context_budget_chars: default_context_budget(),
            keep_tail: default_keep_tail(),
            compress_threshold_chars: default_compress_threshold(),
            tool_result_max_bytes: default_tool_result_max_bytes(),
            plan_max_chars: default_plan_max_chars(),
            min_classify_chars: default_min_classify_chars(),
        }
    }
}

/// Conversation store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Turn count above which a conversation is compacted
    #[serde(default = "default_history_max")]
    pub history_max: usize,

    /// Turns handed to fact extraction per compaction
    #[serde(default = "default_compact_batch")]
    pub compact_batch: usize,

    /// Recent turns included in chat prompts
    #[serde(default = "default_prompt_history_turns")]
    pub prompt_history_turns: usize,

    /// Extracted facts listed in every prompt
    #[serde(default = "default_prompt_fact_limit")]
    pub prompt_fact_limit: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_max: default_history_max(),
            compact_batch: default_compact_batch(),
            prompt_history_turns: default_prompt_history_turns(),
            prompt_fact_limit: default_prompt_fact_limit(),
        }
    }
}

/// Tiered memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Dated abstracts in the always-on P0 index
    #[serde(default = "default_index_limit")]
    pub index_limit: usize,

    /// Trailing window of P1 overviews, in days
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: i64,

    /// Retention of P1 entries, in days
    #[serde(default = "default_p1_ttl_days")]
    pub p1_ttl_days: i64,

    /// Retention of P2 entries, in days
    #[serde(default = "default_p2_ttl_days")]
    pub p2_ttl_days: i64,

    /// Most recent lessons kept in the identity record
    #[serde(default = "default_lesson_cap")]
    pub lesson_cap: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            index_limit: default_index_limit(),
            recent_window_days: default_recent_window_days(),
            p1_ttl_days: default_p1_ttl_days(),
            p2_ttl_days: default_p2_ttl_days(),
            lesson_cap: default_lesson_cap(),
        }
    }
}

/// Capability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Workspace directory path (supports ~ expansion)
    pub workspace: PathBuf,

    /// Enable read_file / list_dir
    #[serde(default = "default_true")]
    pub read_files: bool,

    /// Enable write_file
    #[serde(default = "default_true")]
    pub write_files: bool,

    /// Enable run_command
    #[serde(default = "default_true")]
    pub run_commands: bool,

    /// Enable web_fetch
    #[serde(default = "default_true")]
    pub web_fetch: bool,

    /// Timeout for run_command and web_fetch, in seconds
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

/// Telegram adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Enable the adapter in `wisp start`
    #[serde(default)]
    pub enabled: bool,

    /// Environment variable holding the bot token
    #[serde(default = "default_telegram_token_env")]
    pub token_env: String,

    /// Allowed user IDs (empty allows everyone)
    #[serde(default)]
    pub allowed_users: Vec<i64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token_env: default_telegram_token_env(),
            allowed_users: Vec::new(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            primary_model: default_primary_model(),
            fallback_model: default_fallback_model(),
            cheap_model: default_cheap_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.wisp")
}

fn default_agent_name() -> String {
    "Wisp".to_string()
}

fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_primary_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_fallback_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_cheap_model() -> String {
    "gemini-2.5-flash-lite".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_debounce_ms() -> u64 {
    3000
}

fn default_max_retries() -> usize {
    2
}

fn default_max_act_steps() -> usize {
    15
}

fn default_context_budget() -> usize {
    60_000
}

fn default_keep_tail() -> usize {
    4
}

fn default_compress_threshold() -> usize {
    600
}

fn default_tool_result_max_bytes() -> usize {
    4000
}

fn default_plan_max_chars() -> usize {
    800
}

fn default_min_classify_chars() -> usize {
    5
}

fn default_history_max() -> usize {
    100
}

fn default_compact_batch() -> usize {
    50
}

fn default_prompt_history_turns() -> usize {
    20
}

fn default_prompt_fact_limit() -> usize {
    30
}

fn default_index_limit() -> usize {
    20
}

fn default_recent_window_days() -> i64 {
    7
}

fn default_p1_ttl_days() -> i64 {
    30
}

fn default_p2_ttl_days() -> i64 {
    7
}

fn default_lesson_cap() -> usize {
    20
}

fn default_tool_timeout() -> u64 {
    60
}

fn default_telegram_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}

impl Config {
    /// Load configuration from the default location (~/.wisp/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        // Write the unexpanded form so the file stays portable
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.wisp/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".wisp").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                data_dir: default_data_dir(),
                log_level: default_log_level(),
                agent_name: default_agent_name(),
            },
            llm: LLMConfig::default(),
            agent: AgentConfig::default(),
            conversation: ConversationConfig::default(),
            memory: MemoryConfig::default(),
            tools: ToolsConfig {
                workspace: PathBuf::from("~/.wisp/workspace"),
                read_files: true,
                write_files: true,
                run_commands: true,
                web_fetch: true,
                timeout_secs: default_tool_timeout(),
            },
            telegram: TelegramConfig::default(),
        }
    }

    /// Path of the SQLite database inside the data directory
    pub fn db_path(&self) -> PathBuf {
        self.core.data_dir.join("wisp.db")
    }

    /// Root directory of the tiered memory files
    pub fn memory_dir(&self) -> PathBuf {
        self.core.data_dir.join("memory")
    }

    /// Validate and process configuration
    ///
    /// This method validates value ranges, expands ~ in paths and creates the
    /// data and workspace directories when missing.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        self.validate()?;

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        self.tools.workspace = expand_path(&self.tools.workspace)?;
        self.tools.workspace = canonicalize_or_create(&self.tools.workspace)?;
        if !self.tools.workspace.is_dir() {
            return Err(EngineError::Config(format!(
                "Workspace path is not a directory: {:?}",
                self.tools.workspace
            )));
        }

        Ok(())
    }

    /// Check value ranges without touching the filesystem
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        for (field, value) in [
            ("primary_model", &self.llm.primary_model),
            ("fallback_model", &self.llm.fallback_model),
            ("cheap_model", &self.llm.cheap_model),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::Config(format!("llm.{} must not be empty", field)));
            }
        }

        if self.llm.timeout_secs == 0 {
            return Err(EngineError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.agent.max_act_steps == 0 {
            return Err(EngineError::Config(
                "agent.max_act_steps must be greater than 0".to_string(),
            ));
        }

        if self.agent.keep_tail == 0 {
            return Err(EngineError::Config(
                "agent.keep_tail must be greater than 0".to_string(),
            ));
        }

        if self.conversation.compact_batch == 0
            || self.conversation.compact_batch >= self.conversation.history_max
        {
            return Err(EngineError::Config(format!(
                "conversation.compact_batch ({}) must be between 1 and history_max ({})",
                self.conversation.compact_batch, self.conversation.history_max
            )));
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Canonicalize path, creating it if it doesn't exist
fn canonicalize_or_create(path: &Path) -> Result<PathBuf, EngineError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            EngineError::Config(format!("Failed to create directory {:?}: {}", path, e))
        })?;
    }

    path.canonicalize()
        .map_err(|e| EngineError::Config(format!("Failed to resolve {:?}: {}", path, e)))
}
