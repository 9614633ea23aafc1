//! Integration tests for configuration management
//!
//! These tests write real config files and load them through
//! `Config::load_from_path`, covering parsing, defaults, validation and
//! path processing.

use std::path::Path;
use tempfile::TempDir;
use wisp_engine::config::Config;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn base_sections(dir: &Path) -> String {
    format!(
        r#"
[core]
data_dir = '{data}'
log_level = "debug"

[llm]
primary_model = "gemini-test-pro"

[tools]
workspace = '{ws}'
"#,
        data = dir.join("data").display(),
        ws = dir.join("ws").display()
    )
}

#[test]
fn test_config_toml_parsing() {
    let temp = TempDir::new().unwrap();
    let body = format!(
        r#"
[core]
data_dir = '{data}'
log_level = "warn"
agent_name = "Pip"

[llm]
base_url = "http://localhost:9999/v1beta"
api_key_env = "PIP_KEY"
primary_model = "gemini-a"
fallback_model = "gemini-b"
cheap_model = "gemini-c"
timeout_secs = 30

[agent]
debounce_ms = 1500
max_retries = 1
max_act_steps = 8

[conversation]
history_max = 40
compact_batch = 10

[memory]
index_limit = 5
p2_ttl_days = 3

[tools]
workspace = '{ws}'
run_commands = false
web_fetch = false

[telegram]
enabled = true
token_env = "PIP_BOT"
allowed_users = [111, 222]
"#,
        data = temp.path().join("data").display(),
        ws = temp.path().join("ws").display()
    );
    let path = write_config(&temp, &body);

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "warn");
    assert_eq!(config.core.agent_name, "Pip");
    assert_eq!(config.llm.fallback_model, "gemini-b");
    assert_eq!(config.llm.timeout_secs, 30);
    assert_eq!(config.agent.debounce_ms, 1500);
    assert_eq!(config.agent.max_act_steps, 8);
    // Unset keys in a present section keep their defaults
    assert_eq!(config.agent.keep_tail, 4);
    assert_eq!(config.conversation.compact_batch, 10);
    assert_eq!(config.memory.index_limit, 5);
    assert_eq!(config.memory.recent_window_days, 7);
    assert!(!config.tools.run_commands);
    assert!(config.tools.read_files);
    assert!(config.telegram.enabled);
    assert_eq!(config.telegram.allowed_users, vec![111, 222]);
}

#[test]
fn test_minimal_config_with_defaults() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, &base_sections(temp.path()));

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.llm.primary_model, "gemini-test-pro");
    assert_eq!(config.agent.debounce_ms, 3000);
    assert_eq!(config.agent.max_retries, 2);
    assert_eq!(config.agent.max_act_steps, 15);
    assert_eq!(config.conversation.history_max, 100);
    assert_eq!(config.conversation.compact_batch, 50);
    assert_eq!(config.memory.index_limit, 20);
    assert_eq!(config.memory.p1_ttl_days, 30);
    assert!(!config.telegram.enabled);

    // Processing creates both directories and canonicalizes the workspace
    assert!(config.core.data_dir.is_dir());
    assert!(config.tools.workspace.is_dir());
    assert!(config.tools.workspace.is_absolute());
    assert_eq!(config.db_path(), config.core.data_dir.join("wisp.db"));
}

#[test]
fn test_invalid_log_level_detection() {
    let temp = TempDir::new().unwrap();
    let body = base_sections(temp.path()).replace("\"debug\"", "\"verbose\"");
    let path = write_config(&temp, &body);

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("Invalid log level 'verbose'"));
}

#[test]
fn test_compaction_bounds_validation() {
    let temp = TempDir::new().unwrap();
    let body = format!(
        "{}\n[conversation]\nhistory_max = 10\ncompact_batch = 10\n",
        base_sections(temp.path())
    );
    let path = write_config(&temp, &body);

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("compact_batch"));
}

#[test]
fn test_zero_keep_tail_rejected() {
    let temp = TempDir::new().unwrap();
    let body = format!("{}\n[agent]\nkeep_tail = 0\n", base_sections(temp.path()));
    let path = write_config(&temp, &body);

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("keep_tail"));
}

#[test]
fn test_malformed_and_missing_files() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "[core\nlog_level = ");
    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));

    let err = Config::load_from_path(&temp.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
