use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use wisp_engine::command_executor::CommandExecutor;
use wisp_engine::config::ToolsConfig;
use wisp_engine::tools::CapabilityRegistry;
use sdk::{CapabilityCall, EngineError};

fn tools_config(workspace: &TempDir) -> ToolsConfig {
    ToolsConfig {
        workspace: workspace.path().to_path_buf(),
        read_files: true,
        write_files: true,
        run_commands: true,
        web_fetch: false,
        timeout_secs: 10,
    }
}

#[tokio::test]
async fn test_safe_command_execution() {
    let temp = TempDir::new().unwrap();
    let output = CommandExecutor::new()
        .run("uname", temp.path(), Duration::from_secs(10))
        .await
        .unwrap();

    assert!(output.success);
    assert!(!output.stdout.is_empty());
}

#[test]
fn test_command_injection_prevention() {
    let executor = CommandExecutor::new();

    // Semicolon, pipe and backticks never reach a process
    for args in [
        vec!["; rm -rf /".to_string()],
        vec!["file.txt".to_string(), "|".to_string(), "rm".to_string()],
        vec!["`whoami`".to_string()],
    ] {
        assert!(matches!(
            executor.validate("ls", &args),
            Err(EngineError::CommandNotAllowed(_))
        ));
    }
}

#[test]
fn test_dangerous_command_blocked() {
    let executor = CommandExecutor::new();

    let result = executor.validate("rm", &["-rf".to_string(), "/tmp/test".to_string()]);
    assert!(matches!(result, Err(EngineError::CommandNotAllowed(_))));

    let result = executor.validate("sudo", &["ls".to_string()]);
    assert!(matches!(result, Err(EngineError::CommandNotAllowed(_))));
}

#[tokio::test]
async fn test_stdin_null_configuration() {
    let temp = TempDir::new().unwrap();

    // cat with no args would block on a terminal; stdin is closed instead
    let output = CommandExecutor::new()
        .run("cat", temp.path(), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(output.success);
    assert!(output.stdout.is_empty());
}

#[tokio::test]
async fn test_custom_allowlist_workflow() {
    let temp = TempDir::new().unwrap();
    let executor = CommandExecutor::with_allowlist(vec!["echo".to_string()]);
    assert_eq!(executor.allowed(), vec!["echo"]);

    let output = executor
        .run("echo wisp", temp.path(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(output.stdout.trim(), "wisp");

    let result = executor.run("ls", temp.path(), Duration::from_secs(5)).await;
    assert!(matches!(result, Err(EngineError::CommandNotAllowed(_))));
}

#[tokio::test]
async fn test_run_command_capability_reports_rejections_as_results() {
    let temp = TempDir::new().unwrap();
    let registry = CapabilityRegistry::from_config(&tools_config(&temp)).unwrap();

    let rejected = registry
        .execute(&CapabilityCall::new("run_command", json!({"command": "rm -rf ."})))
        .await;
    assert!(!rejected.success);
    assert!(rejected.output.contains("Command not allowed"));

    let missing = registry
        .execute(&CapabilityCall::new("run_command", json!({})))
        .await;
    assert!(!missing.success);

    std::fs::write(temp.path().join("hello.txt"), "hi").unwrap();
    let listed = registry
        .execute(&CapabilityCall::new("run_command", json!({"command": "ls"})))
        .await;
    assert!(listed.success);
    assert!(listed.output.contains("hello.txt"));
}

#[tokio::test]
async fn test_disabled_capability_names_available_set() {
    let temp = TempDir::new().unwrap();
    let mut config = tools_config(&temp);
    config.run_commands = false;
    let registry = CapabilityRegistry::from_config(&config).unwrap();

    let result = registry
        .execute(&CapabilityCall::new("run_command", json!({"command": "ls"})))
        .await;
    assert!(!result.success);
    assert!(result.output.contains("read_file"));
    assert!(!registry.available_names().contains(&"run_command"));
}
