//! `run_command` capability
//!
//! Runs one allowlisted program in the workspace through `CommandExecutor`
//! (no shell, stdin closed, hard timeout).

use async_trait::async_trait;
use sdk::{Capability, CapabilityCall, CapabilityResult};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::command_executor::CommandExecutor;

pub struct RunCommand {
    work_dir: PathBuf,
    timeout: Duration,
    executor: CommandExecutor,
    description: String,
}

impl RunCommand {
    pub fn new(work_dir: PathBuf, timeout: Duration) -> Self {
        Self::with_executor(work_dir, timeout, CommandExecutor::new())
    }

    pub fn with_executor(work_dir: PathBuf, timeout: Duration, executor: CommandExecutor) -> Self {
        let description = format!(
            "Run a program in the workspace without a shell (no pipes or redirects). Allowed: {}.",
            executor.allowed().join(", ")
        );
        Self {
            work_dir,
            timeout,
            executor,
            description,
        }
    }
}

#[async_trait]
impl Capability for RunCommand {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn arguments_hint(&self) -> &str {
        r#"{"command": "git status"}"#
    }

    async fn execute(&self, call: &CapabilityCall) -> CapabilityResult {
        let Some(command) = call.arg_str("command") else {
            return CapabilityResult::failed("ERROR: run_command requires a string 'command'");
        };

        info!("Executing command: {}", command);

        match self.executor.run(command, &self.work_dir, self.timeout).await {
            Ok(output) if output.success => {
                if output.stdout.is_empty() && !output.stderr.is_empty() {
                    CapabilityResult::ok(output.stderr)
                } else {
                    CapabilityResult::ok(output.stdout)
                }
            }
            Ok(output) => CapabilityResult::failed(format!(
                "Command failed with status: {}\nStdout: {}\nStderr: {}",
                output.status, output.stdout, output.stderr
            )),
            Err(e) => {
                warn!("Command rejected or failed to start: {}", e);
                CapabilityResult::failed(format!("ERROR: {}", e))
            }
        }
    }
}
