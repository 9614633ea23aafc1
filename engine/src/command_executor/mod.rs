use sdk::errors::EngineError;
use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs allowlisted programs without a shell.
///
/// # Gates
/// - Program must be on the allowlist
/// - Shell interpreters are never allowed, even if listed
/// - Arguments must not carry shell metacharacters
/// - Known dangerous pipe patterns are rejected
///
/// The program is spawned directly (execve-style) with stdin closed, in the
/// workspace directory, and killed when the timeout elapses.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    allowlist: HashSet<String>,
}

/// Captured result of a finished process
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

const SHELLS: &[&str] = &["sh", "bash", "zsh", "fish", "dash", "ksh", "csh", "pwsh"];

impl CommandExecutor {
    /// Default allowlist: inspection, text processing and build tools.
    /// Nothing that deletes files or escalates privileges.
    pub fn new() -> Self {
        let allowlist = [
            // Version control
            "git",
            // File inspection
            "ls", "cat", "grep", "find", "head", "tail", "wc", "stat", "file", "tree",
            // Text processing
            "sed", "awk", "cut", "sort", "uniq", "diff", "jq",
            // Safe file creation
            "mkdir", "touch", "cp", "mv",
            // System info
            "ps", "df", "du", "uname", "date", "whoami", "pwd",
            // Network
            "ping", "curl",
            // Build tools and runtimes
            "cargo", "rustc", "npm", "node", "python3", "make",
            // Utilities
            "echo",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self { allowlist }
    }

    /// Creates a CommandExecutor with a custom allowlist.
    pub fn with_allowlist(commands: Vec<String>) -> Self {
        Self {
            allowlist: commands.into_iter().collect(),
        }
    }

    /// Sorted allowlist, for the capability catalogue
    pub fn allowed(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.allowlist.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Validates a command through all gates without executing it.
    pub fn validate(&self, program: &str, args: &[String]) -> Result<(), EngineError> {
        if SHELLS.contains(&program) {
            return Err(EngineError::CommandNotAllowed(format!(
                "{} (shell interpreters are not available)",
                program
            )));
        }

        if !self.allowlist.contains(program) {
            return Err(EngineError::CommandNotAllowed(program.to_string()));
        }

        if let Some(arg) = args.iter().find(|a| has_shell_metacharacters(a)) {
            return Err(EngineError::CommandNotAllowed(format!(
                "shell metacharacters in argument {:?}",
                arg
            )));
        }

        let full_command = format!("{} {}", program, args.join(" "));
        if has_dangerous_pipe(&full_command) {
            return Err(EngineError::CommandNotAllowed(
                "dangerous pipe pattern".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate and run a whitespace-separated command line.
    ///
    /// Returns `Err` only when the command is rejected or cannot start. A
    /// process that runs and exits non-zero is an `Ok` with `success = false`.
    pub async fn run(
        &self,
        command_line: &str,
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, EngineError> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| EngineError::InvalidArguments("empty command".to_string()))?;
        let args: Vec<String> = parts.map(String::from).collect();

        self.validate(program, &args)?;

        let child = Command::new(program)
            .args(&args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                EngineError::InvalidArguments(format!(
                    "{} timed out after {} seconds",
                    program,
                    timeout.as_secs()
                ))
            })??;

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Detects: | & ; ` $ newline < >
fn has_shell_metacharacters(s: &str) -> bool {
    s.chars()
        .any(|c| matches!(c, '|' | '&' | ';' | '`' | '$' | '\n' | '<' | '>'))
}

fn has_dangerous_pipe(cmd: &str) -> bool {
    const DANGEROUS: &[&str] = &[
        "| sudo",
        "| su",
        "| chmod 777",
        "curl | bash",
        "wget | sh",
        "curl | sh",
        "wget | bash",
    ];
    DANGEROUS.iter().any(|d| cmd.contains(d))
}
