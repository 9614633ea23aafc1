//! File capabilities: `read_file`, `write_file`, `list_dir`
//!
//! All three share one `WorkspaceGuard`; every path is validated before any
//! I/O and failures come back as `CapabilityResult::failed`.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::{Capability, CapabilityCall, CapabilityResult};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::fs_guard::WorkspaceGuard;

fn required<'a>(call: &'a CapabilityCall, key: &str) -> Result<&'a str, EngineError> {
    call.arg_str(key).ok_or_else(|| {
        EngineError::InvalidArguments(format!("{} requires a string '{}'", call.name, key))
    })
}

fn into_result(result: Result<String, EngineError>) -> CapabilityResult {
    match result {
        Ok(output) => CapabilityResult::ok(output),
        Err(e) => {
            warn!("File capability failed: {}", e);
            CapabilityResult::failed(format!("ERROR: {}", e))
        }
    }
}

/// Read a UTF-8 file from the workspace
pub struct ReadFile {
    guard: Arc<WorkspaceGuard>,
}

impl ReadFile {
    pub fn new(guard: Arc<WorkspaceGuard>) -> Self {
        Self { guard }
    }

    async fn read(&self, call: &CapabilityCall) -> Result<String, EngineError> {
        let path = self.guard.validate_existing(required(call, "path")?)?;
        info!("Reading file: {}", path.display());

        let content = fs::read_to_string(&path).await?;
        debug!("Read {} bytes from {}", content.len(), path.display());
        Ok(content)
    }
}

#[async_trait]
impl Capability for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file in the workspace."
    }

    fn arguments_hint(&self) -> &str {
        r#"{"path": "relative/path.txt"}"#
    }

    async fn execute(&self, call: &CapabilityCall) -> CapabilityResult {
        into_result(self.read(call).await)
    }
}

/// Write a file in the workspace, creating parent directories
pub struct WriteFile {
    guard: Arc<WorkspaceGuard>,
}

impl WriteFile {
    pub fn new(guard: Arc<WorkspaceGuard>) -> Self {
        Self { guard }
    }

    async fn write(&self, call: &CapabilityCall) -> Result<String, EngineError> {
        let target: PathBuf = self.guard.validate_for_write(required(call, "path")?)?;
        let content = required(call, "content")?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        info!("Writing {} bytes to: {}", content.len(), target.display());
        fs::write(&target, content).await?;

        let shown = target
            .strip_prefix(self.guard.workspace())
            .unwrap_or(&target)
            .display()
            .to_string();
        Ok(format!("Wrote {} bytes to {}", content.len(), shown))
    }
}

#[async_trait]
impl Capability for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file in the workspace (parent directories are created)."
    }

    fn arguments_hint(&self) -> &str {
        r#"{"path": "relative/path.md", "content": "file contents"}"#
    }

    async fn execute(&self, call: &CapabilityCall) -> CapabilityResult {
        into_result(self.write(call).await)
    }
}

/// List a workspace directory
pub struct ListDir {
    guard: Arc<WorkspaceGuard>,
}

impl ListDir {
    pub fn new(guard: Arc<WorkspaceGuard>) -> Self {
        Self { guard }
    }

    async fn list(&self, call: &CapabilityCall) -> Result<String, EngineError> {
        let raw = call.arg_str("path").unwrap_or(".");
        let path = self.guard.validate_existing(raw)?;
        info!("Listing directory: {}", path.display());

        let mut entries = fs::read_dir(&path).await?;

        let mut dirs = Vec::new();
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let ft = entry.file_type().await?;
            if ft.is_dir() {
                dirs.push(format!("d  {}/", name));
            } else {
                let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                files.push(format!("f  {:>8}  {}", format_size(size), name));
            }
        }

        dirs.sort();
        files.sort();

        let mut out = Vec::with_capacity(dirs.len() + files.len() + 1);
        out.push(format!("{}  ({} entries)", raw, dirs.len() + files.len()));
        out.extend(dirs);
        out.extend(files);
        Ok(out.join("\n"))
    }
}

#[async_trait]
impl Capability for ListDir {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List files and directories at a workspace path."
    }

    fn arguments_hint(&self) -> &str {
        r#"{"path": "."}"#
    }

    async fn execute(&self, call: &CapabilityCall) -> CapabilityResult {
        into_result(self.list(call).await)
    }
}

/// Format a byte count into a human-readable size string.
fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<WorkspaceGuard>) {
        let temp = TempDir::new().unwrap();
        let guard = Arc::new(WorkspaceGuard::new(temp.path()).unwrap());
        (temp, guard)
    }

    #[tokio::test]
    async fn test_write_and_read_file() {
        let (_temp, guard) = setup();

        let wrote = WriteFile::new(Arc::clone(&guard))
            .execute(&CapabilityCall::new(
                "write_file",
                json!({"path": "a/b/README.md", "content": "# Hello"}),
            ))
            .await;
        assert!(wrote.success, "{}", wrote.output);
        assert!(wrote.output.contains("7 bytes"));

        let read = ReadFile::new(guard)
            .execute(&CapabilityCall::new("read_file", json!({"path": "a/b/README.md"})))
            .await;
        assert!(read.success);
        assert_eq!(read.output, "# Hello");
    }

    #[tokio::test]
    async fn test_missing_argument_is_failed_result() {
        let (_temp, guard) = setup();
        let result = WriteFile::new(guard)
            .execute(&CapabilityCall::new("write_file", json!({"path": "x.txt"})))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("content"));
    }

    #[tokio::test]
    async fn test_read_nonexistent_file() {
        let (_temp, guard) = setup();
        let result = ReadFile::new(guard)
            .execute(&CapabilityCall::new("read_file", json!({"path": "nope.txt"})))
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_list_dir() {
        let (temp, guard) = setup();
        std::fs::write(temp.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(temp.path().join("subdir")).unwrap();

        let listing = ListDir::new(guard)
            .execute(&CapabilityCall::new("list_dir", json!({})))
            .await;
        assert!(listing.success);
        assert!(listing.output.contains("a.txt"));
        assert!(listing.output.contains("d  subdir/"));
        assert!(listing.output.contains("2 entries"));
    }

    #[tokio::test]
    async fn test_write_outside_workspace_fails() {
        let (_temp, guard) = setup();
        let result = WriteFile::new(guard)
            .execute(&CapabilityCall::new(
                "write_file",
                json!({"path": "../escape.txt", "content": "x"}),
            ))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("workspace"));
    }
}
