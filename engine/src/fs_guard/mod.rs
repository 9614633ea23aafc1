use sdk::errors::EngineError;
use std::path::{Component, Path, PathBuf};

/// Confines file capabilities to the workspace directory.
///
/// Paths from the model are resolved against the workspace, checked against a
/// deny list of credential locations, and canonicalized so symlinks and `..`
/// cannot escape. Paths that do not exist yet (write targets) are normalized
/// lexically and their nearest existing ancestor is canonicalized instead.
///
/// Validation order:
/// 1. Deny list on the raw path
/// 2. Canonicalize (or normalize + canonicalize the existing ancestor)
/// 3. Deny list on the resolved path
/// 4. Workspace boundary
#[derive(Debug)]
pub struct WorkspaceGuard {
    workspace: PathBuf,
    deny_list: Vec<PathBuf>,
}

impl WorkspaceGuard {
    /// Creates a guard rooted at `workspace`, which must exist.
    pub fn new(workspace: &Path) -> Result<Self, EngineError> {
        // Canonicalize so symlinked roots (/var -> /private/var) compare correctly
        let workspace = workspace.canonicalize().map_err(|e| {
            EngineError::Config(format!("Workspace {:?} is not accessible: {}", workspace, e))
        })?;

        let deny_list = [
            ".ssh",
            ".env",
            ".aws/credentials",
            ".config/gcloud",
            "id_rsa",
            "id_ed25519",
            "id_dsa",
            ".gnupg",
            ".kube/config",
            "credentials",
            "private_key",
            ".npmrc",
            ".pypirc",
            ".netrc",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect();

        Ok(Self {
            workspace,
            deny_list,
        })
    }

    /// Returns the canonical workspace path.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Resolve a path that must already exist.
    pub fn validate_existing(&self, raw: &str) -> Result<PathBuf, EngineError> {
        let joined = self.join(raw);
        self.check_denied(&joined)?;

        let canonical = joined
            .canonicalize()
            .map_err(|e| EngineError::InvalidArguments(format!("{}: {}", raw, e)))?;

        self.check_resolved(canonical)
    }

    /// Resolve a path that may not exist yet (a write target).
    pub fn validate_for_write(&self, raw: &str) -> Result<PathBuf, EngineError> {
        let joined = self.join(raw);
        self.check_denied(&joined)?;

        if joined.exists() {
            let canonical = joined
                .canonicalize()
                .map_err(|e| EngineError::InvalidArguments(format!("{}: {}", raw, e)))?;
            return self.check_resolved(canonical);
        }

        let normalized = normalize(&joined)
            .ok_or_else(|| EngineError::PathOutsideWorkspace(joined.clone()))?;

        // Canonicalize the deepest existing ancestor, then re-append the rest
        let mut existing = normalized.as_path();
        let mut missing = Vec::new();
        while !existing.exists() {
            let Some(name) = existing.file_name() else {
                return Err(EngineError::PathOutsideWorkspace(normalized.clone()));
            };
            missing.push(name.to_os_string());
            existing = match existing.parent() {
                Some(parent) => parent,
                None => return Err(EngineError::PathOutsideWorkspace(normalized.clone())),
            };
        }

        let mut resolved = existing
            .canonicalize()
            .map_err(|e| EngineError::InvalidArguments(format!("{}: {}", raw, e)))?;
        for name in missing.into_iter().rev() {
            resolved.push(name);
        }

        self.check_resolved(resolved)
    }

    fn join(&self, raw: &str) -> PathBuf {
        let target = Path::new(raw);
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.workspace.join(target)
        }
    }

    fn check_resolved(&self, resolved: PathBuf) -> Result<PathBuf, EngineError> {
        self.check_denied(&resolved)?;

        if !resolved.starts_with(&self.workspace) {
            return Err(EngineError::PathOutsideWorkspace(resolved));
        }

        Ok(resolved)
    }

    fn check_denied(&self, path: &Path) -> Result<(), EngineError> {
        if self.is_denied(path) {
            return Err(EngineError::PathDenied(path.to_path_buf()));
        }
        Ok(())
    }

    /// A path is denied when it ends with a denied entry or contains a
    /// denied component anywhere (`/tmp/.env`, `ws/../.ssh/id_rsa`).
    fn is_denied(&self, path: &Path) -> bool {
        self.deny_list.iter().any(|denied| {
            path.ends_with(denied)
                || path
                    .components()
                    .any(|c| c.as_os_str() == denied.as_os_str())
        })
    }
}

/// Lexically resolve `.` and `..`; `None` if `..` climbs above the root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}
