pub mod filesystem;
pub mod terminal;
pub mod web;

pub use filesystem::{ListDir, ReadFile, WriteFile};
pub use terminal::RunCommand;
pub use web::WebFetch;

use crate::config::ToolsConfig;
use crate::fs_guard::WorkspaceGuard;
use sdk::errors::EngineError;
use sdk::{Capability, CapabilityCall, CapabilityResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The closed set of capabilities the model can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CapabilityKind {
    ReadFile,
    WriteFile,
    ListDir,
    RunCommand,
    WebFetch,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 5] = [
        CapabilityKind::ReadFile,
        CapabilityKind::WriteFile,
        CapabilityKind::ListDir,
        CapabilityKind::RunCommand,
        CapabilityKind::WebFetch,
    ];

    /// Wire name used in capability calls
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::ReadFile => "read_file",
            CapabilityKind::WriteFile => "write_file",
            CapabilityKind::ListDir => "list_dir",
            CapabilityKind::RunCommand => "run_command",
            CapabilityKind::WebFetch => "web_fetch",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

/// Registry of enabled capabilities, resolved by wire name.
///
/// Unknown and disabled names never error: the caller gets a failed result
/// listing what is available, so the model can correct itself.
pub struct CapabilityRegistry {
    handlers: BTreeMap<CapabilityKind, Box<dyn Capability>>,
}

impl CapabilityRegistry {
    /// Create an empty registry with no capabilities enabled.
    pub fn empty() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Build the registry from the `[tools]` config section
    pub fn from_config(config: &ToolsConfig) -> Result<Self, EngineError> {
        let mut registry = Self::empty();
        let guard = Arc::new(WorkspaceGuard::new(&config.workspace)?);
        let timeout = Duration::from_secs(config.timeout_secs);

        if config.read_files {
            registry.register(
                CapabilityKind::ReadFile,
                Box::new(ReadFile::new(Arc::clone(&guard))),
            );
            registry.register(
                CapabilityKind::ListDir,
                Box::new(ListDir::new(Arc::clone(&guard))),
            );
        }
        if config.write_files {
            registry.register(
                CapabilityKind::WriteFile,
                Box::new(WriteFile::new(Arc::clone(&guard))),
            );
        }
        if config.run_commands {
            registry.register(
                CapabilityKind::RunCommand,
                Box::new(RunCommand::new(guard.workspace().to_path_buf(), timeout)),
            );
        }
        if config.web_fetch {
            registry.register(CapabilityKind::WebFetch, Box::new(WebFetch::new(timeout)));
        }

        Ok(registry)
    }

    /// Install (or replace) the handler for a kind
    pub fn register(&mut self, kind: CapabilityKind, handler: Box<dyn Capability>) {
        self.handlers.insert(kind, handler);
    }

    /// Resolve and execute one call
    pub async fn execute(&self, call: &CapabilityCall) -> CapabilityResult {
        debug!("Dispatching capability '{}' with args: {}", call.name, call.arguments);

        let Some(kind) = CapabilityKind::from_name(&call.name) else {
            warn!("Unknown capability requested: {}", call.name);
            return CapabilityResult::failed(format!(
                "ERROR: {}. Available capabilities: {}",
                EngineError::UnknownCapability(call.name.clone()),
                self.available_names().join(", ")
            ));
        };

        match self.handlers.get(&kind) {
            Some(handler) => handler.execute(call).await,
            None => {
                warn!("Disabled capability requested: {}", call.name);
                CapabilityResult::failed(format!(
                    "ERROR: {}. Available capabilities: {}",
                    EngineError::CapabilityDisabled(call.name.clone()),
                    self.available_names().join(", ")
                ))
            }
        }
    }

    /// Describe every enabled capability for the ACT prompt
    pub fn catalogue(&self) -> String {
        if self.handlers.is_empty() {
            return "No capabilities are enabled. Answer from your own knowledge.".to_string();
        }

        let mut parts = vec![
            "Call a capability by emitting a JSON object (several per reply are allowed):"
                .to_string(),
            r#"{"function": "capability_name", "arguments": {"arg": "value"}}"#.to_string(),
        ];

        for handler in self.handlers.values() {
            parts.push(String::new());
            parts.push(format!("### {}", handler.name()));
            parts.push(handler.description().to_string());
            parts.push(format!("Arguments: {}", handler.arguments_hint()));
        }

        parts.join("\n")
    }

    /// Wire names of all currently enabled capabilities
    pub fn available_names(&self) -> Vec<&'static str> {
        self.handlers.keys().map(|k| k.as_str()).collect()
    }
}
