//! Error types and handling
//!
//! This module provides the error types shared by the Wisp engine and its
//! capabilities. All errors implement the `WispErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! # User-facing messages
//!
//! Hints never include secrets, raw model output or internal paths. They are
//! what the messaging adapter shows when an invocation ends with an error.

use thiserror::Error;

/// Trait for Wisp error extensions
pub trait WispErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors go away on their own (rate limits, flaky network)
    /// or with a different input. Non-recoverable errors need operator action.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: SQLite operation failures
/// - **Language model**: every model failed for one call
/// - **Capability**: lookup and argument failures
/// - **Memory**: tiered memory file operations
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, WispErrorExt};
///
/// let error = EngineError::UnknownCapability("teleport".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::Config("bad log level".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Language model errors
    #[error("Language model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("All models exhausted for this call: {0}")]
    ModelsExhausted(String),

    #[error("Language model call timed out")]
    ModelTimeout,

    // Capability errors
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Capability disabled: {0}")]
    CapabilityDisabled(String),

    #[error("Invalid capability arguments: {0}")]
    InvalidArguments(String),

    #[error("Path outside workspace: {0:?}")]
    PathOutsideWorkspace(std::path::PathBuf),

    #[error("Path denied: {0:?}")]
    PathDenied(std::path::PathBuf),

    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),

    // Memory errors
    #[error("Memory store error: {0}")]
    Memory(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WispErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Try restarting wisp",

            Self::ModelUnavailable(_) => {
                "The language model is unavailable. Check your API key and network"
            }
            Self::ModelsExhausted(_) => {
                "Both the primary and fallback models failed. Please try again later"
            }
            Self::ModelTimeout => "The language model took too long to respond. Try again",

            Self::UnknownCapability(_) => "The requested capability does not exist",
            Self::CapabilityDisabled(_) => "The requested capability is disabled",
            Self::InvalidArguments(_) => "The capability was called with invalid arguments",
            Self::PathOutsideWorkspace(_) => "Operation must be within workspace",
            Self::PathDenied(_) => "Access to this path is not allowed",
            Self::CommandNotAllowed(_) => "This command is not permitted",

            Self::Memory(_) => "Memory store operation failed",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_hints_are_not_empty() {
        let errors = vec![
            EngineError::Config("x".to_string()),
            EngineError::Database("x".to_string()),
            EngineError::ModelUnavailable("x".to_string()),
            EngineError::ModelsExhausted("x".to_string()),
            EngineError::ModelTimeout,
            EngineError::UnknownCapability("x".to_string()),
            EngineError::CapabilityDisabled("x".to_string()),
            EngineError::InvalidArguments("x".to_string()),
            EngineError::PathOutsideWorkspace(PathBuf::from("/etc")),
            EngineError::PathDenied(PathBuf::from(".ssh")),
            EngineError::CommandNotAllowed("rm".to_string()),
            EngineError::Memory("x".to_string()),
            EngineError::Network("x".to_string()),
        ];

        for error in errors {
            assert!(!error.user_hint().is_empty(), "empty hint for {:?}", error);
        }
    }

    #[test]
    fn test_hint_does_not_leak_details() {
        let error = EngineError::ModelUnavailable("api key AIza-secret rejected".to_string());
        assert!(!error.user_hint().contains("AIza"));
    }

    #[test]
    fn test_recoverability() {
        assert!(!EngineError::Config("x".to_string()).is_recoverable());
        assert!(!EngineError::Database("x".to_string()).is_recoverable());
        assert!(EngineError::ModelTimeout.is_recoverable());
        assert!(EngineError::UnknownCapability("x".to_string()).is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: EngineError = io.into();
        assert!(matches!(error, EngineError::Io(_)));
    }
}
