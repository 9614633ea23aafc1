//! Wisp SDK
//!
//! Shared library providing the Capability Contract and the error taxonomy.
//! This crate is used by the engine and by anything that implements a
//! capability outside of it.

/// Capability trait
pub mod capability;

/// Error types and handling
pub mod errors;

/// Capability call/result types
pub mod types;

// Re-export commonly used types
pub use capability::Capability;
pub use errors::{EngineError, WispErrorExt};
pub use types::{truncate_chars, CapabilityCall, CapabilityResult};
