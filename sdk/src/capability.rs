//! Capability trait
//!
//! This module defines the `Capability` trait that every external action
//! (file I/O, shell, web fetch, browser) implements. The engine only ever sees
//! capabilities through this trait and the registry that resolves names.

use crate::types::{CapabilityCall, CapabilityResult};
use async_trait::async_trait;

/// Trait that all capabilities must implement
#[async_trait]
pub trait Capability: Send + Sync {
    /// Wire name used by the model to request this capability
    fn name(&self) -> &str;

    /// One-line description shown in the capability catalogue
    fn description(&self) -> &str;

    /// Example argument object shown in the capability catalogue
    fn arguments_hint(&self) -> &str;

    /// Execute the capability.
    ///
    /// Must not panic or return early with an error for expected failure
    /// modes: those are `CapabilityResult::failed`.
    async fn execute(&self, call: &CapabilityCall) -> CapabilityResult;
}
