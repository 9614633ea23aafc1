//! Task orchestration
//!
//! Intent classification, the THINK → ACT → VERIFY → REFLECT → EVOLVE life
//! cycle, the ACT capability loop with its context governor, and the
//! persistent identity record the life cycle evolves.

pub mod act;
pub mod context_governor;
pub mod identity;
pub mod intent;
pub mod interrupts;
pub mod lifecycle;
pub mod markers;
pub mod orchestrator;
pub mod prompt;

pub use identity::{Identity, IdentityStore};
pub use intent::{Classification, Intent, IntentClassifier};
pub use interrupts::InterruptQueue;
pub use lifecycle::{LifeCycleReport, State};
pub use orchestrator::{Invocation, Orchestrator, ReplySink};
