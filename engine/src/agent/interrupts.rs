//! Per-conversation interrupt queues
//!
//! Text that arrives while a conversation is inside a life cycle lands here
//! (pushed by the intake debouncer) and is drained exactly once, at the start
//! of the next ACT step.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Default)]
pub struct InterruptQueue {
    queues: Mutex<HashMap<String, Vec<String>>>,
}

impl InterruptQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<String, Vec<String>>> {
        // Every critical section is a single push or remove
        self.queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, conversation_id: &str, text: impl Into<String>) {
        let mut queues = self.queues();
        let queue = queues.entry(conversation_id.to_string()).or_default();
        queue.push(text.into());
        debug!(conversation_id, queued = queue.len(), "Interrupt queued");
    }

    /// Take every queued text for a conversation, oldest first
    pub fn drain(&self, conversation_id: &str) -> Vec<String> {
        self.queues().remove(conversation_id).unwrap_or_default()
    }

    pub fn len(&self, conversation_id: &str) -> usize {
        self.queues().get(conversation_id).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, conversation_id: &str) -> bool {
        self.len(conversation_id) == 0
    }
}
