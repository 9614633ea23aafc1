//! Intake debouncer
//!
//! Batches rapid-fire messages per conversation and guarantees at most one
//! orchestrator invocation in flight per conversation. Each conversation is a
//! small state machine:
//!
//! ```text
//! Idle --enqueue--> Batching --deadline--> Running --finish--> Idle
//!                      ^                     |  ^                |
//!                      |                     |  +--enqueue--+    |
//!                      +---------------------+- leftovers --+----+
//! ```
//!
//! While `Running`, new text is still debounced; when that batch's deadline
//! fires it goes to the orchestrator's interrupt queue instead of starting a
//! second invocation. When the run ends, interrupts nobody drained plus any
//! batch still pending become a fresh batch.

use crate::agent::InterruptQueue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Consumer of debounced input
#[async_trait]
pub trait InputHandler: Send + Sync {
    async fn handle_input(&self, conversation_id: &str, text: String);
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingBatch {
    texts: Vec<String>,
    /// Identifies the timer allowed to fire this batch
    epoch: u64,
}

impl PendingBatch {
    fn joined(&self) -> String {
        self.texts.join("\n")
    }
}

#[derive(Debug)]
enum Session {
    Batching(PendingBatch),
    Running { pending: Option<PendingBatch> },
}

/// Observable state of one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Batching { texts: Vec<String> },
    Running { pending: Vec<String> },
}

struct Inner {
    sessions: Mutex<HashMap<String, Session>>,
    handler: Arc<dyn InputHandler>,
    interrupts: Arc<InterruptQueue>,
    delay: Duration,
    next_epoch: AtomicU64,
}

#[derive(Clone)]
pub struct IntakeDebouncer {
    inner: Arc<Inner>,
}

impl IntakeDebouncer {
    pub fn new(handler: Arc<dyn InputHandler>, interrupts: Arc<InterruptQueue>, delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                handler,
                interrupts,
                delay,
                next_epoch: AtomicU64::new(1),
            }),
        }
    }

    fn epoch(&self) -> u64 {
        self.inner.next_epoch.fetch_add(1, Ordering::Relaxed)
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        // A poisoned map still holds consistent sessions: every critical
        // section below is a single replace
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add text to the conversation's batch and restart its countdown
    pub fn enqueue(&self, conversation_id: &str, text: impl Into<String>) {
        let text = text.into();
        let epoch = self.epoch();

        {
            let mut sessions = self.sessions();
            let next = match sessions.remove(conversation_id) {
                None => Session::Batching(PendingBatch {
                    texts: vec![text],
                    epoch,
                }),
                Some(Session::Batching(batch)) => Session::Batching(extend(batch, text, epoch)),
                Some(Session::Running { pending }) => Session::Running {
                    pending: Some(match pending {
                        Some(batch) => extend(batch, text, epoch),
                        None => PendingBatch {
                            texts: vec![text],
                            epoch,
                        },
                    }),
                },
            };
            sessions.insert(conversation_id.to_string(), next);
        }

        debug!(conversation_id, epoch, "Input batched");
        self.schedule(conversation_id, epoch);
    }

    fn schedule(&self, conversation_id: &str, epoch: u64) {
        let this = self.clone();
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(this.inner.delay).await;
            this.fire(&conversation_id, epoch);
        });
    }

    fn fire(&self, conversation_id: &str, epoch: u64) {
        let mut sessions = self.sessions();
        let ready = match sessions.get_mut(conversation_id) {
            Some(Session::Batching(batch)) if batch.epoch == epoch => {
                Some((batch.joined(), batch.texts.len()))
            }
            Some(Session::Running { pending }) if pending.as_ref().is_some_and(|b| b.epoch == epoch) => {
                if let Some(batch) = pending.take() {
                    info!(conversation_id, "Conversation busy, batch routed to interrupts");
                    self.inner.interrupts.push(conversation_id, batch.joined());
                }
                None
            }
            _ => {
                debug!(conversation_id, epoch, "Stale batch timer ignored");
                None
            }
        };

        if let Some((text, count)) = ready {
            sessions.insert(
                conversation_id.to_string(),
                Session::Running { pending: None },
            );
            drop(sessions);

            info!(conversation_id, messages = count, "Batch ready, starting invocation");
            self.dispatch(conversation_id, text);
        }
    }

    fn dispatch(&self, conversation_id: &str, text: String) {
        let this = self.clone();
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            let handler = Arc::clone(&this.inner.handler);
            let id = conversation_id.clone();
            let run = tokio::spawn(async move { handler.handle_input(&id, text).await });

            if let Err(e) = run.await {
                error!(conversation_id = %conversation_id, error = %e, "Invocation task failed");
            }
            this.finish(&conversation_id);
        });
    }

    /// Leave `Running`: undrained interrupts and any pending batch become
    /// the next batch, otherwise the conversation goes idle
    fn finish(&self, conversation_id: &str) {
        let mut sessions = self.sessions();
        let pending = match sessions.remove(conversation_id) {
            Some(Session::Running { pending }) => pending,
            other => {
                warn!(conversation_id, state = ?other, "Finished a conversation that was not running");
                None
            }
        };

        let mut texts = self.inner.interrupts.drain(conversation_id);
        if let Some(batch) = pending {
            texts.extend(batch.texts);
        }
        if texts.is_empty() {
            debug!(conversation_id, "Conversation idle");
            return;
        }

        let epoch = self.epoch();
        info!(conversation_id, messages = texts.len(), "Re-batching input that arrived mid-run");
        sessions.insert(
            conversation_id.to_string(),
            Session::Batching(PendingBatch { texts, epoch }),
        );
        drop(sessions);
        self.schedule(conversation_id, epoch);
    }

    pub fn state(&self, conversation_id: &str) -> SessionState {
        match self.sessions().get(conversation_id) {
            None => SessionState::Idle,
            Some(Session::Batching(batch)) => SessionState::Batching {
                texts: batch.texts.clone(),
            },
            Some(Session::Running { pending }) => SessionState::Running {
                pending: pending.as_ref().map(|b| b.texts.clone()).unwrap_or_default(),
            },
        }
    }
}

/// A new batch with one more text and a new epoch
fn extend(batch: PendingBatch, text: String, epoch: u64) -> PendingBatch {
    let mut texts = batch.texts;
    texts.push(text);
    PendingBatch { texts, epoch }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, String)>>,
        gate: Option<Arc<Notify>>,
        panic_first: bool,
    }

    #[async_trait]
    impl InputHandler for Recorder {
        async fn handle_input(&self, conversation_id: &str, text: String) {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((conversation_id.to_string(), text));
                calls.len() == 1
            };
            if first {
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                if self.panic_first {
                    panic!("handler blew up");
                }
            }
        }
    }

    fn texts(recorder: &Recorder) -> Vec<String> {
        recorder
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    fn debouncer(recorder: &Arc<Recorder>) -> (IntakeDebouncer, Arc<InterruptQueue>) {
        let interrupts = Arc::new(InterruptQueue::new());
        let d = IntakeDebouncer::new(
            Arc::clone(recorder) as Arc<dyn InputHandler>,
            Arc::clone(&interrupts),
            Duration::from_secs(3),
        );
        (d, interrupts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_messages_join_into_one_invocation() {
        let recorder = Arc::new(Recorder::default());
        let (d, _) = debouncer(&recorder);

        d.enqueue("c1", "first");
        sleep(Duration::from_secs(1)).await;
        d.enqueue("c1", "second");
        sleep(Duration::from_secs(2)).await;
        d.enqueue("c1", "third");
        assert_eq!(
            d.state("c1"),
            SessionState::Batching {
                texts: vec!["first".into(), "second".into(), "third".into()]
            }
        );

        sleep(Duration::from_secs(4)).await;
        assert_eq!(texts(&recorder), vec!["first\nsecond\nthird"]);
        assert_eq!(d.state("c1"), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conversations_are_independent() {
        let recorder = Arc::new(Recorder::default());
        let (d, _) = debouncer(&recorder);

        d.enqueue("a", "hello a");
        d.enqueue("b", "hello b");
        sleep(Duration::from_secs(4)).await;

        let mut calls = recorder.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(
            calls,
            vec![
                ("a".to_string(), "hello a".to_string()),
                ("b".to_string(), "hello b".to_string())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_while_running_goes_to_interrupts_then_rebatches() {
        let gate = Arc::new(Notify::new());
        let recorder = Arc::new(Recorder {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        });
        let (d, interrupts) = debouncer(&recorder);

        d.enqueue("c1", "build it");
        sleep(Duration::from_secs(4)).await;
        assert_eq!(d.state("c1"), SessionState::Running { pending: vec![] });

        d.enqueue("c1", "stop please");
        assert_eq!(
            d.state("c1"),
            SessionState::Running {
                pending: vec!["stop please".into()]
            }
        );
        sleep(Duration::from_secs(4)).await;

        // Single flight: the batch went to the interrupt queue
        assert_eq!(texts(&recorder), vec!["build it"]);
        assert_eq!(interrupts.len("c1"), 1);

        // Nobody drained it, so it runs next
        gate.notify_one();
        sleep(Duration::from_secs(4)).await;
        assert_eq!(texts(&recorder), vec!["build it", "stop please"]);
        assert!(interrupts.is_empty("c1"));
        assert_eq!(d.state("c1"), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_handler_releases_session() {
        let recorder = Arc::new(Recorder {
            panic_first: true,
            ..Default::default()
        });
        let (d, _) = debouncer(&recorder);

        d.enqueue("c1", "boom");
        sleep(Duration::from_secs(4)).await;
        assert_eq!(d.state("c1"), SessionState::Idle);

        d.enqueue("c1", "again");
        sleep(Duration::from_secs(4)).await;
        assert_eq!(texts(&recorder), vec!["boom", "again"]);
    }
}
