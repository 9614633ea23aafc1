//! Persistent identity and strategy record
//!
//! One record per agent instance. Each life cycle passes it through
//! load → evolve → persist under a per-instance lock, so concurrent life
//! cycles in different conversations never lose each other's updates.

use super::markers::Reflection;
use crate::db::IdentityRepository;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

const STRATEGY_CAP: usize = 10;
const CAPABILITY_CAP: usize = 20;
const SAFETY_NOTE_CAP: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,

    /// Bumped only when a field actually changed
    pub version: u64,

    /// Bumped once per life cycle
    pub cycle: u64,

    #[serde(default)]
    pub strategy: Vec<String>,

    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default)]
    pub safety_notes: Vec<String>,

    #[serde(default)]
    pub lessons: Vec<String>,
}

/// Append unless blank or already present, then keep the newest `cap`
fn push_capped(list: &mut Vec<String>, item: Option<&String>, cap: usize) -> bool {
    let Some(item) = item.map(|s| s.trim()).filter(|s| !s.is_empty()) else {
        return false;
    };
    if list.iter().any(|existing| existing == item) {
        return false;
    }
    list.push(item.to_string());
    if list.len() > cap {
        let excess = list.len() - cap;
        list.drain(..excess);
    }
    true
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            cycle: 0,
            strategy: Vec::new(),
            capabilities: Vec::new(),
            safety_notes: Vec::new(),
            lessons: Vec::new(),
        }
    }

    /// Fold one reflection in. Returns whether any field changed.
    pub fn evolve(&mut self, reflection: &Reflection, lesson_cap: usize) -> bool {
        let mut changed = push_capped(&mut self.lessons, reflection.lesson.as_ref(), lesson_cap);
        changed |= push_capped(&mut self.strategy, reflection.strategy_update.as_ref(), STRATEGY_CAP);
        changed |= push_capped(
            &mut self.capabilities,
            reflection.new_capability.as_ref(),
            CAPABILITY_CAP,
        );
        changed |= push_capped(&mut self.safety_notes, reflection.safety_note.as_ref(), SAFETY_NOTE_CAP);

        if changed {
            self.version += 1;
        }
        self.cycle += 1;
        changed
    }
}

pub struct IdentityStore {
    repo: IdentityRepository,
    name: String,
    lesson_cap: usize,
    lock: Mutex<()>,
}

impl IdentityStore {
    pub fn new(repo: IdentityRepository, name: impl Into<String>, lesson_cap: usize) -> Self {
        Self {
            repo,
            name: name.into(),
            lesson_cap,
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Identity> {
        let Some(stored) = self.repo.load().await? else {
            return Ok(Identity::new(&self.name));
        };
        match serde_json::from_str(&stored.record) {
            Ok(identity) => Ok(identity),
            Err(e) => {
                // Keep the counters from their columns so the version never goes back
                warn!(
                    error = %e,
                    version = stored.version,
                    cycle = stored.cycle,
                    "Stored identity record is unreadable, starting fresh"
                );
                let mut identity = Identity::new(&self.name);
                identity.version = u64::try_from(stored.version).unwrap_or(0).max(identity.version);
                identity.cycle = u64::try_from(stored.cycle).unwrap_or(0);
                Ok(identity)
            }
        }
    }

    /// Current record (a fresh one if nothing is stored yet)
    pub async fn current(&self) -> Result<Identity> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Load, fold in the reflection, persist. Returns the new record.
    pub async fn evolve(&self, reflection: &Reflection) -> Result<Identity> {
        let _guard = self.lock.lock().await;

        let mut identity = self.load().await?;
        let changed = identity.evolve(reflection, self.lesson_cap);

        let json = serde_json::to_string(&identity).context("Failed to serialize identity")?;
        self.repo
            .save(
                identity.version as i64,
                identity.cycle as i64,
                &json,
                chrono::Utc::now().timestamp(),
            )
            .await?;

        info!(
            version = identity.version,
            cycle = identity.cycle,
            changed,
            "Identity evolved"
        );
        Ok(identity)
    }
}
