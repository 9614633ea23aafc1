//! Tiered memory store
//!
//! One dated entry per calendar day, backed by plain files:
//!
//! - `daily/<date>.md`: every raw record appended in full (P2 detail)
//! - `index.json`: date → [`MemoryEntry`] with abstract, overview, tags and tier
//! - `archive/index.json` + `archive/daily/`: entries whose retention passed
//!
//! Three prompt builders read it back: the P0 index of recent abstracts, the
//! P1 overviews of a trailing window, and the P2 raw text of one date (never
//! included automatically).
//!
//! Writes for the same date merge: abstracts and overviews are concatenated
//! and truncated, tags unioned, and the tier is only ever raised.

pub mod tier;

pub use tier::{infer_tags, infer_tier, Tier};

use crate::config::MemoryConfig;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use sdk::truncate_chars;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const ABSTRACT_MAX_CHARS: usize = 160;
pub const OVERVIEW_MAX_CHARS: usize = 1200;

/// Index entry for one calendar date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub date: NaiveDate,
    #[serde(default)]
    pub cycle: Option<u64>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub overview: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub tier: Tier,
    #[serde(default)]
    pub expires_on: Option<NaiveDate>,
}

impl MemoryEntry {
    /// Expired entries are archived; P0 entries never expire
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expires_on.is_some_and(|d| d < today)
    }
}

/// Input of one write
#[derive(Debug, Clone, Default)]
pub struct MemoryRecord {
    pub task: String,
    pub result: String,
    pub reflection: String,
    pub cycle: Option<u64>,
    /// Inferred from the reflection when absent
    pub tier: Option<Tier>,
    /// Inferred from the whole record when absent
    pub tags: Option<Vec<String>>,
}

type Index = BTreeMap<NaiveDate, MemoryEntry>;

/// File-backed tiered memory
pub struct TieredMemory {
    root: PathBuf,
    config: MemoryConfig,
    // Serializes every read-modify-write of the index files
    lock: Mutex<()>,
}

impl TieredMemory {
    /// Open (and create) the memory directory
    pub async fn open(root: impl Into<PathBuf>, config: MemoryConfig) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("daily"))
            .await
            .with_context(|| format!("Failed to create memory dir {}", root.display()))?;
        fs::create_dir_all(root.join("archive").join("daily"))
            .await
            .context("Failed to create memory archive dir")?;

        Ok(Self {
            root,
            config,
            lock: Mutex::new(()),
        })
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn archive_index_path(&self) -> PathBuf {
        self.root.join("archive").join("index.json")
    }

    fn daily_path(&self, date: NaiveDate) -> PathBuf {
        self.root.join("daily").join(format!("{}.md", date))
    }

    fn archived_daily_path(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join("archive")
            .join("daily")
            .join(format!("{}.md", date))
    }

    /// Record a finished task for today
    pub async fn write_entry(&self, record: &MemoryRecord) -> Result<MemoryEntry> {
        self.write_entry_on(record, Local::now().date_naive()).await
    }

    /// Record a finished task for an explicit date
    pub async fn write_entry_on(&self, record: &MemoryRecord, date: NaiveDate) -> Result<MemoryEntry> {
        let _guard = self.lock.lock().await;

        self.append_raw(record, date).await?;

        let tier = record
            .tier
            .unwrap_or_else(|| infer_tier(&record.reflection));
        let tags: BTreeSet<String> = match &record.tags {
            Some(tags) => tags.iter().take(tier::MAX_TAGS).cloned().collect(),
            None => infer_tags(&format!(
                "{}\n{}\n{}",
                record.task, record.result, record.reflection
            )),
        };

        let fresh = MemoryEntry {
            date,
            cycle: record.cycle,
            abstract_text: one_line_abstract(record),
            overview: overview(record),
            tags,
            tier,
            expires_on: tier.expires_on(date, self.config.p1_ttl_days, self.config.p2_ttl_days),
        };

        let mut index = load_index(&self.index_path()).await?;
        let entry = match index.remove(&date) {
            Some(existing) => self.merge(existing, fresh),
            None => fresh,
        };
        index.insert(date, entry.clone());
        save_index(&self.index_path(), &index).await?;

        debug!(%date, tier = %entry.tier, "Memory entry written");
        Ok(entry)
    }

    fn merge(&self, existing: MemoryEntry, fresh: MemoryEntry) -> MemoryEntry {
        let tier = existing.tier.raise(fresh.tier);

        let mut tags = existing.tags;
        for tag in fresh.tags {
            if tags.len() >= tier::MAX_TAGS {
                break;
            }
            tags.insert(tag);
        }

        MemoryEntry {
            date: existing.date,
            cycle: fresh.cycle.or(existing.cycle),
            abstract_text: truncate_chars(
                &format!("{}; {}", existing.abstract_text, fresh.abstract_text),
                ABSTRACT_MAX_CHARS,
            ),
            overview: truncate_chars(
                &format!("{}\n\n{}", existing.overview, fresh.overview),
                OVERVIEW_MAX_CHARS,
            ),
            tags,
            tier,
            expires_on: tier.expires_on(
                existing.date,
                self.config.p1_ttl_days,
                self.config.p2_ttl_days,
            ),
        }
    }

    async fn append_raw(&self, record: &MemoryRecord, date: NaiveDate) -> Result<()> {
        let path = self.daily_path(date);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let heading = match record.cycle {
            Some(cycle) => format!("## {} · cycle {}", Local::now().format("%H:%M:%S"), cycle),
            None => format!("## {}", Local::now().format("%H:%M:%S")),
        };
        let block = format!(
            "{}\n\n### Task\n{}\n\n### Result\n{}\n\n### Reflection\n{}\n\n",
            heading,
            record.task.trim(),
            record.result.trim(),
            record.reflection.trim()
        );

        file.write_all(block.as_bytes())
            .await
            .with_context(|| format!("Failed to append to {}", path.display()))?;
        file.flush().await?;
        Ok(())
    }

    /// Entry for one date, if any
    pub async fn entry(&self, date: NaiveDate) -> Result<Option<MemoryEntry>> {
        let _guard = self.lock.lock().await;
        Ok(load_index(&self.index_path()).await?.remove(&date))
    }

    /// P0: always-on index of the most recent dated abstracts
    pub async fn p0_index(&self) -> Result<String> {
        let _guard = self.lock.lock().await;
        let index = load_index(&self.index_path()).await?;

        let lines: Vec<String> = index
            .values()
            .rev()
            .take(self.config.index_limit)
            .map(|e| {
                let tags = if e.tags.is_empty() {
                    String::new()
                } else {
                    format!(
                        " [{}]",
                        e.tags.iter().cloned().collect::<Vec<_>>().join(", ")
                    )
                };
                format!("- {} ({}) {}{}", e.date, e.tier, e.abstract_text, tags)
            })
            .collect();

        Ok(lines.join("\n"))
    }

    /// P1: overviews of entries within the trailing window ending today
    pub async fn p1_recent(&self) -> Result<String> {
        self.p1_recent_on(Local::now().date_naive()).await
    }

    pub async fn p1_recent_on(&self, today: NaiveDate) -> Result<String> {
        let _guard = self.lock.lock().await;
        let index = load_index(&self.index_path()).await?;
        let window = self.config.recent_window_days;

        let sections: Vec<String> = index
            .values()
            .filter(|e| e.date <= today && (today - e.date).num_days() < window)
            .map(|e| format!("### {}\n{}", e.date, e.overview))
            .collect();

        Ok(sections.join("\n\n"))
    }

    /// P2: raw detail for one date (archived days included)
    pub async fn p2_day(&self, date: NaiveDate) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;

        for path in [self.daily_path(date), self.archived_daily_path(date)] {
            if fs::try_exists(&path).await.unwrap_or(false) {
                let text = fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                return Ok(Some(text));
            }
        }
        Ok(None)
    }

    /// Move expired entries and their daily files into the archive
    pub async fn archive_expired(&self) -> Result<usize> {
        self.archive_expired_on(Local::now().date_naive()).await
    }

    pub async fn archive_expired_on(&self, today: NaiveDate) -> Result<usize> {
        let _guard = self.lock.lock().await;

        let mut index = load_index(&self.index_path()).await?;
        let expired: Vec<NaiveDate> = index
            .values()
            .filter(|e| e.is_expired(today))
            .map(|e| e.date)
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let mut archive = load_index(&self.archive_index_path()).await?;
        for date in &expired {
            if let Some(entry) = index.remove(date) {
                archive.insert(*date, entry);
            }
            self.archive_daily_file(*date).await?;
        }

        // Archive first: a crash in between leaves a duplicate, never a loss
        save_index(&self.archive_index_path(), &archive).await?;
        save_index(&self.index_path(), &index).await?;

        info!(count = expired.len(), "Archived expired memory entries");
        Ok(expired.len())
    }

    async fn archive_daily_file(&self, date: NaiveDate) -> Result<()> {
        let from = self.daily_path(date);
        if !fs::try_exists(&from).await.unwrap_or(false) {
            return Ok(());
        }

        let to = self.archived_daily_path(date);
        if fs::try_exists(&to).await.unwrap_or(false) {
            let text = fs::read_to_string(&from).await?;
            let mut file = fs::OpenOptions::new().append(true).open(&to).await?;
            file.write_all(text.as_bytes()).await?;
            fs::remove_file(&from).await?;
        } else {
            fs::rename(&from, &to)
                .await
                .with_context(|| format!("Failed to archive {}", from.display()))?;
        }
        Ok(())
    }
}

fn one_line_abstract(record: &MemoryRecord) -> String {
    let task = record.task.lines().next().unwrap_or("").trim();
    let result = record.result.lines().next().unwrap_or("").trim();
    truncate_chars(&format!("{} → {}", task, result), ABSTRACT_MAX_CHARS)
}

fn overview(record: &MemoryRecord) -> String {
    let mut text = format!(
        "Task: {}\nResult: {}",
        truncate_chars(record.task.trim(), 300),
        truncate_chars(record.result.trim(), 500)
    );
    if !record.reflection.trim().is_empty() {
        text.push_str(&format!(
            "\nReflection: {}",
            truncate_chars(record.reflection.trim(), 300)
        ));
    }
    truncate_chars(&text, OVERVIEW_MAX_CHARS)
}

async fn load_index(path: &Path) -> Result<Index> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(Index::new());
    }
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Corrupt memory index {}", path.display()))
}

/// Write via a temp file and rename so readers never see a partial index
async fn save_index(path: &Path, index: &Index) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(index)?;
    fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
