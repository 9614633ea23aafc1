//! Retention tiers, tier inference and tag inference

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Retention class of a memory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Permanent; always listed in the prompt index
    P0,
    /// Kept ~30 days; overview shown while recent
    P1,
    /// Kept ~7 days; raw detail only on demand
    P2,
}

impl Tier {
    fn permanence(self) -> u8 {
        match self {
            Tier::P0 => 2,
            Tier::P1 => 1,
            Tier::P2 => 0,
        }
    }

    /// The more permanent of the two
    pub fn raise(self, other: Tier) -> Tier {
        if other.permanence() > self.permanence() {
            other
        } else {
            self
        }
    }

    /// Expiry date for an entry of this tier written on `date`
    pub fn expires_on(self, date: NaiveDate, p1_ttl_days: i64, p2_ttl_days: i64) -> Option<NaiveDate> {
        match self {
            Tier::P0 => None,
            Tier::P1 => Some(date + Duration::days(p1_ttl_days)),
            Tier::P2 => Some(date + Duration::days(p2_ttl_days)),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::P0 => write!(f, "P0"),
            Tier::P1 => write!(f, "P1"),
            Tier::P2 => write!(f, "P2"),
        }
    }
}

const P0_KEYWORDS: &[&str] = &["lesson", "critical", "important", "教训", "关键", "重要"];
const P1_KEYWORDS: &[&str] = &["result", "finding", "complete", "结果", "发现", "完成"];

/// Infer a tier from reflection text by keyword presence
pub fn infer_tier(text: &str) -> Tier {
    let lower = text.to_lowercase();
    if P0_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Tier::P0
    } else if P1_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Tier::P1
    } else {
        Tier::P2
    }
}

pub const MAX_TAGS: usize = 5;

const TAG_TABLE: &[(&[&str], &str)] = &[
    (&["bug", "fix", "error", "修复", "错误"], "bugfix"),
    (&["deploy", "release", "部署", "发布"], "deploy"),
    (&["database", "sql", "sqlite", "数据库"], "database"),
    (&["file", "readme", "文件"], "files"),
    (&["doc", "文档"], "docs"),
    (&["test", "测试"], "testing"),
    (&["git", "commit", "branch"], "git"),
    (&["server", "service", "服务"], "service"),
    (&["script", "脚本"], "scripting"),
    (&["http", "url", "web", "网页"], "web"),
    (&["rust", "cargo"], "rust"),
    (&["python", "pip"], "python"),
    (&["config", "配置"], "config"),
];

/// Up to `MAX_TAGS` topical tags from the fixed keyword table, in table order
pub fn infer_tags(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    TAG_TABLE
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, tag)| tag.to_string())
        .take(MAX_TAGS)
        .collect()
}
