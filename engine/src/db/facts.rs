//! Extracted fact persistence
//!
//! Facts are written only by compaction and never updated. Every prompt build
//! reads the most recent ones, across conversations.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Category of an extracted fact
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    Key,
    Conclusion,
    Method,
    Reference,
    Identifier,
    Datum,
    /// Credentials and secrets. Kept so they can be audited, masked in prompts.
    Sensitive,
    Other,
}

impl FactKind {
    pub fn as_str(&self) -> &str {
        match self {
            FactKind::Key => "key",
            FactKind::Conclusion => "conclusion",
            FactKind::Method => "method",
            FactKind::Reference => "reference",
            FactKind::Identifier => "identifier",
            FactKind::Datum => "datum",
            FactKind::Sensitive => "sensitive",
            FactKind::Other => "other",
        }
    }

    /// Lenient parse: anything unrecognised becomes `Other`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "key" => FactKind::Key,
            "conclusion" => FactKind::Conclusion,
            "method" => FactKind::Method,
            "reference" => FactKind::Reference,
            "identifier" => FactKind::Identifier,
            "datum" | "data" => FactKind::Datum,
            "sensitive" | "secret" | "credential" => FactKind::Sensitive,
            _ => FactKind::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedFact {
    pub kind: FactKind,
    pub content: String,
    pub source_conversation_id: String,
    pub extracted_at: i64,
}

#[derive(Clone)]
pub struct FactRepository {
    pool: SqlitePool,
}

impl FactRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a batch of facts in one transaction
    pub async fn insert_all(&self, facts: &[ExtractedFact]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin fact transaction")?;

        for fact in facts {
            sqlx::query(
                "INSERT INTO extracted_facts (kind, content, source_conversation_id, extracted_at) VALUES (?, ?, ?, ?)",
            )
            .bind(fact.kind.as_str())
            .bind(&fact.content)
            .bind(&fact.source_conversation_id)
            .bind(fact.extracted_at)
            .execute(&mut *tx)
            .await
            .context("Failed to insert extracted fact")?;
        }

        tx.commit().await.context("Failed to commit facts")?;
        Ok(())
    }

    /// Most recent facts, returned oldest first
    pub async fn recent(&self, limit: i64) -> Result<Vec<ExtractedFact>> {
        let rows = sqlx::query(
            r#"
            SELECT kind, content, source_conversation_id, extracted_at
            FROM extracted_facts
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load extracted facts")?;

        let mut facts: Vec<ExtractedFact> = rows
            .into_iter()
            .map(|row| ExtractedFact {
                kind: FactKind::parse(row.get::<String, _>("kind").as_str()),
                content: row.get("content"),
                source_conversation_id: row.get("source_conversation_id"),
                extracted_at: row.get("extracted_at"),
            })
            .collect();
        facts.reverse();

        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    #[test]
    fn test_kind_parse_is_lenient() {
        assert_eq!(FactKind::parse("Sensitive"), FactKind::Sensitive);
        assert_eq!(FactKind::parse(" method "), FactKind::Method);
        assert_eq!(FactKind::parse("gossip"), FactKind::Other);
    }

    #[tokio::test]
    async fn test_insert_and_recent() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("t.db")).await.unwrap();
        let repo = db.facts();

        let facts: Vec<ExtractedFact> = (0..5)
            .map(|i| ExtractedFact {
                kind: if i == 4 { FactKind::Sensitive } else { FactKind::Datum },
                content: format!("fact {}", i),
                source_conversation_id: "c1".to_string(),
                extracted_at: i,
            })
            .collect();
        repo.insert_all(&facts).await.unwrap();

        let recent = repo.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "fact 3");
        assert_eq!(recent[1].kind, FactKind::Sensitive);
    }
}
