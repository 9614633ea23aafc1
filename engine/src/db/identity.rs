//! Identity record persistence (single row, JSON body)

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

/// The stored row: counters as columns, the rest as a JSON body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredIdentity {
    pub version: i64,
    pub cycle: i64,
    pub record: String,
}

#[derive(Clone)]
pub struct IdentityRepository {
    pool: SqlitePool,
}

impl IdentityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the stored row, if any
    pub async fn load(&self) -> Result<Option<StoredIdentity>> {
        let row = sqlx::query("SELECT version, cycle, record FROM identity WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load identity record")?;

        Ok(row.map(|r| StoredIdentity {
            version: r.get("version"),
            cycle: r.get("cycle"),
            record: r.get("record"),
        }))
    }

    /// Insert or replace the record
    pub async fn save(&self, version: i64, cycle: i64, record: &str, updated_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO identity (id, version, cycle, record, updated_at)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                cycle = excluded.cycle,
                record = excluded.record,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(version)
        .bind(cycle)
        .bind(record)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to save identity record")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_overwrites_single_row() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("t.db")).await.unwrap();
        let repo = db.identity();

        assert!(repo.load().await.unwrap().is_none());

        repo.save(1, 1, r#"{"v":1}"#, 100).await.unwrap();
        repo.save(2, 2, r#"{"v":2}"#, 200).await.unwrap();

        let stored = repo.load().await.unwrap().unwrap();
        assert_eq!(stored.record, r#"{"v":2}"#);
        assert_eq!((stored.version, stored.cycle), (2, 2));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM identity")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
