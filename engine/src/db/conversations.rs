//! Conversation turn persistence
//!
//! Turns are append-only rows keyed by conversation id. The only delete path
//! is `delete_through`, used by compaction to drop the oldest turns.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Who wrote a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "assistant" => TurnRole::Assistant,
            _ => TurnRole::User,
        }
    }
}

/// One persisted turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub id: i64,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: i64,
}

/// Repository for conversation turns
#[derive(Clone)]
pub struct TurnRepository {
    pool: SqlitePool,
}

impl TurnRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a turn and return it with its row id
    pub async fn append(
        &self,
        conversation_id: &str,
        role: TurnRole,
        content: &str,
        timestamp: i64,
    ) -> Result<ConversationTurn> {
        let result = sqlx::query(
            "INSERT INTO conversation_turns (conversation_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to append conversation turn")?;

        Ok(ConversationTurn {
            id: result.last_insert_rowid(),
            role,
            content: content.to_string(),
            timestamp,
        })
    }

    /// Load every turn of a conversation, oldest first
    pub async fn load(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            "SELECT id, role, content, created_at FROM conversation_turns WHERE conversation_id = ? ORDER BY id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load conversation turns")?;

        Ok(rows
            .into_iter()
            .map(|row| ConversationTurn {
                id: row.get("id"),
                role: TurnRole::from_db(row.get::<String, _>("role").as_str()),
                content: row.get("content"),
                timestamp: row.get("created_at"),
            })
            .collect())
    }

    /// Delete every turn of a conversation with `id <= last_id`
    pub async fn delete_through(&self, conversation_id: &str, last_id: i64) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM conversation_turns WHERE conversation_id = ? AND id <= ?")
                .bind(conversation_id)
                .bind(last_id)
                .execute(&self.pool)
                .await
                .context("Failed to delete compacted turns")?;

        Ok(result.rows_affected())
    }
}
