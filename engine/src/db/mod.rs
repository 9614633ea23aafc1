/// Database module for SQLite persistence
///
/// This module provides database operations for conversation turns, facts
/// extracted during compaction, and the identity record. It uses sqlx with
/// runtime-checked queries and WAL mode for better concurrency.
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Executor};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod conversations;
pub mod facts;
pub mod identity;

// Re-export commonly used types
pub use conversations::{ConversationTurn, TurnRepository, TurnRole};
pub use facts::{ExtractedFact, FactKind, FactRepository};
pub use identity::{IdentityRepository, StoredIdentity};

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Enable WAL mode for better concurrency
    /// 3. Run migrations to set up the schema
    ///
    /// SQLite replays a leftover WAL on open, so an unclean shutdown needs no
    /// extra recovery code. Call `close()` on shutdown to checkpoint it.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Initializing database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!("Database connection established");

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    ///
    /// Every statement is `IF NOT EXISTS`, so this is safe on each start.
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        self.pool
            .execute(include_str!("../../migrations/001_initial.sql"))
            .await
            .context("Failed to execute migration 001_initial.sql")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Flush the WAL to disk
    pub async fn flush_wal(&self) -> Result<()> {
        info!("Flushing WAL to disk");

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;

        debug!("WAL flushed successfully");
        Ok(())
    }

    /// Close the database connection
    ///
    /// This flushes the WAL and closes all connections in the pool.
    pub async fn close(&self) -> Result<()> {
        info!("Closing database connection");

        self.flush_wal().await?;
        self.pool.close().await;

        info!("Database connection closed");
        Ok(())
    }

    /// Create a conversation turn repository
    pub fn turns(&self) -> TurnRepository {
        TurnRepository::new(self.pool.clone())
    }

    /// Create an extracted fact repository
    pub fn facts(&self) -> FactRepository {
        FactRepository::new(self.pool.clone())
    }

    /// Create an identity record repository
    pub fn identity(&self) -> IdentityRepository {
        IdentityRepository::new(self.pool.clone())
    }
}
