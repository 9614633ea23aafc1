/// Integration tests for database module
///
/// Tests the complete database lifecycle including:
/// - Database creation and initialization
/// - WAL mode configuration
/// - Schema creation via migrations
/// - Graceful shutdown with WAL flush, and recovery without it
/// - Turn, fact and identity repositories across reopen
use wisp_engine::agent::markers::Reflection;
use wisp_engine::agent::IdentityStore;
use wisp_engine::db::{Database, ExtractedFact, FactKind, TurnRole};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("wisp.db");

    let db = Database::new(&db_path).await.unwrap();
    assert!(db_path.exists());

    // WAL mode creates the side file on first write
    let wal_path = temp_dir.path().join("wisp.db-wal");
    assert!(wal_path.exists());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversation_turns")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_database_schema_complete() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("wisp.db")).await.unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(db.pool())
            .await
            .unwrap();

    for table in ["conversation_turns", "extracted_facts", "identity"] {
        assert!(tables.contains(&table.to_string()), "{} table missing", table);
    }

    let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(journal_mode.to_lowercase(), "wal");

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("wisp.db");

    let db = Database::new(&db_path).await.unwrap();
    db.turns().append("c1", TurnRole::User, "hello", 1).await.unwrap();
    db.close().await.unwrap();

    // Reopening re-runs every CREATE ... IF NOT EXISTS without losing rows
    let db = Database::new(&db_path).await.unwrap();
    assert_eq!(db.turns().load("c1").await.unwrap().len(), 1);
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_turn_role_constraint() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("wisp.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO conversation_turns (conversation_id, role, content, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind("c1")
    .bind("system")
    .bind("sneaky")
    .bind(1i64)
    .execute(db.pool())
    .await;
    assert!(result.is_err(), "role outside user/assistant must be rejected");

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_wal_flush_on_close() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("wisp.db");
    let wal_path = temp_dir.path().join("wisp.db-wal");

    {
        let db = Database::new(&db_path).await.unwrap();
        db.turns()
            .append("c1", TurnRole::User, "persist me", 1234567890)
            .await
            .unwrap();
        assert!(wal_path.exists());
        db.close().await.unwrap();
    }

    if wal_path.exists() {
        let metadata = std::fs::metadata(&wal_path).unwrap();
        assert!(metadata.len() < 1024, "WAL file not properly flushed");
    }

    let db = Database::new(&db_path).await.unwrap();
    let turns = db.turns().load("c1").await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].content, "persist me");
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_wal_recovery_after_unclean_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("wisp.db");

    // Simulate unclean shutdown by NOT calling close()
    {
        let db = Database::new(&db_path).await.unwrap();
        for n in 0..5 {
            db.turns()
                .append("c1", TurnRole::User, &format!("turn {}", n), n)
                .await
                .unwrap();
        }
        db.facts()
            .insert_all(&[ExtractedFact {
                kind: FactKind::Identifier,
                content: "host db-01".to_string(),
                source_conversation_id: "c1".to_string(),
                extracted_at: 5,
            }])
            .await
            .unwrap();
        drop(db);
    }

    let db = Database::new(&db_path).await.unwrap();
    let turns = db.turns().load("c1").await.unwrap();
    assert_eq!(turns.len(), 5);
    assert_eq!(turns[4].content, "turn 4");
    assert_eq!(db.facts().recent(10).await.unwrap().len(), 1);
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_delete_through_only_touches_one_conversation() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("wisp.db")).await.unwrap();
    let turns = db.turns();

    let mut a_ids = Vec::new();
    for n in 0..4 {
        a_ids.push(turns.append("a", TurnRole::User, &format!("a{}", n), n).await.unwrap().id);
        turns.append("b", TurnRole::User, &format!("b{}", n), n).await.unwrap();
    }

    // Interleaved ids: deleting through a1 also passes b0's id
    let deleted = turns.delete_through("a", a_ids[1]).await.unwrap();
    assert_eq!(deleted, 2);

    let remaining: Vec<String> = turns
        .load("a")
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.content)
        .collect();
    assert_eq!(remaining, vec!["a2", "a3"]);
    assert_eq!(turns.load("b").await.unwrap().len(), 4);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_identity_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("wisp.db");

    {
        let db = Database::new(&db_path).await.unwrap();
        let store = IdentityStore::new(db.identity(), "Wisp".to_string(), 20);
        store
            .evolve(&Reflection {
                lesson: Some("check the workspace before writing".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        store.evolve(&Reflection::default()).await.unwrap();
        db.close().await.unwrap();
    }

    let db = Database::new(&db_path).await.unwrap();
    let identity = IdentityStore::new(db.identity(), "Wisp".to_string(), 20)
        .current()
        .await
        .unwrap();
    assert_eq!(identity.cycle, 2);
    assert_eq!(identity.version, 2);
    assert_eq!(identity.lessons, vec!["check the workspace before writing"]);
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_sql_injection_prevention_in_turn_content() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("wisp.db")).await.unwrap();

    let malicious = "'; DROP TABLE conversation_turns; --";
    db.turns()
        .append(malicious, TurnRole::User, malicious, 1)
        .await
        .unwrap();

    let turns = db.turns().load(malicious).await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].content, malicious);

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table'")
            .fetch_all(db.pool())
            .await
            .unwrap();
    assert!(tables.contains(&"conversation_turns".to_string()));

    db.close().await.unwrap();
}
