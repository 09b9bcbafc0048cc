//! Integration tests for database migrations and connection pooling.
//!
//! Each test creates a unique temporary database in the shared PostgreSQL
//! instance (see `arho-test-utils`), runs migrations, and drops it on
//! completion so tests are fully isolated and idempotent.

use arho_db::pool;
use arho_test_utils::{create_test_db, drop_test_db};

/// Expected tables created by the migrations.
const EXPECTED_TABLES: &[&str] = &[
    "additional_information",
    "codes",
    "documents",
    "event_dates",
    "lifecycle_dates",
    "organisations",
    "plan_legal_effects",
    "plan_objects",
    "plan_proposition_themes",
    "plan_propositions",
    "plan_regulation_groups",
    "plan_regulation_themes",
    "plan_regulation_verbal_types",
    "plan_regulations",
    "plans",
    "regulation_group_associations",
];

#[tokio::test]
async fn migrations_create_all_tables() {
    let (pool, db_name) = create_test_db().await;

    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT tablename::text FROM pg_tables \
         WHERE schemaname = 'public' \
         ORDER BY tablename",
    )
    .fetch_all(&pool)
    .await
    .expect("should list tables");

    // Filter out the sqlx metadata table.
    let user_tables: Vec<&str> = rows
        .iter()
        .map(|(name,)| name.as_str())
        .filter(|t| !t.starts_with("_sqlx"))
        .collect();

    assert_eq!(
        user_tables, EXPECTED_TABLES,
        "migrations should create exactly the expected tables"
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (pool, db_name) = create_test_db().await;

    // create_test_db already ran the migrations; a second run must be a
    // no-op.
    pool::run_migrations(&pool)
        .await
        .expect("second migration run should succeed (idempotent)");

    for table in EXPECTED_TABLES {
        let query = format!("SELECT COUNT(*) FROM {table}");
        let count: (i64,) = sqlx::query_as(&query)
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("failed to count {table}: {e}"));
        assert_eq!(count.0, 0, "table {table} should be empty after migrations");
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn table_counts_covers_every_table() {
    let (pool, db_name) = create_test_db().await;

    let counts = pool::table_counts(&pool)
        .await
        .expect("table_counts should succeed");

    let user_counts: Vec<(&str, i64)> = counts
        .iter()
        .filter(|(name, _)| !name.starts_with("_sqlx"))
        .map(|(name, count)| (name.as_str(), *count))
        .collect();

    let mut names: Vec<&str> = user_counts.iter().map(|(name, _)| *name).collect();
    names.sort_unstable();
    assert_eq!(
        names, EXPECTED_TABLES,
        "table_counts should report every migrated table"
    );
    for (name, count) in &user_counts {
        assert_eq!(*count, 0, "table {name} should be empty");
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn pool_creates_and_destroys_cleanly() {
    let (pool, db_name) = create_test_db().await;

    let one: (i32,) = sqlx::query_as("SELECT 1")
        .fetch_one(&pool)
        .await
        .expect("simple query should work");
    assert_eq!(one.0, 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}
