//! Shared test utilities for arho integration tests.
//!
//! Provides a PostgreSQL instance shared across tests. Each test gets its
//! own migrated database within the instance, plus a helper to seed the
//! handful of registry codes a scenario needs.
//!
//! Two modes:
//! - **`ARHO_TEST_PG_URL`** set (nextest setup script): use the external
//!   container directly. No testcontainers overhead per process.
//! - **No env var** (`cargo test`): spin up a container via testcontainers,
//!   shared per binary through a `OnceCell`.

use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use arho_db::config::DbConfig;
use arho_db::models::CodeList;
use arho_db::pool;
use arho_db::queries::codes::{self, NewCode};

/// Shared container state: base URL and optional container handle (kept alive).
struct SharedPg {
    base_url: String,
    /// Held to keep the container alive. `None` when using an external URL.
    _container: Option<ContainerAsync<Postgres>>,
}

/// Lazily-initialized shared PostgreSQL.
static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn init_shared_pg() -> SharedPg {
    // If a setup script already started a container, use that directly.
    if let Ok(url) = std::env::var("ARHO_TEST_PG_URL") {
        return SharedPg {
            base_url: url,
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("18")
        .start()
        .await
        .expect("failed to start PostgreSQL container");

    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    let base_url = format!("postgresql://postgres:postgres@{host}:{port}");

    SharedPg {
        base_url,
        _container: Some(container),
    }
}

/// Base URL for the shared PostgreSQL.
///
/// Lazily starts a container on first call (unless `ARHO_TEST_PG_URL` is
/// set). The URL points at the server root (no database name appended).
pub async fn pg_url() -> &'static str {
    let shared = SHARED_PG.get_or_init(init_shared_pg).await;
    &shared.base_url
}

/// Create a temporary database with migrations applied.
///
/// Returns `(pool, db_name)`. The pool connects to a uniquely-named
/// database within the shared instance, created and migrated through the
/// same `arho_db::pool` path the `db-init` command uses. Call
/// [`drop_test_db`] with the returned `db_name` when the test is done.
pub async fn create_test_db() -> (PgPool, String) {
    let base_url = pg_url().await;
    let db_name = format!("arho_test_{}", Uuid::new_v4().simple());
    let config = DbConfig::new(format!("{base_url}/{db_name}"));

    pool::ensure_database_exists(&config)
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e}"));

    let temp_pool = pool::create_pool(&config)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e}"));

    pool::run_migrations(&temp_pool)
        .await
        .expect("migrations should succeed");

    (temp_pool, db_name)
}

/// Drop a temporary database.
///
/// Terminates existing connections and drops the database. Safe to call
/// even if the database was already dropped.
pub async fn drop_test_db(db_name: &str) {
    let base_url = pg_url().await;
    let config = DbConfig::new(format!("{base_url}/{db_name}"));
    let maint_config = DbConfig::new(config.maintenance_url()).with_max_connections(1);

    let maint_pool = pool::create_pool(&maint_config)
        .await
        .expect("failed to connect to maintenance database for cleanup");

    // Terminate existing connections first.
    let terminate = format!(
        "SELECT pg_terminate_backend(pid) \
         FROM pg_stat_activity \
         WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
    );
    let _ = maint_pool.execute(terminate.as_str()).await;

    let stmt = format!("DROP DATABASE IF EXISTS {db_name}");
    let _ = maint_pool.execute(stmt.as_str()).await;
    maint_pool.close().await;
}

/// Seed bare registry codes (value only, minimal fields) so a scenario
/// can reference them by `(list, value)`.
///
/// Most tests only need a few lifecycle statuses, plan types, or
/// municipalities; this skips a full code-list load.
pub async fn seed_bare_codes(pool: &PgPool, entries: &[(CodeList, &str)]) {
    for (list, value) in entries {
        codes::upsert_code(pool, &NewCode::bare(*list, *value))
            .await
            .unwrap_or_else(|e| panic!("failed to seed code {value}: {e}"));
    }
}
