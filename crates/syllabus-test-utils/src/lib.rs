//! Shared PostgreSQL fixtures for syllabus integration tests.
//!
//! Every test gets a freshly migrated database of its own inside one server
//! per test binary. Set `SYLLABUS_TEST_PG_URL` to point at an already running
//! server (for example one started by a CI service container); otherwise a
//! throwaway container is started through testcontainers on first use.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use syllabus_db::pool;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

struct Server {
    /// Server root URL, no database segment.
    root_url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static SERVER: OnceCell<Server> = OnceCell::const_new();

async fn start_server() -> Server {
    if let Ok(url) = std::env::var("SYLLABUS_TEST_PG_URL") {
        return Server {
            root_url: url.trim_end_matches('/').to_owned(),
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("18")
        .start()
        .await
        .expect("failed to start PostgreSQL container");
    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("container port");

    Server {
        root_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Root URL of the shared server (no database name appended).
pub async fn pg_url() -> &'static str {
    &SERVER.get_or_init(start_server).await.root_url
}

async fn maintenance_pool() -> PgPool {
    let url = format!("{}/postgres", pg_url().await);
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect(&url)
        .await
        .expect("failed to connect to maintenance database")
}

/// Create a uniquely named database with all migrations applied.
///
/// Returns the pool and the database name; hand the name to
/// [`drop_test_db`] once the pool is closed.
pub async fn create_test_db() -> (PgPool, String) {
    let db_name = format!("syllabus_test_{}", Uuid::new_v4().simple());

    let maint = maintenance_pool().await;
    maint
        .execute(format!("CREATE DATABASE {db_name}").as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create {db_name}: {e}"));
    maint.close().await;

    let url = format!("{}/{db_name}", pg_url().await);
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect(&url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to {db_name}: {e}"));

    pool::run_migrations(&pool)
        .await
        .expect("migrations should apply cleanly");

    (pool, db_name)
}

/// Connection URL for a database created by [`create_test_db`].
pub async fn test_db_url(db_name: &str) -> String {
    format!("{}/{db_name}", pg_url().await)
}

/// Drop a test database, kicking out any connections still attached.
pub async fn drop_test_db(db_name: &str) {
    let maint = maintenance_pool().await;
    let _ = maint
        .execute(
            format!(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                 WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
            )
            .as_str(),
        )
        .await;
    let _ = maint
        .execute(format!("DROP DATABASE IF EXISTS {db_name}").as_str())
        .await;
    maint.close().await;
}
