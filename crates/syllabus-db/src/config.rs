use std::env;
use std::time::Duration;

/// Connection settings for the plan store.
///
/// `SYLLABUS_DATABASE_URL` selects the database; `SYLLABUS_DB_MAX_CONNECTIONS`
/// optionally sizes the pool.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,
}

impl DbConfig {
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/syllabus";
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Build a config from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let database_url =
            env::var("SYLLABUS_DATABASE_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        let mut cfg = Self::new(database_url);
        if let Some(n) = env::var("SYLLABUS_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
        {
            cfg.max_connections = n;
        }
        cfg
    }

    /// Build a config for an explicit URL with default pool sizing.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Self::DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// The database name: the last path segment of the URL, minus any
    /// query string.
    pub fn database_name(&self) -> Option<&str> {
        let without_query = self.database_url.split('?').next()?;
        without_query.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// URL of the `postgres` maintenance database on the same server, used to
    /// issue `CREATE DATABASE`.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => format!("{}/postgres", &self.database_url[..pos]),
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
