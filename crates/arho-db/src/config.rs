use std::env;

/// Database configuration.
///
/// Reads from the `ARHO_DATABASE_URL` environment variable, falling back to
/// `postgresql://localhost:5432/arho` when unset. Connection URLs may carry
/// a query string (`?sslmode=require` against a managed instance); the
/// name and maintenance helpers preserve it.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    /// Pool size; commands are short-lived so the default is small.
    pub max_connections: u32,
}

impl DbConfig {
    /// The default connection URL used when no environment variable is set.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/arho";

    /// Default pool size.
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

    /// Build a config from the environment.
    ///
    /// Priority: `ARHO_DATABASE_URL` env var, then the compile-time default.
    pub fn from_env() -> Self {
        let database_url =
            env::var("ARHO_DATABASE_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self::new(database_url)
    }

    /// Build a config from an explicit URL (useful for tests and CLI flags).
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Override the pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Extract the database name from the URL, dropping any query string.
    ///
    /// Returns `None` if the URL cannot be parsed or has no path component.
    pub fn database_name(&self) -> Option<&str> {
        // URLs look like: postgresql://host:port/dbname?params
        let tail = self.database_url.rsplit('/').next()?;
        let name = tail.split('?').next().unwrap_or(tail);
        (!name.is_empty()).then_some(name)
    }

    /// Return a URL pointing at the `postgres` maintenance database on the
    /// same host, keeping any query string. Used to issue `CREATE DATABASE`
    /// when the target database does not yet exist.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => {
                let (head, tail) = self.database_url.split_at(pos);
                let query = match tail.find('?') {
                    Some(q) => &tail[q..],
                    None => "",
                };
                format!("{head}/postgres{query}")
            }
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url() {
        let cfg = DbConfig::new(DbConfig::DEFAULT_URL);
        assert_eq!(cfg.database_url, "postgresql://localhost:5432/arho");
        assert_eq!(cfg.max_connections, DbConfig::DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn database_name_extraction() {
        let cfg = DbConfig::new("postgresql://localhost:5432/mydb");
        assert_eq!(cfg.database_name(), Some("mydb"));
    }

    #[test]
    fn database_name_drops_query_string() {
        let cfg = DbConfig::new("postgresql://db.example.fi:5432/arho?sslmode=require");
        assert_eq!(cfg.database_name(), Some("arho"));
    }

    #[test]
    fn maintenance_url_replaces_db() {
        let cfg = DbConfig::new("postgresql://localhost:5432/arho");
        assert_eq!(cfg.maintenance_url(), "postgresql://localhost:5432/postgres");
    }

    #[test]
    fn maintenance_url_keeps_query_string() {
        let cfg = DbConfig::new("postgresql://db.example.fi:5432/arho?sslmode=require");
        assert_eq!(
            cfg.maintenance_url(),
            "postgresql://db.example.fi:5432/postgres?sslmode=require"
        );
    }

    #[test]
    fn explicit_new() {
        let cfg = DbConfig::new("postgresql://remotehost:5433/other").with_max_connections(1);
        assert_eq!(cfg.database_url, "postgresql://remotehost:5433/other");
        assert_eq!(cfg.database_name(), Some("other"));
        assert_eq!(cfg.max_connections, 1);
    }
}
