//! Database connection management

use std::path::Path;

use libsql::{Builder, Connection, Database as LibSqlDatabase};

use super::migrations;
use crate::error::{Error, Result};

/// Where a database lives
#[derive(Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// Embedded file (or `:memory:`)
    Local(String),
    /// Remote libSQL server
    Remote { url: String, auth_token: String },
}

impl std::fmt::Debug for DatabaseLocation {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => formatter.debug_tuple("Local").field(path).finish(),
            Self::Remote { url, .. } => formatter
                .debug_struct("Remote")
                .field("url", url)
                .field("auth_token", &"[REDACTED]")
                .finish(),
        }
    }
}

impl DatabaseLocation {
    /// Interpret a `DATABASE_URL`-style value.
    ///
    /// `libsql://`, `http://`, `https://`, `ws://` and `wss://` URLs are remote;
    /// anything else is a local path, with an optional `file:` prefix.
    pub fn parse(value: &str, auth_token: Option<String>) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::Database("database location is empty".to_string()));
        }

        let is_remote = ["libsql://", "http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| value.starts_with(scheme));
        if is_remote {
            let auth_token = auth_token.unwrap_or_default();
            return Ok(Self::Remote {
                url: value.to_string(),
                auth_token,
            });
        }

        let path = value.strip_prefix("file:").unwrap_or(value);
        Ok(Self::Local(path.to_string()))
    }

    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

/// Database wrapper for libSQL connections
pub struct Database {
    // Kept alive for the lifetime of `conn`.
    _db: LibSqlDatabase,
    conn: Connection,
    remote: bool,
}

impl Database {
    /// Open a local-only database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        Self::finish(db, false).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::finish(db, false).await
    }

    /// Open a database served by a remote libSQL server
    pub async fn open_remote(url: impl Into<String>, auth_token: impl Into<String>) -> Result<Self> {
        let db = Builder::new_remote(url.into(), auth_token.into())
            .build()
            .await?;
        Self::finish(db, true).await
    }

    /// Open whatever `location` points at
    pub async fn open_location(location: &DatabaseLocation) -> Result<Self> {
        match location {
            DatabaseLocation::Local(path) if path == ":memory:" => Self::open_in_memory().await,
            DatabaseLocation::Local(path) => {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Self::open(path).await
            }
            DatabaseLocation::Remote { url, auth_token } => {
                tracing::info!("Connecting to remote database at {url}");
                Self::open_remote(url.clone(), auth_token.clone()).await
            }
        }
    }

    async fn finish(db: LibSqlDatabase, remote: bool) -> Result<Self> {
        let conn = db.connect()?;
        let database = Self {
            _db: db,
            conn,
            remote,
        };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Configure `SQLite` pragmas
    async fn configure(&self) -> Result<()> {
        if self.remote {
            // The server owns its own pragmas.
            return Ok(());
        }
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok(); // Not available for in-memory databases
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    pub const fn is_remote(&self) -> bool {
        self.remote
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
