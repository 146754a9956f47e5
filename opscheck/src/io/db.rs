//! Database access for existence checks, test users and feature flags.
//!
//! The connection string comes from an environment variable (see
//! [`crate::io::config::DatabaseConfig`]). Only SQLite URLs are supported.

use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, instrument};

/// Open database connection.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open from a connection string.
    ///
    /// Accepted forms: `sqlite::memory:`, `:memory:`, `sqlite://<path>`,
    /// `sqlite:<path>`, `file:<path>` or a bare path. The database file must
    /// already exist.
    pub fn open(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            bail!("database url is empty");
        }
        if url == ":memory:" || url == "sqlite::memory:" {
            return Self::in_memory();
        }
        let path = if let Some(rest) = url.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = url.strip_prefix("sqlite:") {
            rest
        } else if let Some(rest) = url.strip_prefix("file:") {
            rest
        } else if let Some((scheme, _)) = url.split_once("://") {
            bail!("unsupported database url scheme '{scheme}' (expected sqlite)");
        } else {
            url
        };
        Self::open_path(Path::new(path))
    }

    /// Open using the connection string stored in env var `var`.
    pub fn from_env(var: &str) -> Result<Self> {
        let url = std::env::var(var).with_context(|| format!("read database url from ${var}"))?;
        Self::open(&url).with_context(|| format!("open database from ${var}"))
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open database {}", path.display()))?;
        debug!(path = %path.display(), "database opened");
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).context("execute sql batch")
    }

    #[instrument(skip(self))]
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        validate_identifier(table)?;
        let exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1)",
                params![table],
                |row| row.get(0),
            )
            .with_context(|| format!("look up table {table}"))?;
        Ok(exists)
    }

    #[instrument(skip(self))]
    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
                params![table, column],
                |row| row.get(0),
            )
            .with_context(|| format!("look up column {table}.{column}"))?;
        Ok(count > 0)
    }

    /// True when a read-only query returns at least one row.
    #[instrument(skip(self))]
    pub fn query_exists(&self, sql: &str) -> Result<bool> {
        let mut stmt = self.read_only_statement(sql)?;
        let mut rows = stmt.query([]).with_context(|| format!("run query {sql}"))?;
        let first = rows.next().with_context(|| format!("read row of {sql}"))?;
        Ok(first.is_some())
    }

    fn read_only_statement(&self, sql: &str) -> Result<rusqlite::Statement<'_>> {
        let stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("prepare {sql}"))?;
        if !stmt.readonly() {
            bail!("refusing to run a statement that writes: {sql}");
        }
        Ok(stmt)
    }
}

/// Table and column names are interpolated, so only plain identifiers pass.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        _ => false,
    };
    if !valid {
        bail!("invalid sql identifier {name:?}");
    }
    Ok(())
}
