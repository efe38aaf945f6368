//! # odrive-db
//!
//! Metadata store for Object Drive, backed by a single SQLite database.
//!
//! ## Schema
//!
//! - All timestamps are Unix epoch milliseconds
//! - Ids are 16 random bytes assigned by the database
//! - `change_count` / `change_token` are maintained by triggers
//! - Every version of an object, property, or permission row is copied to
//!   the matching `a_*` archive table
//! - Schema version stored in `PRAGMA user_version`
//!
//! Free functions under [`queries`] take a `&Connection` and never open
//! transactions. [`Dao`] is the transactional surface used by the daemon.

pub mod dao;
pub mod filter;
pub mod functions;
pub mod listing;
pub mod migrations;
pub mod queries;
pub mod schema;
pub mod sql;

pub use dao::{Dao, DaoError, DaoResult, DaoSettings, ErrorKind};

use rusqlite::Connection;
use std::path::Path;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Schema version recorded in the `dbstate` row.
pub const SCHEMA_VERSION_LABEL: &str = "20170331";

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Display never includes the driver message, which can name tables.
    #[error("database operation failed")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("change token is stale")]
    StaleChangeToken,

    /// Rendered like `NotFound` so callers cannot detect hidden rows.
    #[error("not found")]
    Unauthorized(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Crypto(#[from] odrive_crypto::CryptoError),

    #[error(transparent)]
    Types(#[from] odrive_types::TypeError),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Map the driver's "no rows" into `NotFound`; pass every other error through.
pub(crate) fn not_found(what: &str) -> impl FnOnce(rusqlite::Error) -> DbError + '_ {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(what.to_string()),
        other => DbError::Sqlite(other),
    }
}

/// Open or create the database at the given path.
///
/// Configures pragmas, registers the SQL functions, and runs pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas and register application functions.
///
/// Functions must exist before migrations run because triggers call them.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA recursive_triggers = OFF;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    functions::register(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let conn = open_memory().expect("open in-memory db");
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("get user_version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = open_memory().expect("open");
        let fk: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("get foreign_keys");
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_sqlite_error_display_hides_detail() {
        let conn = open_memory().expect("open");
        let err = conn
            .execute("INSERT INTO no_such_table VALUES (1)", [])
            .map_err(DbError::from)
            .expect_err("must fail");
        assert_eq!(err.to_string(), "database operation failed");
    }

    #[test]
    fn test_open_file_database() {
        let dir = std::env::temp_dir().join(format!("odrive-db-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("test.db");
        {
            let _conn = open(&path).expect("first open");
        }
        let conn = open(&path).expect("reopen runs no migration");
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("get journal_mode");
        assert_eq!(mode, "wal");
        std::fs::remove_dir_all(&dir).ok();
    }
}
