//! SQL schema constants and migration setup for the relational backend.
//!
//! Uses `rusqlite_migration` to manage schema migrations via SQLite's
//! `user_version` pragma. Migrations are embedded at compile time.

use repograph_core::{RpgError, RpgResult};
use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};
use std::path::Path;

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(include_str!("migrations/001_initial_schema.sql")),
        // Future migrations added here as new M::up(...) entries.
    ])
}

/// Open (or create) a database at `path` with WAL mode, foreign keys, and
/// all pending migrations applied.
pub fn open_database(path: &Path) -> RpgResult<Connection> {
    let mut conn = Connection::open(path)
        .map_err(|e| RpgError::Store(format!("failed to open {}: {e}", path.display())))?;
    configure_and_migrate(&mut conn)?;
    Ok(conn)
}

/// Open an ephemeral in-memory database with the same configuration.
pub fn open_in_memory() -> RpgResult<Connection> {
    let mut conn = Connection::open_in_memory()
        .map_err(|e| RpgError::Store(format!("failed to open in-memory database: {e}")))?;
    configure_and_migrate(&mut conn)?;
    Ok(conn)
}

fn configure_and_migrate(conn: &mut Connection) -> RpgResult<()> {
    // WAL gives concurrent readers with a single writer; NORMAL sync is safe
    // under WAL. Foreign keys are off by default in SQLite.
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(store_err)?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(store_err)?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(store_err)?;

    migrations()
        .to_latest(conn)
        .map_err(|e| RpgError::Store(format!("migration failed: {e}")))?;
    Ok(())
}

pub(crate) fn store_err(e: rusqlite::Error) -> RpgError {
    RpgError::Store(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn in_memory_database_has_schema() {
        let conn = open_in_memory().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
