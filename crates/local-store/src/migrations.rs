//! Store schema migrations.
//!
//! Migrations run in order and are tracked in the `migrations` table.

use crate::StoreResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version < CURRENT_VERSION {
        info!(current_version, target_version = CURRENT_VERSION, "Running store migrations");
    }

    if current_version < 1 {
        migrate_v1_records(conn)?;
    }
    if current_version < 2 {
        migrate_v2_sequences(conn)?;
    }

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Applied migration");
    Ok(())
}

/// Records and their secondary index entries.
///
/// `record_key` has no declared type so integer keys keep INTEGER storage
/// and sort numerically ahead of text keys.
fn migrate_v1_records(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS store_records (
            collection TEXT NOT NULL,
            record_key NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (collection, record_key)
        );

        CREATE TABLE IF NOT EXISTS store_index_entries (
            collection TEXT NOT NULL,
            index_name TEXT NOT NULL,
            index_value TEXT NOT NULL,
            record_key NOT NULL,
            PRIMARY KEY (collection, index_name, index_value, record_key)
        );

        CREATE INDEX IF NOT EXISTS idx_store_index_entries_record
            ON store_index_entries(collection, record_key);
        ",
    )?;

    record_migration(conn, 1, "records")
}

/// Auto-increment sequences, one row per collection.
fn migrate_v2_sequences(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS store_sequences (
            collection TEXT PRIMARY KEY,
            next_key INTEGER NOT NULL
        );
        ",
    )?;

    record_migration(conn, 2, "sequences")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"store_records".to_string()));
        assert!(tables.contains(&"store_index_entries".to_string()));
        assert!(tables.contains(&"store_sequences".to_string()));
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
