//! Database schema definitions.
//!
//! The `records` table is the archive's source of truth. Exported
//! artifacts are projections of it and are never read back for logic.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the archive database.
///
/// `posted_at` is stored in canonical `YYYY-MM-DDTHH:MM:SS` form so that
/// text ordering matches time ordering. `year_month` is denormalized from it
/// for partition queries. Bookkeeping timestamps are Unix milliseconds.
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Archive
-- ====================

-- Records: one row per archived post, never updated once written
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY,
    posted_at TEXT NOT NULL,
    year_month TEXT NOT NULL,
    payload TEXT NOT NULL,
    archived_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_year_month ON records(year_month);
CREATE INDEX IF NOT EXISTS idx_records_posted_at ON records(posted_at DESC);

-- ====================
-- Bookkeeping
-- ====================

-- Sync runs: one row per `favarc sync` invocation
CREATE TABLE IF NOT EXISTS sync_runs (
    id TEXT PRIMARY KEY,
    policy TEXT NOT NULL,
    threshold TEXT,
    started_at INTEGER NOT NULL,
    finished_at INTEGER,
    pages INTEGER NOT NULL DEFAULT 0,
    processed INTEGER NOT NULL DEFAULT 0,
    new_records INTEGER NOT NULL DEFAULT 0,
    outcome TEXT
);

CREATE INDEX IF NOT EXISTS idx_sync_runs_started ON sync_runs(started_at DESC);

-- Partition exports: last artifact written for each month
CREATE TABLE IF NOT EXISTS partition_exports (
    year_month TEXT PRIMARY KEY,
    record_count INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    exported_at INTEGER NOT NULL
);
";

/// Apply pragmas and the schema to a connection.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"records".to_string()));
        assert!(tables.contains(&"sync_runs".to_string()));
        assert!(tables.contains(&"partition_exports".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        apply_schema(&conn).expect("First apply failed");
        apply_schema(&conn).expect("Second apply failed");

        let versions: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_duplicate_record_id_rejected_by_primary_key() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let insert = "INSERT INTO records (id, posted_at, year_month, payload, archived_at)
                      VALUES (1, '2024-01-01T00:00:00', '2024_01', '{}', 0)";
        assert!(conn.execute(insert, []).is_ok());
        assert!(conn.execute(insert, []).is_err());
    }
}
