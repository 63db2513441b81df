//! SQLite storage implementation.
//!
//! This module provides the Record Store: insert-if-absent persistence of
//! archived records, plus the bookkeeping tables for sync runs and the
//! partition export ledger.

use crate::error::{Error, Result};
use crate::model::{parse_timestamp, Record, YearMonth};
use crate::storage::schema::apply_schema;
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// One row of sync run history.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub id: String,
    /// Stop policy kind (`full`, `by_id`, `by_date`).
    pub policy: String,
    /// Rendered threshold (max id or canonical timestamp).
    pub threshold: Option<String>,
    /// Unix milliseconds.
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub pages: usize,
    pub processed: usize,
    pub new_records: usize,
    /// `stopped`, `exhausted`, `stalled`, or `failed: <message>`.
    pub outcome: Option<String>,
}

/// The last artifact written for a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionExport {
    pub year_month: YearMonth,
    pub record_count: usize,
    /// SHA256 of the artifact content.
    pub content_hash: String,
    /// Unix milliseconds.
    pub exported_at: i64,
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Run `f` inside an IMMEDIATE transaction, committing on success.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let result = f(&tx)?;
        tx.commit()?;

        tracing::trace!(op, "transaction committed");
        Ok(result)
    }

    // =================
    // Record Operations
    // =================

    /// Insert a record unless one with the same id already exists.
    ///
    /// Returns `true` when a new row was written. Existing rows are never
    /// overwritten; the first write wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_record(&mut self, record: &Record) -> Result<bool> {
        let inserted = self.insert_records(std::slice::from_ref(record))?;
        Ok(inserted.first().copied().unwrap_or(false))
    }

    /// Insert a batch of records in one transaction.
    ///
    /// Returns one flag per input record, `true` where a new row was written.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing from the batch is kept.
    pub fn insert_records(&mut self, records: &[Record]) -> Result<Vec<bool>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("insert_records", |tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO records (id, posted_at, year_month, payload, archived_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            let mut inserted = Vec::with_capacity(records.len());
            for record in records {
                let payload = serde_json::to_string(&record.payload)?;
                let changed = stmt.execute(rusqlite::params![
                    record.id,
                    record.posted_at_canonical(),
                    record.year_month().to_string(),
                    payload,
                    now,
                ])?;
                inserted.push(changed == 1);
            }
            Ok(inserted)
        })
    }

    /// Get a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored row is corrupt.
    pub fn get_record(&self, id: i64) -> Result<Option<Record>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, posted_at, payload FROM records WHERE id = ?1",
                [id],
                map_record_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Highest stored record id, or 0 for an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn max_record_id(&self) -> Result<i64> {
        let max: Option<i64> = self
            .conn
            .query_row("SELECT MAX(id) FROM records", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }

    /// Total number of stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_records(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Every partition key present in the store, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn partition_keys(&self) -> Result<Vec<YearMonth>> {
        Ok(self
            .partition_counts()?
            .into_iter()
            .map(|(ym, _)| ym)
            .collect())
    }

    /// Record count per partition, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn partition_counts(&self) -> Result<Vec<(YearMonth, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT year_month, COUNT(*) FROM records
             GROUP BY year_month ORDER BY year_month DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((key, count))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (key, count) = row?;
            let ym = key
                .parse::<YearMonth>()
                .map_err(|e| Error::Other(format!("Corrupt partition key in store: {e}")))?;
            counts.push((ym, usize::try_from(count).unwrap_or(0)));
        }
        Ok(counts)
    }

    /// All records in one partition, ordered by id descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored row is corrupt.
    pub fn records_in_partition(&self, year_month: YearMonth) -> Result<Vec<Record>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, posted_at, payload FROM records
             WHERE year_month = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt.query_map([year_month.to_string()], map_record_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // ==================
    // Sync Run History
    // ==================

    /// Record the start of a sync run.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn begin_sync_run(&mut self, run: &SyncRun) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_runs (id, policy, threshold, started_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![run.id, run.policy, run.threshold, run.started_at],
        )?;
        Ok(())
    }

    /// Record the result of a sync run.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn finish_sync_run(&mut self, run: &SyncRun) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_runs
             SET finished_at = ?2, pages = ?3, processed = ?4, new_records = ?5, outcome = ?6
             WHERE id = ?1",
            rusqlite::params![
                run.id,
                run.finished_at,
                i64::try_from(run.pages).unwrap_or(i64::MAX),
                i64::try_from(run.processed).unwrap_or(i64::MAX),
                i64::try_from(run.new_records).unwrap_or(i64::MAX),
                run.outcome,
            ],
        )?;
        Ok(())
    }

    /// Most recent sync runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent_sync_runs(&self, limit: usize) -> Result<Vec<SyncRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, policy, threshold, started_at, finished_at,
                    pages, processed, new_records, outcome
             FROM sync_runs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
            Ok(SyncRun {
                id: row.get(0)?,
                policy: row.get(1)?,
                threshold: row.get(2)?,
                started_at: row.get(3)?,
                finished_at: row.get(4)?,
                pages: count_column(row, 5)?,
                processed: count_column(row, 6)?,
                new_records: count_column(row, 7)?,
                outcome: row.get(8)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // ======================
    // Partition Export Ledger
    // ======================

    /// Remember the artifact just written for a partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn record_partition_export(
        &mut self,
        year_month: YearMonth,
        record_count: usize,
        content_hash: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO partition_exports (year_month, record_count, content_hash, exported_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(year_month) DO UPDATE SET
               record_count = excluded.record_count,
               content_hash = excluded.content_hash,
               exported_at = excluded.exported_at",
            rusqlite::params![
                year_month.to_string(),
                i64::try_from(record_count).unwrap_or(i64::MAX),
                content_hash,
                now
            ],
        )?;
        Ok(())
    }

    /// The export ledger, most recent partition first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn partition_exports(&self) -> Result<Vec<PartitionExport>> {
        let mut stmt = self.conn.prepare(
            "SELECT year_month, record_count, content_hash, exported_at
             FROM partition_exports ORDER BY year_month DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let year_month = key.parse::<YearMonth>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
            })?;
            Ok(PartitionExport {
                year_month,
                record_count: count_column(row, 1)?,
                content_hash: row.get(2)?,
                exported_at: row.get(3)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

fn count_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<usize> {
    let value: i64 = row.get(idx)?;
    Ok(usize::try_from(value).unwrap_or(0))
}

fn map_record_row(row: &rusqlite::Row) -> rusqlite::Result<Record> {
    let id: i64 = row.get(0)?;
    let posted_raw: String = row.get(1)?;
    let payload_raw: String = row.get(2)?;

    let posted_at = parse_timestamp(&posted_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unparseable posted_at: {posted_raw}").into(),
        )
    })?;
    let payload = serde_json::from_str(&payload_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Record {
        id,
        posted_at,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_record(id: i64, posted: &str, content: &str) -> Record {
        Record::from_remote(json!({
            "plurk_id": id,
            "posted": posted,
            "content": content,
        }))
        .unwrap()
    }

    #[test]
    fn test_open_memory() {
        let storage = SqliteStorage::open_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("archive.db");
        SqliteStorage::open(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_insert_is_idempotent_first_write_wins() {
        let mut storage = SqliteStorage::open_memory().unwrap();

        let first = make_record(42, "2024-03-10T08:00:00", "original");
        let second = make_record(42, "2024-03-10T08:00:00", "rewritten");

        assert!(storage.insert_record(&first).unwrap());
        assert!(!storage.insert_record(&second).unwrap());

        assert_eq!(storage.count_records().unwrap(), 1);
        let stored = storage.get_record(42).unwrap().unwrap();
        assert_eq!(stored.payload["content"], "original");
    }

    #[test]
    fn test_insert_records_reports_per_record_flags() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .insert_record(&make_record(2, "2024-01-02T00:00:00", "b"))
            .unwrap();

        let flags = storage
            .insert_records(&[
                make_record(3, "2024-01-03T00:00:00", "c"),
                make_record(2, "2024-01-02T00:00:00", "b"),
                make_record(1, "2024-01-01T00:00:00", "a"),
            ])
            .unwrap();
        assert_eq!(flags, vec![true, false, true]);
        assert_eq!(storage.count_records().unwrap(), 3);
    }

    #[test]
    fn test_max_record_id() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        assert_eq!(storage.max_record_id().unwrap(), 0);

        storage
            .insert_record(&make_record(100, "2024-01-01T00:00:00", "x"))
            .unwrap();
        storage
            .insert_record(&make_record(7, "2024-02-01T00:00:00", "y"))
            .unwrap();
        assert_eq!(storage.max_record_id().unwrap(), 100);
    }

    #[test]
    fn test_partition_queries() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .insert_records(&[
                make_record(10, "2024-03-01T00:00:00", "a"),
                make_record(12, "2024-03-31T23:59:59", "b"),
                make_record(11, "2024-03-15T12:00:00", "c"),
                make_record(5, "2024-02-29T23:59:59", "d"),
            ])
            .unwrap();

        let keys: Vec<String> = storage
            .partition_keys()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(keys, vec!["2024_03", "2024_02"]);

        let march = storage
            .records_in_partition("2024_03".parse().unwrap())
            .unwrap();
        let ids: Vec<i64> = march.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![12, 11, 10]);

        let counts = storage.partition_counts().unwrap();
        assert_eq!(counts[0].1, 3);
        assert_eq!(counts[1].1, 1);
    }

    #[test]
    fn test_sync_run_roundtrip() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut run = SyncRun {
            id: "run-1".to_string(),
            policy: "by_id".to_string(),
            threshold: Some("100".to_string()),
            started_at: 1_000,
            finished_at: None,
            pages: 0,
            processed: 0,
            new_records: 0,
            outcome: None,
        };
        storage.begin_sync_run(&run).unwrap();

        run.finished_at = Some(2_000);
        run.pages = 2;
        run.processed = 5;
        run.new_records = 4;
        run.outcome = Some("stopped".to_string());
        storage.finish_sync_run(&run).unwrap();

        let runs = storage.recent_sync_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].new_records, 4);
        assert_eq!(runs[0].outcome.as_deref(), Some("stopped"));
    }

    #[test]
    fn test_partition_export_ledger_upserts() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let ym: YearMonth = "2024_01".parse().unwrap();

        storage.record_partition_export(ym, 3, "aaa").unwrap();
        storage.record_partition_export(ym, 4, "bbb").unwrap();

        let ledger = storage.partition_exports().unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].record_count, 4);
        assert_eq!(ledger[0].content_hash, "bbb");
    }
}
