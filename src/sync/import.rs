//! Legacy artifact import.
//!
//! Reads `<year_month>.js` artifacts written by earlier tools (or by this
//! one) and seeds the Record Store from them. Existing records always win;
//! an artifact can never overwrite what the store already holds. Partitions
//! that gained records are added to the Dirty-Partition Set so the next
//! export regenerates them with the store's canonical contents.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::model::{Record, YearMonth, PERMALINK_FIELD};
use crate::storage::sqlite::SqliteStorage;
use crate::sync::dirty::PartitionTracker;
use crate::sync::file::{list_partition_artifacts, parse_partition_artifact};
use crate::sync::types::{ImportStats, SyncError, SyncResult};

/// Importer for partition artifacts.
pub struct Importer<'a> {
    storage: &'a mut SqliteStorage,
    tracker: &'a PartitionTracker,
}

impl<'a> Importer<'a> {
    #[must_use]
    pub fn new(storage: &'a mut SqliteStorage, tracker: &'a PartitionTracker) -> Self {
        Self { storage, tracker }
    }

    /// Import every partition artifact in `dir`.
    ///
    /// Unreadable or corrupt artifacts are treated as empty and counted in
    /// [`ImportStats::corrupt_files`]. The manifest is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` does not exist, or if the store or the
    /// Dirty-Partition Set cannot be written.
    pub fn import_dir(&mut self, dir: &Path) -> SyncResult<ImportStats> {
        if !dir.is_dir() {
            return Err(SyncError::DirectoryNotFound(dir.display().to_string()));
        }

        let mut stats = ImportStats::default();
        for (year_month, path) in list_partition_artifacts(dir)? {
            stats.files += 1;
            let Some(documents) = read_artifact(&path) else {
                warn!(path = %path.display(), "unreadable or corrupt artifact; treating as empty");
                stats.corrupt_files += 1;
                continue;
            };
            debug!(%year_month, documents = documents.len(), "importing artifact");
            self.import_documents(documents, &mut stats)?;
        }

        self.tracker.extend(&stats.partitions)?;

        info!(
            files = stats.files,
            created = stats.created,
            existing = stats.existing,
            skipped = stats.skipped,
            corrupt = stats.corrupt_files,
            "import complete"
        );
        Ok(stats)
    }

    /// Insert the documents of one artifact.
    fn import_documents(
        &mut self,
        documents: Vec<serde_json::Value>,
        stats: &mut ImportStats,
    ) -> SyncResult<()> {
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            match Record::from_remote(document) {
                Ok(mut record) => {
                    // Regenerated on export from the configured base.
                    record.payload.remove(PERMALINK_FIELD);
                    records.push(record);
                }
                Err(e) => {
                    debug!(error = %e, "skipping document");
                    stats.skipped += 1;
                }
            }
        }

        let inserted = self.storage.insert_records(&records)?;
        let mut touched: BTreeSet<YearMonth> = BTreeSet::new();
        for (record, is_new) in records.iter().zip(inserted) {
            if is_new {
                stats.created += 1;
                touched.insert(record.year_month());
            } else {
                stats.existing += 1;
            }
        }
        stats.partitions.extend(touched);
        Ok(())
    }
}

fn read_artifact(path: &Path) -> Option<Vec<serde_json::Value>> {
    let content = fs::read_to_string(path).ok()?;
    parse_partition_artifact(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::file::render_partition;
    use serde_json::json;
    use tempfile::TempDir;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn write_artifact(dir: &Path, key: &str, docs: &[serde_json::Value]) {
        let content = render_partition(ym(key), docs).unwrap();
        fs::write(dir.join(format!("{key}.js")), content).unwrap();
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = PartitionTracker::new(temp_dir.path().join("dirty.txt"));
        let mut storage = SqliteStorage::open_memory().unwrap();

        let result =
            Importer::new(&mut storage, &tracker).import_dir(&temp_dir.path().join("nope"));
        assert!(matches!(result, Err(SyncError::DirectoryNotFound(_))));
    }

    #[test]
    fn test_import_seeds_store_and_dirty_set() {
        let temp_dir = TempDir::new().unwrap();
        let legacy = temp_dir.path().join("legacy");
        fs::create_dir_all(&legacy).unwrap();
        write_artifact(
            &legacy,
            "2024_01",
            &[
                json!({
                    "plurk_id": 2,
                    "posted": "Tue, 02 Jan 2024 10:00:00 GMT",
                    "plurk_url": "https://old/2",
                }),
                json!({"plurk_id": 1, "posted": "Mon, 01 Jan 2024 10:00:00 GMT"}),
            ],
        );
        fs::write(legacy.join("manifest.js"), "BackupData.months = [];").unwrap();

        let tracker = PartitionTracker::new(temp_dir.path().join("dirty.txt"));
        let mut storage = SqliteStorage::open_memory().unwrap();
        let stats = Importer::new(&mut storage, &tracker).import_dir(&legacy).unwrap();

        assert_eq!(stats.files, 1);
        assert_eq!(stats.created, 2);
        assert_eq!(storage.count_records().unwrap(), 2);
        assert!(storage.get_record(2).unwrap().unwrap().payload.get("plurk_url").is_none());
        let expected: BTreeSet<YearMonth> = [ym("2024_01")].into_iter().collect();
        assert_eq!(tracker.load().unwrap(), expected);
    }

    #[test]
    fn test_corrupt_artifact_is_treated_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("2023_05.js"),
            "BackupData.plurks[\"2023_05\"] = [{",
        )
        .unwrap();
        write_artifact(
            temp_dir.path(),
            "2023_06",
            &[json!({"plurk_id": 9, "posted": "2023-06-01T00:00:00"})],
        );

        let tracker = PartitionTracker::new(temp_dir.path().join("dirty.txt"));
        let mut storage = SqliteStorage::open_memory().unwrap();
        let stats = Importer::new(&mut storage, &tracker)
            .import_dir(temp_dir.path())
            .unwrap();

        assert_eq!(stats.files, 2);
        assert_eq!(stats.corrupt_files, 1);
        assert_eq!(stats.created, 1);
    }

    #[test]
    fn test_existing_records_are_not_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = PartitionTracker::new(temp_dir.path().join("dirty.txt"));
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .insert_record(
                &Record::from_remote(json!({
                    "plurk_id": 9,
                    "posted": "2023-06-01T00:00:00",
                    "content": "store",
                }))
                .unwrap(),
            )
            .unwrap();
        write_artifact(
            temp_dir.path(),
            "2023_06",
            &[
                json!({"plurk_id": 9, "posted": "2023-06-01T00:00:00", "content": "artifact"}),
                json!({"no_id": true}),
            ],
        );

        let stats = Importer::new(&mut storage, &tracker)
            .import_dir(temp_dir.path())
            .unwrap();
        assert_eq!(stats.existing, 1);
        assert_eq!(stats.skipped, 1);
        assert!(stats.partitions.is_empty());
        assert_eq!(storage.get_record(9).unwrap().unwrap().payload["content"], "store");
        assert!(tracker.load().unwrap().is_empty());
    }
}
