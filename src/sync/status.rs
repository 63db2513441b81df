//! Archive status display.
//!
//! Combines the Record Store, the export ledger, the Dirty-Partition Set
//! and the artifact directory into one overview.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use colored::Colorize;

use crate::storage::sqlite::SqliteStorage;
use crate::sync::dirty::PartitionTracker;
use crate::sync::file::{artifact_path, file_size, MANIFEST_FILE};
use crate::sync::hash::{content_hash, has_changed};
use crate::sync::types::{ArchiveStatus, PartitionStatus, SyncResult};

/// Sync runs shown by `favarc status`.
const RECENT_RUNS: usize = 5;

/// Get the current archive status.
///
/// # Errors
///
/// Returns an error if database queries fail or the dirty file is unreadable.
pub fn get_archive_status(
    storage: &SqliteStorage,
    tracker: &PartitionTracker,
    export_dir: &Path,
) -> SyncResult<ArchiveStatus> {
    let ledger: HashMap<_, _> = storage
        .partition_exports()?
        .into_iter()
        .map(|e| (e.year_month, e))
        .collect();

    let mut partitions = Vec::new();
    for (year_month, records) in storage.partition_counts()? {
        let path = artifact_path(export_dir, year_month);
        let exported = ledger.get(&year_month);
        let stale = match (fs::read(&path).ok(), exported) {
            (Some(bytes), Some(entry)) => {
                entry.record_count != records
                    || has_changed(&content_hash(&bytes), Some(entry.content_hash.as_str()))
            }
            _ => true,
        };
        partitions.push(PartitionStatus {
            year_month,
            records,
            exported_records: exported.map(|e| e.record_count),
            artifact_size: file_size(&path),
            stale,
        });
    }

    Ok(ArchiveStatus {
        total_records: storage.count_records()?,
        max_id: storage.max_record_id()?,
        partitions,
        dirty: tracker.load()?.into_iter().rev().collect(),
        manifest_present: export_dir.join(MANIFEST_FILE).is_file(),
        recent_runs: storage.recent_sync_runs(RECENT_RUNS)?,
    })
}

/// Print archive status to stdout in a human-readable format.
pub fn print_status(status: &ArchiveStatus) {
    println!("{}", "Archive Status".bold().underline());
    println!();

    if status.total_records == 0 {
        println!("{}", "Archive is empty.".dimmed());
        println!("{}", "Run 'favarc sync' to fetch your favorites.".dimmed());
        return;
    }

    println!("{}", "Store:".blue().bold());
    println!("  Records:    {}", status.total_records);
    println!("  Newest id:  {}", status.max_id);
    println!("  Partitions: {}", status.partitions.len());
    println!();

    if status.dirty.is_empty() {
        println!("{}", "No partitions pending export.".green());
    } else {
        println!("{}", "Pending Export:".yellow().bold());
        let keys: Vec<String> = status.dirty.iter().map(ToString::to_string).collect();
        println!("  {}", keys.join(", "));
        println!();
        println!("{}", "Run 'favarc export' to write pending partitions.".dimmed());
    }
    println!();

    println!("{}", "Partitions:".blue().bold());
    for partition in &status.partitions {
        let marker = if partition.stale {
            "stale".yellow()
        } else {
            "ok".green()
        };
        println!(
            "  {} {:>6} records  {:>9}  {}",
            partition.year_month,
            partition.records,
            format_size(partition.artifact_size),
            marker
        );
    }
    if !status.manifest_present {
        println!("{}", "  manifest.js missing".yellow());
    }
    if status.stale_count() > 0 {
        println!(
            "{}",
            "Run 'favarc export --all' to rebuild every artifact.".dimmed()
        );
    }

    if !status.recent_runs.is_empty() {
        println!();
        println!("{}", "Recent Syncs:".blue().bold());
        for run in &status.recent_runs {
            let started = chrono::DateTime::from_timestamp_millis(run.started_at)
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!(
                "  {}  {:<7} +{:<5} {}",
                started,
                run.policy,
                run.new_records,
                run.outcome.as_deref().unwrap_or("running").dimmed()
            );
        }
    }
}

/// Format a byte size as a human-readable string.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use crate::sync::export::Exporter;
    use crate::sync::types::ExportScope;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: i64, posted: &str) -> Record {
        Record::from_remote(json!({"plurk_id": id, "posted": posted})).unwrap()
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }

    #[test]
    fn test_status_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SqliteStorage::open(&temp_dir.path().join("archive.db")).unwrap();
        let tracker = PartitionTracker::new(temp_dir.path().join("dirty.txt"));

        let status = get_archive_status(&storage, &tracker, temp_dir.path()).unwrap();
        assert_eq!(status.total_records, 0);
        assert_eq!(status.max_id, 0);
        assert!(status.partitions.is_empty());
        assert!(!status.manifest_present);
    }

    #[test]
    fn test_status_tracks_staleness() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("backup_js");
        let mut storage = SqliteStorage::open_memory().unwrap();
        let tracker = PartitionTracker::new(temp_dir.path().join("dirty.txt"));

        storage.insert_record(&record(1, "2024-01-01T00:00:00")).unwrap();
        let status = get_archive_status(&storage, &tracker, &out).unwrap();
        assert!(status.partitions[0].stale);

        Exporter::new(&mut storage, &tracker, out.clone())
            .export(ExportScope::All)
            .unwrap();
        let status = get_archive_status(&storage, &tracker, &out).unwrap();
        assert!(!status.partitions[0].stale);
        assert!(status.manifest_present);
        assert_eq!(status.partitions[0].exported_records, Some(1));

        storage.insert_record(&record(2, "2024-01-02T00:00:00")).unwrap();
        let status = get_archive_status(&storage, &tracker, &out).unwrap();
        assert!(status.partitions[0].stale);
        assert_eq!(status.stale_count(), 1);
    }

    #[test]
    fn test_status_detects_modified_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("backup_js");
        let mut storage = SqliteStorage::open_memory().unwrap();
        let tracker = PartitionTracker::new(temp_dir.path().join("dirty.txt"));

        storage.insert_record(&record(1, "2024-01-01T00:00:00")).unwrap();
        Exporter::new(&mut storage, &tracker, out.clone())
            .export(ExportScope::All)
            .unwrap();
        fs::write(out.join("2024_01.js"), "edited by hand").unwrap();

        let status = get_archive_status(&storage, &tracker, &out).unwrap();
        assert!(status.partitions[0].stale);
    }

    #[test]
    fn test_status_lists_dirty_partitions() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SqliteStorage::open_memory().unwrap();
        let tracker = PartitionTracker::new(temp_dir.path().join("dirty.txt"));
        let pending = ["2024_01".parse().unwrap(), "2024_03".parse().unwrap()];
        tracker.replace(&pending.into_iter().collect()).unwrap();

        let status = get_archive_status(&storage, &tracker, temp_dir.path()).unwrap();
        let dirty: Vec<String> = status.dirty.iter().map(ToString::to_string).collect();
        assert_eq!(dirty, vec!["2024_03", "2024_01"]);
    }
}
