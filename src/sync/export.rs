//! Partition export.
//!
//! Regenerates `<year_month>.js` artifacts from the Record Store and then
//! rewrites `manifest.js` from the artifacts present on disk.
//!
//! # Scopes
//!
//! - [`ExportScope::DirtyOnly`]: the partitions in the persisted
//!   Dirty-Partition Set. An empty set means nothing is written at all.
//! - [`ExportScope::All`]: every partition in the store (full rebuild).
//!
//! Every artifact is a full snapshot of its partition, so rewriting one is
//! always safe. Records are ordered by id descending, which makes the output
//! a pure function of the store and two consecutive exports byte-identical.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::model::{YearMonth, DEFAULT_PERMALINK_BASE};
use crate::storage::sqlite::SqliteStorage;
use crate::sync::dirty::PartitionTracker;
use crate::sync::file::{
    artifact_path, atomic_write, list_partition_artifacts, render_manifest, render_partition,
    MANIFEST_FILE,
};
use crate::sync::hash::content_hash;
use crate::sync::types::{ExportScope, ExportStats, ExportedPartition, SyncResult};

/// Writes partition artifacts and the manifest.
pub struct Exporter<'a> {
    storage: &'a mut SqliteStorage,
    tracker: &'a PartitionTracker,
    output_dir: PathBuf,
    permalink_base: String,
}

impl<'a> Exporter<'a> {
    /// Create an exporter writing into `output_dir`.
    #[must_use]
    pub fn new(
        storage: &'a mut SqliteStorage,
        tracker: &'a PartitionTracker,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            storage,
            tracker,
            output_dir,
            permalink_base: DEFAULT_PERMALINK_BASE.to_string(),
        }
    }

    /// Use a different base URL for permanent links.
    #[must_use]
    pub fn with_permalink_base(mut self, base: impl Into<String>) -> Self {
        self.permalink_base = base.into();
        self
    }

    /// Export the partitions in `scope`, then rewrite the manifest and
    /// clear the Dirty-Partition Set.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or an artifact cannot be
    /// written. The Dirty-Partition Set is left intact on error.
    pub fn export(&mut self, scope: ExportScope) -> SyncResult<ExportStats> {
        let keys: Vec<YearMonth> = match scope {
            ExportScope::All => self.storage.partition_keys()?,
            ExportScope::DirtyOnly => {
                let dirty = self.tracker.load()?;
                if dirty.is_empty() {
                    debug!("no dirty partitions; nothing to export");
                    return Ok(ExportStats::default());
                }
                dirty.into_iter().rev().collect()
            }
        };

        let mut stats = ExportStats::default();
        for year_month in keys {
            if let Some(exported) = self.export_partition(year_month)? {
                stats.partitions.push(exported);
            }
        }

        stats.manifest = Some(self.write_manifest()?);
        self.tracker.clear()?;

        info!(
            partitions = stats.partitions.len(),
            records = stats.total_records(),
            dir = %self.output_dir.display(),
            "export complete"
        );
        Ok(stats)
    }

    /// Rewrite one partition artifact from the store.
    fn export_partition(&mut self, year_month: YearMonth) -> SyncResult<Option<ExportedPartition>> {
        let records = self.storage.records_in_partition(year_month)?;
        if records.is_empty() {
            warn!(%year_month, "dirty partition has no records; skipping");
            return Ok(None);
        }

        let documents: Vec<serde_json::Value> = records
            .iter()
            .map(|r| r.to_document(&self.permalink_base))
            .collect();
        let content = render_partition(year_month, &documents)?;
        let hash = content_hash(&content);

        atomic_write(&artifact_path(&self.output_dir, year_month), &content)?;
        self.storage
            .record_partition_export(year_month, documents.len(), &hash)?;
        debug!(%year_month, records = documents.len(), "partition exported");

        Ok(Some(ExportedPartition {
            year_month,
            records: documents.len(),
            content_hash: hash,
        }))
    }

    /// Rewrite the manifest from the artifacts on disk.
    fn write_manifest(&self) -> SyncResult<Vec<YearMonth>> {
        let keys: Vec<YearMonth> = list_partition_artifacts(&self.output_dir)?
            .into_iter()
            .map(|(ym, _)| ym)
            .collect();
        atomic_write(&self.output_dir.join(MANIFEST_FILE), &render_manifest(&keys)?)?;
        Ok(keys)
    }
}
