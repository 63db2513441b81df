//! Shared types for sync, export and import.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::YearMonth;
use crate::storage::SyncRun;
use crate::sync::source::SourceError;

/// Which partitions an export pass regenerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportScope {
    /// Only the partitions in the persisted Dirty-Partition Set.
    #[default]
    DirtyOnly,
    /// Every partition present in the store.
    All,
}

/// Why a sync pass stopped fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The stop policy matched this record; it and everything after were skipped.
    Boundary { id: i64 },
    /// The source returned an empty or malformed page.
    Exhausted,
    /// The cursor did not move backwards in time between pages.
    Stalled { cursor: String },
    /// The source failed; see [`SyncReport::remote_failure`].
    Failed { message: String },
}

impl StopReason {
    /// Short label stored in sync run history.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Boundary { id } => format!("stopped at {id}"),
            Self::Exhausted => "exhausted".to_string(),
            Self::Stalled { cursor } => format!("stalled at {cursor}"),
            Self::Failed { message } => format!("failed: {message}"),
        }
    }
}

/// Result of one sync pass.
#[derive(Debug, Serialize)]
pub struct SyncReport {
    /// Id of the `sync_runs` row.
    pub run_id: String,
    /// Stop policy kind.
    pub policy: &'static str,
    /// Pages that contained records.
    pub pages: usize,
    /// Records accepted before the stop boundary (new or already stored).
    pub processed: usize,
    /// Records written for the first time.
    pub new_records: usize,
    /// Partitions that gained new records.
    pub partitions: BTreeSet<YearMonth>,
    pub stop: StopReason,
    /// The remote error that ended the pass, if any.
    #[serde(skip)]
    pub remote_failure: Option<SourceError>,
}

impl SyncReport {
    /// Whether the pass ended on a remote failure.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.remote_failure.is_some()
    }
}

/// One artifact written during export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedPartition {
    pub year_month: YearMonth,
    pub records: usize,
    pub content_hash: String,
}

/// Statistics for an export operation.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExportStats {
    /// Artifacts rewritten, most recent first.
    pub partitions: Vec<ExportedPartition>,
    /// Manifest contents after the export, `None` when nothing was written.
    pub manifest: Option<Vec<YearMonth>>,
}

impl ExportStats {
    /// Total number of records serialized.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.partitions.iter().map(|p| p.records).sum()
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty() && self.manifest.is_none()
    }
}

/// Statistics for a legacy artifact import.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportStats {
    /// Artifact files read.
    pub files: usize,
    /// Artifacts that could not be read or parsed and were treated as empty.
    pub corrupt_files: usize,
    /// Records written for the first time.
    pub created: usize,
    /// Records already present in the store.
    pub existing: usize,
    /// Documents without a usable id or timestamp.
    pub skipped: usize,
    /// Partitions that gained new records.
    pub partitions: BTreeSet<YearMonth>,
}

/// Per-partition view for `favarc status`.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionStatus {
    pub year_month: YearMonth,
    /// Records in the store.
    pub records: usize,
    /// Records in the last artifact written, if any.
    pub exported_records: Option<usize>,
    /// Artifact size on disk in bytes, 0 when missing.
    pub artifact_size: u64,
    /// The artifact is missing, outdated, or modified since export.
    pub stale: bool,
}

/// Archive overview for `favarc status`.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveStatus {
    pub total_records: usize,
    pub max_id: i64,
    /// Most recent first.
    pub partitions: Vec<PartitionStatus>,
    /// Partitions pending export, most recent first.
    pub dirty: Vec<YearMonth>,
    pub manifest_present: bool,
    pub recent_runs: Vec<SyncRun>,
}

impl ArchiveStatus {
    /// Partitions whose artifacts need regenerating.
    #[must_use]
    pub fn stale_count(&self) -> usize {
        self.partitions.iter().filter(|p| p.stale).count()
    }
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Import directory not found.
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<crate::error::Error> for SyncError {
    fn from(err: crate::error::Error) -> Self {
        match err {
            crate::error::Error::Io(e) => Self::Io(e),
            crate::error::Error::Json(e) => Self::Json(e),
            other => Self::Database(other.to_string()),
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
