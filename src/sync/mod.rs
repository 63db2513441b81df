//! Incremental sync and partition export.
//!
//! - **Mode**: resolve the stop policy from the store's high-water mark
//! - **Engine**: page the remote favorites timeline into the Record Store
//! - **Dirty tracking**: persist which partitions gained records
//! - **Export**: regenerate only those partition artifacts, then the manifest
//! - **Import**: seed the store from existing artifacts
//! - **Status**: compare the store, the export ledger and the files on disk
//!
//! # Architecture
//!
//! ```text
//! select_policy ──> SyncEngine ──> SqliteStorage
//!                       │
//!                       └──> PartitionTracker ──> Exporter ──> <ym>.js + manifest.js
//! ```
//!
//! # Example
//!
//! ```ignore
//! use favarc::sync::{select_policy, Exporter, ExportScope, HttpSource, SyncEngine};
//!
//! let selection = select_policy(storage.max_record_id()?, None);
//! let mut source = HttpSource::new(endpoint, token)?;
//! let report = SyncEngine::new(&mut storage, &mut source, &tracker, options)
//!     .run(&selection.policy)?;
//!
//! let stats = Exporter::new(&mut storage, &tracker, export_dir)
//!     .export(ExportScope::DirtyOnly)?;
//! ```

mod dirty;
mod engine;
mod export;
mod file;
mod hash;
mod http;
mod import;
mod mode;
mod source;
mod status;
mod types;

pub use dirty::PartitionTracker;
pub use engine::{SyncEngine, SyncOptions};
pub use export::Exporter;
pub use file::{
    artifact_path, atomic_write, file_size, list_partition_artifacts, parse_partition_artifact,
    render_manifest, render_partition, MANIFEST_FILE,
};
pub use hash::{content_hash, has_changed};
pub use http::HttpSource;
pub use import::Importer;
pub use mode::{parse_date_input, select_policy, ModeChoice, ModeSelection, StopPolicy};
pub use source::{FavoritesSource, Page, PageRequest, ScriptedSource, SourceError, MAX_PAGE_SIZE};
pub use status::{get_archive_status, print_status};
pub use types::{
    ArchiveStatus, ExportScope, ExportStats, ExportedPartition, ImportStats, PartitionStatus,
    StopReason, SyncError, SyncReport, SyncResult,
};
