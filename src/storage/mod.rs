//! SQLite storage layer for favarc.
//!
//! This module provides the Record Store using SQLite with:
//! - WAL mode
//! - Insert-if-absent writes keyed by record id
//! - Sync run history and the partition export ledger
//!
//! # Submodules
//!
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod schema;
pub mod sqlite;

pub use sqlite::{PartitionExport, SqliteStorage, SyncRun};
