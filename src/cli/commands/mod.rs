//! Command implementations.

pub mod completions;
pub mod export;
pub mod import;
pub mod status;
pub mod sync;
pub mod version;

use crate::config::ArchiveConfig;
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;

/// Open the configured database, which must already exist.
fn open_existing(config: &ArchiveConfig) -> Result<SqliteStorage> {
    if !config.db_path.exists() {
        return Err(Error::NotInitialized {
            path: config.db_path.clone(),
        });
    }
    SqliteStorage::open(&config.db_path)
}
