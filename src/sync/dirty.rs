//! The persisted Dirty-Partition Set.
//!
//! A plain text file, one `YYYY_MM` key per line, naming the partitions
//! whose artifacts are out of date. Sync writes it; export consumes and
//! clears it. Keeping it on disk lets an export that never ran (crash,
//! `--no-export`) be picked up by a later `favarc export`.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::model::YearMonth;
use crate::sync::file::atomic_write;
use crate::sync::types::SyncResult;

/// Reads and writes the dirty-partition file.
#[derive(Debug, Clone)]
pub struct PartitionTracker {
    path: PathBuf,
}

impl PartitionTracker {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the set. A missing file is the empty set; unparseable lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(&self) -> SyncResult<BTreeSet<YearMonth>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let mut set = BTreeSet::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.parse::<YearMonth>() {
                Ok(ym) => {
                    set.insert(ym);
                }
                Err(e) => warn!(
                    path = %self.path.display(),
                    line,
                    error = %e,
                    "ignoring bad dirty-partition entry"
                ),
            }
        }
        Ok(set)
    }

    /// Overwrite the set. An empty set clears the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or removed.
    pub fn replace(&self, set: &BTreeSet<YearMonth>) -> SyncResult<()> {
        if set.is_empty() {
            return self.clear();
        }

        let mut content = String::new();
        for ym in set.iter().rev() {
            content.push_str(&ym.to_string());
            content.push('\n');
        }
        atomic_write(&self.path, &content)?;
        debug!(path = %self.path.display(), partitions = set.len(), "dirty partitions saved");
        Ok(())
    }

    /// Union `set` into the persisted set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written.
    pub fn extend(&self, set: &BTreeSet<YearMonth>) -> SyncResult<()> {
        if set.is_empty() {
            return Ok(());
        }
        let mut merged = self.load()?;
        merged.extend(set.iter().copied());
        self.replace(&merged)
    }

    /// Remove the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> SyncResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
