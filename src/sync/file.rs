//! Artifact file operations.
//!
//! Partition artifacts and the manifest are small JavaScript files that
//! register data on a shared `window.BackupData` namespace so a static
//! viewer can load them with plain `<script>` tags:
//!
//! ```text
//! if (!window.BackupData) window.BackupData = { plurks: {} };
//! BackupData.plurks["2024_03"] = [...];
//! ```
//!
//! All writes go through [`atomic_write`], so a reader never sees a
//! half-written artifact.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::model::YearMonth;
use crate::sync::types::SyncResult;

/// File name of the manifest artifact.
pub const MANIFEST_FILE: &str = "manifest.js";

/// Artifact file extension.
pub const ARTIFACT_EXTENSION: &str = "js";

/// First line of every artifact; creates the namespace if absent.
pub const NAMESPACE_PRELUDE: &str = "if (!window.BackupData) window.BackupData = { plurks: {} };";

const PARTITION_ASSIGNMENT: &str = "BackupData.plurks[";

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a temporary file next to the target
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> SyncResult<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Path of the artifact for one partition.
#[must_use]
pub fn artifact_path(dir: &Path, year_month: YearMonth) -> PathBuf {
    dir.join(format!("{year_month}.{ARTIFACT_EXTENSION}"))
}

/// Render a partition artifact.
///
/// # Errors
///
/// Returns an error if the documents cannot be serialized.
pub fn render_partition(year_month: YearMonth, documents: &[Value]) -> SyncResult<String> {
    let json = serde_json::to_string(documents)?;
    Ok(format!(
        "{NAMESPACE_PRELUDE}\n{PARTITION_ASSIGNMENT}\"{year_month}\"] = {json};"
    ))
}

/// Render the manifest artifact listing every available partition.
///
/// # Errors
///
/// Returns an error if the key list cannot be serialized.
pub fn render_manifest(keys: &[YearMonth]) -> SyncResult<String> {
    let json = serde_json::to_string(keys)?;
    Ok(format!("{NAMESPACE_PRELUDE}\nBackupData.months = {json};"))
}

/// Extract the document array from a partition artifact.
///
/// Returns `None` if the content has no partition assignment or its
/// payload is not a JSON array.
#[must_use]
pub fn parse_partition_artifact(content: &str) -> Option<Vec<Value>> {
    let line = content
        .lines()
        .find(|line| line.trim_start().starts_with(PARTITION_ASSIGNMENT))?;
    let (_, payload) = line.split_once(" = ")?;
    let payload = payload.trim_end().strip_suffix(';').unwrap_or(payload);

    match serde_json::from_str(payload).ok()? {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

/// Partition artifacts present in `dir`, most recent first.
///
/// Only `<YYYY_MM>.js` files count; the manifest, temp files and anything
/// else are ignored. A missing directory has no artifacts.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn list_partition_artifacts(dir: &Path) -> SyncResult<Vec<(YearMonth, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION)
        {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Ok(year_month) = stem.parse::<YearMonth>() {
            found.push((year_month, path));
        }
    }

    found.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(found)
}

/// Get the size of a file in bytes.
///
/// Returns 0 if the file doesn't exist.
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
