//! Import command implementation.

use std::path::Path;

use crate::config::{ArchiveConfig, ConfigOverrides};
use crate::error::Result;
use crate::storage::SqliteStorage;
use crate::sync::Importer;

/// Execute the import command.
///
/// Creates the archive if it does not exist yet.
///
/// # Errors
///
/// Returns an error if `dir` is missing or the archive cannot be written.
pub fn execute(dir: &Path, overrides: &ConfigOverrides, json: bool) -> Result<()> {
    let config = ArchiveConfig::resolve(overrides)?;
    let mut storage = SqliteStorage::open(&config.db_path)?;
    let tracker = config.tracker();

    let stats = Importer::new(&mut storage, &tracker).import_dir(dir)?;

    if json {
        let output = serde_json::json!({
            "success": true,
            "import_dir": dir.display().to_string(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if stats.files == 0 {
        println!("No partition artifacts found in: {}", dir.display());
    } else {
        println!("Import complete from: {}", dir.display());
        println!();
        println!("  Files:    {} ({} unreadable)", stats.files, stats.corrupt_files);
        println!("  Created:  {}", stats.created);
        println!("  Existing: {}", stats.existing);
        if stats.skipped > 0 {
            println!("  Skipped:  {}", stats.skipped);
        }
        if !stats.partitions.is_empty() {
            println!();
            println!(
                "{} partitions pending export. Run 'favarc export' to write them.",
                stats.partitions.len()
            );
        }
    }
    Ok(())
}
