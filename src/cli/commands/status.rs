//! Status command implementation.

use crate::config::{ArchiveConfig, ConfigOverrides};
use crate::error::Result;
use crate::sync::{get_archive_status, print_status};

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the archive does not exist or cannot be read.
pub fn execute(overrides: &ConfigOverrides, json: bool) -> Result<()> {
    let config = ArchiveConfig::resolve(overrides)?;
    let storage = super::open_existing(&config)?;
    let tracker = config.tracker();

    let status = get_archive_status(&storage, &tracker, &config.export_dir)?;

    if json {
        let output = serde_json::json!({
            "db_path": config.db_path.display().to_string(),
            "export_dir": config.export_dir.display().to_string(),
            "status": status,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        print_status(&status);
    }
    Ok(())
}
