//! Export command implementation.

use crate::config::{ArchiveConfig, ConfigOverrides};
use crate::error::Result;
use crate::sync::{ExportScope, ExportStats, Exporter};

/// Execute the export command.
///
/// # Errors
///
/// Returns an error if the archive does not exist or an artifact cannot be written.
pub fn execute(all: bool, overrides: &ConfigOverrides, json: bool) -> Result<()> {
    let config = ArchiveConfig::resolve(overrides)?;
    let mut storage = super::open_existing(&config)?;
    let scope = if all {
        ExportScope::All
    } else {
        ExportScope::DirtyOnly
    };

    let stats = run_export(&config, &mut storage, scope)?;
    report(&config, &stats, json)
}

/// Run an export pass with the configured directory and permalink base.
pub(crate) fn run_export(
    config: &ArchiveConfig,
    storage: &mut crate::storage::SqliteStorage,
    scope: ExportScope,
) -> Result<ExportStats> {
    let tracker = config.tracker();
    let stats = Exporter::new(storage, &tracker, config.export_dir.clone())
        .with_permalink_base(config.permalink_base.clone())
        .export(scope)?;
    Ok(stats)
}

/// Print export results.
pub(crate) fn report(config: &ArchiveConfig, stats: &ExportStats, json: bool) -> Result<()> {
    if json {
        let output = serde_json::json!({
            "success": true,
            "export_dir": config.export_dir.display().to_string(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if stats.is_empty() {
        println!("No partitions pending export.");
        println!("Use --all to rebuild every partition.");
    } else {
        println!("Export complete: {}", config.export_dir.display());
        println!();
        for partition in &stats.partitions {
            println!("  {}: {} records", partition.year_month, partition.records);
        }
        println!();
        println!(
            "  Total: {} records in {} partitions",
            stats.total_records(),
            stats.partitions.len()
        );
        if let Some(manifest) = &stats.manifest {
            println!("  Manifest: {} partitions", manifest.len());
        }
    }
    Ok(())
}
