//! Sync command implementation.
//!
//! Resolves the stop policy, runs one sync pass against the configured
//! endpoint, then exports: every partition after a full rebuild, otherwise
//! only the partitions the pass touched. A remote failure still exports
//! what was fetched before it and then fails the command.
//!
//! Partitions already pending export when the pass starts (from `import`
//! or an earlier `sync --no-export`) stay pending across the pass.

use std::collections::BTreeSet;
use std::io::{self, BufRead, IsTerminal, Write};

use tracing::{info, warn};

use super::export::{report as report_export, run_export};
use crate::cli::SyncArgs;
use crate::config::{ArchiveConfig, ConfigOverrides};
use crate::error::{Error, Result};
use crate::model::YearMonth;
use crate::storage::SqliteStorage;
use crate::sync::{
    select_policy, ExportScope, ExportStats, FavoritesSource, HttpSource, ModeChoice, StopPolicy,
    SyncEngine, SyncReport,
};

/// Everything one `favarc sync` did.
#[derive(Debug)]
struct SyncOutcome {
    report: SyncReport,
    /// `None` when export was skipped.
    export: Option<ExportStats>,
    /// Partitions left pending export afterwards.
    pending: BTreeSet<YearMonth>,
}

/// Execute the sync command.
///
/// # Errors
///
/// Returns an error if the archive cannot be opened or written, or if the
/// remote source failed during the pass.
pub fn execute(args: &SyncArgs, overrides: ConfigOverrides, json: bool) -> Result<()> {
    let config = ArchiveConfig::resolve(&args.apply(overrides))?;
    let mut storage = SqliteStorage::open(&config.db_path)?;
    let last_max_id = storage.max_record_id()?;

    let choice = match args.mode_choice() {
        Some(choice) => Some(choice),
        None if last_max_id > 0 && !json && io::stdin().is_terminal() => {
            prompt_mode(last_max_id)?
        }
        None => None,
    };

    let selection = select_policy(last_max_id, choice.as_ref());
    if let Some(warning) = &selection.warning {
        warn!("{warning}");
    }

    let mut source = HttpSource::new(config.endpoint.clone(), config.token.clone())?;
    let mut outcome = run_sync(
        &config,
        &mut storage,
        &mut source,
        &selection.policy,
        args.no_export,
    )?;

    print_report(&config, &outcome, selection.warning.as_deref(), json)?;

    match outcome.report.remote_failure.take() {
        Some(err) => Err(Error::Remote(err)),
        None => Ok(()),
    }
}

/// One pass plus its export.
///
/// The engine overwrites the Dirty-Partition Set with the partitions the
/// pass wrote, so whatever was pending before is merged back afterwards.
/// A full pass leaves the set alone; with `no_export` the partitions it
/// wrote are added so a later `favarc export` picks them up.
fn run_sync<S: FavoritesSource>(
    config: &ArchiveConfig,
    storage: &mut SqliteStorage,
    source: &mut S,
    policy: &StopPolicy,
    no_export: bool,
) -> Result<SyncOutcome> {
    let tracker = config.tracker();
    let carried = tracker.load()?;
    if !carried.is_empty() {
        info!(partitions = carried.len(), "partitions pending from an earlier run");
    }

    let result = SyncEngine::new(storage, source, &tracker, config.sync_options()).run(policy);
    tracker.extend(&carried)?;
    let report = result?;

    if no_export {
        if policy.is_full() {
            tracker.extend(&report.partitions)?;
        }
        return Ok(SyncOutcome {
            report,
            export: None,
            pending: tracker.load()?,
        });
    }

    let scope = if policy.is_full() {
        ExportScope::All
    } else {
        ExportScope::DirtyOnly
    };
    let export = run_export(config, storage, scope)?;
    Ok(SyncOutcome {
        report,
        export: Some(export),
        pending: tracker.load()?,
    })
}

/// Ask which stop policy to use.
fn prompt_mode(last_max_id: i64) -> Result<Option<ModeChoice>> {
    let mut stderr = io::stderr();
    writeln!(stderr, "Archive holds records up to id {last_max_id}. Sync mode:")?;
    writeln!(stderr, "  1) resume from a date (YYYYMMDD)")?;
    writeln!(stderr, "  2) resume after the newest archived record [default]")?;
    writeln!(stderr, "  3) full rebuild")?;
    write!(stderr, "> ")?;
    stderr.flush()?;

    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;

    let choice = match line.parse::<ModeChoice>() {
        Ok(choice) => choice,
        Err(e) => {
            warn!("{e}; resuming after the newest archived record");
            ModeChoice::ById
        }
    };

    if choice == ModeChoice::ByDate(String::new()) {
        write!(stderr, "Date (YYYYMMDD): ")?;
        stderr.flush()?;
        let mut date = String::new();
        stdin.lock().read_line(&mut date)?;
        return Ok(Some(ModeChoice::ByDate(date.trim().to_string())));
    }
    Ok(Some(choice))
}

fn print_report(
    config: &ArchiveConfig,
    outcome: &SyncOutcome,
    warning: Option<&str>,
    json: bool,
) -> Result<()> {
    let report = &outcome.report;
    if json {
        let mut output = serde_json::json!({
            "success": !report.failed(),
            "sync": report,
            "export": outcome.export,
            "pending": outcome.pending,
        });
        if let Some(warning) = warning {
            output["warning"] = serde_json::Value::String(warning.to_string());
        }
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!(
        "Sync ({}): {} new of {} processed across {} pages",
        report.policy, report.new_records, report.processed, report.pages
    );
    println!("  Stopped: {}", report.stop.label());
    if !report.partitions.is_empty() {
        let keys: Vec<String> = report
            .partitions
            .iter()
            .rev()
            .map(ToString::to_string)
            .collect();
        println!("  Partitions: {}", keys.join(", "));
    }

    if let Some(stats) = outcome.export.as_ref().filter(|s| !s.is_empty()) {
        println!();
        report_export(config, stats, false)?;
    }
    if !outcome.pending.is_empty() {
        println!(
            "Export skipped. {} partitions pending; run 'favarc export' to write them.",
            outcome.pending.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{render_partition, Exporter, Importer, ScriptedSource};
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;

    fn doc(id: i64, posted: &str) -> Value {
        json!({"plurk_id": id, "posted": posted, "content": format!("post {id}")})
    }

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    struct Fixture {
        dir: TempDir,
        config: ArchiveConfig,
        storage: SqliteStorage,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = ArchiveConfig::resolve(&ConfigOverrides {
            data_dir: Some(dir.path().to_path_buf()),
            page_delay_ms: Some(0),
            ..ConfigOverrides::default()
        })
        .unwrap();
        let storage = SqliteStorage::open(&config.db_path).unwrap();
        Fixture {
            dir,
            config,
            storage,
        }
    }

    impl Fixture {
        /// Import one legacy June 2023 artifact holding record 10.
        fn import_june(&mut self) {
            let legacy = self.dir.path().join("legacy");
            fs::create_dir_all(&legacy).unwrap();
            let content = render_partition(ym("2023_06"), &[doc(10, "2023-06-15T00:00:00")]);
            fs::write(legacy.join("2023_06.js"), content.unwrap()).unwrap();

            let tracker = self.config.tracker();
            Importer::new(&mut self.storage, &tracker)
                .import_dir(&legacy)
                .unwrap();
        }

        fn artifact(&self, key: &str) -> bool {
            self.config.export_dir.join(format!("{key}.js")).exists()
        }

        fn sync(
            &mut self,
            source: &mut ScriptedSource,
            policy: StopPolicy,
            no_export: bool,
        ) -> SyncOutcome {
            run_sync(&self.config, &mut self.storage, source, &policy, no_export).unwrap()
        }
    }

    #[test]
    fn test_imported_partition_exported_by_incremental_sync() {
        let mut fx = fixture();
        fx.import_june();

        let mut source = ScriptedSource::new()
            .page(vec![doc(60, "2024-05-01T00:00:00"), doc(10, "2023-06-15T00:00:00")]);
        let outcome = fx.sync(&mut source, StopPolicy::ById(10), false);

        assert_eq!(outcome.report.new_records, 1);
        let written: Vec<YearMonth> = outcome
            .export
            .unwrap()
            .partitions
            .iter()
            .map(|p| p.year_month)
            .collect();
        assert_eq!(written, vec![ym("2024_05"), ym("2023_06")]);
        assert!(fx.artifact("2023_06"));
        assert!(fx.artifact("2024_05"));
        assert!(outcome.pending.is_empty());
    }

    #[test]
    fn test_no_export_sync_keeps_earlier_pending_partitions() {
        let mut fx = fixture();
        fx.import_june();

        let mut source = ScriptedSource::new()
            .page(vec![doc(60, "2024-05-01T00:00:00"), doc(10, "2023-06-15T00:00:00")]);
        let outcome = fx.sync(&mut source, StopPolicy::ById(10), true);

        let expected: BTreeSet<YearMonth> = [ym("2023_06"), ym("2024_05")].into_iter().collect();
        assert_eq!(outcome.pending, expected);
        assert!(outcome.export.is_none());
        assert!(!fx.artifact("2024_05"));

        let tracker = fx.config.tracker();
        let stats = Exporter::new(&mut fx.storage, &tracker, fx.config.export_dir.clone())
            .export(ExportScope::DirtyOnly)
            .unwrap();
        assert_eq!(stats.partitions.len(), 2);
        assert!(fx.artifact("2023_06"));
        assert!(fx.artifact("2024_05"));
    }

    #[test]
    fn test_full_sync_without_export_leaves_partitions_pending() {
        let mut fx = fixture();
        let mut source = ScriptedSource::new().page(vec![doc(60, "2024-05-01T00:00:00")]);
        let outcome = fx.sync(&mut source, StopPolicy::Full, true);

        let expected: BTreeSet<YearMonth> = [ym("2024_05")].into_iter().collect();
        assert_eq!(outcome.pending, expected);

        let tracker = fx.config.tracker();
        let stats = Exporter::new(&mut fx.storage, &tracker, fx.config.export_dir.clone())
            .export(ExportScope::DirtyOnly)
            .unwrap();
        assert_eq!(stats.partitions.len(), 1);
        assert!(fx.artifact("2024_05"));
    }

    #[test]
    fn test_remote_failure_still_exports_pending_partitions() {
        let mut fx = fixture();
        fx.import_june();

        let mut source = ScriptedSource::new().failure("connection reset");
        let outcome = fx.sync(&mut source, StopPolicy::ById(10), false);

        assert!(outcome.report.failed());
        assert!(fx.artifact("2023_06"));
        assert!(outcome.pending.is_empty());
    }
}
