//! The sync engine.
//!
//! Pages backwards through the remote favorites timeline, writing every
//! record not yet archived, until the stop policy matches, the source runs
//! dry, or the source fails. The partitions that gained records become the
//! new Dirty-Partition Set so the exporter can regenerate only those.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use tracing::{debug, info, warn};

use crate::model::{canonical_timestamp, document_timestamp, Record, YearMonth};
use crate::storage::{SqliteStorage, SyncRun};
use crate::sync::dirty::PartitionTracker;
use crate::sync::mode::StopPolicy;
use crate::sync::source::{FavoritesSource, PageRequest, SourceError, MAX_PAGE_SIZE};
use crate::sync::types::{StopReason, SyncReport, SyncResult};

/// Tunables for one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Records requested per page, clamped to `1..=MAX_PAGE_SIZE`.
    pub page_size: u32,
    /// Politeness delay between page requests.
    pub page_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            page_delay: Duration::from_secs(1),
        }
    }
}

/// Drives one sync pass against a [`FavoritesSource`].
pub struct SyncEngine<'a, S: FavoritesSource> {
    storage: &'a mut SqliteStorage,
    source: &'a mut S,
    tracker: &'a PartitionTracker,
    options: SyncOptions,
}

/// What processing one page decided.
enum PageOutcome {
    /// Keep paging from this cursor.
    Continue(NaiveDateTime),
    /// Stop; the pass is over.
    Stop(StopReason),
}

/// Running totals for a pass.
#[derive(Default)]
struct Progress {
    pages: usize,
    processed: usize,
    new_records: usize,
    partitions: BTreeSet<YearMonth>,
}

impl<'a, S: FavoritesSource> SyncEngine<'a, S> {
    /// Create a new engine.
    pub fn new(
        storage: &'a mut SqliteStorage,
        source: &'a mut S,
        tracker: &'a PartitionTracker,
        options: SyncOptions,
    ) -> Self {
        Self {
            storage,
            source,
            tracker,
            options,
        }
    }

    /// Run one pass under `policy`.
    ///
    /// A remote failure does not make this return `Err`: it ends the pass
    /// with [`StopReason::Failed`] and the error in
    /// [`SyncReport::remote_failure`], after the dirty set has been saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the dirty-partition file cannot be
    /// written.
    pub fn run(&mut self, policy: &StopPolicy) -> SyncResult<SyncReport> {
        let mut run = SyncRun {
            id: uuid::Uuid::new_v4().to_string(),
            policy: policy.kind().to_string(),
            threshold: Some(policy.threshold_label()),
            started_at: Utc::now().timestamp_millis(),
            finished_at: None,
            pages: 0,
            processed: 0,
            new_records: 0,
            outcome: None,
        };
        self.storage.begin_sync_run(&run)?;
        info!(run_id = %run.id, policy = %policy, "sync started");

        let mut progress = Progress::default();
        let mut remote_failure = None;
        let loop_result = self.fetch_loop(policy, &mut progress);

        let (stop, store_error) = match loop_result {
            Ok(Ok(stop)) => (stop, None),
            Ok(Err(source_err)) => {
                warn!(error = %source_err, "remote fetch failed; ending sync");
                let stop = StopReason::Failed {
                    message: source_err.to_string(),
                };
                remote_failure = Some(source_err);
                (stop, None)
            }
            Err(store_err) => {
                let stop = StopReason::Failed {
                    message: store_err.to_string(),
                };
                (stop, Some(store_err))
            }
        };

        if !policy.is_full() {
            self.tracker.replace(&progress.partitions)?;
        }

        run.finished_at = Some(Utc::now().timestamp_millis());
        run.pages = progress.pages;
        run.processed = progress.processed;
        run.new_records = progress.new_records;
        run.outcome = Some(stop.label());
        self.storage.finish_sync_run(&run)?;

        if let Some(err) = store_error {
            return Err(err);
        }

        info!(
            run_id = %run.id,
            pages = progress.pages,
            processed = progress.processed,
            new_records = progress.new_records,
            partitions = progress.partitions.len(),
            outcome = %stop.label(),
            "sync finished"
        );

        Ok(SyncReport {
            run_id: run.id,
            policy: policy.kind(),
            pages: progress.pages,
            processed: progress.processed,
            new_records: progress.new_records,
            partitions: progress.partitions,
            stop,
            remote_failure,
        })
    }

    /// Page until a stop condition.
    ///
    /// The outer `Result` carries store failures, the inner one remote
    /// failures, so the caller can treat them differently.
    fn fetch_loop(
        &mut self,
        policy: &StopPolicy,
        progress: &mut Progress,
    ) -> SyncResult<Result<StopReason, SourceError>> {
        let mut cursor: Option<NaiveDateTime> = None;

        loop {
            let request = PageRequest::favorites(
                self.options.page_size,
                cursor.as_ref().map(canonical_timestamp),
            );
            debug!(page = progress.pages + 1, cursor = ?request.cursor, "fetching page");

            let page = match self.source.fetch_page(&request) {
                Ok(page) => page,
                Err(e) => return Ok(Err(e)),
            };

            if page.is_exhausted() {
                debug!("empty page; end of data");
                return Ok(Ok(StopReason::Exhausted));
            }
            let documents = page.records.unwrap_or_default();
            progress.pages += 1;

            match self.process_page(policy, documents, progress)? {
                PageOutcome::Stop(reason) => return Ok(Ok(reason)),
                PageOutcome::Continue(next) => {
                    if cursor.is_some_and(|prev| next >= prev) {
                        warn!(
                            cursor = %canonical_timestamp(&next),
                            "cursor did not advance; ending sync"
                        );
                        return Ok(Ok(StopReason::Stalled {
                            cursor: canonical_timestamp(&next),
                        }));
                    }
                    cursor = Some(next);
                }
            }

            if !self.options.page_delay.is_zero() {
                std::thread::sleep(self.options.page_delay);
            }
        }
    }

    /// Apply the stop policy to one page and store what precedes the boundary.
    ///
    /// The next cursor is the last parseable timestamp on the page, taken
    /// before dedup or validation, so skipped records still advance it.
    fn process_page(
        &mut self,
        policy: &StopPolicy,
        documents: Vec<serde_json::Value>,
        progress: &mut Progress,
    ) -> SyncResult<PageOutcome> {
        let mut accepted = Vec::with_capacity(documents.len());
        let mut boundary = None;
        let mut last_seen = None;

        for document in documents {
            last_seen = document_timestamp(&document).or(last_seen);
            let record = match Record::from_remote(document) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "skipping malformed record");
                    continue;
                }
            };
            if policy.should_stop(&record) {
                debug!(id = record.id, "stop policy matched");
                boundary = Some(record.id);
                break;
            }
            accepted.push(record);
        }

        let inserted = self.storage.insert_records(&accepted)?;
        for (record, is_new) in accepted.iter().zip(&inserted) {
            progress.processed += 1;
            if *is_new {
                progress.new_records += 1;
                progress.partitions.insert(record.year_month());
            }
        }
        debug!(
            page = progress.pages,
            accepted = accepted.len(),
            new_records = inserted.iter().filter(|n| **n).count(),
            "page stored"
        );

        if let Some(id) = boundary {
            return Ok(PageOutcome::Stop(StopReason::Boundary { id }));
        }

        match last_seen {
            Some(next) => Ok(PageOutcome::Continue(next)),
            None => Ok(PageOutcome::Stop(StopReason::Stalled {
                cursor: "no timestamps in page".to_string(),
            })),
        }
    }
}
