// src/pipeline.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, Timelike};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::error::FetchError;
use crate::price_record::{FailureReason, IngestOutcome, PriceRecord};
use crate::price_source::PriceSource;
use crate::price_store::{PriceStore, UpsertMode};
use crate::time_window::{FetchWindow, TimeWindow};

/// How a run treats prices already in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Keep stored rows; re-running is a no-op.
    #[default]
    Skip,
    /// Clear the window and store exactly what was just fetched.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Ready,
    NotYetAvailable { available_from_hour: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Done,
    PartiallyFailed,
    Failed(String),
    NotYetAvailable,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// Position of the entry in the upstream batch.
    pub index: usize,
    pub reason: FailureReason,
}

/// Summary of one ingestion run. Always produced, whatever happened.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub window: Option<FetchWindow>,
    pub status: RunStatus,
    pub inserted: usize,
    pub skipped: usize,
    pub replaced: usize,
    pub failed: usize,
    pub failures: Vec<RecordFailure>,
    /// Where the raw payload was saved, if archiving is on and it worked.
    pub archived: Option<PathBuf>,
}

impl RunReport {
    fn new(window: Option<FetchWindow>) -> Self {
        RunReport {
            window,
            status: RunStatus::Done,
            inserted: 0,
            skipped: 0,
            replaced: 0,
            failed: 0,
            failures: Vec::new(),
            archived: None,
        }
    }

    fn with_status(window: Option<FetchWindow>, status: RunStatus) -> Self {
        RunReport {
            status,
            ..RunReport::new(window)
        }
    }

    /// The market-local calendar day the run was resolved for.
    ///
    /// Stored rows are keyed by UTC date, so outside UTC the day's slots span
    /// two stored dates; read them back with `PriceStore::query_window`.
    pub fn local_date(&self) -> Option<NaiveDate> {
        self.window.map(|w| w.day)
    }

    pub fn stored(&self) -> usize {
        self.inserted + self.replaced
    }

    fn record(&mut self, index: usize, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Inserted => self.inserted += 1,
            IngestOutcome::SkippedDuplicate => self.skipped += 1,
            IngestOutcome::Replaced => self.replaced += 1,
            IngestOutcome::Failed(reason) => {
                self.failed += 1;
                self.failures.push(RecordFailure { index, reason });
            }
        }
    }

    fn settle(&mut self) {
        if self.status == RunStatus::Done && self.failed > 0 {
            self.status = RunStatus::PartiallyFailed;
        }
    }
}

/// Fetch → normalize → store, one window at a time.
pub struct IngestionPipeline<S> {
    source: S,
    store: Arc<PriceStore>,
    windows: TimeWindow,
    tomorrow_available_hour: u32,
    archive_dir: Option<PathBuf>,
}

impl<S: PriceSource> IngestionPipeline<S> {
    pub fn new(source: S, store: Arc<PriceStore>, windows: TimeWindow, config: &IngestConfig) -> Self {
        IngestionPipeline {
            source,
            store,
            windows,
            tomorrow_available_hour: config.tomorrow_available_hour,
            archive_dir: config.archive_dir.clone(),
        }
    }

    pub fn store(&self) -> &Arc<PriceStore> {
        &self.store
    }

    pub fn windows(&self) -> &TimeWindow {
        &self.windows
    }

    /// Whether prices for the day at `offset` can exist upstream yet.
    ///
    /// Past days and today are always ready. Tomorrow becomes ready at the
    /// configured local hour; anything further out never is.
    pub fn check_available(&self, offset: i64) -> Availability {
        self.availability_at(self.windows.local_hour(), offset)
    }

    fn availability_at(&self, local_hour: u32, offset: i64) -> Availability {
        let ready = match offset {
            o if o <= 0 => true,
            1 => local_hour >= self.tomorrow_available_hour,
            _ => false,
        };
        if ready {
            Availability::Ready
        } else {
            Availability::NotYetAvailable {
                available_from_hour: self.tomorrow_available_hour,
            }
        }
    }

    /// Resolves the day at `offset` and ingests it. The clock is read once;
    /// the window and the availability guard both derive from that reading.
    pub async fn ingest_day(&self, offset: i64, mode: IngestMode, cancel: &CancellationToken) -> RunReport {
        let now = self.windows.now_local();
        let window = match self.windows.day_from(now.date_naive(), offset) {
            Ok(window) => window,
            Err(e) => {
                error!(offset, "cannot resolve window: {e}");
                return RunReport::with_status(None, RunStatus::Failed(e.to_string()));
            }
        };

        if let Availability::NotYetAvailable { available_from_hour } = self.availability_at(now.hour(), offset) {
            info!(day = %window.day, available_from_hour, "prices not published yet, skipping fetch");
            return RunReport::with_status(Some(window), RunStatus::NotYetAvailable);
        }

        self.ingest_window(&window, mode, cancel).await
    }

    pub async fn ingest_window(
        &self,
        window: &FetchWindow,
        mode: IngestMode,
        cancel: &CancellationToken,
    ) -> RunReport {
        let mut report = RunReport::new(Some(*window));

        let entries = match self.source.fetch_window(window, cancel).await {
            Ok(entries) => entries,
            Err(FetchError::Cancelled) => {
                warn!(day = %window.day, "run cancelled while fetching");
                report.status = RunStatus::Cancelled;
                return report;
            }
            Err(e) => {
                error!(day = %window.day, "fetch failed: {e}");
                report.status = RunStatus::Failed(e.to_string());
                return report;
            }
        };
        if entries.is_empty() {
            warn!(day = %window.day, "upstream returned no entries");
        }
        if let Some(dir) = &self.archive_dir {
            report.archived = archive_payload(dir, window, &entries).await;
        }

        let records = Normalizer::normalize(&entries, &mut report);

        match mode {
            IngestMode::Skip => self.store_each(&records, &mut report, cancel),
            IngestMode::Replace => self.store_replacing(window, &records, &mut report, cancel),
        }

        report.settle();
        info!(
            day = %window.day,
            status = ?report.status,
            inserted = report.inserted,
            skipped = report.skipped,
            replaced = report.replaced,
            failed = report.failed,
            "ingestion run finished"
        );
        report
    }

    fn store_each(&self, records: &[(usize, PriceRecord)], report: &mut RunReport, cancel: &CancellationToken) {
        for (index, record) in records {
            if cancel.is_cancelled() {
                warn!(stored = report.stored(), "run cancelled before next write");
                report.status = RunStatus::Cancelled;
                return;
            }
            let outcome = self
                .store
                .upsert(record, UpsertMode::Skip)
                .unwrap_or_else(|e| IngestOutcome::Failed(FailureReason::StoreWrite(e.to_string())));
            debug!(date = %record.date, hour = record.hour, ?outcome, "stored record");
            report.record(*index, outcome);
        }
    }

    fn store_replacing(
        &self,
        window: &FetchWindow,
        records: &[(usize, PriceRecord)],
        report: &mut RunReport,
        cancel: &CancellationToken,
    ) {
        if cancel.is_cancelled() {
            warn!("run cancelled before replacing window");
            report.status = RunStatus::Cancelled;
            return;
        }

        let batch: Vec<PriceRecord> = records.iter().map(|(_, record)| record.clone()).collect();
        match self.store.replace_window(window, &batch) {
            Ok(outcomes) => {
                for ((index, _), outcome) in records.iter().zip(outcomes) {
                    report.record(*index, outcome);
                }
            }
            Err(e) => {
                error!(day = %window.day, "replacing window failed: {e}");
                for (index, _) in records {
                    report.record(*index, IngestOutcome::Failed(FailureReason::StoreWrite(e.to_string())));
                }
            }
        }
    }
}

/// Saves the fetched entries as `{dir}/awattar_prices_{day}.json`. A failed
/// write is logged and does not affect the run.
async fn archive_payload(dir: &Path, window: &FetchWindow, entries: &[Value]) -> Option<PathBuf> {
    let path = dir.join(format!("awattar_prices_{}.json", window.day.format("%Y-%m-%d")));
    let payload = match serde_json::to_vec_pretty(&json!({ "data": entries })) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(day = %window.day, "could not encode payload for archive: {e}");
            return None;
        }
    };

    let written = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, payload).await
    };
    match written.await {
        Ok(()) => {
            debug!(path = %path.display(), "archived raw payload");
            Some(path)
        }
        Err(e) => {
            warn!(path = %path.display(), "could not archive raw payload: {e}");
            None
        }
    }
}

/// Turns upstream entries into records, noting the ones that don't parse.
struct Normalizer;

impl Normalizer {
    fn normalize(entries: &[Value], report: &mut RunReport) -> Vec<(usize, PriceRecord)> {
        let mut records = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            match PriceRecord::from_raw(entry) {
                Ok(record) => records.push((index, record)),
                Err(e) => {
                    warn!(index, "skipping entry: {e}");
                    report.record(index, IngestOutcome::Failed(FailureReason::MalformedRecord(e.to_string())));
                }
            }
        }
        records
    }
}
