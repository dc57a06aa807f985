// src/batch.rs

use std::path::{Path, PathBuf};

use chrono::Datelike;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{BatchError, FetchError};
use crate::price_source::PriceSource;
use crate::time_window::TimeWindow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthFailure {
    pub year: i32,
    pub month: u32,
    pub reason: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchReport {
    pub downloaded: Vec<PathBuf>,
    pub failed: Vec<MonthFailure>,
    pub cancelled: bool,
}

/// Downloads monthly CSV exports one after another over a bounded year range.
pub struct BatchDownloader<'a, S> {
    source: &'a S,
    windows: &'a TimeWindow,
}

impl<'a, S: PriceSource> BatchDownloader<'a, S> {
    pub fn new(source: &'a S, windows: &'a TimeWindow) -> Self {
        BatchDownloader { source, windows }
    }

    /// Every `(year, month)` from January of `start_year` up to December of
    /// `end_year`, or up to the current month when `end_year` is this year.
    pub fn months(&self, start_year: i32, end_year: i32) -> Result<Vec<(i32, u32)>, BatchError> {
        let today = self.windows.now_local().date_naive();
        let current = today.year();
        if start_year > end_year || end_year > current {
            return Err(BatchError::InvalidRange {
                start: start_year,
                end: end_year,
                current,
            });
        }

        let mut months = Vec::new();
        for year in start_year..=end_year {
            let last_month = if year == current { today.month() } else { 12 };
            months.extend((1..=last_month).map(|month| (year, month)));
        }
        Ok(months)
    }

    /// Fetches each month's file into `out_dir/{year}_{month}.csv`.
    ///
    /// A month that can't be fetched or saved is recorded and skipped;
    /// cancellation ends the run with whatever was downloaded so far. Only a
    /// bad range or an unusable `out_dir` fails the whole call.
    pub async fn download_range(
        &self,
        start_year: i32,
        end_year: i32,
        out_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, BatchError> {
        let months = self.months(start_year, end_year)?;
        tokio::fs::create_dir_all(out_dir).await?;

        let mut report = BatchReport::default();
        for (year, month) in months {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.source.fetch_batch_file(year, month, cancel).await {
                Ok(bytes) => {
                    let path = out_dir.join(format!("{year}_{month}.csv"));
                    match tokio::fs::write(&path, &bytes).await {
                        Ok(()) => {
                            info!(path = %path.display(), "saved batch file");
                            report.downloaded.push(path);
                        }
                        Err(e) => {
                            error!(path = %path.display(), "could not save batch file: {e}");
                            report.failed.push(MonthFailure {
                                year,
                                month,
                                reason: format!("writing {}: {e}", path.display()),
                            });
                        }
                    }
                }
                Err(FetchError::Cancelled) => {
                    warn!(year, month, "batch download cancelled");
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!(year, month, "batch download failed: {e}");
                    report.failed.push(MonthFailure {
                        year,
                        month,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            downloaded = report.downloaded.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "batch download finished"
        );
        Ok(report)
    }
}
