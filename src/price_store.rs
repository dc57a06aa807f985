// src/price_store.rs

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::price_record::{FailureReason, IngestOutcome, PriceRecord};
use crate::time_window::FetchWindow;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// What to do when a (date, hour) slot is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertMode {
    /// Leave the stored row alone.
    #[default]
    Skip,
    /// Overwrite price and unit of the stored row.
    Replace,
}

/// SQLite-backed price history, one row per (date, hour).
///
/// The handle owns a single connection; share it behind an `Arc`. Readers
/// that want to run alongside a writer can open their own handle on the
/// same file.
pub struct PriceStore {
    conn: Mutex<Connection>,
}

fn ensure_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS energy_prices (
             id    INTEGER PRIMARY KEY AUTOINCREMENT,
             date  TEXT    NOT NULL,
             hour  INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
             price REAL    NOT NULL,
             unit  TEXT    NOT NULL,
             UNIQUE (date, hour)
         );",
    )?;
    Ok(())
}

impl PriceStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        // Pragmas (best-effort).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;");
        ensure_table(&conn)?;
        info!(path = %path.display(), "opened price store");
        Ok(PriceStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        ensure_table(&conn)?;
        Ok(PriceStore {
            conn: Mutex::new(conn),
        })
    }

    /// Closes the underlying connection, surfacing any error SQLite reports.
    pub fn close(self) -> Result<(), StoreError> {
        let conn = self.conn.into_inner().map_err(|_| StoreError::Poisoned)?;
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Writes one record in its own transaction.
    pub fn upsert(&self, record: &PriceRecord, mode: UpsertMode) -> Result<IngestOutcome, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let outcome = write_record(&tx, record, mode)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Deletes every row whose date lies in `start..=end`.
    pub fn clear_range(&self, start: NaiveDate, end: NaiveDate) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM energy_prices WHERE date BETWEEN ?1 AND ?2",
            params![
                start.format(DATE_FORMAT).to_string(),
                end.format(DATE_FORMAT).to_string()
            ],
        )?;
        info!(%start, %end, deleted, "cleared date range");
        Ok(deleted)
    }

    /// Swaps the contents of `window` for `records` in a single transaction.
    ///
    /// Every slot inside the window is cleared first, then each record is
    /// written in replace mode. A record that fails to write is reported as
    /// `Failed` and the rest still go in.
    pub fn replace_window(
        &self,
        window: &FetchWindow,
        records: &[PriceRecord],
    ) -> Result<Vec<IngestOutcome>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let cleared = delete_window(&tx, window)?;
        let outcomes = records
            .iter()
            .map(|record| {
                write_record(&tx, record, UpsertMode::Replace).unwrap_or_else(|e| {
                    IngestOutcome::Failed(FailureReason::StoreWrite(e.to_string()))
                })
            })
            .collect();

        tx.commit()?;
        debug!(day = %window.day, cleared, "replaced window");
        Ok(outcomes)
    }

    /// Records of one UTC day, by hour ascending.
    pub fn query_by_date(&self, date: NaiveDate) -> Result<Vec<PriceRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT date, hour, price, unit FROM energy_prices WHERE date = ?1 ORDER BY hour",
        )?;
        let rows = stmt
            .query_map(params![date.format(DATE_FORMAT).to_string()], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_record).collect()
    }

    /// Records whose hour slot starts inside `window`, oldest first.
    ///
    /// Unlike [`PriceStore::query_by_date`] this follows the window's own
    /// calendar, so a market-local day outside UTC comes back whole.
    pub fn query_window(&self, window: &FetchWindow) -> Result<Vec<PriceRecord>, StoreError> {
        let Some((first, last, start_ms, end_ms)) = window_params(window) else {
            return Ok(Vec::new());
        };
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT date, hour, price, unit FROM energy_prices WHERE {SLOT_IN_WINDOW} ORDER BY date, hour"
        ))?;
        let rows = stmt
            .query_map(params![first, last, start_ms, end_ms], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_record).collect()
    }

    /// Every record, by (date, hour) ascending.
    pub fn query_all(&self) -> Result<Vec<PriceRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT date, hour, price, unit FROM energy_prices ORDER BY date, hour")?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_record).collect()
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM energy_prices", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

type RawRow = (String, i64, f64, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_record((date, hour, price, unit): RawRow) -> Result<PriceRecord, StoreError> {
    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|_| StoreError::BadDate(date.clone()))?;
    let hour = u8::try_from(hour)
        .ok()
        .filter(|h| *h < 24)
        .ok_or(StoreError::BadHour(hour))?;
    Ok(PriceRecord {
        date,
        hour,
        price,
        unit,
    })
}

fn write_record(
    conn: &Connection,
    record: &PriceRecord,
    mode: UpsertMode,
) -> Result<IngestOutcome, rusqlite::Error> {
    let date = record.date.format(DATE_FORMAT).to_string();

    let inserted = conn.execute(
        "INSERT INTO energy_prices (date, hour, price, unit)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (date, hour) DO NOTHING",
        params![date, record.hour, record.price, record.unit],
    )?;
    if inserted == 1 {
        return Ok(IngestOutcome::Inserted);
    }

    match mode {
        UpsertMode::Skip => Ok(IngestOutcome::SkippedDuplicate),
        UpsertMode::Replace => {
            conn.execute(
                "UPDATE energy_prices SET price = ?3, unit = ?4 WHERE date = ?1 AND hour = ?2",
                params![date, record.hour, record.price, record.unit],
            )?;
            Ok(IngestOutcome::Replaced)
        }
    }
}

// Slots are matched on their start instant; the date bounds keep the scan on
// the unique index.
const SLOT_IN_WINDOW: &str = "date BETWEEN ?1 AND ?2
    AND CAST(strftime('%s', date) AS INTEGER) * 1000 + hour * 3600000 BETWEEN ?3 AND ?4";

fn window_params(window: &FetchWindow) -> Option<(String, String, i64, i64)> {
    let (start, end) = (window.start()?, window.end()?);
    Some((
        start.date_naive().format(DATE_FORMAT).to_string(),
        end.date_naive().format(DATE_FORMAT).to_string(),
        window.start_ms,
        window.end_ms,
    ))
}

fn delete_window(conn: &Connection, window: &FetchWindow) -> Result<usize, StoreError> {
    let Some((first, last, start_ms, end_ms)) = window_params(window) else {
        return Ok(0);
    };
    let deleted = conn.execute(
        &format!("DELETE FROM energy_prices WHERE {SLOT_IN_WINDOW}"),
        params![first, last, start_ms, end_ms],
    )?;
    Ok(deleted)
}
