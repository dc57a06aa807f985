// src/time_window.rs

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::WindowError;

/// Source of "now". Injected everywhere wall-clock time matters.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Pins the clock to a wall-clock reading in `tz`.
    pub fn at_local(tz: Tz, local: NaiveDateTime) -> Option<Self> {
        tz.from_local_datetime(&local)
            .earliest()
            .map(|dt| FixedClock(dt.with_timezone(&Utc)))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Closed interval `[start_ms, end_ms]` of UTC epoch milliseconds.
///
/// `day` is the market-local calendar day the window was resolved for, or
/// the first day of the month for month windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchWindow {
    pub day: NaiveDate,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl FetchWindow {
    pub fn start(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start_ms)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.end_ms)
    }

    pub fn contains_ms(&self, ms: i64) -> bool {
        ms >= self.start_ms && ms <= self.end_ms
    }
}

/// Resolves day and month windows in the market timezone.
#[derive(Clone)]
pub struct TimeWindow {
    tz: Tz,
    clock: Arc<dyn Clock>,
}

impl TimeWindow {
    pub fn new(tz: Tz, clock: Arc<dyn Clock>) -> Self {
        TimeWindow { tz, clock }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// The reference instant, read once, as market wall-clock time.
    pub fn now_local(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.tz)
    }

    pub fn local_hour(&self) -> u32 {
        self.now_local().hour()
    }

    /// Window for the local day `offset` days away from today
    /// (-1 yesterday, 0 today, +1 tomorrow).
    pub fn day(&self, offset: i64) -> Result<FetchWindow, WindowError> {
        self.day_from(self.now_local().date_naive(), offset)
    }

    /// Same as [`TimeWindow::day`], against a `today` the caller already read.
    pub fn day_from(&self, today: NaiveDate, offset: i64) -> Result<FetchWindow, WindowError> {
        let date = TimeDelta::try_days(offset)
            .and_then(|delta| today.checked_add_signed(delta))
            .ok_or(WindowError::OutOfRange(offset))?;
        self.for_date(date)
    }

    /// Window covering the local calendar day `date`, 00:00:00.000 to 23:59:59.999.
    pub fn for_date(&self, date: NaiveDate) -> Result<FetchWindow, WindowError> {
        let next = date.succ_opt().ok_or(WindowError::OutOfRange(1))?;
        self.span(date, next)
    }

    /// Window covering a full calendar month.
    pub fn month(&self, year: i32, month: u32) -> Result<FetchWindow, WindowError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or(WindowError::InvalidMonth { year, month })?;
        let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        let next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .ok_or(WindowError::InvalidMonth { year, month })?;
        self.span(first, next)
    }

    fn span(&self, first: NaiveDate, next: NaiveDate) -> Result<FetchWindow, WindowError> {
        let start = self.local_midnight(first)?;
        let end = self.local_midnight(next)?;
        Ok(FetchWindow {
            day: first,
            start_ms: start.timestamp_millis(),
            end_ms: end.timestamp_millis() - 1,
        })
    }

    // A midnight swallowed by a DST gap starts the day at the first valid instant.
    fn local_midnight(&self, date: NaiveDate) -> Result<DateTime<Tz>, WindowError> {
        let midnight = date.and_time(NaiveTime::MIN);
        self.tz
            .from_local_datetime(&midnight)
            .earliest()
            .or_else(|| {
                let shifted = midnight.checked_add_signed(TimeDelta::hours(1))?;
                self.tz.from_local_datetime(&shifted).earliest()
            })
            .ok_or(WindowError::NonexistentMidnight(date))
    }
}
