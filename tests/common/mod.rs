// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use awattar_ingest::config::{CooldownSettings, IngestConfig, RetrySettings};
use awattar_ingest::error::AttemptFailure;
use awattar_ingest::{Clock, FetchError, FetchWindow, FixedClock, PriceSource, TimeWindow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

pub const HOUR_MS: i64 = 3_600_000;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, min, 0).unwrap()
}

pub fn windows_at(tz: Tz, at: NaiveDateTime) -> TimeWindow {
    TimeWindow::new(tz, Arc::new(FixedClock::at_local(tz, at).unwrap()))
}

/// Clock that moves to the next reading on every read and stays on the last.
pub struct SteppingClock {
    readings: Vec<DateTime<Utc>>,
    reads: AtomicUsize,
}

impl SteppingClock {
    pub fn new(tz: Tz, locals: &[NaiveDateTime]) -> Self {
        SteppingClock {
            readings: locals
                .iter()
                .map(|at| FixedClock::at_local(tz, *at).unwrap().0)
                .collect(),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let i = self.reads.fetch_add(1, Ordering::SeqCst);
        self.readings[i.min(self.readings.len() - 1)]
    }
}

/// Config pointing at `base_url` with millisecond-scale delays.
pub fn fast_config(base_url: &str) -> IngestConfig {
    IngestConfig {
        base_url: base_url.to_string(),
        market_tz: chrono_tz::UTC,
        retry: RetrySettings {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        },
        cooldown: CooldownSettings {
            every: 8,
            duration: Duration::from_millis(10),
        },
        request_timeout: Duration::from_secs(5),
        ..IngestConfig::default()
    }
}

/// 24 hourly entries for the UTC day `day`, each starting `skew_ms` into its hour.
pub fn day_entries(day: NaiveDate, base_price: f64, skew_ms: i64) -> Vec<Value> {
    let midnight = day.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis();
    (0..24)
        .map(|hour| {
            let start = midnight + hour * HOUR_MS;
            json!({
                "start_timestamp": start + skew_ms,
                "end_timestamp": start + HOUR_MS,
                "marketprice": base_price + hour as f64,
                "unit": "Eur/MWh"
            })
        })
        .collect()
}

/// One hourly entry per slot of `window`, priced `base_price + n` for the n-th slot.
pub fn window_entries(window: &FetchWindow, base_price: f64) -> Vec<Value> {
    (window.start_ms..=window.end_ms)
        .step_by(HOUR_MS as usize)
        .enumerate()
        .map(|(n, start)| {
            json!({
                "start_timestamp": start,
                "end_timestamp": start + HOUR_MS,
                "marketprice": base_price + n as f64,
                "unit": "Eur/MWh"
            })
        })
        .collect()
}

/// In-memory source that hands out a fixed batch and counts calls.
pub struct FakeSource {
    entries: Mutex<Vec<Value>>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(entries: Vec<Value>) -> Self {
        FakeSource {
            entries: Mutex::new(entries),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        FakeSource {
            fail: true,
            ..FakeSource::new(Vec::new())
        }
    }

    pub fn set_entries(&self, entries: Vec<Value>) {
        *self.entries.lock().unwrap() = entries;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for FakeSource {
    async fn fetch_window(
        &self,
        window: &FetchWindow,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Value>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::Exhausted {
                url: format!("fake://marketdata?start={}", window.start_ms),
                attempts: 5,
                last: AttemptFailure::RateLimited,
            });
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn fetch_batch_file(
        &self,
        year: i32,
        month: u32,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{year};{month}\n").into_bytes())
    }
}
