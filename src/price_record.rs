// src/price_record.rs

use chrono::{DateTime, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NormalizeError;

/// One hourly price, keyed by its UTC (date, hour).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub hour: u8,
    pub price: f64,
    pub unit: String,
}

/// Shape of one element of the upstream `data` array.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPriceEntry {
    pub start_timestamp: i64,
    pub marketprice: f64,
    pub unit: String,
}

impl PriceRecord {
    pub fn new(date: NaiveDate, hour: u8, price: f64, unit: impl Into<String>) -> Self {
        PriceRecord {
            date,
            hour,
            price,
            unit: unit.into(),
        }
    }

    /// Turns one untyped upstream entry into a record.
    ///
    /// The hour bucket is the UTC hour of `start_timestamp`, truncated; the
    /// local timezone never enters this conversion.
    pub fn from_raw(entry: &Value) -> Result<Self, NormalizeError> {
        let raw: RawPriceEntry = serde_json::from_value(entry.clone())
            .map_err(|e| NormalizeError::Malformed(e.to_string()))?;

        if !raw.marketprice.is_finite() {
            return Err(NormalizeError::NonFinitePrice(raw.marketprice.to_string()));
        }
        if raw.unit.trim().is_empty() {
            return Err(NormalizeError::EmptyUnit);
        }

        let start = DateTime::from_timestamp_millis(raw.start_timestamp)
            .ok_or(NormalizeError::TimestampOutOfRange(raw.start_timestamp))?;

        Ok(PriceRecord {
            date: start.date_naive(),
            hour: start.hour() as u8,
            price: raw.marketprice,
            unit: raw.unit,
        })
    }

    /// Epoch milliseconds of the start of this record's hour slot.
    pub fn slot_start_ms(&self) -> Option<i64> {
        self.date
            .and_hms_opt(u32::from(self.hour), 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
    }
}

/// Result of writing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    SkippedDuplicate,
    /// Only produced in replace mode, when an existing row was overwritten.
    Replaced,
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    MalformedRecord(String),
    StoreWrite(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::MalformedRecord(msg) => write!(f, "malformed record: {msg}"),
            FailureReason::StoreWrite(msg) => write!(f, "store write failed: {msg}"),
        }
    }
}
