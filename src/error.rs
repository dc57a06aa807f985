// src/error.rs

use std::fmt;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("invalid month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
    #[error("day offset {0} leaves the supported calendar range")]
    OutOfRange(i64),
    #[error("local midnight of {0} does not exist in the market timezone")]
    NonexistentMidnight(chrono::NaiveDate),
}

/// What went wrong on a single request attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    RateLimited,
    Status(StatusCode),
    Transport(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited (HTTP 429)"),
            Self::Status(status) => write!(f, "HTTP {status}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// A single failed attempt; retried internally and only surfaced when
    /// the retry budget is zero.
    #[error("transient failure for {url}: {failure}")]
    Transient { url: String, failure: AttemptFailure },
    #[error("giving up on {url} after {attempts} attempts, last: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: AttemptFailure,
    },
    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("fetch cancelled")]
    Cancelled,
    #[error("http client setup failed: {0}")]
    ClientSetup(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("malformed entry: {0}")]
    Malformed(String),
    #[error("timestamp {0} is outside the representable range")]
    TimestampOutOfRange(i64),
    #[error("price {0} is not a finite number")]
    NonFinitePrice(String),
    #[error("unit label is empty")]
    EmptyUnit,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored date {0:?} is not an ISO date")]
    BadDate(String),
    #[error("stored hour {0} is outside 0..=23")]
    BadHour(i64),
    #[error("store connection lock poisoned")]
    Poisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("invalid year range {start}..={end} (current year {current})")]
    InvalidRange { start: i32, end: i32, current: i32 },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
