// src/lib.rs

pub mod batch;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod price_record;
pub mod price_source;
pub mod price_store;
pub mod session;
pub mod stats;
pub mod time_window;

pub use batch::{BatchDownloader, BatchReport};
pub use config::IngestConfig;
pub use error::{BatchError, ConfigError, FetchError, NormalizeError, StoreError, WindowError};
pub use pipeline::{Availability, IngestMode, IngestionPipeline, RunReport, RunStatus};
pub use price_record::{FailureReason, IngestOutcome, PriceRecord};
pub use price_source::{AwattarSource, PriceSource};
pub use price_store::{PriceStore, UpsertMode};
pub use session::{AwattarSession, BackoffPolicy};
pub use stats::DailyStats;
pub use time_window::{Clock, FetchWindow, FixedClock, SystemClock, TimeWindow};
