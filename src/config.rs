// src/config.rs

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::ConfigError;

pub const AWATTAR_BASE_URL: &str = "https://api.awattar.at/v1";
pub const DEFAULT_DB_PATH: &str = "energy_prices.db";
pub const DEFAULT_MARKET_TZ: Tz = chrono_tz::Europe::Vienna;

pub const RETRY_MAX_ATTEMPTS: u32 = 5;
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(5);
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);

pub const BATCH_COOLDOWN_EVERY: u32 = 8;
pub const BATCH_COOLDOWN: Duration = Duration::from_secs(6);

/// Local hour from which next-day prices are published.
pub const TOMORROW_AVAILABLE_HOUR: u32 = 14;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry schedule for upstream requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_delay: RETRY_BASE_DELAY,
            max_delay: RETRY_MAX_DELAY,
        }
    }
}

/// Proactive throttle applied to batch CSV downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownSettings {
    pub every: u32,
    pub duration: Duration,
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            every: BATCH_COOLDOWN_EVERY,
            duration: BATCH_COOLDOWN,
        }
    }
}

/// Everything an ingestion run can be tuned with.
///
/// Every field has a default; [`IngestConfig::from_env`] overrides the ones
/// whose `AWATTAR_*` variable is set.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub base_url: String,
    pub db_path: PathBuf,
    pub market_tz: Tz,
    pub retry: RetrySettings,
    pub cooldown: CooldownSettings,
    pub tomorrow_available_hour: u32,
    pub request_timeout: Duration,
    /// When set, every fetched payload is also saved here as
    /// `awattar_prices_{date}.json`.
    pub archive_dir: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_url: AWATTAR_BASE_URL.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            market_tz: DEFAULT_MARKET_TZ,
            retry: RetrySettings::default(),
            cooldown: CooldownSettings::default(),
            tomorrow_available_hour: TOMORROW_AVAILABLE_HOUR,
            request_timeout: REQUEST_TIMEOUT,
            archive_dir: None,
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, so tests don't have to
    /// touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("AWATTAR_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(path) = lookup("AWATTAR_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("AWATTAR_ARCHIVE_DIR").filter(|d| !d.trim().is_empty()) {
            config.archive_dir = Some(PathBuf::from(dir));
        }
        if let Some(tz) = lookup("AWATTAR_MARKET_TZ") {
            config.market_tz = Tz::from_str(tz.trim()).map_err(|_| ConfigError::Invalid {
                key: "AWATTAR_MARKET_TZ",
                value: tz.clone(),
            })?;
        }

        if let Some(n) = parse::<u32, _>(&lookup, "AWATTAR_RETRY_MAX_ATTEMPTS")? {
            if n == 0 {
                return Err(ConfigError::Invalid {
                    key: "AWATTAR_RETRY_MAX_ATTEMPTS",
                    value: n.to_string(),
                });
            }
            config.retry.max_attempts = n;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "AWATTAR_RETRY_BASE_DELAY_SECS")? {
            config.retry.base_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "AWATTAR_RETRY_MAX_DELAY_SECS")? {
            config.retry.max_delay = Duration::from_secs(secs);
        }
        if let Some(n) = parse::<u32, _>(&lookup, "AWATTAR_BATCH_COOLDOWN_EVERY")? {
            config.cooldown.every = n;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "AWATTAR_BATCH_COOLDOWN_SECS")? {
            config.cooldown.duration = Duration::from_secs(secs);
        }
        if let Some(hour) = parse::<u32, _>(&lookup, "AWATTAR_TOMORROW_AVAILABLE_HOUR")? {
            if hour > 23 {
                return Err(ConfigError::Invalid {
                    key: "AWATTAR_TOMORROW_AVAILABLE_HOUR",
                    value: hour.to_string(),
                });
            }
            config.tomorrow_available_hour = hour;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "AWATTAR_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
