// src/session.rs

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CooldownSettings, IngestConfig, RetrySettings};
use crate::error::{AttemptFailure, FetchError};

/// HTTP session against the price API: one client, one retry schedule, and
/// the proactive cooldown counter for batch downloads.
pub struct AwattarSession {
    client: Client,
    backoff: BackoffPolicy,
    throttle: Mutex<BatchThrottle>,
}

impl AwattarSession {
    pub fn new(config: &IngestConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::ClientSetup(e.to_string()))?;

        Ok(AwattarSession {
            client,
            backoff: BackoffPolicy::from_settings(config.retry),
            throttle: Mutex::new(BatchThrottle::new(config.cooldown)),
        })
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// GETs `url` until it answers 2xx or the attempt budget runs out.
    ///
    /// Rate limiting, other non-2xx statuses and transport errors are all
    /// retried on the same schedule. Both the request and the backoff sleep
    /// give way to `cancel`.
    pub async fn send_request(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, FetchError> {
        let max_attempts = self.backoff.max_attempts();
        let mut last = AttemptFailure::Transport("no attempt made".to_string());

        for attempt in 1..=max_attempts {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = self.attempt(url) => result,
            };

            let failure = match result {
                Ok(body) => {
                    debug!(url, attempt, bytes = body.len(), "request succeeded");
                    return Ok(body);
                }
                Err(FetchError::Transient { failure, .. }) => failure,
                Err(other) => return Err(other),
            };

            if attempt < max_attempts {
                let delay = self.backoff.delay_for(attempt);
                warn!(
                    url,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "request failed: {failure}, backing off"
                );
                cancellable_sleep(delay, cancel).await?;
            } else {
                warn!(url, attempt, max_attempts, "request failed: {failure}, retry budget spent");
            }
            last = failure;
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: max_attempts,
            last,
        })
    }

    /// Counts one successful batch download and, every N of them, sits out
    /// the cooldown before returning. Cancellation cuts the pause short; the
    /// caller's next request sees the token.
    pub async fn record_batch_success(&self, cancel: &CancellationToken) {
        let pause = self.throttle.lock().await.record_success();
        if let Some((count, pause)) = pause {
            info!(downloads = count, pause_ms = pause.as_millis() as u64, "batch cooldown");
            if cancellable_sleep(pause, cancel).await.is_err() {
                debug!(downloads = count, "batch cooldown cut short");
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transient = |failure| FetchError::Transient {
            url: url.to_string(),
            failure,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transient(AttemptFailure::Transport(e.to_string())))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(transient(AttemptFailure::RateLimited));
        }
        if !status.is_success() {
            return Err(transient(AttemptFailure::Status(status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transient(AttemptFailure::Transport(e.to_string())))?;
        Ok(body.to_vec())
    }
}

async fn cancellable_sleep(delay: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        _ = sleep(delay) => Ok(()),
    }
}

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    pub fn from_settings(settings: RetrySettings) -> Self {
        BackoffPolicy {
            base_delay: settings.base_delay,
            max_delay: settings.max_delay,
            max_attempts: settings.max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay that follows failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// The delay attached to each attempt in the budget, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts).map(|attempt| self.delay_for(attempt)).collect()
    }
}

struct BatchThrottle {
    successes: u32,
    every: u32,
    cooldown: Duration,
}

impl BatchThrottle {
    fn new(settings: CooldownSettings) -> Self {
        BatchThrottle {
            successes: 0,
            every: settings.every,
            cooldown: settings.duration,
        }
    }

    /// Returns the running count and the pause to take, if this success
    /// completes a block.
    fn record_success(&mut self) -> Option<(u32, Duration)> {
        self.successes += 1;
        if self.every > 0 && self.successes % self.every == 0 {
            Some((self.successes, self.cooldown))
        } else {
            None
        }
    }
}
