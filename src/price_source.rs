// src/price_source.rs

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::error::FetchError;
use crate::session::AwattarSession;
use crate::time_window::FetchWindow;

/// Where raw price entries come from.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Raw entries of the `data` array for `window`, untouched.
    async fn fetch_window(
        &self,
        window: &FetchWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, FetchError>;

    /// The monthly CSV export as raw bytes.
    async fn fetch_batch_file(
        &self,
        year: i32,
        month: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl<T: PriceSource + ?Sized> PriceSource for std::sync::Arc<T> {
    async fn fetch_window(
        &self,
        window: &FetchWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, FetchError> {
        (**self).fetch_window(window, cancel).await
    }

    async fn fetch_batch_file(
        &self,
        year: i32,
        month: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        (**self).fetch_batch_file(year, month, cancel).await
    }
}

/// The aWATTar market data API.
pub struct AwattarSource {
    session: AwattarSession,
    base_url: String,
}

impl AwattarSource {
    pub fn new(config: &IngestConfig) -> Result<Self, FetchError> {
        Ok(AwattarSource {
            session: AwattarSession::new(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn session(&self) -> &AwattarSession {
        &self.session
    }
}

#[async_trait]
impl PriceSource for AwattarSource {
    async fn fetch_window(
        &self,
        window: &FetchWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, FetchError> {
        let url = QueryBuilder::window(&self.base_url, window);
        debug!(url = %url, day = %window.day, "fetching price window");

        let body = self.session.send_request(&url, cancel).await?;
        let entries = ResponseProcessor::entries(&url, &body)?;

        info!(day = %window.day, entries = entries.len(), "fetched price window");
        Ok(entries)
    }

    async fn fetch_batch_file(
        &self,
        year: i32,
        month: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        let url = QueryBuilder::batch_file(&self.base_url, year, month);
        debug!(url = %url, "fetching batch file");

        let body = self.session.send_request(&url, cancel).await?;
        info!(year, month, bytes = body.len(), "downloaded batch file");

        self.session.record_batch_success(cancel).await;
        Ok(body)
    }
}

/// Builds request URLs against the API base.
pub struct QueryBuilder;

impl QueryBuilder {
    pub fn window(base_url: &str, window: &FetchWindow) -> String {
        format!(
            "{}/marketdata?start={}&end={}",
            base_url, window.start_ms, window.end_ms
        )
    }

    pub fn batch_file(base_url: &str, year: i32, month: u32) -> String {
        format!("{}/marketdata/csv/{}/{}/", base_url, year, month)
    }
}

#[derive(Deserialize)]
struct MarketDataResponse {
    data: Vec<Value>,
}

/// Decodes the JSON envelope, leaving each entry untyped so a single bad
/// entry can be rejected later without losing the rest.
struct ResponseProcessor;

impl ResponseProcessor {
    fn entries(url: &str, body: &[u8]) -> Result<Vec<Value>, FetchError> {
        let response: MarketDataResponse =
            serde_json::from_slice(body).map_err(|e| FetchError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(response.data)
    }
}
