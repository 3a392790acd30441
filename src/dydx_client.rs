use crate::candles::{CandlesResponse, RawCandle, Timeframe};
use crate::find_markets::MarketsResponse;
use crate::storage_utils::ApiConfig;
use anyhow::{Result, anyhow};
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

/// Public (unauthenticated) dYdX v3 REST endpoints.
pub struct DydxClient {
    http: Client,
    base_url: String,
    retry_delay: Duration,
    max_retries: Option<u32>,
    candle_limit: Option<u32>,
}

/// A failed attempt, plus how long the server asked us to back off.
struct Failure {
    error: anyhow::Error,
    retry_after: Option<Duration>,
}

impl From<anyhow::Error> for Failure {
    fn from(error: anyhow::Error) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

impl DydxClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_retries: config.max_retries,
            candle_limit: config.candle_limit,
        })
    }

    pub async fn get_markets(&self) -> Result<MarketsResponse> {
        let url = format!("{}/v3/markets", self.base_url);
        self.with_retry("get_markets", || self.get_json(&url, Vec::new()))
            .await
    }

    /// Candles for one market, newest first as the exchange returns them.
    pub async fn get_candles(&self, market: &str, timeframe: Timeframe) -> Result<Vec<RawCandle>> {
        let url = format!("{}/v3/candles/{}", self.base_url, market);
        let mut query = vec![("resolution", timeframe.as_str().to_string())];
        if let Some(limit) = self.candle_limit {
            query.push(("limit", limit.to_string()));
        }
        let resp: CandlesResponse = self
            .with_retry("get_candles", || self.get_json(&url, query.clone()))
            .await?;
        Ok(resp.candles)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: Vec<(&'static str, String)>,
    ) -> Result<T, Failure> {
        let response = self
            .http
            .get(url)
            .query(&query)
            .send()
            .await
            .map_err(|e| anyhow!("request to {} failed: {}", url, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(Failure {
                error: anyhow!("rate limited by {} (HTTP {})", url, status),
                retry_after,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP {} from {}: {}", status, url, body.trim()).into());
        }

        let data = response
            .json::<T>()
            .await
            .map_err(|e| anyhow!("undecodable response from {}: {}", url, e))?;
        Ok(data)
    }

    /// Repeats `op` until it succeeds, sleeping a fixed delay between attempts.
    /// Gives up only when `max_retries` is configured.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        let mut retries = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(failure) => {
                    tracing::warn!(
                        what,
                        at = %Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                        error = %failure.error,
                        "request failed"
                    );
                    if let Some(max) = self.max_retries {
                        if retries >= max {
                            return Err(failure
                                .error
                                .context(format!("{} failed after {} retries", what, retries)));
                        }
                    }
                    retries += 1;
                    let delay = failure.retry_after.unwrap_or(self.retry_delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
