//! REST open-interest poller.
//!
//! The upstream feed does not push open interest, so it is polled per
//! symbol. The polling interval is derived from the universe size against a
//! request budget and clamped to a configured range, then every sample is
//! funneled into the same normalizer channel as the socket streams.

use crate::feed::FeedMessage;
use crate::types::IngestConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;

/// Derives the per-symbol polling interval from the universe size.
///
/// `budget` requests per minute spread over `universe_size` symbols, then
/// clamped into `[min_interval, max_interval]`.
#[must_use]
pub fn compute_polling_interval(
    universe_size: usize,
    budget_per_min: u32,
    min_interval: Duration,
    max_interval: Duration,
) -> Duration {
    if universe_size == 0 || budget_per_min == 0 {
        return max_interval;
    }

    let polls_per_min_per_symbol = f64::from(budget_per_min) / universe_size as f64;
    let raw_secs = 60.0 / polls_per_min_per_symbol;
    let raw = Duration::from_secs_f64(raw_secs.max(0.0));

    raw.clamp(min_interval, max_interval)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenInterestResponse {
    open_interest: String,
    symbol: String,
}

/// Polls open interest for the configured symbols at a derived interval.
pub struct OiPoller {
    config: IngestConfig,
    client: reqwest::Client,
    tx: mpsc::Sender<FeedMessage>,
}

impl OiPoller {
    #[must_use]
    pub fn new(config: IngestConfig, tx: mpsc::Sender<FeedMessage>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            tx,
        }
    }

    /// Runs the poll loop until the feed channel closes.
    ///
    /// Per-symbol fetch failures are logged and skipped; the loop itself
    /// only ends with the pipeline.
    pub async fn run(self) -> Result<()> {
        let interval = compute_polling_interval(
            self.config.symbols.len(),
            self.config.oi_max_requests_per_min,
            self.config.oi_min_interval,
            self.config.oi_max_interval,
        );
        tracing::info!(
            symbols = self.config.symbols.len(),
            interval_secs = interval.as_secs(),
            "open-interest poller starting"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            for symbol in &self.config.symbols {
                match self.fetch_open_interest(symbol).await {
                    Ok(open_interest) => {
                        let message = FeedMessage::OpenInterest {
                            symbol: symbol.clone(),
                            open_interest,
                            timestamp: Utc::now(),
                        };
                        if self.tx.send(message).await.is_err() {
                            tracing::info!("feed channel closed, open-interest poller stopping");
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        tracing::warn!(symbol, error = %e, "open-interest fetch failed");
                    }
                }
            }
        }
    }

    async fn fetch_open_interest(&self, symbol: &str) -> Result<Decimal> {
        let url = format!("{}/fapi/v1/openInterest", self.config.api_url);
        let response: OpenInterestResponse = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("open-interest request failed")?
            .error_for_status()
            .context("open-interest request rejected")?
            .json()
            .await
            .context("open-interest response was not valid JSON")?;

        Decimal::from_str(&response.open_interest).with_context(|| {
            format!(
                "unparseable open interest for {}: {}",
                response.symbol, response.open_interest
            )
        })
    }
}
