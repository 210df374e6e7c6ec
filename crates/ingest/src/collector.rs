//! WebSocket collectors for the upstream feed.
//!
//! One collector task per symbol, each owning its own socket and reconnect
//! loop. Raw frames are parsed into [`FeedMessage`]s and handed to the
//! shared normalizer channel; nothing here interprets the values.

use crate::feed::FeedMessage;
use crate::types::{CollectorStats, IngestConfig};
use anyhow::Result;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use url::Url;

/// Builds the combined-stream URL for one symbol's trade and mark-price
/// streams.
#[must_use]
pub fn build_stream_url(ws_url: &str, symbol: &str) -> String {
    let symbol = symbol.to_lowercase();
    let base = ws_url.trim_end_matches('/').trim_end_matches("/ws");
    format!("{base}/stream?streams={symbol}@aggTrade/{symbol}@markPrice")
}

async fn connect_websocket(
    url: &str,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
> {
    let url = Url::parse(url)?;
    let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
    Ok(ws_stream)
}

/// Collects raw feed messages for a set of symbols.
pub struct MarketCollector {
    config: IngestConfig,
    tx: mpsc::Sender<FeedMessage>,
}

impl MarketCollector {
    #[must_use]
    pub const fn new(config: IngestConfig, tx: mpsc::Sender<FeedMessage>) -> Self {
        Self { config, tx }
    }

    /// Runs one collector task per configured symbol and waits for all of
    /// them.
    ///
    /// # Errors
    /// Individual stream failures reconnect internally; this only fails if
    /// a task panics.
    pub async fn run(self) -> Result<()> {
        let mut handles = Vec::new();

        for symbol in self.config.symbols.clone() {
            let tx = self.tx.clone();
            let config = self.config.clone();
            handles.push(tokio::spawn(async move {
                let mut collector = SymbolCollector::new(symbol, config, tx);
                collector.run().await
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("feed collector task failed: {}", e);
            }
        }

        Ok(())
    }
}

/// Single-symbol collect loop with reconnect handling.
struct SymbolCollector {
    symbol: String,
    config: IngestConfig,
    tx: mpsc::Sender<FeedMessage>,
    stats: CollectorStats,
}

impl SymbolCollector {
    fn new(symbol: String, config: IngestConfig, tx: mpsc::Sender<FeedMessage>) -> Self {
        Self {
            symbol,
            config,
            tx,
            stats: CollectorStats::default(),
        }
    }

    async fn run(&mut self) -> Result<()> {
        let mut reconnect_attempts = 0u32;

        loop {
            match self.collect_stream().await {
                Ok(()) => {
                    tracing::info!(symbol = %self.symbol, "feed collector exiting cleanly");
                    return Ok(());
                }
                Err(e) => {
                    self.stats.error_occurred();
                    tracing::error!(symbol = %self.symbol, error = %e, "feed stream error");

                    reconnect_attempts += 1;
                    if self.config.max_reconnect_attempts > 0
                        && reconnect_attempts >= self.config.max_reconnect_attempts
                    {
                        anyhow::bail!(
                            "max reconnect attempts reached for {}",
                            self.symbol
                        );
                    }

                    self.stats.reconnected();
                    tracing::info!(
                        symbol = %self.symbol,
                        attempt = reconnect_attempts,
                        "reconnecting feed stream"
                    );
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
            }
        }
    }

    async fn collect_stream(&mut self) -> Result<()> {
        let url = build_stream_url(&self.config.ws_url, &self.symbol);
        tracing::info!(symbol = %self.symbol, %url, "connecting to feed stream");

        let mut stream = connect_websocket(&url).await?;

        while let Some(message) = stream.next().await {
            let message = message?;
            if let tokio_tungstenite::tungstenite::Message::Text(text) = message {
                match FeedMessage::parse(&text) {
                    Ok(feed_message) => {
                        if self.tx.send(feed_message).await.is_err() {
                            tracing::info!(symbol = %self.symbol, "feed channel closed");
                            return Ok(());
                        }
                        self.stats.message_collected();
                    }
                    Err(e) => {
                        // Unknown stream types are expected on shared
                        // endpoints; skip, do not reconnect.
                        tracing::debug!(symbol = %self.symbol, error = %e, "skipping unknown frame");
                    }
                }
            }
        }

        anyhow::bail!("feed stream ended for {}", self.symbol)
    }
}
