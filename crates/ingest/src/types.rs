//! Shared ingest configuration and collector statistics.

use std::time::Duration;
use volspike_core::FeedConfig;

/// Configuration for the upstream feed collectors.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// WebSocket base URL of the upstream feed.
    pub ws_url: String,
    /// REST base URL of the upstream feed.
    pub api_url: String,
    /// Symbols to subscribe to (upper-case tickers).
    pub symbols: Vec<String>,
    /// Delay before reconnection attempts.
    pub reconnect_delay: Duration,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Open-interest request budget per minute across all symbols.
    pub oi_max_requests_per_min: u32,
    /// Lower clamp for the derived open-interest polling interval.
    pub oi_min_interval: Duration,
    /// Upper clamp for the derived open-interest polling interval.
    pub oi_max_interval: Duration,
}

impl From<&FeedConfig> for IngestConfig {
    fn from(config: &FeedConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            api_url: config.api_url.clone(),
            symbols: config.symbols.clone(),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
            max_reconnect_attempts: config.max_reconnect_attempts,
            oi_max_requests_per_min: config.oi_max_requests_per_min,
            oi_min_interval: Duration::from_secs(config.oi_min_interval_secs),
            oi_max_interval: Duration::from_secs(config.oi_max_interval_secs),
        }
    }
}

/// Statistics for a running collector.
#[derive(Debug, Clone, Default)]
pub struct CollectorStats {
    /// Total messages collected since start.
    pub messages_collected: u64,
    /// Total errors encountered.
    pub errors_encountered: u64,
    /// Number of reconnections.
    pub reconnections: u32,
    /// Time of the last successful message.
    pub last_message_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl CollectorStats {
    /// Increments the message count.
    pub fn message_collected(&mut self) {
        self.messages_collected += 1;
        self.last_message_time = Some(chrono::Utc::now());
    }

    /// Increments the error count.
    pub fn error_occurred(&mut self) {
        self.errors_encountered += 1;
    }

    /// Increments the reconnection count.
    pub fn reconnected(&mut self) {
        self.reconnections += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_config() -> FeedConfig {
        FeedConfig {
            ws_url: "wss://example.com/ws".to_string(),
            api_url: "https://example.com".to_string(),
            symbols: vec!["BTCUSDT".to_string()],
            reconnect_delay_secs: 7,
            max_reconnect_attempts: 3,
            oi_max_requests_per_min: 1200,
            oi_min_interval_secs: 5,
            oi_max_interval_secs: 20,
        }
    }

    #[test]
    fn ingest_config_mirrors_feed_config() {
        let config = IngestConfig::from(&feed_config());
        assert_eq!(config.reconnect_delay, Duration::from_secs(7));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.oi_max_requests_per_min, 1200);
    }

    #[test]
    fn stats_track_messages_and_errors() {
        let mut stats = CollectorStats::default();
        stats.message_collected();
        stats.message_collected();
        stats.error_occurred();
        stats.reconnected();

        assert_eq!(stats.messages_collected, 2);
        assert_eq!(stats.errors_encountered, 1);
        assert_eq!(stats.reconnections, 1);
        assert!(stats.last_message_time.is_some());
    }
}
