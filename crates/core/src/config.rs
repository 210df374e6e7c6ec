use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub feed: FeedConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub ws_url: String,
    pub api_url: String,
    /// Symbols to subscribe to (upper-case perpetual tickers, e.g. "BTCUSDT").
    pub symbols: Vec<String>,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// 0 = retry forever.
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_oi_max_requests_per_min")]
    pub oi_max_requests_per_min: u32,
    #[serde(default = "default_oi_min_interval_secs")]
    pub oi_min_interval_secs: u64,
    #[serde(default = "default_oi_max_interval_secs")]
    pub oi_max_interval_secs: u64,
}

/// Thresholds for the spike and open-interest detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Current-hour volume must reach this multiple of the previous hour.
    #[serde(default = "default_volume_multiple")]
    pub volume_multiple: f64,
    /// Minimum current-hour quote volume (USD) before a spike may fire.
    #[serde(default = "default_min_quote_volume")]
    pub min_quote_volume: f64,
    /// Open-interest swing threshold as a fraction (0.03 = 3%).
    #[serde(default = "default_oi_threshold_pct")]
    pub oi_threshold_pct: f64,
    /// Minimum absolute open-interest change, in contracts.
    #[serde(default = "default_oi_min_delta")]
    pub oi_min_delta: f64,
    /// Cooldown between OI alerts for the same symbol and direction.
    #[serde(default = "default_oi_cooldown_secs")]
    pub oi_cooldown_secs: u64,
    /// Open-interest baseline lookback window.
    #[serde(default = "default_oi_baseline_secs")]
    pub oi_baseline_secs: u64,
    /// Number of symbol shards (one worker per shard).
    #[serde(default = "default_shards")]
    pub shards: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            volume_multiple: default_volume_multiple(),
            min_quote_volume: default_min_quote_volume(),
            oi_threshold_pct: default_oi_threshold_pct(),
            oi_min_delta: default_oi_min_delta(),
            oi_cooldown_secs: default_oi_cooldown_secs(),
            oi_baseline_secs: default_oi_baseline_secs(),
            shards: default_shards(),
        }
    }
}

/// Per-connection delivery limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Outbound queue capacity per connection.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Consecutive oldest-drop evictions before a connection is closed.
    #[serde(default = "default_max_consecutive_drops")]
    pub max_consecutive_drops: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_consecutive_drops: default_max_consecutive_drops(),
        }
    }
}

const fn default_reconnect_delay_secs() -> u64 {
    5
}

const fn default_oi_max_requests_per_min() -> u32 {
    2000
}

const fn default_oi_min_interval_secs() -> u64 {
    5
}

const fn default_oi_max_interval_secs() -> u64 {
    20
}

const fn default_volume_multiple() -> f64 {
    3.0
}

const fn default_min_quote_volume() -> f64 {
    3_000_000.0 // ~$3M notional
}

const fn default_oi_threshold_pct() -> f64 {
    0.03
}

const fn default_oi_min_delta() -> f64 {
    5_000.0
}

const fn default_oi_cooldown_secs() -> u64 {
    900
}

const fn default_oi_baseline_secs() -> u64 {
    300
}

const fn default_shards() -> usize {
    4
}

const fn default_queue_capacity() -> usize {
    64
}

const fn default_max_consecutive_drops() -> u32 {
    8
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://volspike.db".to_string(),
                max_connections: 5,
            },
            feed: FeedConfig {
                ws_url: "wss://fstream.binance.com/ws".to_string(),
                api_url: "https://fapi.binance.com".to_string(),
                symbols: vec![
                    "BTCUSDT".to_string(),
                    "ETHUSDT".to_string(),
                    "SOLUSDT".to_string(),
                ],
                reconnect_delay_secs: default_reconnect_delay_secs(),
                max_reconnect_attempts: 0,
                oi_max_requests_per_min: default_oi_max_requests_per_min(),
                oi_min_interval_secs: default_oi_min_interval_secs(),
                oi_max_interval_secs: default_oi_max_interval_secs(),
            },
            detection: DetectionConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}
