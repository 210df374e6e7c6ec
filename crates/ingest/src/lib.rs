pub mod collector;
pub mod feed;
pub mod normalizer;
pub mod oi_poller;
pub mod types;

pub use collector::MarketCollector;
pub use feed::{AggTradeTick, FeedMessage, MarkPriceTick};
pub use normalizer::{run_normalizer, Normalizer};
pub use oi_poller::{compute_polling_interval, OiPoller};
pub use types::{CollectorStats, IngestConfig};
