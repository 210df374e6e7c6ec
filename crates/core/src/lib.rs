pub mod config;
pub mod config_loader;
pub mod events;
pub mod tier;

pub use config::{
    AppConfig, DatabaseConfig, DeliveryConfig, DetectionConfig, FeedConfig, ServerConfig,
};
pub use config_loader::ConfigLoader;
pub use events::{
    CandleDirection, MetricSnapshot, OiAlertEvent, OiDirection, OpenInterestSample, Outbound,
    PushEvent, SpikeEvent, SpikeKind, TriggeredAlert, TriggeredPayload,
};
pub use tier::{AlertKind, CrossDirection, DeliveryMethod, Tier};
