pub mod alerts;
pub mod error;
pub mod oi;
pub mod router;
pub mod shard;
pub mod spike;
pub mod store;
pub mod window;

pub use alerts::{AlertBook, AlertStatus, NewAlert, ThresholdUnit, UpdateAlert, UserAlert};
pub use error::AlertError;
pub use oi::{OiConfig, OiDetector};
pub use router::SymbolRouter;
pub use shard::ShardWorker;
pub use spike::{SpikeConfig, SpikeDetector};
pub use store::AlertStore;
pub use window::{ClosedHour, RollingWindow, WindowState};
