pub mod scheduler;

pub use scheduler::{next_release_time, GatePhase, ReleaseTick, TierGate, TierScheduler};
