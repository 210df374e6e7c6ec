pub mod queue;
pub mod registry;

pub use queue::{ConnectionQueue, PushOutcome};
pub use registry::{Broadcaster, ConnectionId};
