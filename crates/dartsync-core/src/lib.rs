// dartsync-core: Keeps a board and its current match mirrored from the Autodarts cloud.

pub mod command;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod pairing;
pub mod registry;
pub mod stream;
pub mod supervisor;
pub mod view;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::Command;
pub use config::{PairingConfig, PairingId, ReconnectPolicy, SyncConfig};
pub use coordinator::{BoardCoordinator, Coordinator, LinkState, MatchCoordinator, WaitToken};
pub use error::CoreError;
pub use pairing::{Pairing, PairingHandle};
pub use registry::{HandleRegistry, RegistrationScope};
pub use stream::{Latest, StateStream};
pub use supervisor::Supervisor;
pub use view::MatchPhase;

// The entity types consumers see through streams.
pub use dartsync_api::{BoardState, MatchState, Segment};
