// dartsync-api: Async Rust client for the Autodarts cloud (boards, matches, push channels)

pub mod auth;
pub mod client;
pub mod entity;
pub mod error;
pub mod models;
pub mod push;
pub mod transport;

pub use auth::{Credentials, Session, SessionConfig};
pub use entity::{
    BoardControl, DartsApi, EntityKind, MatchControl, RemoteBoard, RemoteEntity, RemoteMatch,
};
pub use error::Error;
pub use models::{Bed, BoardState, BoardStatus, MatchState, Player, Segment};
pub use push::{
    Callback, CallbackHandle, CallbackTable, EventFilter, PushChannel, PushMessage,
};
pub use transport::{TlsMode, TransportConfig};
