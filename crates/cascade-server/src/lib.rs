//! Cascade multiplayer server
//!
//! Authoritative rooms over Renet: lobby, moves, reconnection and disconnect grace.

pub mod channels;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod room;
pub mod store;
pub mod sync;
pub mod transport;

pub use channels::*;
pub use config::{ConfigError, ServerConfig};
pub use connection::ConnectionRegistry;
pub use protocol::*;
pub use room::{BeginMoveError, LeaveOutcome, Room, RoomError, RoomRules, ValidationError};
pub use store::{InMemoryRoomStore, RoomStore};
pub use sync::{Outbound, SyncService};
pub use transport::{ServerRunner, TransportError, PROTOCOL_ID};
