//! Wire types shared by the Cascade simulation core, the server and its clients.

mod board;
mod event;
mod ids;
mod replay;
mod snapshot;
mod types;
pub mod wire;

pub use crate::board::*;
pub use crate::event::*;
pub use crate::ids::*;
pub use crate::replay::*;
pub use crate::snapshot::*;
pub use crate::types::*;
