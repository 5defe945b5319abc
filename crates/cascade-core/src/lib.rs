mod game;
pub mod replay;
mod resolver;

pub use crate::game::*;
pub use crate::replay::{replay, ReplayError};
pub use crate::resolver::*;
