//! Typed command wrappers for ComputerCraft devices reached through a [`cc_link::Client`].

mod block;
mod computer;
mod error;
mod heading;
mod item;
pub mod lua;
mod peripheral;
mod side;
mod turtle;

#[cfg(test)]
mod testing;

pub use block::Block;
pub use computer::{Computer, Position, SettingKind, SettingOptions};
pub use error::ModuleNotPresent;
pub use heading::Heading;
pub use item::ItemDetail;
pub use side::{Direction, Side};
pub use turtle::Turtle;
