//! Server side
//!
//! Background services that keep a queue healthy.

pub mod sweeper;

pub use sweeper::{Sweep, Sweeper, SweeperConfig};
