//! Device-to-device relay
//!
//! Connects a push-style fetch on one device to a pull-style send on
//! another through a single-slot handoff channel.

mod bridge;
mod channel;

pub use bridge::*;
pub use channel::*;
