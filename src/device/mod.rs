//! Device model and transport boundary
//!
//! Provides the metadata snapshots, the shared session handle, the
//! blocking `Transport` trait and an in-memory transport implementation.

mod handle;
pub mod memory;
mod transport;
mod types;

pub use handle::*;
pub use memory::{BusImage, DeviceImage, FaultPlan, MemoryTransport};
pub use transport::*;
pub use types::*;
