//! Path resolution
//!
//! Maps user-supplied paths and literal ids to device object ids over an
//! in-memory snapshot of a device's folders and files.

mod resolver;
mod snapshot;
mod tree;

pub use resolver::*;
pub use snapshot::*;
pub use tree::*;
