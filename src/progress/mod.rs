//! Progress reporting module
//!
//! Provides the ordering adapter every transfer reports through, plus
//! terminal progress bars for the command-line tool.

mod monotonic;
mod reporter;

pub use monotonic::*;
pub use reporter::*;
