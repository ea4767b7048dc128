//! Task executor
//!
//! Runs single blocking device operations on background workers and
//! reports each outcome through a completion handler.

mod operations;
mod pool;
mod tree;

pub use operations::*;
pub use pool::*;
pub use tree::*;
