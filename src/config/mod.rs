//! Configuration module for mtpcopy
//!
//! Provides CLI arguments, the JSON config file and runtime settings for
//! the executor, the transfer bridge and the path resolver.

mod settings;

pub use settings::*;
