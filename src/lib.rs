//! # mtpcopy - Background Device Operations for MTP Media Devices
//!
//! mtpcopy drives media devices through a blocking, callback-based
//! transport without blocking its callers. Every device call runs on a
//! bounded worker pool and reports back through a completion handler.
//!
//! ## Features
//!
//! - **Task Executor**: bounded worker pool, fault containment, exactly one
//!   completion per submitted operation
//! - **Device-to-Device Copy**: streams an object from one device into
//!   another through a single-slot handoff channel, never touching disk
//! - **Ordered Progress**: non-decreasing `(sent, total)` reports ending at
//!   `(total, total)`
//! - **Path Resolution**: absolute paths, bare names and literal ids
//! - **Tree Transfers**: recursive listing, folder download and directory
//!   upload, optionally skipping dot files
//! - **Simulated Bus**: an in-memory transport loaded from JSON, with fault
//!   injection
//!
//! ## Quick Start
//!
//! ```no_run
//! use mtpcopy::config::ExecutorConfig;
//! use mtpcopy::device::{MemoryTransport, Transport};
//! use mtpcopy::executor::{DetectRawDevices, OpenDevice, TaskExecutor};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::load(Path::new("bus.json")).unwrap());
//! let executor = TaskExecutor::new(transport, &ExecutorConfig::default()).unwrap();
//!
//! let devices = executor.call(DetectRawDevices).unwrap();
//! let device = executor.call(OpenDevice { raw: devices[0].clone(), cached: true }).unwrap();
//! println!("Opened session {}", device.id());
//! ```
//!
//! ## Device-to-Device Copy
//!
//! ```no_run
//! use mtpcopy::executor::{CopyBetweenDevices, TaskExecutor};
//! # fn demo(executor: &TaskExecutor, a: mtpcopy::device::DeviceHandle, b: mtpcopy::device::DeviceHandle) {
//! executor.submit(
//!     CopyBetweenDevices {
//!         source: a,
//!         object_id: 42,
//!         destination: b,
//!         parent: 0,
//!         storage: 0,
//!         name: None,
//!         progress: None,
//!     },
//!     |outcome| match outcome {
//!         Ok(summary) => println!("Copied {} bytes", summary.bytes),
//!         Err(e) => eprintln!("Copy failed: {}", e),
//!     },
//! );
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod device;
pub mod error;
pub mod executor;
pub mod progress;
pub mod relay;
pub mod resolve;

// Re-export commonly used types
pub use device::{DeviceHandle, MemoryTransport, Transport};
pub use error::{MtpError, Result};
pub use executor::{Operation, OperationKind, TaskExecutor};
pub use progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use mtpcopy::prelude::*;
    //! ```

    pub use crate::config::{BridgeConfig, ExecutorConfig, RuntimeConfig};
    pub use crate::device::{
        DeviceHandle, DeviceInfo, FileRecord, MemoryTransport, RawDevice, StorageInfo, Transport,
    };
    pub use crate::error::{MtpError, Result};
    pub use crate::executor::{
        CopyBetweenDevices, CreateFolder, DeleteObject, DetectRawDevices, DownloadToFile,
        DownloadTree, GetFileMetadata, ListFolder, ListTree, OpenDevice, Operation, ReleaseDevice,
        RenameObject, TaskExecutor, UploadFromFile, UploadTree,
    };
    pub use crate::progress::{MonotonicProgress, ProgressFn, ProgressReporter};
    pub use crate::relay::{DeviceBridge, HandoffChannel, TransferSummary};
    pub use crate::resolve::{DeviceSnapshot, FolderTree, PathResolver};
}
