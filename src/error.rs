//! Error types for mtpcopy
//!
//! This module defines all error types used throughout the crate. Every
//! asynchronous operation resolves with either a value or one of these
//! errors, never both.

use crate::executor::OperationKind;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for mtpcopy operations
#[derive(Error, Debug)]
pub enum MtpError {
    /// Either side of a handoff channel closed before the requested byte
    /// count was satisfied. Both counts are running totals for that side.
    #[error("Handoff channel cancelled after {transferred} of {requested} bytes")]
    ChannelCancelled { transferred: u64, requested: u64 },

    /// A wrapped transport call returned a nonzero status
    #[error("Transport call '{call}' failed with status {status}")]
    ExternalCallFailure { call: &'static str, status: i32 },

    /// A pull or push callback rejected its buffer
    #[error("Data callback rejected during '{call}'")]
    CallbackRejected { call: &'static str },

    /// Allocation, queue or thread exhaustion
    #[error("Resource exhausted: {0}")]
    ResourceExhaustion(String),

    /// A fault escaped a wrapped call and was caught at the worker boundary
    #[error("Worker panicked while running {kind}: {message}")]
    WorkerPanic { kind: OperationKind, message: String },

    /// Aggregate failure of a device-to-device copy
    #[error("Device-to-device transfer failed (fetch: {}, send: {})", side(.fetch), side(.send))]
    TransferFailed {
        fetch: Option<Box<MtpError>>,
        send: Option<Box<MtpError>>,
    },

    /// The object exists but is a folder where a file is needed, or the
    /// other way round
    #[error("'{name}' is a {found}, not a {expected}")]
    WrongObjectType {
        name: String,
        found: &'static str,
        expected: &'static str,
    },

    /// Object not present on the device or in the snapshot
    #[error("Object not found: {0}")]
    NotFound(String),

    /// No raw device matches the requested selector
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The transport refused to open a session
    #[error("Failed to open device at bus {bus_location}, devnum {devnum}")]
    OpenFailed { bus_location: u32, devnum: u8 },

    /// The session behind a handle was already released
    #[error("Device session {0} already released")]
    AlreadyReleased(u64),

    /// One session cannot serve both sides of a device-to-device copy
    #[error("Session {0} cannot be both source and destination of a transfer")]
    SessionConflict(u64),

    /// Illegal object name
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// The executor no longer accepts work
    #[error("Task executor is shut down")]
    ExecutorShutdown,

    /// I/O error on the local side of a transfer
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<MtpError>,
    },
}

fn side(outcome: &Option<Box<MtpError>>) -> String {
    match outcome {
        Some(e) => e.to_string(),
        None => "ok".to_string(),
    }
}

impl MtpError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Build the aggregate error for a device-to-device copy, or `Ok` if
    /// both sides succeeded
    pub fn aggregate<T, U>(fetch: Result<T>, send: Result<U>) -> Result<(T, U)> {
        match (fetch, send) {
            (Ok(f), Ok(s)) => Ok((f, s)),
            (f, s) => Err(Self::TransferFailed {
                fetch: f.err().map(Box::new),
                send: s.err().map(Box::new),
            }),
        }
    }

    /// Check if this error stems from a closed handoff channel
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::ChannelCancelled { .. } => true,
            Self::WithContext { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ExternalCallFailure { .. }
                | Self::ResourceExhaustion(_)
                | Self::ChannelCancelled { .. }
                | Self::TransferFailed { .. }
        )
    }
}

/// Result type alias for mtpcopy operations
pub type Result<T> = std::result::Result<T, MtpError>;

impl From<serde_json::Error> for MtpError {
    fn from(err: serde_json::Error) -> Self {
        MtpError::ConfigError(err.to_string())
    }
}

/// Convert a transport status code into a result
pub fn check_status(call: &'static str, status: i32) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(MtpError::ExternalCallFailure { call, status })
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| MtpError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status() {
        assert!(check_status("Delete_Object", 0).is_ok());

        let err = check_status("Delete_Object", -1).unwrap_err();
        assert!(matches!(
            err,
            MtpError::ExternalCallFailure { call: "Delete_Object", status: -1 }
        ));
    }

    #[test]
    fn test_aggregate_both_ok() {
        let out = MtpError::aggregate::<u32, u64>(Ok(1), Ok(2)).unwrap();
        assert_eq!(out, (1, 2));
    }

    #[test]
    fn test_aggregate_one_side_failed() {
        let fetch: Result<()> = Ok(());
        let send: Result<()> = Err(MtpError::CallbackRejected { call: "send" });

        match MtpError::aggregate(fetch, send).unwrap_err() {
            MtpError::TransferFailed { fetch, send } => {
                assert!(fetch.is_none());
                assert!(send.is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancellation_through_context() {
        let err = MtpError::ChannelCancelled {
            transferred: 10,
            requested: 20,
        }
        .with_context("pull source");

        assert!(err.is_cancellation());
        assert!(!MtpError::ExecutorShutdown.is_cancellation());
    }

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let result: Result<()> = Err(io_err).with_path("/tmp/x");
        match result.unwrap_err() {
            MtpError::Io { path, .. } => assert_eq!(path, PathBuf::from("/tmp/x")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
