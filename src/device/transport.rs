//! Boundary to the blocking device-transport library
//!
//! Every method blocks the calling thread until the device answers. The
//! rest of the crate never calls these from a caller's control thread;
//! they are reached through the executor or the device bridge.

use super::types::{DeviceInfo, FileRecord, RawDevice, StorageInfo, StorageSortPolicy};

/// Opaque session identifier handed out by `open_raw_device`
pub type SessionId = u64;

/// Transport status code, `0` on success
pub type Status = i32;

/// Generic failure status
pub const STATUS_FAILED: Status = -1;

/// A data callback aborted the transfer
pub const STATUS_CALLBACK_ABORTED: Status = 2;

/// Detection found no device; not an error for callers
pub const STATUS_NO_DEVICE_ATTACHED: Status = 5;

/// Push-style data sink: consumes one chunk, `false` rejects it and aborts
/// the transfer
pub type PushSink<'a> = dyn FnMut(&[u8]) -> bool + 'a;

/// Pull-style data source: fills the buffer and returns the produced
/// length, `None` aborts the transfer
pub type PullSource<'a> = dyn FnMut(&mut [u8]) -> Option<usize> + 'a;

/// Progress callback `(sent, total)`
pub type ProgressCallback<'a> = dyn FnMut(u64, u64) + 'a;

/// Blocking primitives of a device-transport library
pub trait Transport: Send + Sync {
    /// Enumerate connectable devices
    fn detect_raw_devices(&self) -> (Status, Vec<RawDevice>);

    /// Open a session, `None` on failure
    fn open_raw_device(&self, raw: &RawDevice, cached: bool) -> Option<SessionId>;

    /// Release a session
    fn release_device(&self, session: SessionId);

    /// Identity strings of the device
    fn device_info(&self, session: SessionId) -> DeviceInfo;

    /// Refresh the device's storage list using the given order
    fn get_storage(&self, session: SessionId, sort: StorageSortPolicy) -> Status;

    /// Storages from the last `get_storage` call
    fn storages(&self, session: SessionId) -> Vec<StorageInfo>;

    /// Objects directly under `parent` on `storage`
    fn get_files_and_folders(&self, session: SessionId, storage: u32, parent: u32) -> Vec<FileRecord>;

    /// Metadata of one object
    fn get_file_metadata(&self, session: SessionId, id: u32) -> Option<FileRecord>;

    /// Rename an object
    fn set_file_name(&self, session: SessionId, file: &FileRecord, name: &str) -> Status;

    /// Create a folder, returns the new id or `0` on failure
    fn create_folder(&self, session: SessionId, name: &str, parent: u32, storage: u32) -> u32;

    /// Delete an object
    fn delete_object(&self, session: SessionId, id: u32) -> Status;

    /// Stream an object's bytes into `sink`
    fn get_file_to_handler(
        &self,
        session: SessionId,
        id: u32,
        sink: &mut PushSink<'_>,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> Status;

    /// Create an object described by `metadata` and fill it from `source`.
    /// On success the transport writes the new object id into `metadata.id`.
    fn send_file_from_handler(
        &self,
        session: SessionId,
        source: &mut PullSource<'_>,
        metadata: &mut FileRecord,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> Status;
}
