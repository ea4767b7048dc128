//! Operation descriptors
//!
//! Each descriptor bundles the arguments of one blocking device call. The
//! executor runs it on a worker through [`Operation::run`] and hands the
//! result to the completion handler.

use crate::device::{
    is_valid_object_name, DeviceHandle, DeviceInfo, FileRecord, RawDevice, StorageInfo,
    StorageSortPolicy, Transport, STATUS_FAILED, STATUS_NO_DEVICE_ATTACHED,
};
use crate::error::{check_status, IoResultExt, MtpError, Result};
use crate::progress::{MonotonicProgress, ProgressFn};
use crate::relay::{DeviceBridge, TransferSummary};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

/// Kind tag of an operation descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Enumerate attached devices
    DetectRawDevices,
    /// Open a session
    OpenDevice,
    /// Release a session
    ReleaseDevice,
    /// Enumerate storages
    GetStorages,
    /// Read identity strings
    GetDeviceInfo,
    /// List folder contents
    ListFolder,
    /// Fetch object metadata
    GetFileMetadata,
    /// Rename an object
    RenameObject,
    /// Create a folder
    CreateFolder,
    /// Delete an object
    DeleteObject,
    /// Download to a local file
    DownloadToFile,
    /// Upload a local file
    UploadFromFile,
    /// Download into a push sink
    DownloadToSink,
    /// Upload from a pull source
    UploadFromSource,
    /// Device-to-device copy
    CopyBetweenDevices,
    /// Recursive folder listing
    ListTree,
    /// Download a file or folder tree
    DownloadTree,
    /// Upload a local file or directory tree
    UploadTree,
}

impl OperationKind {
    /// Stable name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DetectRawDevices => "detect-raw-devices",
            Self::OpenDevice => "open-device",
            Self::ReleaseDevice => "release-device",
            Self::GetStorages => "get-storages",
            Self::GetDeviceInfo => "get-device-info",
            Self::ListFolder => "list-folder",
            Self::GetFileMetadata => "get-file-metadata",
            Self::RenameObject => "rename-object",
            Self::CreateFolder => "create-folder",
            Self::DeleteObject => "delete-object",
            Self::DownloadToFile => "download-to-file",
            Self::UploadFromFile => "upload-from-file",
            Self::DownloadToSink => "download-to-sink",
            Self::UploadFromSource => "upload-from-source",
            Self::CopyBetweenDevices => "copy-between-devices",
            Self::ListTree => "list-tree",
            Self::DownloadTree => "download-tree",
            Self::UploadTree => "upload-tree",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A self-contained unit of blocking device work
pub trait Operation: Send + 'static {
    /// Value delivered on success
    type Output: Send + 'static;

    /// Kind tag
    const KIND: OperationKind;

    /// Run the blocking call
    fn run(self, transport: &dyn Transport) -> Result<Self::Output>;
}

/// Boxed push sink accepted by [`DownloadToSink`]
pub type BoxedSink = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// Boxed pull source accepted by [`UploadFromSource`]
pub type BoxedSource = Box<dyn FnMut(&mut [u8]) -> Option<usize> + Send>;

/// Caller progress behind the ordering adapter
struct ProgressRelay(Option<MonotonicProgress<Box<dyn FnMut(u64, u64) + Send>>>);

impl ProgressRelay {
    fn new(progress: Option<ProgressFn>) -> Self {
        Self(progress.map(|f| {
            let forward: Box<dyn FnMut(u64, u64) + Send> = Box::new(move |sent, total| f(sent, total));
            MonotonicProgress::new(forward)
        }))
    }

    fn report(&mut self, sent: u64, total: u64) {
        if let Some(p) = self.0.as_mut() {
            p.report(sent, total);
        }
    }

    fn finish(&mut self, total: u64) {
        if let Some(p) = self.0.as_mut() {
            p.finish(total);
        }
    }
}

/// Enumerate attached devices
#[derive(Debug, Clone, Default)]
pub struct DetectRawDevices;

impl Operation for DetectRawDevices {
    type Output = Vec<RawDevice>;
    const KIND: OperationKind = OperationKind::DetectRawDevices;

    fn run(self, transport: &dyn Transport) -> Result<Self::Output> {
        let (status, devices) = transport.detect_raw_devices();
        if status == STATUS_NO_DEVICE_ATTACHED {
            return Ok(Vec::new());
        }
        check_status("detect_raw_devices", status)?;
        Ok(devices)
    }
}

/// Open a session on a detected device
#[derive(Debug, Clone)]
pub struct OpenDevice {
    /// Device to open
    pub raw: RawDevice,
    /// Cache the object tree on open
    pub cached: bool,
}

impl Operation for OpenDevice {
    type Output = DeviceHandle;
    const KIND: OperationKind = OperationKind::OpenDevice;

    fn run(self, transport: &dyn Transport) -> Result<Self::Output> {
        DeviceHandle::open(transport, &self.raw, self.cached)
    }
}

/// Release a session
#[derive(Debug, Clone)]
pub struct ReleaseDevice {
    /// Target session
    pub device: DeviceHandle,
}

impl Operation for ReleaseDevice {
    type Output = ();
    const KIND: OperationKind = OperationKind::ReleaseDevice;

    fn run(self, transport: &dyn Transport) -> Result<()> {
        self.device.release(transport)
    }
}

/// Refresh and list the storages of a device
#[derive(Debug, Clone)]
pub struct GetStorages {
    /// Target session
    pub device: DeviceHandle,
    /// Order of the refreshed list
    pub sort: StorageSortPolicy,
}

impl Operation for GetStorages {
    type Output = Vec<StorageInfo>;
    const KIND: OperationKind = OperationKind::GetStorages;

    fn run(self, transport: &dyn Transport) -> Result<Self::Output> {
        let session = self.device.session()?;
        check_status("get_storage", transport.get_storage(session, self.sort))?;
        Ok(transport.storages(session))
    }
}

/// Read the identity strings of a device
#[derive(Debug, Clone)]
pub struct GetDeviceInfo {
    /// Target session
    pub device: DeviceHandle,
}

impl Operation for GetDeviceInfo {
    type Output = DeviceInfo;
    const KIND: OperationKind = OperationKind::GetDeviceInfo;

    fn run(self, transport: &dyn Transport) -> Result<Self::Output> {
        let session = self.device.session()?;
        Ok(transport.device_info(session))
    }
}

/// List the direct children of a folder
#[derive(Debug, Clone)]
pub struct ListFolder {
    /// Target session
    pub device: DeviceHandle,
    /// Storage id, `0` for all storages
    pub storage: u32,
    /// Parent folder id
    pub parent: u32,
}

impl Operation for ListFolder {
    type Output = Vec<FileRecord>;
    const KIND: OperationKind = OperationKind::ListFolder;

    fn run(self, transport: &dyn Transport) -> Result<Self::Output> {
        let session = self.device.session()?;
        Ok(transport.get_files_and_folders(session, self.storage, self.parent))
    }
}

/// Fetch the metadata of one object
#[derive(Debug, Clone)]
pub struct GetFileMetadata {
    /// Target session
    pub device: DeviceHandle,
    /// Object id
    pub object_id: u32,
}

impl Operation for GetFileMetadata {
    type Output = FileRecord;
    const KIND: OperationKind = OperationKind::GetFileMetadata;

    fn run(self, transport: &dyn Transport) -> Result<Self::Output> {
        let session = self.device.session()?;
        transport
            .get_file_metadata(session, self.object_id)
            .ok_or_else(|| MtpError::NotFound(format!("object {}", self.object_id)))
    }
}

/// Rename an object; delivers the updated record
#[derive(Debug, Clone)]
pub struct RenameObject {
    /// Target session
    pub device: DeviceHandle,
    /// Current record of the object
    pub file: FileRecord,
    /// New name
    pub name: String,
}

impl Operation for RenameObject {
    type Output = FileRecord;
    const KIND: OperationKind = OperationKind::RenameObject;

    fn run(self, transport: &dyn Transport) -> Result<Self::Output> {
        if !is_valid_object_name(&self.name) {
            return Err(MtpError::InvalidName(self.name));
        }
        let session = self.device.session()?;
        check_status("set_file_name", transport.set_file_name(session, &self.file, &self.name))?;

        let mut file = self.file;
        file.name = self.name;
        Ok(file)
    }
}

/// Create a folder; delivers the new folder id
#[derive(Debug, Clone)]
pub struct CreateFolder {
    /// Target session
    pub device: DeviceHandle,
    /// Folder name
    pub name: String,
    /// Parent folder id
    pub parent: u32,
    /// Storage id
    pub storage: u32,
}

impl Operation for CreateFolder {
    type Output = u32;
    const KIND: OperationKind = OperationKind::CreateFolder;

    fn run(self, transport: &dyn Transport) -> Result<Self::Output> {
        if !is_valid_object_name(&self.name) {
            return Err(MtpError::InvalidName(self.name));
        }
        let session = self.device.session()?;
        match transport.create_folder(session, &self.name, self.parent, self.storage) {
            0 => Err(MtpError::ExternalCallFailure {
                call: "create_folder",
                status: STATUS_FAILED,
            }),
            id => Ok(id),
        }
    }
}

/// Delete an object and, for folders, everything below it
#[derive(Debug, Clone)]
pub struct DeleteObject {
    /// Target session
    pub device: DeviceHandle,
    /// Object id
    pub object_id: u32,
}

impl Operation for DeleteObject {
    type Output = ();
    const KIND: OperationKind = OperationKind::DeleteObject;

    fn run(self, transport: &dyn Transport) -> Result<()> {
        let session = self.device.session()?;
        check_status("delete_object", transport.delete_object(session, self.object_id))
    }
}

/// Download an object into a local file; delivers the byte count
pub struct DownloadToFile {
    /// Target session
    pub device: DeviceHandle,
    /// Object id
    pub object_id: u32,
    /// Local file
    pub path: PathBuf,
    /// Progress reporter
    pub progress: Option<ProgressFn>,
}

impl Operation for DownloadToFile {
    type Output = u64;
    const KIND: OperationKind = OperationKind::DownloadToFile;

    fn run(self, transport: &dyn Transport) -> Result<u64> {
        let session = self.device.session()?;
        if let Some(record) = transport.get_file_metadata(session, self.object_id) {
            require_file(&record)?;
        }
        let file = File::create(&self.path).with_path(&self.path)?;
        let mut writer = BufWriter::new(file);
        let mut written = 0u64;
        let mut write_error = None;
        let mut progress = ProgressRelay::new(self.progress);

        let status = transport.get_file_to_handler(
            session,
            self.object_id,
            &mut |chunk: &[u8]| match writer.write_all(chunk) {
                Ok(()) => {
                    written += chunk.len() as u64;
                    true
                }
                Err(e) => {
                    write_error = Some(e);
                    false
                }
            },
            Some(&mut |sent: u64, total: u64| progress.report(sent, total)),
        );

        let outcome = match write_error {
            Some(e) => Err(MtpError::io(&self.path, e)),
            None => check_status("get_file_to_handler", status)
                .and_then(|()| writer.flush().with_path(&self.path)),
        };

        if let Err(e) = outcome {
            drop(writer);
            if let Err(rm) = std::fs::remove_file(&self.path) {
                tracing::debug!("Could not remove partial file {:?}: {}", self.path, rm);
            }
            return Err(e);
        }

        progress.finish(written);
        Ok(written)
    }
}

/// Upload a local file; delivers the new object's record
pub struct UploadFromFile {
    /// Target session
    pub device: DeviceHandle,
    /// Local file
    pub path: PathBuf,
    /// Parent folder id
    pub parent: u32,
    /// Storage id
    pub storage: u32,
    /// Name on the device, defaults to the local file name
    pub name: Option<String>,
    /// Progress reporter
    pub progress: Option<ProgressFn>,
}

impl Operation for UploadFromFile {
    type Output = FileRecord;
    const KIND: OperationKind = OperationKind::UploadFromFile;

    fn run(self, transport: &dyn Transport) -> Result<FileRecord> {
        let session = self.device.session()?;
        let name = match self.name {
            Some(name) => name,
            None => self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| MtpError::InvalidName(self.path.display().to_string()))?,
        };
        if !is_valid_object_name(&name) {
            return Err(MtpError::InvalidName(name));
        }

        let mut file = File::open(&self.path).with_path(&self.path)?;
        let size = file.metadata().with_path(&self.path)?.len();
        let mut metadata = FileRecord::for_upload(name, size, self.parent, self.storage);
        let mut read_error = None;
        let mut progress = ProgressRelay::new(self.progress);

        let status = transport.send_file_from_handler(
            session,
            &mut |buf: &mut [u8]| match fill(&mut file, buf) {
                Ok(n) => Some(n),
                Err(e) => {
                    read_error = Some(e);
                    None
                }
            },
            &mut metadata,
            Some(&mut |sent: u64, total: u64| progress.report(sent, total)),
        );

        if let Some(e) = read_error {
            return Err(MtpError::io(&self.path, e));
        }
        check_status("send_file_from_handler", status)?;

        progress.finish(size);
        Ok(metadata)
    }
}

/// Refuse folders where file content is needed
fn require_file(record: &FileRecord) -> Result<()> {
    if record.is_folder() {
        return Err(MtpError::WrongObjectType {
            name: record.name.clone(),
            found: "folder",
            expected: "file",
        });
    }
    Ok(())
}

/// Read until `buf` is full or the reader is exhausted
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Stream an object into a caller-supplied sink; delivers the byte count
pub struct DownloadToSink {
    /// Target session
    pub device: DeviceHandle,
    /// Object id
    pub object_id: u32,
    /// Receives each chunk
    pub sink: BoxedSink,
    /// Progress reporter
    pub progress: Option<ProgressFn>,
}

impl Operation for DownloadToSink {
    type Output = u64;
    const KIND: OperationKind = OperationKind::DownloadToSink;

    fn run(mut self, transport: &dyn Transport) -> Result<u64> {
        let session = self.device.session()?;
        let mut delivered = 0u64;
        let mut rejected = false;
        let mut progress = ProgressRelay::new(self.progress.take());
        let sink = &mut self.sink;

        let status = transport.get_file_to_handler(
            session,
            self.object_id,
            &mut |chunk: &[u8]| {
                if sink(chunk) {
                    delivered += chunk.len() as u64;
                    true
                } else {
                    rejected = true;
                    false
                }
            },
            Some(&mut |sent: u64, total: u64| progress.report(sent, total)),
        );

        if rejected {
            return Err(MtpError::CallbackRejected {
                call: "get_file_to_handler",
            });
        }
        check_status("get_file_to_handler", status)?;

        progress.finish(delivered);
        Ok(delivered)
    }
}

/// Create an object filled from a caller-supplied source; delivers the
/// new object's record
pub struct UploadFromSource {
    /// Target session
    pub device: DeviceHandle,
    /// Name, size, parent and storage of the new object
    pub metadata: FileRecord,
    /// Fills each requested buffer
    pub source: BoxedSource,
    /// Progress reporter
    pub progress: Option<ProgressFn>,
}

impl Operation for UploadFromSource {
    type Output = FileRecord;
    const KIND: OperationKind = OperationKind::UploadFromSource;

    fn run(mut self, transport: &dyn Transport) -> Result<FileRecord> {
        if !is_valid_object_name(&self.metadata.name) {
            return Err(MtpError::InvalidName(self.metadata.name));
        }
        let session = self.device.session()?;
        let mut rejected = false;
        let mut progress = ProgressRelay::new(self.progress.take());
        let source = &mut self.source;

        let status = transport.send_file_from_handler(
            session,
            &mut |buf: &mut [u8]| {
                let produced = source(buf);
                rejected |= produced.is_none();
                produced
            },
            &mut self.metadata,
            Some(&mut |sent: u64, total: u64| progress.report(sent, total)),
        );

        if rejected {
            return Err(MtpError::CallbackRejected {
                call: "send_file_from_handler",
            });
        }
        check_status("send_file_from_handler", status)?;

        progress.finish(self.metadata.size);
        Ok(self.metadata)
    }
}

/// Copy an object from one device straight to another
pub struct CopyBetweenDevices {
    /// Session holding the object
    pub source: DeviceHandle,
    /// Object id
    pub object_id: u32,
    /// Session receiving the copy
    pub destination: DeviceHandle,
    /// Parent folder id
    pub parent: u32,
    /// Storage id
    pub storage: u32,
    /// Name on the destination, defaults to the source name
    pub name: Option<String>,
    /// Progress reporter
    pub progress: Option<ProgressFn>,
}

impl Operation for CopyBetweenDevices {
    type Output = TransferSummary;
    const KIND: OperationKind = OperationKind::CopyBetweenDevices;

    fn run(self, transport: &dyn Transport) -> Result<TransferSummary> {
        let session = self.source.session()?;
        let record = transport
            .get_file_metadata(session, self.object_id)
            .ok_or_else(|| MtpError::NotFound(format!("object {}", self.object_id)))?;
        require_file(&record)?;

        let name = self.name.unwrap_or(record.name);
        if !is_valid_object_name(&name) {
            return Err(MtpError::InvalidName(name));
        }

        let mut metadata = FileRecord::for_upload(name, record.size, self.parent, self.storage);
        metadata.file_type = record.file_type;
        metadata.modified = record.modified;

        let mut forward = self.progress.map(|f| move |sent: u64, total: u64| f(sent, total));

        DeviceBridge::new(transport).copy(
            &self.source,
            self.object_id,
            &self.destination,
            &mut metadata,
            forward.as_mut().map(|f| f as &mut (dyn FnMut(u64, u64) + Send)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::DEFAULT_STORAGE_ID;
    use crate::device::{DeviceImage, MemoryTransport};
    use std::sync::{Arc, Mutex};

    fn open_single() -> (MemoryTransport, RawDevice, DeviceHandle) {
        let transport = MemoryTransport::new().with_chunk_sizes(16, 10);
        let raw = transport.add_device(
            DeviceImage::new(2, 7, "Acme")
                .with_folder(1, 0, "Music")
                .with_file(2, 1, "song.mp3", vec![7u8; 100]),
        );
        let handle = OpenDevice { raw: raw.clone(), cached: false }.run(&transport).unwrap();
        (transport, raw, handle)
    }

    #[test]
    fn test_detect_empty_bus_is_ok() {
        let transport = MemoryTransport::new();
        assert!(DetectRawDevices.run(&transport).unwrap().is_empty());
    }

    #[test]
    fn test_metadata_not_found() {
        let (transport, _, device) = open_single();
        let err = GetFileMetadata { device, object_id: 99 }.run(&transport).unwrap_err();
        assert!(matches!(err, MtpError::NotFound(_)));
    }

    #[test]
    fn test_rename_rejects_bad_name() {
        let (transport, _, device) = open_single();
        let file = GetFileMetadata { device: device.clone(), object_id: 2 }.run(&transport).unwrap();
        let err = RenameObject { device, file, name: "a/b".to_string() }.run(&transport).unwrap_err();
        assert!(matches!(err, MtpError::InvalidName(_)));
    }

    #[test]
    fn test_create_folder_duplicate_fails() {
        let (transport, _, device) = open_single();
        let err = CreateFolder {
            device,
            name: "music".to_string(),
            parent: 0,
            storage: DEFAULT_STORAGE_ID,
        }
        .run(&transport)
        .unwrap_err();
        assert!(matches!(err, MtpError::ExternalCallFailure { call: "create_folder", .. }));
    }

    #[test]
    fn test_download_to_sink_reports_progress() {
        let (transport, _, device) = open_single();
        let received = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink_buf = Arc::clone(&received);
        let progress_log = Arc::clone(&seen);
        let bytes = DownloadToSink {
            device,
            object_id: 2,
            sink: Box::new(move |chunk: &[u8]| {
                sink_buf.lock().unwrap().extend_from_slice(chunk);
                true
            }),
            progress: Some(Arc::new(move |sent: u64, total: u64| progress_log.lock().unwrap().push((sent, total)))),
        }
        .run(&transport)
        .unwrap();

        assert_eq!(bytes, 100);
        assert_eq!(received.lock().unwrap().len(), 100);
        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(seen.last().copied(), Some((100, 100)));
    }

    #[test]
    fn test_download_to_sink_rejected() {
        let (transport, _, device) = open_single();
        let err = DownloadToSink {
            device,
            object_id: 2,
            sink: Box::new(|_: &[u8]| false),
            progress: None,
        }
        .run(&transport)
        .unwrap_err();
        assert!(matches!(err, MtpError::CallbackRejected { .. }));
    }

    #[test]
    fn test_upload_from_source() {
        let (transport, raw, device) = open_single();
        let data: Vec<u8> = (0..45u8).collect();
        let mut cursor = std::io::Cursor::new(data.clone());

        let record = UploadFromSource {
            device,
            metadata: FileRecord::for_upload("notes.txt", 45, 1, DEFAULT_STORAGE_ID),
            source: Box::new(move |buf: &mut [u8]| fill(&mut cursor, buf).ok()),
            progress: None,
        }
        .run(&transport)
        .unwrap();

        assert_ne!(record.id, 0);
        assert_eq!(transport.object_data(&raw, record.id).unwrap(), data);
    }

    #[test]
    fn test_file_round_trip_through_device() {
        let (transport, raw, device) = open_single();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("song.mp3");

        let bytes = DownloadToFile {
            device: device.clone(),
            object_id: 2,
            path: local.clone(),
            progress: None,
        }
        .run(&transport)
        .unwrap();
        assert_eq!(bytes, 100);

        let record = UploadFromFile {
            device,
            path: local,
            parent: 0,
            storage: DEFAULT_STORAGE_ID,
            name: Some("copy.mp3".to_string()),
            progress: None,
        }
        .run(&transport)
        .unwrap();
        assert_eq!(transport.object_data(&raw, record.id).unwrap(), vec![7u8; 100]);
    }

    #[test]
    fn test_download_failure_removes_partial_file() {
        let (transport, _, device) = open_single();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("missing.bin");

        let err = DownloadToFile {
            device,
            object_id: 42,
            path: local.clone(),
            progress: None,
        }
        .run(&transport)
        .unwrap_err();

        assert!(matches!(err, MtpError::ExternalCallFailure { .. }));
        assert!(!local.exists());
    }

    #[test]
    fn test_download_folder_to_file_refused() {
        let (transport, _, device) = open_single();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("music");

        let err = DownloadToFile {
            device,
            object_id: 1,
            path: local.clone(),
            progress: None,
        }
        .run(&transport)
        .unwrap_err();

        assert!(matches!(err, MtpError::WrongObjectType { found: "folder", .. }));
        assert!(!local.exists());
    }

    #[test]
    fn test_copy_folder_refused() {
        let transport = MemoryTransport::new();
        let src = transport.add_device(DeviceImage::new(1, 1, "Source").with_folder(1, 0, "Music"));
        let dst = transport.add_device(DeviceImage::new(1, 2, "Dest"));
        let source = OpenDevice { raw: src, cached: true }.run(&transport).unwrap();
        let destination = OpenDevice { raw: dst, cached: true }.run(&transport).unwrap();

        let err = CopyBetweenDevices {
            source,
            object_id: 1,
            destination,
            parent: 0,
            storage: DEFAULT_STORAGE_ID,
            name: None,
            progress: None,
        }
        .run(&transport)
        .unwrap_err();

        match err {
            MtpError::WrongObjectType { name, found, expected } => {
                assert_eq!((name.as_str(), found, expected), ("Music", "folder", "file"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_released_handle_rejected() {
        let (transport, _, device) = open_single();
        ReleaseDevice { device: device.clone() }.run(&transport).unwrap();
        let err = ListFolder { device, storage: 0, parent: 0 }.run(&transport).unwrap_err();
        assert!(matches!(err, MtpError::AlreadyReleased(_)));
    }
}
