//! In-process simulated device bus
//!
//! `MemoryTransport` implements [`Transport`] over devices held in memory.
//! It is loaded from a JSON bus image or assembled in code, and can inject
//! faults (failing or panicking calls, slow chunks) to exercise the
//! executor and the device bridge.

use super::transport::{
    ProgressCallback, PullSource, PushSink, SessionId, Status, Transport,
    STATUS_CALLBACK_ABORTED, STATUS_FAILED, STATUS_NO_DEVICE_ATTACHED,
};
use super::types::{
    is_valid_object_name, DeviceInfo, FileRecord, FileType, RawDevice, StorageInfo,
    StorageSortPolicy, FILES_AND_FOLDERS_ROOT, STORAGE_ROOT_PARENT,
};
use crate::error::{IoResultExt, MtpError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Bytes handed to a push sink per call
pub const DEFAULT_PUSH_CHUNK: usize = 64 * 1024;

/// Bytes requested from a pull source per call; deliberately different
/// from the push size, as on real hardware
pub const DEFAULT_PULL_CHUNK: usize = 48 * 1024;

/// Faults a simulated device injects into its calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultPlan {
    /// Fail a fetch once this many bytes have been pushed
    pub fail_fetch_after: Option<u64>,
    /// Fail a send once this many bytes have been pulled
    pub fail_send_after: Option<u64>,
    /// Panic inside the named transport call
    pub panic_in: Option<String>,
    /// Sleep before each chunk
    pub chunk_delay_ms: Option<u64>,
    /// Refuse to open sessions
    pub refuse_open: bool,
}

impl FaultPlan {
    fn check_panic(&self, call: &str) {
        if self.panic_in.as_deref() == Some(call) {
            panic!("injected fault in {call}");
        }
    }

    fn pause(&self) {
        if let Some(ms) = self.chunk_delay_ms {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }
}

/// Object payload in a bus image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectContent {
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl ObjectContent {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }
}

/// One object in a bus image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectImage {
    /// Metadata; `size` is recomputed from `content` when present
    #[serde(flatten)]
    pub record: FileRecord,
    /// Payload, absent for folders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ObjectContent>,
}

/// One simulated device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceImage {
    /// Bus identity
    pub raw: RawDevice,
    /// Identity strings
    #[serde(default)]
    pub info: DeviceInfo,
    /// Storage areas
    #[serde(default)]
    pub storages: Vec<StorageInfo>,
    /// Objects across all storages
    #[serde(default)]
    pub objects: Vec<ObjectImage>,
    /// Injected faults
    #[serde(default)]
    pub faults: FaultPlan,
}

/// Storage id given to the default storage of `DeviceImage::new`
pub const DEFAULT_STORAGE_ID: u32 = 0x0001_0001;

impl DeviceImage {
    /// Device with one empty internal storage
    pub fn new(bus_location: u32, devnum: u8, vendor: &str) -> Self {
        Self {
            raw: RawDevice {
                bus_location,
                devnum,
                vendor: vendor.to_string(),
                vendor_id: 0,
                product: String::new(),
                product_id: 0,
            },
            info: DeviceInfo {
                friendly_name: format!("{vendor} device"),
                model_name: "Simulated".to_string(),
                serial_number: format!("{bus_location:04}-{devnum:03}"),
                device_version: "1.0".to_string(),
            },
            storages: vec![StorageInfo {
                id: DEFAULT_STORAGE_ID,
                description: "Internal storage".to_string(),
                max_capacity: 16 * 1024 * 1024 * 1024,
                free_space: 8 * 1024 * 1024 * 1024,
            }],
            objects: Vec::new(),
            faults: FaultPlan::default(),
        }
    }

    /// Add a storage area
    pub fn with_storage(mut self, storage: StorageInfo) -> Self {
        self.storages.push(storage);
        self
    }

    /// Add a folder on the first storage
    pub fn with_folder(mut self, id: u32, parent_id: u32, name: &str) -> Self {
        let storage_id = self.first_storage();
        self.objects.push(ObjectImage {
            record: FileRecord {
                id,
                parent_id,
                storage_id,
                name: name.to_string(),
                size: 0,
                file_type: FileType::Folder,
                modified: None,
            },
            content: None,
        });
        self
    }

    /// Add a file on the first storage
    pub fn with_file(mut self, id: u32, parent_id: u32, name: &str, data: impl Into<Vec<u8>>) -> Self {
        let storage_id = self.first_storage();
        let data = data.into();
        self.objects.push(ObjectImage {
            record: FileRecord {
                id,
                parent_id,
                storage_id,
                name: name.to_string(),
                size: data.len() as u64,
                file_type: FileType::from_name(name),
                modified: None,
            },
            content: Some(ObjectContent::Bytes(data)),
        });
        self
    }

    /// Inject faults
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    fn first_storage(&self) -> u32 {
        self.storages.first().map(|s| s.id).unwrap_or(DEFAULT_STORAGE_ID)
    }
}

/// A whole simulated bus
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusImage {
    /// Attached devices
    #[serde(default)]
    pub devices: Vec<DeviceImage>,
}

impl BusImage {
    /// Reject object ids that collide with the root markers or repeat
    /// within one device
    pub fn validate(&self) -> Result<()> {
        for device in &self.devices {
            let mut seen = HashSet::new();
            for object in &device.objects {
                let id = object.record.id;
                if is_root(id) {
                    return Err(MtpError::config(format!(
                        "device {}: object '{}' uses reserved id {:#x}",
                        device.raw.label(),
                        object.record.name,
                        id
                    )));
                }
                if !seen.insert(id) {
                    return Err(MtpError::config(format!(
                        "device {}: duplicate object id {}",
                        device.raw.label(),
                        id
                    )));
                }
            }
        }
        Ok(())
    }
}

struct StoredObject {
    record: FileRecord,
    data: Vec<u8>,
}

struct DeviceState {
    raw: RawDevice,
    info: DeviceInfo,
    storages: Vec<StorageInfo>,
    objects: BTreeMap<u32, StoredObject>,
    next_id: u32,
    faults: FaultPlan,
}

impl DeviceState {
    fn from_image(image: DeviceImage) -> Self {
        let mut objects = BTreeMap::new();
        for object in image.objects {
            let mut record = object.record;
            let data = object.content.map(ObjectContent::into_bytes).unwrap_or_default();
            if !record.is_folder() {
                record.size = data.len() as u64;
            }
            objects.insert(record.id, StoredObject { record, data });
        }

        let next_id = objects
            .keys()
            .next_back()
            .and_then(|id| id.checked_add(1))
            .unwrap_or(1);

        Self {
            raw: image.raw,
            info: image.info,
            storages: image.storages,
            objects,
            next_id,
            faults: image.faults,
        }
    }

    fn storage_exists(&self, storage: u32) -> bool {
        storage == 0 || self.storages.iter().any(|s| s.id == storage)
    }

    fn folder_exists(&self, parent: u32) -> bool {
        is_root(parent)
            || self
                .objects
                .get(&parent)
                .map(|o| o.record.is_folder())
                .unwrap_or(false)
    }

    fn name_taken(&self, parent: u32, name: &str, except: u32) -> bool {
        self.objects.values().any(|o| {
            o.record.id != except
                && same_parent(o.record.parent_id, parent)
                && o.record.name.eq_ignore_ascii_case(name)
        })
    }

    /// Next free object id; `None` once every usable id is taken
    fn allocate_id(&mut self) -> Option<u32> {
        let free = |objects: &BTreeMap<u32, StoredObject>, id: u32| {
            !is_root(id) && !objects.contains_key(&id)
        };

        let id = if free(&self.objects, self.next_id) {
            self.next_id
        } else {
            (1..FILES_AND_FOLDERS_ROOT).find(|&id| free(&self.objects, id))?
        };
        // Wrapping to 0 forces a scan on the next call
        self.next_id = id.checked_add(1).unwrap_or(0);
        Some(id)
    }

    fn insert(&mut self, mut record: FileRecord, data: Vec<u8>) -> Option<u32> {
        let id = self.allocate_id()?;
        record.id = id;
        if is_root(record.parent_id) {
            record.parent_id = STORAGE_ROOT_PARENT;
        }
        self.objects.insert(id, StoredObject { record, data });
        Some(id)
    }

    fn remove_tree(&mut self, id: u32) {
        if self.objects.remove(&id).is_none() {
            return;
        }
        let children: Vec<u32> = self
            .objects
            .values()
            .filter(|o| o.record.parent_id == id)
            .map(|o| o.record.id)
            .collect();
        for child in children {
            self.remove_tree(child);
        }
    }
}

fn is_root(parent: u32) -> bool {
    parent == STORAGE_ROOT_PARENT || parent == FILES_AND_FOLDERS_ROOT
}

fn same_parent(a: u32, b: u32) -> bool {
    a == b || (is_root(a) && is_root(b))
}

struct BusState {
    devices: Vec<DeviceState>,
    sessions: HashMap<SessionId, usize>,
    next_session: SessionId,
}

/// Simulated device bus implementing [`Transport`]
pub struct MemoryTransport {
    state: Mutex<BusState>,
    push_chunk: usize,
    pull_chunk: usize,
}

impl MemoryTransport {
    /// Empty bus
    pub fn new() -> Self {
        Self::from_image(BusImage::default())
    }

    /// Bus populated from an image
    pub fn from_image(image: BusImage) -> Self {
        Self {
            state: Mutex::new(BusState {
                devices: image.devices.into_iter().map(DeviceState::from_image).collect(),
                sessions: HashMap::new(),
                next_session: 1,
            }),
            push_chunk: DEFAULT_PUSH_CHUNK,
            pull_chunk: DEFAULT_PULL_CHUNK,
        }
    }

    /// Load a JSON bus image from disk
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_path(path)?;
        let image: BusImage = serde_json::from_str(&text)?;
        image.validate()?;
        tracing::debug!("Loaded bus image with {} device(s) from {:?}", image.devices.len(), path);
        Ok(Self::from_image(image))
    }

    /// Override the chunk sizes used when streaming
    pub fn with_chunk_sizes(mut self, push_chunk: usize, pull_chunk: usize) -> Self {
        self.push_chunk = push_chunk.max(1);
        self.pull_chunk = pull_chunk.max(1);
        self
    }

    /// Attach a device and return its raw descriptor
    pub fn add_device(&self, image: DeviceImage) -> RawDevice {
        let raw = image.raw.clone();
        self.state().devices.push(DeviceState::from_image(image));
        raw
    }

    /// Replace the fault plan of an attached device
    pub fn set_faults(&self, raw: &RawDevice, faults: FaultPlan) {
        let mut state = self.state();
        if let Some(device) = state.devices.iter_mut().find(|d| d.raw == *raw) {
            device.faults = faults;
        }
    }

    /// Number of sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.state().sessions.len()
    }

    /// Payload of an object, `None` if absent
    pub fn object_data(&self, raw: &RawDevice, id: u32) -> Option<Vec<u8>> {
        let state = self.state();
        let device = state.devices.iter().find(|d| d.raw == *raw)?;
        device.objects.get(&id).map(|o| o.data.clone())
    }

    /// Metadata of every object on a device
    pub fn objects(&self, raw: &RawDevice) -> Vec<FileRecord> {
        let state = self.state();
        state
            .devices
            .iter()
            .find(|d| d.raw == *raw)
            .map(|d| d.objects.values().map(|o| o.record.clone()).collect())
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_device<R>(&self, session: SessionId, f: impl FnOnce(&mut DeviceState) -> R) -> Option<R> {
        let mut state = self.state();
        let index = *state.sessions.get(&session)?;
        state.devices.get_mut(index).map(f)
    }

    fn faults(&self, session: SessionId) -> Option<FaultPlan> {
        self.with_device(session, |d| d.faults.clone())
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn detect_raw_devices(&self) -> (Status, Vec<RawDevice>) {
        let raws: Vec<RawDevice> = self.state().devices.iter().map(|d| d.raw.clone()).collect();
        if raws.is_empty() {
            (STATUS_NO_DEVICE_ATTACHED, raws)
        } else {
            (0, raws)
        }
    }

    fn open_raw_device(&self, raw: &RawDevice, _cached: bool) -> Option<SessionId> {
        let mut state = self.state();
        let index = state
            .devices
            .iter()
            .position(|d| d.raw.bus_location == raw.bus_location && d.raw.devnum == raw.devnum)?;

        if state.devices[index].faults.refuse_open {
            return None;
        }

        let session = state.next_session;
        state.next_session += 1;
        state.sessions.insert(session, index);
        Some(session)
    }

    fn release_device(&self, session: SessionId) {
        self.state().sessions.remove(&session);
    }

    fn device_info(&self, session: SessionId) -> DeviceInfo {
        self.with_device(session, |d| d.info.clone()).unwrap_or_default()
    }

    fn get_storage(&self, session: SessionId, sort: StorageSortPolicy) -> Status {
        let sorted = self.with_device(session, |d| match sort {
            StorageSortPolicy::NotSorted => {}
            StorageSortPolicy::FreeSpace => d.storages.sort_by(|a, b| b.free_space.cmp(&a.free_space)),
            StorageSortPolicy::MaxSpace => d.storages.sort_by(|a, b| b.max_capacity.cmp(&a.max_capacity)),
        });

        match sorted {
            Some(()) => 0,
            None => STATUS_FAILED,
        }
    }

    fn storages(&self, session: SessionId) -> Vec<StorageInfo> {
        self.with_device(session, |d| d.storages.clone()).unwrap_or_default()
    }

    fn get_files_and_folders(&self, session: SessionId, storage: u32, parent: u32) -> Vec<FileRecord> {
        self.with_device(session, |d| {
            d.objects
                .values()
                .filter(|o| storage == 0 || o.record.storage_id == storage)
                .filter(|o| same_parent(o.record.parent_id, parent))
                .map(|o| o.record.clone())
                .collect()
        })
        .unwrap_or_default()
    }

    fn get_file_metadata(&self, session: SessionId, id: u32) -> Option<FileRecord> {
        self.with_device(session, |d| d.objects.get(&id).map(|o| o.record.clone()))
            .flatten()
    }

    fn set_file_name(&self, session: SessionId, file: &FileRecord, name: &str) -> Status {
        let renamed = self.with_device(session, |d| {
            if !is_valid_object_name(name) || d.name_taken(file.parent_id, name, file.id) {
                return false;
            }
            match d.objects.get_mut(&file.id) {
                Some(object) => {
                    object.record.name = name.to_string();
                    true
                }
                None => false,
            }
        });

        match renamed {
            Some(true) => 0,
            _ => STATUS_FAILED,
        }
    }

    fn create_folder(&self, session: SessionId, name: &str, parent: u32, storage: u32) -> u32 {
        self.with_device(session, |d| {
            if !is_valid_object_name(name)
                || !d.storage_exists(storage)
                || !d.folder_exists(parent)
                || d.name_taken(parent, name, 0)
            {
                return 0;
            }
            let storage_id = if storage == 0 {
                d.storages.first().map(|s| s.id).unwrap_or(DEFAULT_STORAGE_ID)
            } else {
                storage
            };
            let record = FileRecord {
                id: 0,
                parent_id: parent,
                storage_id,
                name: name.to_string(),
                size: 0,
                file_type: FileType::Folder,
                modified: None,
            };
            d.insert(record, Vec::new()).unwrap_or(0)
        })
        .unwrap_or(0)
    }

    fn delete_object(&self, session: SessionId, id: u32) -> Status {
        let deleted = self.with_device(session, |d| {
            if d.objects.contains_key(&id) {
                d.remove_tree(id);
                true
            } else {
                false
            }
        });

        match deleted {
            Some(true) => 0,
            _ => STATUS_FAILED,
        }
    }

    fn get_file_to_handler(
        &self,
        session: SessionId,
        id: u32,
        sink: &mut PushSink<'_>,
        mut progress: Option<&mut ProgressCallback<'_>>,
    ) -> Status {
        let Some(faults) = self.faults(session) else {
            return STATUS_FAILED;
        };
        faults.check_panic("get_file_to_handler");

        // Copy out so the bus lock is not held while the sink blocks
        let data = self
            .with_device(session, |d| {
                d.objects
                    .get(&id)
                    .filter(|o| !o.record.is_folder())
                    .map(|o| o.data.clone())
            })
            .flatten();
        let Some(data) = data else {
            return STATUS_FAILED;
        };

        let total = data.len() as u64;
        let mut sent = 0u64;

        for chunk in data.chunks(self.push_chunk) {
            if faults.fail_fetch_after.map(|limit| sent >= limit).unwrap_or(false) {
                return STATUS_FAILED;
            }
            faults.pause();

            if !sink(chunk) {
                return STATUS_CALLBACK_ABORTED;
            }

            sent += chunk.len() as u64;
            if let Some(cb) = progress.as_deref_mut() {
                cb(sent, total);
            }
        }

        0
    }

    fn send_file_from_handler(
        &self,
        session: SessionId,
        source: &mut PullSource<'_>,
        metadata: &mut FileRecord,
        mut progress: Option<&mut ProgressCallback<'_>>,
    ) -> Status {
        let Some(faults) = self.faults(session) else {
            return STATUS_FAILED;
        };
        faults.check_panic("send_file_from_handler");

        let accepted = self
            .with_device(session, |d| {
                is_valid_object_name(&metadata.name)
                    && d.storage_exists(metadata.storage_id)
                    && d.folder_exists(metadata.parent_id)
                    && !d.name_taken(metadata.parent_id, &metadata.name, 0)
            })
            .unwrap_or(false);
        if !accepted {
            return STATUS_FAILED;
        }

        let total = metadata.size;
        let mut data = Vec::with_capacity(total.min(1 << 20) as usize);
        let mut buf = vec![0u8; self.pull_chunk];

        while (data.len() as u64) < total {
            let received = data.len() as u64;
            if faults.fail_send_after.map(|limit| received >= limit).unwrap_or(false) {
                return STATUS_FAILED;
            }
            faults.pause();

            let want = (self.pull_chunk as u64).min(total - received) as usize;
            match source(&mut buf[..want]) {
                None => return STATUS_CALLBACK_ABORTED,
                // Source ran dry before the announced size
                Some(0) => return STATUS_FAILED,
                Some(n) => data.extend_from_slice(&buf[..n.min(want)]),
            }

            if let Some(cb) = progress.as_deref_mut() {
                cb(data.len() as u64, total);
            }
        }

        let mut record = metadata.clone();
        if record.file_type == FileType::Unknown {
            record.file_type = FileType::from_name(&record.name);
        }

        match self.with_device(session, |d| d.insert(record, data)).flatten() {
            Some(id) => {
                metadata.id = id;
                0
            }
            None => STATUS_FAILED,
        }
    }
}
