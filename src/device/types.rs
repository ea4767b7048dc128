//! Metadata snapshots exchanged with a device transport
//!
//! Every record here is a flat copy taken at enumeration time. Nothing
//! updates them when the remote object changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parent id used by the transport for "the whole storage, root level"
pub const FILES_AND_FOLDERS_ROOT: u32 = 0xFFFF_FFFF;

/// Parent id that objects at the storage root carry in listings
pub const STORAGE_ROOT_PARENT: u32 = 0;

/// Check if a name is usable for a remote object
pub fn is_valid_object_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\0')
}

/// Object type as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Association (folder)
    Folder,
    /// Audio track
    Audio,
    /// Video clip
    Video,
    /// Still image
    Image,
    /// Plain text or document
    Text,
    /// Anything the transport could not classify
    #[default]
    Unknown,
}

impl FileType {
    /// Guess a type from a file name extension
    pub fn from_name(name: &str) -> Self {
        let ext = match name.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return Self::Unknown,
        };

        match ext.as_str() {
            "mp3" | "wav" | "flac" | "ogg" | "m4a" | "aac" | "wma" => Self::Audio,
            "mp4" | "avi" | "mkv" | "mov" | "wmv" | "3gp" => Self::Video,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tif" | "tiff" => Self::Image,
            "txt" | "md" | "csv" | "html" | "xml" | "json" => Self::Text,
            _ => Self::Unknown,
        }
    }

    /// Short lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Image => "image",
            Self::Text => "text",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Object id
    pub id: u32,
    /// Id of the containing folder
    pub parent_id: u32,
    /// Storage the object lives on
    pub storage_id: u32,
    /// File name
    pub name: String,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    /// Object type
    #[serde(default)]
    pub file_type: FileType,
    /// Last modification time
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Metadata for a new object about to be sent to a device
    pub fn for_upload(name: impl Into<String>, size: u64, parent_id: u32, storage_id: u32) -> Self {
        let name = name.into();
        Self {
            id: 0,
            parent_id,
            storage_id,
            file_type: FileType::from_name(&name),
            name,
            size,
            modified: Some(Utc::now()),
        }
    }

    /// Check if this record is a folder
    pub fn is_folder(&self) -> bool {
        self.file_type == FileType::Folder
    }
}

/// Snapshot of one folder; the tree is rebuilt from parent ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRecord {
    /// Folder id
    pub id: u32,
    /// Parent folder id
    pub parent_id: u32,
    /// Storage id
    pub storage_id: u32,
    /// Folder name
    pub name: String,
}

impl From<&FileRecord> for FolderRecord {
    fn from(file: &FileRecord) -> Self {
        Self {
            id: file.id,
            parent_id: file.parent_id,
            storage_id: file.storage_id,
            name: file.name.clone(),
        }
    }
}

/// A detected device endpoint that has not been opened yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDevice {
    /// USB bus location
    pub bus_location: u32,
    /// Device number on the bus
    pub devnum: u8,
    /// Vendor name, empty when the device entry has none
    #[serde(default)]
    pub vendor: String,
    /// USB vendor id
    #[serde(default)]
    pub vendor_id: u16,
    /// Product name
    #[serde(default)]
    pub product: String,
    /// USB product id
    #[serde(default)]
    pub product_id: u16,
}

impl RawDevice {
    /// Short human-readable label
    pub fn label(&self) -> String {
        let name = match (self.vendor.is_empty(), self.product.is_empty()) {
            (false, false) => format!("{} {}", self.vendor, self.product),
            (false, true) => self.vendor.clone(),
            (true, false) => self.product.clone(),
            (true, true) => "Unknown device".to_string(),
        };
        format!("{} (bus {}, dev {})", name, self.bus_location, self.devnum)
    }
}

/// One storage area on an open device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    /// Storage id
    pub id: u32,
    /// Storage description as reported by the device
    pub description: String,
    /// Capacity in bytes
    #[serde(default)]
    pub max_capacity: u64,
    /// Free space in bytes
    #[serde(default)]
    pub free_space: u64,
}

/// Identity strings of an open device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// User-assigned device name
    pub friendly_name: String,
    /// Model name
    pub model_name: String,
    /// Serial number
    pub serial_number: String,
    /// Firmware/device version
    pub device_version: String,
}

/// Order in which a device should report its storages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StorageSortPolicy {
    /// Device order
    #[default]
    NotSorted,
    /// Most free space first
    FreeSpace,
    /// Largest capacity first
    MaxSpace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_name() {
        assert_eq!(FileType::from_name("song.MP3"), FileType::Audio);
        assert_eq!(FileType::from_name("photo.jpeg"), FileType::Image);
        assert_eq!(FileType::from_name("README"), FileType::Unknown);
    }

    #[test]
    fn test_valid_object_name() {
        assert!(is_valid_object_name("notes.txt"));
        assert!(!is_valid_object_name(""));
        assert!(!is_valid_object_name(".."));
        assert!(!is_valid_object_name("a/b"));
    }

    #[test]
    fn test_raw_device_label() {
        let raw = RawDevice {
            bus_location: 2,
            devnum: 7,
            vendor: "Acme".to_string(),
            vendor_id: 0x1234,
            product: "Phone".to_string(),
            product_id: 0x5678,
        };
        assert_eq!(raw.label(), "Acme Phone (bus 2, dev 7)");
    }

    #[test]
    fn test_file_record_deserialize_defaults() {
        let record: FileRecord =
            serde_json::from_str(r#"{"id":3,"parent_id":2,"storage_id":1,"name":"c.txt"}"#).unwrap();
        assert_eq!(record.size, 0);
        assert_eq!(record.file_type, FileType::Unknown);
        assert!(record.modified.is_none());
    }
}
