//! Whole-device object snapshot
//!
//! Walks a device folder by folder through the executor and keeps the
//! result for path resolution.

use super::resolver::{PathResolver, DEFAULT_MAX_DEPTH};
use super::tree::FolderTree;
use crate::device::{DeviceHandle, FileRecord, FILES_AND_FOLDERS_ROOT};
use crate::error::{MtpError, Result};
use crate::executor::{ListFolder, TaskExecutor};
use std::collections::{HashSet, VecDeque};

/// Flat listing of every object on a device plus its folder tree
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    folders: FolderTree,
    objects: Vec<FileRecord>,
    max_depth: usize,
}

impl DeviceSnapshot {
    /// Build from an already collected listing
    pub fn from_objects(objects: Vec<FileRecord>) -> Self {
        Self {
            folders: FolderTree::from_listing(&objects),
            objects,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// List the whole device, breadth first, down to `max_depth` levels
    pub fn collect(executor: &TaskExecutor, device: &DeviceHandle, max_depth: usize) -> Result<Self> {
        let mut objects = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([(FILES_AND_FOLDERS_ROOT, 1usize)]);

        while let Some((parent, depth)) = queue.pop_front() {
            let listing = executor.call(ListFolder {
                device: device.clone(),
                storage: 0,
                parent,
            })?;

            for object in listing {
                if !seen.insert(object.id) {
                    continue;
                }
                if object.is_folder() && depth < max_depth {
                    queue.push_back((object.id, depth + 1));
                }
                objects.push(object);
            }
        }

        tracing::debug!("Snapshot of session {} holds {} object(s)", device.id(), objects.len());

        let mut snapshot = Self::from_objects(objects);
        snapshot.max_depth = max_depth;
        Ok(snapshot)
    }

    /// Resolver over this snapshot
    pub fn resolver(&self) -> PathResolver<'_> {
        PathResolver::new(&self.folders, &self.objects).with_max_depth(self.max_depth)
    }

    /// Resolve a path or literal id
    pub fn resolve(&self, path: &str) -> Option<u32> {
        self.resolver().resolve(path)
    }

    /// Resolve a path or literal id to an object that exists in this
    /// snapshot, or to the files-and-folders root
    pub fn lookup(&self, path: &str) -> Result<u32> {
        match self.resolve(path) {
            Some(id) if id == FILES_AND_FOLDERS_ROOT || self.get(id).is_some() => Ok(id),
            _ => Err(MtpError::NotFound(path.to_string())),
        }
    }

    /// Device path of a folder, `/` for the root
    pub fn folder_path(&self, id: u32) -> Option<String> {
        if id == FILES_AND_FOLDERS_ROOT {
            return Some("/".to_string());
        }
        self.folders.path_of(id)
    }

    /// Object by id
    pub fn get(&self, id: u32) -> Option<&FileRecord> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// Every object in the snapshot
    pub fn objects(&self) -> &[FileRecord] {
        &self.objects
    }

    /// Folder hierarchy
    pub fn folders(&self) -> &FolderTree {
        &self.folders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::device::{DeviceImage, FileType, MemoryTransport, Transport};
    use crate::executor::OpenDevice;
    use std::sync::Arc;

    #[test]
    fn test_collect_and_resolve() {
        let transport = Arc::new(MemoryTransport::new());
        let raw = transport.add_device(
            DeviceImage::new(1, 1, "Acme")
                .with_folder(1, 0, "A")
                .with_folder(2, 1, "B")
                .with_file(3, 2, "c.txt", "hello")
                .with_file(4, 0, "top.txt", "hi"),
        );

        let shared: Arc<dyn Transport> = transport;
        let executor = TaskExecutor::new(shared, &ExecutorConfig { workers: 2, queue_size: 8 }).unwrap();
        let device = executor.call(OpenDevice { raw, cached: true }).unwrap();

        let snapshot = DeviceSnapshot::collect(&executor, &device, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(snapshot.objects().len(), 4);
        assert_eq!(snapshot.folders().len(), 2);
        assert_eq!(snapshot.resolve("/A/B/c.txt"), Some(3));
        assert_eq!(snapshot.resolve("/top.txt"), Some(4));
        assert_eq!(snapshot.get(3).map(|o| o.size), Some(5));
    }

    #[test]
    fn test_lookup_requires_known_object() {
        let snapshot = DeviceSnapshot::from_objects(vec![
            FileRecord {
                id: 1,
                parent_id: 0,
                storage_id: 1,
                name: "A".to_string(),
                size: 0,
                file_type: FileType::Folder,
                modified: None,
            },
            FileRecord {
                id: 2,
                parent_id: 1,
                storage_id: 1,
                name: "b.txt".to_string(),
                size: 3,
                file_type: FileType::Text,
                modified: None,
            },
        ]);

        assert_eq!(snapshot.lookup("/").unwrap(), FILES_AND_FOLDERS_ROOT);
        assert_eq!(snapshot.lookup("/A/b.txt").unwrap(), 2);
        assert_eq!(snapshot.lookup("1").unwrap(), 1);
        assert!(matches!(snapshot.lookup("12345"), Err(MtpError::NotFound(_))));
        assert!(matches!(snapshot.lookup("/A/missing"), Err(MtpError::NotFound(_))));
        assert_eq!(snapshot.folder_path(1).as_deref(), Some("/A"));
        assert_eq!(snapshot.folder_path(FILES_AND_FOLDERS_ROOT).as_deref(), Some("/"));
    }
}
