//! Recursive listing and whole-tree transfers
//!
//! The tree descriptors run on one worker and drive the per-object
//! descriptors inline, so a folder transfer occupies a single pool slot.

use super::operations::{CreateFolder, DownloadToFile, Operation, OperationKind, UploadFromFile};
use crate::device::{is_valid_object_name, DeviceHandle, FileRecord, SessionId, Transport, FILES_AND_FOLDERS_ROOT};
use crate::error::{IoResultExt, MtpError, Result};
use crate::progress::ProgressFn;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One object in a recursive listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    /// Object metadata
    #[serde(flatten)]
    pub record: FileRecord,
    /// Absolute device path
    pub path: String,
    /// Folder contents; empty for files and for folders past the depth limit
    pub children: Vec<TreeEntry>,
}

impl TreeEntry {
    /// Visit this entry and every descendant, parents first
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TreeEntry)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Counts of a finished tree transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeTally {
    /// Files transferred
    pub files: u64,
    /// Folders created
    pub folders: u64,
    /// Payload bytes transferred
    pub bytes: u64,
}

/// Dot files such as `.git` or `.DS_Store`; `.` and `..` style names are
/// not hidden
pub fn is_hidden(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('.') && chars.next().is_some_and(|c| c != '.')
}

/// `parent/name` on the device
fn join_remote(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Listing rules shared by every tree walk
#[derive(Debug, Clone, Copy)]
struct WalkRules {
    recursive: bool,
    ignore_hidden: bool,
    max_depth: usize,
}

fn walk_folder(
    transport: &dyn Transport,
    session: SessionId,
    folder: u32,
    path: &str,
    depth: usize,
    rules: WalkRules,
    visited: &mut HashSet<u32>,
) -> Vec<TreeEntry> {
    let mut entries = Vec::new();

    for record in transport.get_files_and_folders(session, 0, folder) {
        if rules.ignore_hidden && is_hidden(&record.name) {
            continue;
        }
        // A listing that repeats an id would otherwise loop forever
        if !visited.insert(record.id) {
            tracing::warn!("Object {} listed twice, skipping", record.id);
            continue;
        }

        let entry_path = join_remote(path, &record.name);
        let children = if record.is_folder() && rules.recursive && depth < rules.max_depth {
            walk_folder(transport, session, record.id, &entry_path, depth + 1, rules, visited)
        } else {
            Vec::new()
        };

        entries.push(TreeEntry {
            record,
            path: entry_path,
            children,
        });
    }

    entries
}

/// List a folder, optionally with all its descendants
#[derive(Debug, Clone)]
pub struct ListTree {
    /// Target session
    pub device: DeviceHandle,
    /// Folder id, or the files-and-folders root
    pub folder: u32,
    /// Device path of `folder`, used to build entry paths
    pub path: String,
    /// Descend into subfolders
    pub recursive: bool,
    /// Skip dot files and dot folders
    pub ignore_hidden: bool,
    /// Deepest level listed
    pub max_depth: usize,
}

impl Operation for ListTree {
    type Output = Vec<TreeEntry>;
    const KIND: OperationKind = OperationKind::ListTree;

    fn run(self, transport: &dyn Transport) -> Result<Self::Output> {
        let session = self.device.session()?;
        let rules = WalkRules {
            recursive: self.recursive,
            ignore_hidden: self.ignore_hidden,
            max_depth: self.max_depth.max(1),
        };
        Ok(walk_folder(transport, session, self.folder, &self.path, 1, rules, &mut HashSet::new()))
    }
}

/// Download a file or a whole folder into a local path
pub struct DownloadTree {
    /// Target session
    pub device: DeviceHandle,
    /// File, folder or the files-and-folders root
    pub object_id: u32,
    /// Local file for a file, local directory for a folder
    pub destination: PathBuf,
    /// Skip dot files and dot folders
    pub ignore_hidden: bool,
    /// Deepest folder level copied
    pub max_depth: usize,
    /// Progress reporter, fed per file
    pub progress: Option<ProgressFn>,
}

impl DownloadTree {
    fn download_entries(&self, transport: &dyn Transport, entries: &[TreeEntry], dir: &Path, tally: &mut TreeTally) -> Result<()> {
        for entry in entries {
            // Device names end up as local path components
            if !is_valid_object_name(&entry.record.name) {
                return Err(MtpError::InvalidName(entry.path.clone()));
            }
            let local = dir.join(&entry.record.name);

            if entry.record.is_folder() {
                fs::create_dir_all(&local).with_path(&local)?;
                tally.folders += 1;
                self.download_entries(transport, &entry.children, &local, tally)?;
                continue;
            }

            tally.bytes += DownloadToFile {
                device: self.device.clone(),
                object_id: entry.record.id,
                path: local,
                progress: self.progress.clone(),
            }
            .run(transport)?;
            tally.files += 1;
        }
        Ok(())
    }
}

impl Operation for DownloadTree {
    type Output = TreeTally;
    const KIND: OperationKind = OperationKind::DownloadTree;

    fn run(self, transport: &dyn Transport) -> Result<TreeTally> {
        let session = self.device.session()?;
        let mut tally = TreeTally::default();

        if self.object_id != FILES_AND_FOLDERS_ROOT {
            let record = transport
                .get_file_metadata(session, self.object_id)
                .ok_or_else(|| MtpError::NotFound(format!("object {}", self.object_id)))?;

            if !record.is_folder() {
                if let Some(parent) = self.destination.parent() {
                    fs::create_dir_all(parent).with_path(parent)?;
                }
                tally.bytes = DownloadToFile {
                    device: self.device.clone(),
                    object_id: self.object_id,
                    path: self.destination.clone(),
                    progress: self.progress.clone(),
                }
                .run(transport)?;
                tally.files = 1;
                return Ok(tally);
            }
        }

        let rules = WalkRules {
            recursive: true,
            ignore_hidden: self.ignore_hidden,
            max_depth: self.max_depth.max(1),
        };
        let entries = walk_folder(transport, session, self.object_id, "/", 1, rules, &mut HashSet::new());

        fs::create_dir_all(&self.destination).with_path(&self.destination)?;
        self.download_entries(transport, &entries, &self.destination, &mut tally)?;

        tracing::info!(
            "Downloaded {} file(s) in {} folder(s) to {:?}",
            tally.files,
            tally.folders,
            self.destination
        );
        Ok(tally)
    }
}

/// Upload a local file or a whole directory
pub struct UploadTree {
    /// Target session
    pub device: DeviceHandle,
    /// Local file or directory
    pub source: PathBuf,
    /// Parent folder id on the device
    pub parent: u32,
    /// Storage id
    pub storage: u32,
    /// Name of the top-level object, defaults to the local name
    pub name: Option<String>,
    /// Skip dot files and dot directories
    pub ignore_hidden: bool,
    /// Progress reporter, fed per file
    pub progress: Option<ProgressFn>,
}

impl Operation for UploadTree {
    type Output = TreeTally;
    const KIND: OperationKind = OperationKind::UploadTree;

    fn run(self, transport: &dyn Transport) -> Result<TreeTally> {
        self.device.session()?;
        let mut tally = TreeTally::default();

        let metadata = fs::metadata(&self.source).with_path(&self.source)?;
        if !metadata.is_dir() {
            let record = UploadFromFile {
                device: self.device.clone(),
                path: self.source.clone(),
                parent: self.parent,
                storage: self.storage,
                name: self.name.clone(),
                progress: self.progress.clone(),
            }
            .run(transport)?;
            tally.files = 1;
            tally.bytes = record.size;
            return Ok(tally);
        }

        let name = match &self.name {
            Some(name) => name.clone(),
            None => self
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| MtpError::InvalidName(self.source.display().to_string()))?,
        };
        let root = CreateFolder {
            device: self.device.clone(),
            name,
            parent: self.parent,
            storage: self.storage,
        }
        .run(transport)?;
        tally.folders = 1;

        // Local directory to device folder id
        let mut folders = HashMap::from([(self.source.clone(), root)]);
        let ignore_hidden = self.ignore_hidden;
        let walker = WalkDir::new(&self.source)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !(ignore_hidden && is_hidden(&e.file_name().to_string_lossy())));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.source.clone());
                MtpError::io(path, e.into())
            })?;
            let path = entry.path();
            let parent = path
                .parent()
                .and_then(|p| folders.get(p))
                .copied()
                .ok_or_else(|| MtpError::NotFound(path.display().to_string()))?;

            if entry.file_type().is_dir() {
                let id = CreateFolder {
                    device: self.device.clone(),
                    name: entry.file_name().to_string_lossy().into_owned(),
                    parent,
                    storage: self.storage,
                }
                .run(transport)?;
                folders.insert(path.to_path_buf(), id);
                tally.folders += 1;
            } else if entry.file_type().is_file() {
                let record = UploadFromFile {
                    device: self.device.clone(),
                    path: path.to_path_buf(),
                    parent,
                    storage: self.storage,
                    name: None,
                    progress: self.progress.clone(),
                }
                .run(transport)?;
                tally.files += 1;
                tally.bytes += record.size;
            } else {
                tracing::debug!("Skipping {:?}: not a regular file", path);
            }
        }

        tracing::info!(
            "Uploaded {} file(s) in {} folder(s) from {:?}",
            tally.files,
            tally.folders,
            self.source
        );
        Ok(tally)
    }
}
