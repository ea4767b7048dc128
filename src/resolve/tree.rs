//! Folder tree snapshot
//!
//! An arena of folder nodes rebuilt from flat records by parent id.
//! Siblings keep the order in which they appear in the snapshot.

use crate::device::{FileRecord, FolderRecord};
use std::collections::HashMap;

/// One folder and the arena indices of its children
#[derive(Debug, Clone)]
pub struct FolderNode {
    /// Snapshot of the folder
    pub record: FolderRecord,
    /// Child indices, in snapshot order
    pub children: Vec<usize>,
}

/// Read-only folder hierarchy of one device
#[derive(Debug, Clone, Default)]
pub struct FolderTree {
    nodes: Vec<FolderNode>,
    roots: Vec<usize>,
    /// First node carrying each id
    by_id: HashMap<u32, usize>,
}

impl FolderTree {
    /// Build from flat folder records
    pub fn from_records(records: impl IntoIterator<Item = FolderRecord>) -> Self {
        let nodes: Vec<FolderNode> = records
            .into_iter()
            .map(|record| FolderNode {
                record,
                children: Vec::new(),
            })
            .collect();

        let mut by_id = HashMap::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            by_id.entry(node.record.id).or_insert(index);
        }

        let mut tree = Self {
            nodes,
            roots: Vec::new(),
            by_id,
        };

        for index in 0..tree.nodes.len() {
            match tree.by_id.get(&tree.nodes[index].record.parent_id).copied() {
                Some(parent) => tree.nodes[parent].children.push(index),
                None => tree.roots.push(index),
            }
        }

        tree
    }

    /// Build from a listing that mixes files and folders
    pub fn from_listing(objects: &[FileRecord]) -> Self {
        Self::from_records(objects.iter().filter(|o| o.is_folder()).map(FolderRecord::from))
    }

    /// Top-level folders, in snapshot order
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Node at an arena index
    pub fn node(&self, index: usize) -> Option<&FolderNode> {
        self.nodes.get(index)
    }

    /// Folder record by id
    pub fn get(&self, id: u32) -> Option<&FolderRecord> {
        self.by_id.get(&id).map(|&i| &self.nodes[i].record)
    }

    /// Number of folders
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tree holds no folders
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Absolute path of a folder, `None` if unknown or its parent chain
    /// loops
    pub fn path_of(&self, id: u32) -> Option<String> {
        let mut names = Vec::new();
        let mut current = *self.by_id.get(&id)?;

        loop {
            let node = &self.nodes[current];
            names.push(node.record.name.as_str());
            if names.len() > self.nodes.len() {
                return None;
            }
            match self.by_id.get(&node.record.parent_id) {
                Some(&parent) => current = parent,
                None => break,
            }
        }

        names.reverse();
        Some(format!("/{}", names.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: u32, parent_id: u32, name: &str) -> FolderRecord {
        FolderRecord {
            id,
            parent_id,
            storage_id: 1,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_children_keep_snapshot_order() {
        let tree = FolderTree::from_records(vec![
            folder(1, 0, "Music"),
            folder(5, 1, "Rock"),
            folder(2, 0, "DCIM"),
            folder(4, 1, "Jazz"),
        ]);

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.roots().len(), 2);

        let music = tree.node(tree.roots()[0]).unwrap();
        let names: Vec<_> = music
            .children
            .iter()
            .map(|&i| tree.node(i).unwrap().record.name.as_str())
            .collect();
        assert_eq!(names, ["Rock", "Jazz"]);
    }

    #[test]
    fn test_path_of() {
        let tree = FolderTree::from_records(vec![folder(1, 0, "A"), folder(2, 1, "B")]);
        assert_eq!(tree.path_of(2).as_deref(), Some("/A/B"));
        assert_eq!(tree.path_of(9), None);
    }

    #[test]
    fn test_path_of_cycle() {
        let tree = FolderTree::from_records(vec![folder(1, 2, "A"), folder(2, 1, "B")]);
        assert_eq!(tree.path_of(1), None);
    }

    #[test]
    fn test_from_listing_skips_files() {
        let mut file = FileRecord::for_upload("a.txt", 3, 0, 1);
        file.id = 7;
        let mut dir = FileRecord::for_upload("Docs", 0, 0, 1);
        dir.id = 8;
        dir.file_type = crate::device::FileType::Folder;

        let tree = FolderTree::from_listing(&[file, dir]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(8).unwrap().name, "Docs");
    }
}
