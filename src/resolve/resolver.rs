//! Path to object id resolution
//!
//! Accepts either a literal id (`"42"`, `"0x2a"`, `"052"`), a bare file
//! name, or an absolute path such as `/Music/Rock/song.mp3`. Matching is
//! ASCII case-insensitive throughout.

use super::tree::FolderTree;
use crate::device::{FileRecord, FILES_AND_FOLDERS_ROOT, STORAGE_ROOT_PARENT};
use std::collections::HashSet;

/// Deepest folder level searched unless configured otherwise
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Resolves paths against a folder tree and file list snapshot
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a> {
    folders: &'a FolderTree,
    files: &'a [FileRecord],
    max_depth: usize,
}

impl<'a> PathResolver<'a> {
    /// Create a resolver over a snapshot
    pub fn new(folders: &'a FolderTree, files: &'a [FileRecord]) -> Self {
        Self {
            folders,
            files,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit how deep the folder walk descends
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Resolve a path or literal id to an object id
    pub fn resolve(&self, path: &str) -> Option<u32> {
        if !path.starts_with('/') {
            return match parse_numeric_id(path) {
                0 => self
                    .files
                    .iter()
                    .find(|f| f.name.eq_ignore_ascii_case(path))
                    .map(|f| f.id),
                id => Some(id),
            };
        }

        let path = normalize(path);
        if path == "/" {
            return Some(FILES_AND_FOLDERS_ROOT);
        }

        if let Some(id) = self.find_folder(&path) {
            return Some(id);
        }

        let (parent, leaf) = path.rsplit_once('/')?;
        let parent_id = if parent.is_empty() {
            None
        } else {
            Some(self.find_folder(parent)?)
        };

        self.files
            .iter()
            .find(|f| {
                let same_parent = match parent_id {
                    Some(id) => f.parent_id == id,
                    None => is_storage_root(f.parent_id),
                };
                same_parent && f.name.eq_ignore_ascii_case(leaf)
            })
            .map(|f| f.id)
    }

    /// Depth-first walk, child branch before sibling branch, descending
    /// only into folders whose path prefixes the target
    fn find_folder(&self, target: &str) -> Option<u32> {
        let mut stack: Vec<(usize, String, usize)> = self
            .folders
            .roots()
            .iter()
            .rev()
            .map(|&i| (i, String::new(), 1))
            .collect();
        let mut visited = HashSet::new();

        while let Some((index, parent_path, depth)) = stack.pop() {
            if depth > self.max_depth || !visited.insert(index) {
                continue;
            }
            let Some(node) = self.folders.node(index) else {
                continue;
            };

            let current = format!("{}/{}", parent_path, node.record.name);
            if current.eq_ignore_ascii_case(target) {
                return Some(node.record.id);
            }

            if starts_with_ignore_case(target, &current) {
                for &child in node.children.iter().rev() {
                    stack.push((child, current.clone(), depth + 1));
                }
            }
        }

        None
    }
}

fn is_storage_root(parent_id: u32) -> bool {
    parent_id == STORAGE_ROOT_PARENT || parent_id == FILES_AND_FOLDERS_ROOT
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Collapse repeated separators and drop a trailing one
fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

/// Parse the longest numeric prefix of `s` the way C `strtoul` does with
/// base 0: `0x` for hex, a leading `0` for octal, decimal otherwise.
/// Returns `0` when there is no numeric prefix.
pub fn parse_numeric_id(s: &str) -> u32 {
    let s = s.trim_start();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let bytes = s.as_bytes();
    let (radix, digits) = if bytes.len() > 2
        && bytes[0] == b'0'
        && (bytes[1] == b'x' || bytes[1] == b'X')
        && bytes[2].is_ascii_hexdigit()
    {
        (16, &s[2..])
    } else if bytes.first() == Some(&b'0') {
        (8, s)
    } else {
        (10, s)
    };

    let mut value: u64 = 0;
    let mut overflow = false;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else {
            break;
        };
        match value.checked_mul(u64::from(radix)).and_then(|v| v.checked_add(u64::from(d))) {
            Some(v) => value = v,
            None => overflow = true,
        }
    }

    // Saturate like strtoul, then narrow to the 32-bit object id
    let value = if overflow { u64::MAX } else { value };
    let value = if negative && !overflow { value.wrapping_neg() } else { value };
    value as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{FileType, FolderRecord};
    use proptest::prelude::*;

    fn record(id: u32, parent_id: u32, name: &str, file_type: FileType) -> FileRecord {
        FileRecord {
            id,
            parent_id,
            storage_id: 1,
            name: name.to_string(),
            size: 0,
            file_type,
            modified: None,
        }
    }

    fn folder(id: u32, parent_id: u32, name: &str) -> FolderRecord {
        FolderRecord {
            id,
            parent_id,
            storage_id: 1,
            name: name.to_string(),
        }
    }

    /// /A (1) / B (2) / c.txt (3)
    fn fixture() -> (FolderTree, Vec<FileRecord>) {
        let tree = FolderTree::from_records(vec![folder(1, 0, "A"), folder(2, 1, "B")]);
        let files = vec![record(3, 2, "c.txt", FileType::Text)];
        (tree, files)
    }

    #[test]
    fn test_fixture() {
        let (tree, files) = fixture();
        let resolver = PathResolver::new(&tree, &files);

        assert_eq!(resolver.resolve("/A/B/c.txt"), Some(3));
        assert_eq!(resolver.resolve("/A/B"), Some(2));
        assert_eq!(resolver.resolve("/A/X"), None);
        assert_eq!(resolver.resolve("3"), Some(3));
    }

    #[test]
    fn test_case_insensitive() {
        let (tree, files) = fixture();
        let resolver = PathResolver::new(&tree, &files);

        assert_eq!(resolver.resolve("/a/b/C.TXT"), Some(3));
        assert_eq!(resolver.resolve("C.txt"), Some(3));
    }

    #[test]
    fn test_root_and_normalization() {
        let (tree, mut files) = fixture();
        files.push(record(9, 0, "top.bin", FileType::Unknown));
        let resolver = PathResolver::new(&tree, &files);

        assert_eq!(resolver.resolve("/"), Some(FILES_AND_FOLDERS_ROOT));
        assert_eq!(resolver.resolve("//A//B/"), Some(2));
        assert_eq!(resolver.resolve("/top.bin"), Some(9));
    }

    #[test]
    fn test_literal_ids() {
        let (tree, files) = fixture();
        let resolver = PathResolver::new(&tree, &files);

        assert_eq!(resolver.resolve("0x1f"), Some(31));
        assert_eq!(resolver.resolve("017"), Some(15));
        assert_eq!(resolver.resolve("12abc"), Some(12));
        assert_eq!(resolver.resolve("missing.txt"), None);
    }

    #[test]
    fn test_child_before_sibling() {
        // Two folders share a name prefix; the nested match must win over a
        // later top-level sibling with the same full path
        let tree = FolderTree::from_records(vec![
            folder(1, 0, "Media"),
            folder(2, 1, "Clips"),
            folder(3, 0, "Media"),
            folder(4, 3, "Clips"),
        ]);
        let resolver = PathResolver::new(&tree, &[]);
        assert_eq!(resolver.resolve("/Media/Clips"), Some(2));
    }

    #[test]
    fn test_prefix_without_match_is_not_found() {
        let tree = FolderTree::from_records(vec![folder(1, 0, "Music"), folder(2, 1, "Rock")]);
        let resolver = PathResolver::new(&tree, &[]);

        assert_eq!(resolver.resolve("/Mus"), None);
        assert_eq!(resolver.resolve("/Music/Pop"), None);
    }

    #[test]
    fn test_depth_limit() {
        let (tree, files) = fixture();
        let resolver = PathResolver::new(&tree, &files).with_max_depth(1);

        assert_eq!(resolver.resolve("/A"), Some(1));
        assert_eq!(resolver.resolve("/A/B"), None);
    }

    #[test]
    fn test_duplicate_ids_terminate() {
        let tree = FolderTree::from_records(vec![folder(1, 1, "Loop"), folder(1, 0, "Loop")]);
        let resolver = PathResolver::new(&tree, &[]);
        assert_eq!(resolver.resolve("/Loop/Loop/x"), None);
    }

    #[test]
    fn test_parse_numeric_id() {
        assert_eq!(parse_numeric_id("42"), 42);
        assert_eq!(parse_numeric_id("  0X2A"), 42);
        assert_eq!(parse_numeric_id("052"), 42);
        assert_eq!(parse_numeric_id("0x"), 0);
        assert_eq!(parse_numeric_id("089"), 0);
        assert_eq!(parse_numeric_id("abc"), 0);
        assert_eq!(parse_numeric_id("99999999999999999999999"), u32::MAX);
    }

    proptest! {
        #[test]
        fn prop_decimal_ids_round_trip(id in 1u32..) {
            prop_assert_eq!(parse_numeric_id(&id.to_string()), id);
        }
    }
}
