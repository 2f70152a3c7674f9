//! File and directory node types.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Convert a filesystem timestamp to whole seconds since the Unix epoch.
///
/// Times before the epoch clamp to 0.
pub fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Type of file system node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Regular file.
    #[default]
    File,
    /// Directory.
    Directory,
    /// Symbolic link, recorded as a leaf.
    Symlink {
        /// Link target path.
        target: CompactString,
        /// Whether the link target exists.
        broken: bool,
    },
    /// Other file types (sockets, devices, etc.).
    Other,
}

impl NodeKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }

    /// Check if this is a symlink.
    pub fn is_symlink(&self) -> bool {
        matches!(self, NodeKind::Symlink { .. })
    }
}

/// A single file or directory in the tree.
///
/// Directory nodes carry aggregates over their whole subtree: `size` and
/// `file_count` are sums over all children and `last_modified` is the newest
/// modification time found below (or the directory's own, if newer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Final path segment.
    pub name: CompactString,

    /// Full path of the entry.
    pub path: PathBuf,

    /// Size in bytes (aggregate for directories).
    pub size: u64,

    /// Whether this node is a directory.
    pub is_dir: bool,

    /// Children nodes. `Some` for directories only.
    pub children: Option<Vec<FileNode>>,

    /// Modification time in seconds since the Unix epoch (newest in subtree
    /// for directories).
    pub last_modified: u64,

    /// Number of regular files: 1 for a file, the subtree total for a
    /// directory, 0 otherwise.
    pub file_count: u64,

    /// Node type and associated metadata.
    #[serde(default)]
    pub kind: NodeKind,

    /// Why the directory could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,

    /// This node or something below it was not fully scanned.
    #[serde(default, skip_serializing_if = "is_false")]
    pub incomplete: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl FileNode {
    /// Create a new file node.
    pub fn new_file(
        name: impl Into<CompactString>,
        path: impl Into<PathBuf>,
        size: u64,
        last_modified: u64,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            is_dir: false,
            children: None,
            last_modified,
            file_count: 1,
            kind: NodeKind::File,
            error: None,
            incomplete: false,
        }
    }

    /// Create a symlink leaf. The size is the link's own size, not its target's.
    pub fn new_symlink(
        name: impl Into<CompactString>,
        path: impl Into<PathBuf>,
        size: u64,
        last_modified: u64,
        target: impl Into<CompactString>,
        broken: bool,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            is_dir: false,
            children: None,
            last_modified,
            file_count: 0,
            kind: NodeKind::Symlink {
                target: target.into(),
                broken,
            },
            error: None,
            incomplete: false,
        }
    }

    /// Create a leaf for sockets, devices, fifos and the like.
    pub fn new_other(
        name: impl Into<CompactString>,
        path: impl Into<PathBuf>,
        size: u64,
        last_modified: u64,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            is_dir: false,
            children: None,
            last_modified,
            file_count: 0,
            kind: NodeKind::Other,
            error: None,
            incomplete: false,
        }
    }

    /// Create an empty directory node with zero aggregates.
    pub fn new_directory(
        name: impl Into<CompactString>,
        path: impl Into<PathBuf>,
        last_modified: u64,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size: 0,
            is_dir: true,
            children: Some(Vec::new()),
            last_modified,
            file_count: 0,
            kind: NodeKind::Directory,
            error: None,
            incomplete: false,
        }
    }

    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Check if this node is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Check if this node is a symlink.
    pub fn is_symlink(&self) -> bool {
        self.kind.is_symlink()
    }

    /// Whether the directory behind this node could not be read.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Children as a slice (empty for leaves).
    pub fn children(&self) -> &[FileNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.children().len()
    }

    /// Find a descendant by path relative to this node.
    ///
    /// An empty relative path returns `self`.
    pub fn find(&self, relative: impl AsRef<Path>) -> Option<&FileNode> {
        let mut current = self;
        for component in relative.as_ref().components() {
            let name = component.as_os_str().to_string_lossy();
            current = current
                .children()
                .iter()
                .find(|c| c.name.as_str() == name)?;
        }
        Some(current)
    }

    /// Sort children by name, recursively.
    pub fn sort_children_by_name(&mut self) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Some(children) = node.children.as_mut() {
                children.sort_by(|a, b| a.name.cmp(&b.name));
                stack.extend(children.iter_mut());
            }
        }
    }

    /// Sort children by size in descending order, recursively.
    pub fn sort_children_by_size(&mut self) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Some(children) = node.children.as_mut() {
                children.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));
                stack.extend(children.iter_mut());
            }
        }
    }

    /// Iterate over this node and all descendants in pre-order.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![(self, 0)] }
    }
}

/// Pre-order iterator over a node and its descendants, yielding each node
/// with its depth relative to the starting node.
pub struct Walk<'a> {
    stack: Vec<(&'a FileNode, u32)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (&'a FileNode, u32);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, depth) = self.stack.pop()?;
        self.stack
            .extend(node.children().iter().rev().map(|c| (c, depth + 1)));
        Some((node, depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileNode {
        let mut b = FileNode::new_directory("b", "/r/b", 5);
        b.children = Some(vec![
            FileNode::new_file("c", "/r/b/c", 50, 3),
            FileNode::new_file("d", "/r/b/d", 25, 4),
        ]);
        b.size = 75;
        b.file_count = 2;

        let mut r = FileNode::new_directory("r", "/r", 1);
        r.children = Some(vec![FileNode::new_file("a", "/r/a", 100, 2), b]);
        r.size = 175;
        r.file_count = 3;
        r
    }

    #[test]
    fn test_unix_secs_clamps_pre_epoch() {
        let before = UNIX_EPOCH - std::time::Duration::from_secs(10);
        assert_eq!(unix_secs(before), 0);
        assert_eq!(unix_secs(UNIX_EPOCH + std::time::Duration::from_secs(42)), 42);
    }

    #[test]
    fn test_file_node_creation() {
        let node = FileNode::new_file("test.txt", "/tmp/test.txt", 1024, 7);
        assert!(node.is_file());
        assert!(!node.is_dir());
        assert_eq!(node.size, 1024);
        assert_eq!(node.file_count, 1);
        assert!(node.children.is_none());
    }

    #[test]
    fn test_symlink_counts_no_files() {
        let node = FileNode::new_symlink("link", "/tmp/link", 11, 0, "/tmp/target", false);
        assert!(node.is_symlink());
        assert_eq!(node.file_count, 0);
        assert!(node.children.is_none());
    }

    #[test]
    fn test_directory_node_creation() {
        let node = FileNode::new_directory("test_dir", "/tmp/test_dir", 0);
        assert!(node.is_dir());
        assert!(!node.is_file());
        assert_eq!(node.child_count(), 0);
        assert!(node.children.is_some());
    }

    #[test]
    fn test_find_descendant() {
        let root = sample();
        assert_eq!(root.find("b/d").map(|n| n.size), Some(25));
        assert_eq!(root.find("").map(|n| n.name.as_str()), Some("r"));
        assert!(root.find("b/missing").is_none());
        assert!(root.find("a/x").is_none());
    }

    #[test]
    fn test_walk_is_preorder() {
        let root = sample();
        let names: Vec<_> = root.walk().map(|(n, d)| (n.name.to_string(), d)).collect();
        assert_eq!(
            names,
            vec![
                ("r".to_string(), 0),
                ("a".to_string(), 1),
                ("b".to_string(), 1),
                ("c".to_string(), 2),
                ("d".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_sort_children_by_size() {
        let mut root = sample();
        root.sort_children_by_size();
        let names: Vec<_> = root.children().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        let b = root.find("b").unwrap();
        assert_eq!(b.children()[0].name, "c");
    }

    #[test]
    fn test_sort_children_by_name() {
        let mut root = sample();
        root.sort_children_by_size();
        if let Some(children) = root.children.as_mut() {
            children.reverse();
        }
        root.sort_children_by_name();
        let names: Vec<_> = root.children().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_wire_field_names() {
        let node = FileNode::new_file("a", "/r/a", 100, 9);
        let json = serde_json::to_value(&node).unwrap();
        for key in ["name", "path", "size", "is_dir", "children", "last_modified", "file_count"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json.get("error").is_none());
        assert!(json.get("incomplete").is_none());
    }
}
