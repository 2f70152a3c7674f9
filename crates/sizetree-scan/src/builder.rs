//! Node construction and bottom-up aggregation.
//!
//! Leaves are built as soon as their entry is read. A directory node is built
//! only once every child has a finished node, by folding the children's
//! aggregates in [`finish_dir`].

use compact_str::CompactString;

use sizetree_core::{FileNode, NodeError};

use crate::reader::EntryInfo;

/// Leaf for a regular file.
pub fn file_leaf(entry: &EntryInfo) -> FileNode {
    FileNode::new_file(
        entry.name.clone(),
        entry.path.clone(),
        entry.size,
        entry.modified,
    )
}

/// Leaf for a symlink, using the link's own size and mtime.
pub fn symlink_leaf(entry: &EntryInfo, target: CompactString, broken: bool) -> FileNode {
    FileNode::new_symlink(
        entry.name.clone(),
        entry.path.clone(),
        entry.size,
        entry.modified,
        target,
        broken,
    )
}

/// Leaf for sockets, devices, fifos.
pub fn other_leaf(entry: &EntryInfo) -> FileNode {
    FileNode::new_other(
        entry.name.clone(),
        entry.path.clone(),
        entry.size,
        entry.modified,
    )
}

/// Fold finished children into their parent directory node.
///
/// Unreadable children contribute nothing, not even their own mtime. The
/// result is marked incomplete if any child is.
pub fn finish_dir(dir: &EntryInfo, mut children: Vec<FileNode>, sort_children: bool) -> FileNode {
    let mut node = FileNode::new_directory(dir.name.clone(), dir.path.clone(), dir.modified);

    for child in &children {
        node.incomplete |= child.incomplete;
        if child.has_error() {
            continue;
        }
        node.size += child.size;
        node.file_count += child.file_count;
        node.last_modified = node.last_modified.max(child.last_modified);
    }

    if sort_children {
        children.sort_by(|a, b| a.name.cmp(&b.name));
    }
    node.children = Some(children);
    node
}

/// Directory whose contents could not be read.
///
/// All aggregates are zero, `last_modified` included, so the node never
/// claims to be newer than the parent it is excluded from.
pub fn unreadable_dir(dir: &EntryInfo, error: NodeError) -> FileNode {
    let mut node = FileNode::new_directory(dir.name.clone(), dir.path.clone(), 0);
    node.error = Some(error);
    node
}

/// Directory that was never scanned (cancelled, or still in flight).
pub fn unscanned_dir(dir: &EntryInfo) -> FileNode {
    let mut node = FileNode::new_directory(dir.name.clone(), dir.path.clone(), dir.modified);
    node.incomplete = true;
    node
}
