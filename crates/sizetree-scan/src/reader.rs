//! Single-directory entry reader.
//!
//! Reads the immediate entries of one directory with `lstat` semantics.
//! Knows nothing about recursion; the scheduler decides what to do with the
//! entries and with failures.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use compact_str::CompactString;
use thiserror::Error;

use sizetree_core::{NodeError, unix_secs};

/// Type of a directory entry as seen without following links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Other,
}

/// One directory entry with the metadata the tree needs.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Final path segment.
    pub name: CompactString,
    /// Full path.
    pub path: PathBuf,
    /// Entry type.
    pub kind: EntryKind,
    /// Byte length; always 0 for directories.
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub modified: u64,
    /// Device ID.
    pub device: u64,
    /// Inode number.
    pub inode: u64,
}

impl EntryInfo {
    /// Build entry info from already-fetched metadata.
    pub fn from_metadata(name: CompactString, path: PathBuf, metadata: &fs::Metadata) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        Self {
            name,
            path,
            kind,
            size: if kind == EntryKind::Dir { 0 } else { metadata.len() },
            modified: metadata.modified().map(unix_secs).unwrap_or(0),
            device: get_dev(metadata),
            inode: get_ino(metadata),
        }
    }
}

/// Immediate contents of one directory.
#[derive(Debug, Default)]
pub struct DirListing {
    /// Entries whose metadata could be read.
    pub entries: Vec<EntryInfo>,
    /// Entries that vanished or failed between listing and `lstat`.
    pub skipped: Vec<(PathBuf, io::Error)>,
}

/// A directory could not be listed.
#[derive(Debug, Error)]
#[error("Cannot read {}: {source}", .path.display())]
pub struct ReadFailure {
    /// Directory that failed.
    pub path: PathBuf,
    /// Underlying error.
    #[source]
    pub source: io::Error,
}

impl ReadFailure {
    /// The marker to attach to the directory's node.
    pub fn node_error(&self) -> NodeError {
        NodeError::from_io(&self.source)
    }
}

/// Read the immediate entries of `path`.
///
/// Symlinks are reported as [`EntryKind::Symlink`] and never dereferenced.
pub fn read_entries(path: &Path) -> Result<DirListing, ReadFailure> {
    let read_dir = fs::read_dir(path).map_err(|source| ReadFailure {
        path: path.to_path_buf(),
        source,
    })?;

    let mut listing = DirListing::default();
    for entry in read_dir {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                listing.skipped.push((path.to_path_buf(), err));
                continue;
            }
        };

        let entry_path = entry.path();
        // DirEntry::metadata does not traverse symlinks
        match entry.metadata() {
            Ok(metadata) => {
                let name = CompactString::new(entry.file_name().to_string_lossy());
                listing
                    .entries
                    .push(EntryInfo::from_metadata(name, entry_path, &metadata));
            }
            Err(err) => listing.skipped.push((entry_path, err)),
        }
    }

    Ok(listing)
}

/// Describe a single path, following symlinks.
pub fn stat_path(path: &Path) -> io::Result<EntryInfo> {
    let metadata = fs::metadata(path)?;
    Ok(EntryInfo::from_metadata(display_name(path), path.to_path_buf(), &metadata))
}

/// Describe what a symlink points at, keeping the link's own name and path.
pub fn resolve_symlink(link: &EntryInfo) -> io::Result<EntryInfo> {
    let metadata = fs::metadata(&link.path)?;
    Ok(EntryInfo::from_metadata(
        link.name.clone(),
        link.path.clone(),
        &metadata,
    ))
}

/// Read a symlink's target; empty if it cannot be read.
pub fn read_symlink_target(path: &Path) -> CompactString {
    fs::read_link(path)
        .map(|p| CompactString::new(p.to_string_lossy()))
        .unwrap_or_default()
}

/// Final path segment, or the whole path when there is none (e.g. `/`).
pub fn display_name(path: &Path) -> CompactString {
    path.file_name()
        .map(|n| CompactString::new(n.to_string_lossy()))
        .unwrap_or_else(|| CompactString::new(path.to_string_lossy()))
}

// Cross-platform metadata helpers

/// Get the device ID from metadata.
#[cfg(unix)]
fn get_dev(metadata: &fs::Metadata) -> u64 {
    metadata.dev()
}

#[cfg(not(unix))]
fn get_dev(_metadata: &fs::Metadata) -> u64 {
    0
}

/// Get the inode number from metadata.
#[cfg(unix)]
fn get_ino(metadata: &fs::Metadata) -> u64 {
    metadata.ino()
}

#[cfg(not(unix))]
fn get_ino(_metadata: &fs::Metadata) -> u64 {
    0
}
