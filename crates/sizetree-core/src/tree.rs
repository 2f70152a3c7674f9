//! File tree container and statistics.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::error::ScanWarning;
use crate::node::FileNode;

/// Summary statistics for a scanned tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Total size in bytes.
    pub total_size: u64,
    /// Total number of files.
    pub total_files: u64,
    /// Total number of directories below the root.
    pub total_dirs: u64,
    /// Total number of symbolic links.
    pub total_symlinks: u64,
    /// Directories whose contents could not be read.
    pub unreadable_dirs: u64,
    /// Maximum depth reached.
    pub max_depth: u32,
    /// Largest file (path, size).
    pub largest_file: Option<(PathBuf, u64)>,
    /// Most recently modified file (path, seconds since epoch).
    pub newest_file: Option<(PathBuf, u64)>,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect statistics from a finished tree in one pass.
    pub fn from_root(root: &FileNode) -> Self {
        let mut stats = Self::new();
        stats.total_size = root.size;
        for (node, depth) in root.walk() {
            stats.max_depth = stats.max_depth.max(depth);
            if node.is_dir() {
                if depth > 0 {
                    stats.total_dirs += 1;
                }
                if node.has_error() {
                    stats.unreadable_dirs += 1;
                }
            } else if node.is_symlink() {
                stats.total_symlinks += 1;
            } else if node.is_file() {
                stats.record_file(node);
            }
        }
        stats
    }

    fn record_file(&mut self, node: &FileNode) {
        self.total_files += 1;

        if self.largest_file.as_ref().is_none_or(|(_, s)| node.size > *s) {
            self.largest_file = Some((node.path.clone(), node.size));
        }

        if self
            .newest_file
            .as_ref()
            .is_none_or(|(_, t)| node.last_modified > *t)
        {
            self.newest_file = Some((node.path.clone(), node.last_modified));
        }
    }
}

/// Complete scanned file tree with metadata.
///
/// A tree with `complete == false` is the best-effort partial result of a
/// cancelled or timed-out scan. Every node in it still has consistent
/// aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTree {
    /// Root node of the tree.
    pub root: FileNode,

    /// Root path that was scanned.
    pub root_path: PathBuf,

    /// When this scan was performed.
    pub scanned_at: SystemTime,

    /// Duration of the scan.
    pub scan_duration: Duration,

    /// Scan configuration used.
    pub config: ScanConfig,

    /// Summary statistics.
    pub stats: TreeStats,

    /// Warnings encountered during scan.
    pub warnings: Vec<ScanWarning>,

    /// Whether every directory was fully scanned.
    pub complete: bool,
}

impl FileTree {
    /// Create a new file tree. Statistics are derived from `root`.
    pub fn new(
        root: FileNode,
        root_path: PathBuf,
        config: ScanConfig,
        scan_duration: Duration,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        let stats = TreeStats::from_root(&root);
        let complete = !root.incomplete;
        Self {
            root,
            root_path,
            scanned_at: SystemTime::now(),
            scan_duration,
            config,
            stats,
            warnings,
            complete,
        }
    }

    /// Get the total size of the tree.
    pub fn total_size(&self) -> u64 {
        self.root.size
    }

    /// Get the total number of files.
    pub fn total_files(&self) -> u64 {
        self.root.file_count
    }

    /// Get the total number of directories.
    pub fn total_dirs(&self) -> u64 {
        self.stats.total_dirs
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether the scan ran to completion.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}
