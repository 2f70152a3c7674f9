//! Visited-directory tracking for symlink following.

use dashmap::DashSet;

/// Tracks `(device, inode)` pairs of directories already entered in one scan.
///
/// Only consulted when symlinks are followed. Without that, the filesystem
/// hierarchy is acyclic and no tracking is needed.
#[derive(Debug, Default)]
pub struct VisitedDirs {
    seen: DashSet<(u64, u64)>,
}

impl VisitedDirs {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
        }
    }

    /// Mark a directory as entered. Returns `true` if this is the first time.
    ///
    /// A `false` return means the directory is reachable by more than one
    /// path (a symlink cycle or a second link to the same tree) and must not
    /// be scanned again.
    pub fn enter(&self, device: u64, inode: u64) -> bool {
        self.seen.insert((device, inode))
    }
}
