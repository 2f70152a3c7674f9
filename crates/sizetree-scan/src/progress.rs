//! Scan progress reporting.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use sizetree_core::FileNode;

/// Entries processed between two progress broadcasts.
pub(crate) const PROGRESS_EVERY: u64 = 1000;

/// Counters broadcast while a scan runs.
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    pub files_scanned: u64,
    pub dirs_scanned: u64,
    /// Bytes in the regular files counted so far.
    pub bytes_scanned: u64,
    /// Directory whose listing triggered this update.
    pub current_dir: PathBuf,
    /// Unreadable directories and entries with unreadable metadata.
    pub errors: u64,
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Files per second so far; 0 before any time has passed.
    pub fn files_per_second(&self) -> f64 {
        match self.elapsed.as_secs_f64() {
            secs if secs > 0.0 => self.files_scanned as f64 / secs,
            _ => 0.0,
        }
    }
}

/// A view of the tree while a scan is running.
///
/// Directories still being scanned appear with the children resolved so far
/// and `incomplete` set. Aggregates are always consistent with the children
/// shown.
#[derive(Debug, Clone)]
pub struct ScanSnapshot {
    /// Root of the (possibly partial) tree.
    pub root: FileNode,
    /// Whether this is the final, fully scanned tree.
    pub complete: bool,
    /// Counters at the time of the snapshot.
    pub progress: ScanProgress,
}

impl ScanSnapshot {
    /// Snapshot published before anything has been read.
    pub(crate) fn empty(root: FileNode) -> Self {
        Self {
            root,
            complete: false,
            progress: ScanProgress::default(),
        }
    }
}

/// Shared progress counters, updated from worker threads.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    files_scanned: AtomicU64,
    dirs_scanned: AtomicU64,
    bytes_scanned: AtomicU64,
    errors: AtomicU64,
    entries_seen: AtomicU64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            files_scanned: AtomicU64::new(0),
            dirs_scanned: AtomicU64::new(0),
            bytes_scanned: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            entries_seen: AtomicU64::new(0),
        }
    }

    pub fn record_file(&self, size: u64) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
        self.bytes_scanned.fetch_add(size, Ordering::Relaxed);
    }

    pub fn record_dir(&self) {
        self.dirs_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count processed entries; returns `true` when a broadcast is due.
    pub fn record_entries(&self, count: u64) -> bool {
        let before = self.entries_seen.fetch_add(count, Ordering::Relaxed);
        before / PROGRESS_EVERY != (before + count) / PROGRESS_EVERY
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self, current_dir: &Path) -> ScanProgress {
        ScanProgress {
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            dirs_scanned: self.dirs_scanned.load(Ordering::Relaxed),
            bytes_scanned: self.bytes_scanned.load(Ordering::Relaxed),
            current_dir: current_dir.to_path_buf(),
            errors: self.errors.load(Ordering::Relaxed),
            elapsed: self.start_time.elapsed(),
        }
    }
}
