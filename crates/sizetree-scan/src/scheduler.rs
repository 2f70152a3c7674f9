//! Parallel directory scheduler.
//!
//! Every directory is one job on a rayon pool. A job lists its directory,
//! turns non-directory entries into leaves on the spot and spawns one job per
//! subdirectory. Jobs are queued by rayon, not nested on the call stack, so
//! tree depth never grows the native stack.
//!
//! # Bottom-up barrier
//!
//! A directory with subdirectories becomes a [`PendingDir`] behind an `Arc`.
//! Each child job holds a clone, writes its finished node into its own
//! `OnceLock` slot and then releases the clone. Whoever releases the last
//! reference gets the `PendingDir` back by value (`Arc::into_inner`), folds
//! the slots into a finished node and hands that to the grandparent the same
//! way. Each slot has exactly one writer and each directory node is built by
//! exactly one thread, so aggregation needs no locks.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;

use globset::GlobSet;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use sizetree_core::{FileNode, ScanConfig, ScanWarning};

use crate::builder;
use crate::progress::{ProgressTracker, ScanProgress, ScanSnapshot};
use crate::reader::{self, DirListing, EntryInfo, EntryKind, ReadFailure};
use crate::visited::VisitedDirs;

/// Where a finished directory node goes.
enum Parent {
    /// The scan root; the node is the result.
    Root,
    /// Slot `slot` of a pending directory.
    Dir { dir: Arc<PendingDir>, slot: usize },
}

/// A directory whose entries are known but whose subdirectories are not all
/// finished yet.
struct PendingDir {
    info: EntryInfo,
    parent: Parent,
    slots: Vec<Slot>,
}

/// One child of a pending directory.
enum Slot {
    /// Leaf built while listing.
    Ready(FileNode),
    /// Subdirectory handled by its own job.
    Dir {
        info: EntryInfo,
        /// Written once by the child when it is finished.
        done: OnceLock<FileNode>,
        /// Set by the child if it has subdirectories of its own; lets
        /// snapshots look inside it.
        pending: OnceLock<Weak<PendingDir>>,
    },
}

impl Slot {
    fn subdir(info: EntryInfo) -> Self {
        Slot::Dir {
            info,
            done: OnceLock::new(),
            pending: OnceLock::new(),
        }
    }

    fn into_node(self) -> FileNode {
        match self {
            Slot::Ready(node) => node,
            Slot::Dir { info, done, .. } => done
                .into_inner()
                .unwrap_or_else(|| builder::unscanned_dir(&info)),
        }
    }
}

/// What one listed entry turns into.
enum Child {
    Leaf(FileNode),
    Dir(EntryInfo),
}

/// A directory job.
struct DirJob {
    info: EntryInfo,
    parent: Parent,
}

/// Result of a finished scheduler run.
pub(crate) struct SchedulerOutput {
    pub root: FileNode,
    pub warnings: Vec<ScanWarning>,
}

/// Lists one directory. [`reader::read_entries`] outside of tests.
pub(crate) type ListDir = fn(&Path) -> Result<DirListing, ReadFailure>;

/// Everything one scheduler run needs from its caller.
pub(crate) struct Scheduler<'a> {
    pub config: &'a ScanConfig,
    pub list: ListDir,
    pub root_info: EntryInfo,
    pub ignore: GlobSet,
    pub token: CancellationToken,
    pub progress_tx: &'a broadcast::Sender<ScanProgress>,
    pub snapshot_tx: &'a watch::Sender<ScanSnapshot>,
}

impl Scheduler<'_> {
    /// Scan the whole tree on `pool` and return the root node.
    ///
    /// Returns once every job has finished, whether the scan ran to the end
    /// or was cancelled.
    pub fn run(self, pool: &rayon::ThreadPool) -> SchedulerOutput {
        let (warnings_tx, warnings_rx) = mpsc::channel();
        let ctx = ScanContext::new(self, warnings_tx);

        pool.scope(|scope| {
            ctx.spawn_dir(
                scope,
                DirJob {
                    info: ctx.root_info.clone(),
                    parent: Parent::Root,
                },
            );
        });

        // Only watchers get a copy of the finished tree; the channel keeps
        // its last value for as long as the sender lives.
        if ctx.snapshot_tx.receiver_count() > 0 {
            let root = ctx.snapshot();
            let progress = ctx.progress.snapshot(&ctx.root_info.path);
            ctx.snapshot_tx.send_replace(ScanSnapshot {
                complete: !root.incomplete,
                root,
                progress,
            });
        }

        let root = ctx.into_root();
        SchedulerOutput {
            root,
            warnings: warnings_rx.try_iter().collect(),
        }
    }
}

/// State shared by all jobs of one scan.
struct ScanContext<'a> {
    config: &'a ScanConfig,
    list: ListDir,
    root_info: EntryInfo,
    ignore: GlobSet,
    token: CancellationToken,
    deadline: Option<Instant>,
    progress: ProgressTracker,
    progress_tx: &'a broadcast::Sender<ScanProgress>,
    snapshot_tx: &'a watch::Sender<ScanSnapshot>,
    last_snapshot_ms: AtomicU64,
    /// Held by the one worker building a snapshot.
    snapshot_busy: AtomicBool,
    visited: VisitedDirs,
    warnings_tx: mpsc::Sender<ScanWarning>,
    root_slot: OnceLock<FileNode>,
    root_pending: OnceLock<Weak<PendingDir>>,
}

impl<'a> ScanContext<'a> {
    fn new(scheduler: Scheduler<'a>, warnings_tx: mpsc::Sender<ScanWarning>) -> Self {
        let Scheduler {
            config,
            list,
            root_info,
            ignore,
            token,
            progress_tx,
            snapshot_tx,
        } = scheduler;

        let visited = VisitedDirs::new();
        if config.follow_symlinks {
            visited.enter(root_info.device, root_info.inode);
        }

        Self {
            config,
            list,
            root_info,
            ignore,
            token,
            deadline: config.timeout.map(|t| Instant::now() + t),
            progress: ProgressTracker::new(),
            progress_tx,
            snapshot_tx,
            last_snapshot_ms: AtomicU64::new(0),
            snapshot_busy: AtomicBool::new(false),
            visited,
            warnings_tx,
            root_slot: OnceLock::new(),
            root_pending: OnceLock::new(),
        }
    }

    /// Take the finished root, consuming the context.
    fn into_root(self) -> FileNode {
        let Self {
            root_info,
            root_slot,
            ..
        } = self;
        root_slot
            .into_inner()
            .unwrap_or_else(|| builder::unscanned_dir(&root_info))
    }

    fn spawn_dir<'s>(&'s self, scope: &rayon::Scope<'s>, job: DirJob) {
        scope.spawn(move |scope| self.run_dir(scope, job));
    }

    fn run_dir<'s>(&'s self, scope: &rayon::Scope<'s>, job: DirJob) {
        let DirJob { info, parent } = job;

        if self.should_stop() {
            trace!(path = %info.path.display(), "Skipping directory after cancellation");
            self.complete(builder::unscanned_dir(&info), parent);
            return;
        }

        let listing = match (self.list)(&info.path) {
            Ok(listing) => listing,
            Err(failure) => {
                debug!(path = %info.path.display(), error = %failure.source, "Directory unreadable");
                let error = failure.node_error();
                self.progress.record_error();
                self.warn(ScanWarning::unreadable(&info.path, &error));
                self.complete(builder::unreadable_dir(&info, error), parent);
                return;
            }
        };
        self.progress.record_dir();

        for (path, err) in &listing.skipped {
            self.progress.record_error();
            self.warn(ScanWarning::metadata_error(path, err));
        }

        let entry_count = listing.entries.len() as u64;
        let mut slots = Vec::with_capacity(listing.entries.len());
        let mut subdirs = Vec::new();
        for entry in listing.entries {
            if self.is_excluded(&entry) {
                continue;
            }
            match self.classify(entry) {
                Child::Leaf(node) => slots.push(Slot::Ready(node)),
                Child::Dir(entry) => {
                    subdirs.push((slots.len(), entry.clone()));
                    slots.push(Slot::subdir(entry));
                }
            }
        }

        if self.progress.record_entries(entry_count) {
            let _ = self.progress_tx.send(self.progress.snapshot(&info.path));
        }

        if subdirs.is_empty() {
            let children = slots.into_iter().map(Slot::into_node).collect();
            let node = builder::finish_dir(&info, children, self.config.sort_children);
            self.complete(node, parent);
        } else {
            let pending = Arc::new(PendingDir {
                info,
                parent,
                slots,
            });
            self.register(&pending);

            for (slot, child) in subdirs {
                self.spawn_dir(
                    scope,
                    DirJob {
                        info: child,
                        parent: Parent::Dir {
                            dir: Arc::clone(&pending),
                            slot,
                        },
                    },
                );
            }
            self.release(pending);
        }

        self.maybe_snapshot();
    }

    /// Decide what a listed entry becomes.
    fn classify(&self, entry: EntryInfo) -> Child {
        match entry.kind {
            EntryKind::File => {
                self.progress.record_file(entry.size);
                Child::Leaf(builder::file_leaf(&entry))
            }
            EntryKind::Other => Child::Leaf(builder::other_leaf(&entry)),
            EntryKind::Dir => {
                if !self.same_filesystem(&entry) {
                    self.warn(ScanWarning::cross_filesystem(&entry.path));
                    return Child::Leaf(builder::finish_dir(&entry, Vec::new(), false));
                }
                if self.config.follow_symlinks {
                    // Real directories are always scanned; recording them
                    // keeps links back into them from being entered.
                    self.visited.enter(entry.device, entry.inode);
                }
                Child::Dir(entry)
            }
            EntryKind::Symlink if self.config.follow_symlinks => self.follow_symlink(entry),
            EntryKind::Symlink => {
                let target = reader::read_symlink_target(&entry.path);
                let broken = !entry.path.exists();
                if self.config.collect_diagnostics {
                    if broken {
                        self.warn(ScanWarning::broken_symlink(&entry.path, &target));
                    }
                    self.warn(ScanWarning::symlink_skipped(&entry.path, "not following links"));
                }
                Child::Leaf(builder::symlink_leaf(&entry, target, broken))
            }
        }
    }

    fn follow_symlink(&self, link: EntryInfo) -> Child {
        let resolved = match reader::resolve_symlink(&link) {
            Ok(resolved) => resolved,
            Err(_) => {
                let target = reader::read_symlink_target(&link.path);
                if self.config.collect_diagnostics {
                    self.warn(ScanWarning::broken_symlink(&link.path, &target));
                }
                return Child::Leaf(builder::symlink_leaf(&link, target, true));
            }
        };

        match resolved.kind {
            EntryKind::Dir => {
                let reason = if !self.same_filesystem(&resolved) {
                    "target on another filesystem"
                } else if !self.visited.enter(resolved.device, resolved.inode) {
                    "target already visited"
                } else {
                    return Child::Dir(resolved);
                };
                debug!(path = %link.path.display(), reason, "Symlink recorded as leaf");
                if self.config.collect_diagnostics {
                    self.warn(ScanWarning::symlink_skipped(&link.path, reason));
                }
                let target = reader::read_symlink_target(&link.path);
                Child::Leaf(builder::symlink_leaf(&link, target, false))
            }
            EntryKind::File => {
                self.progress.record_file(resolved.size);
                Child::Leaf(builder::file_leaf(&resolved))
            }
            _ => Child::Leaf(builder::other_leaf(&resolved)),
        }
    }

    fn is_excluded(&self, entry: &EntryInfo) -> bool {
        self.config.should_skip_hidden(&entry.name) || self.ignore.is_match(entry.name.as_str())
    }

    fn same_filesystem(&self, entry: &EntryInfo) -> bool {
        self.config.cross_filesystems || entry.device == self.root_info.device
    }

    /// Check for cancellation, turning an expired deadline into one.
    fn should_stop(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                debug!(root = %self.root_info.path.display(), "Scan deadline reached");
                self.token.cancel();
                return true;
            }
        }
        false
    }

    fn warn(&self, warning: ScanWarning) {
        let _ = self.warnings_tx.send(warning);
    }

    /// Make a pending directory visible to snapshots through its parent.
    fn register(&self, pending: &Arc<PendingDir>) {
        let weak = Arc::downgrade(pending);
        match &pending.parent {
            Parent::Root => {
                let _ = self.root_pending.set(weak);
            }
            Parent::Dir { dir, slot } => {
                if let Slot::Dir { pending: link, .. } = &dir.slots[*slot] {
                    let _ = link.set(weak);
                }
            }
        }
    }

    /// Drop one reference to a pending directory, finishing it if it was the
    /// last.
    fn release(&self, dir: Arc<PendingDir>) {
        if let Some(pending) = Arc::into_inner(dir) {
            let (node, parent) = self.fold(pending);
            self.complete(node, parent);
        }
    }

    /// Hand a finished node to its parent, then keep finishing ancestors for
    /// as long as this thread holds the last reference to them.
    fn complete(&self, mut node: FileNode, mut parent: Parent) {
        loop {
            match parent {
                Parent::Root => {
                    let _ = self.root_slot.set(node);
                    return;
                }
                Parent::Dir { dir, slot } => {
                    if let Slot::Dir { done, .. } = &dir.slots[slot] {
                        let _ = done.set(node);
                    }
                    match Arc::into_inner(dir) {
                        Some(pending) => (node, parent) = self.fold(pending),
                        None => return,
                    }
                }
            }
        }
    }

    fn fold(&self, pending: PendingDir) -> (FileNode, Parent) {
        let PendingDir {
            info,
            parent,
            slots,
        } = pending;
        let children = slots.into_iter().map(Slot::into_node).collect();
        let node = builder::finish_dir(&info, children, self.config.sort_children);
        trace!(path = %node.path.display(), size = node.size, files = node.file_count, "Directory finished");
        (node, parent)
    }

    /// Publish a snapshot if the interval has passed and someone is listening.
    fn maybe_snapshot(&self) {
        if self.snapshot_tx.receiver_count() == 0 {
            return;
        }
        let interval = self.config.snapshot_interval.as_millis() as u64;
        let now = self.progress.elapsed().as_millis() as u64;
        let last = self.last_snapshot_ms.load(Ordering::Relaxed);
        if now < last.saturating_add(interval) {
            return;
        }
        // One builder at a time, so snapshots are published in the order
        // they were taken. Everyone else goes back to scanning.
        if self
            .snapshot_busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.last_snapshot_ms.store(now, Ordering::Relaxed);

        let root = self.snapshot();
        let complete = !root.incomplete && self.root_slot.get().is_some();
        self.snapshot_tx.send_replace(ScanSnapshot {
            root,
            complete,
            progress: self.progress.snapshot(&self.root_info.path),
        });
        self.snapshot_busy.store(false, Ordering::Release);
    }

    /// Build a consistent view of the tree as it stands.
    fn snapshot(&self) -> FileNode {
        if let Some(root) = self.root_slot.get() {
            return root.clone();
        }
        match self.root_pending.get().map(|weak| weak.upgrade()) {
            Some(Some(dir)) => {
                let node = self.snapshot_dir(&dir);
                self.release(dir);
                node
            }
            Some(None) => wait_for(&self.root_slot).clone(),
            None => self
                .root_slot
                .get()
                .cloned()
                .unwrap_or_else(|| builder::unscanned_dir(&self.root_info)),
        }
    }

    fn snapshot_dir(&self, dir: &PendingDir) -> FileNode {
        let children = dir
            .slots
            .iter()
            .map(|slot| match slot {
                Slot::Ready(node) => node.clone(),
                Slot::Dir {
                    info,
                    done,
                    pending,
                } => {
                    if let Some(node) = done.get() {
                        return node.clone();
                    }
                    match pending.get().map(|weak| weak.upgrade()) {
                        Some(Some(child)) => {
                            let node = self.snapshot_dir(&child);
                            self.release(child);
                            node
                        }
                        // Registered but no longer alive: another worker is
                        // folding it and will fill `done` next.
                        Some(None) => wait_for(done).clone(),
                        None => done
                            .get()
                            .cloned()
                            .unwrap_or_else(|| builder::unscanned_dir(info)),
                    }
                }
            })
            .collect();

        let mut node = builder::finish_dir(&dir.info, children, self.config.sort_children);
        node.incomplete = true;
        node
    }
}

/// Spin until a slot being finished by another worker is written.
fn wait_for(done: &OnceLock<FileNode>) -> &FileNode {
    loop {
        if let Some(node) = done.get() {
            return node;
        }
        std::thread::yield_now();
    }
}
