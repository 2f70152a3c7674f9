//! Synchronous entry point to the parallel scanner.

use std::sync::Arc;
use std::time::Instant;

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use sizetree_core::{FileNode, FileTree, ScanConfig, ScanError};

use crate::builder;
use crate::progress::{ScanProgress, ScanSnapshot};
use crate::reader::{self, EntryInfo, EntryKind};
use crate::scheduler::Scheduler;

/// Capacity of the progress broadcast channel.
const PROGRESS_CHANNEL_SIZE: usize = 100;

/// Parallel directory scanner producing fully aggregated trees.
pub struct TreeScanner {
    progress_tx: broadcast::Sender<ScanProgress>,
    snapshot_tx: Arc<watch::Sender<ScanSnapshot>>,
}

impl TreeScanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_SIZE);
        let (snapshot_tx, _) = watch::channel(ScanSnapshot::empty(FileNode::new_directory(
            "", "", 0,
        )));
        Self {
            progress_tx,
            snapshot_tx: Arc::new(snapshot_tx),
        }
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Watch tree snapshots published while the scan runs.
    ///
    /// If a receiver is still alive when a scan ends, the last value is the
    /// finished (or partial) tree. Without receivers the finished tree is
    /// never copied into the channel.
    pub fn snapshots(&self) -> watch::Receiver<ScanSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub(crate) fn progress_sender(&self) -> broadcast::Sender<ScanProgress> {
        self.progress_tx.clone()
    }

    pub(crate) fn snapshot_sender(&self) -> Arc<watch::Sender<ScanSnapshot>> {
        Arc::clone(&self.snapshot_tx)
    }

    /// Scan the configured root, blocking until done.
    pub fn scan(&self, config: &ScanConfig) -> Result<FileTree, ScanError> {
        self.scan_with_token(config, &CancellationToken::new())
    }

    /// Scan the configured root, stopping early if `token` is cancelled.
    ///
    /// Cancellation is not an error: the returned tree is marked incomplete.
    pub fn scan_with_token(
        &self,
        config: &ScanConfig,
        token: &CancellationToken,
    ) -> Result<FileTree, ScanError> {
        let plan = ScanPlan::prepare(config)?;
        Ok(self.run(config, plan, token.clone()))
    }

    /// Run a prepared scan to completion or cancellation.
    pub(crate) fn run(
        &self,
        config: &ScanConfig,
        plan: ScanPlan,
        token: CancellationToken,
    ) -> FileTree {
        let start = Instant::now();
        let ScanPlan { root, ignore, pool } = plan;
        let root_path = root.path.clone();

        info!(
            root = %root_path.display(),
            threads = pool.current_num_threads(),
            "Scan started"
        );

        self.snapshot_tx.send_replace(ScanSnapshot::empty(
            builder::unscanned_dir(&root),
        ));

        let output = Scheduler {
            config,
            list: reader::read_entries,
            root_info: root,
            ignore,
            token,
            progress_tx: &self.progress_tx,
            snapshot_tx: &self.snapshot_tx,
        }
        .run(&pool);

        let tree = FileTree::new(
            output.root,
            root_path,
            config.clone(),
            start.elapsed(),
            output.warnings,
        );

        info!(
            root = %tree.root_path.display(),
            files = tree.total_files(),
            bytes = tree.total_size(),
            warnings = tree.warnings.len(),
            complete = tree.complete,
            elapsed_ms = tree.scan_duration.as_millis() as u64,
            "Scan finished"
        );

        tree
    }
}

impl Default for TreeScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything validated before a scan starts.
pub(crate) struct ScanPlan {
    pub root: EntryInfo,
    pub ignore: GlobSet,
    pub pool: ThreadPool,
}

impl ScanPlan {
    /// Resolve the root, compile ignore patterns and build the worker pool.
    ///
    /// These are the only failures that abort a scan.
    pub fn prepare(config: &ScanConfig) -> Result<Self, ScanError> {
        let root = resolve_root(config)?;
        let ignore = build_ignore_set(&config.ignore_patterns)?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.effective_concurrency())
            .thread_name(|i| format!("sizetree-scan-{i}"))
            .build()
            .map_err(|e| ScanError::ThreadPool {
                message: e.to_string(),
            })?;
        Ok(Self { root, ignore, pool })
    }
}

/// Canonicalize the root and make sure it is a directory.
fn resolve_root(config: &ScanConfig) -> Result<EntryInfo, ScanError> {
    let root_path = config
        .root
        .canonicalize()
        .map_err(|e| ScanError::io(&config.root, e))?;
    let root = reader::stat_path(&root_path).map_err(|e| ScanError::io(&root_path, e))?;
    if root.kind != EntryKind::Dir {
        return Err(ScanError::NotADirectory { path: root_path });
    }
    Ok(root)
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet, ScanError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidConfig {
            message: format!("bad ignore pattern {pattern:?}: {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ScanError::InvalidConfig {
        message: e.to_string(),
    })
}
