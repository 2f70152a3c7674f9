//! Caller-facing scan sessions.
//!
//! A session owns one root, one cancellation token and one background scan.
//! Sessions never share state, so two scans of overlapping paths simply do
//! the work twice.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use sizetree_core::{FileTree, ScanConfig, ScanError};

use crate::progress::{ScanProgress, ScanSnapshot};
use crate::scanner::{ScanPlan, TreeScanner};

/// Starts scans in the background.
pub struct ScanSession;

impl ScanSession {
    /// Validate `config` and start scanning on a dedicated thread.
    ///
    /// Fails immediately, without a tree, if the root does not exist or is
    /// not a directory. Every later problem is recorded in the tree instead.
    pub fn start(config: ScanConfig) -> Result<ScanHandle, ScanError> {
        let plan = ScanPlan::prepare(&config)?;
        let root_path = plan.root.path.clone();

        let scanner = TreeScanner::new();
        let progress_tx = scanner.progress_sender();
        let snapshot_tx = scanner.snapshot_sender();
        let token = CancellationToken::new();
        let (result_tx, result_rx) = oneshot::channel();

        let scan_token = token.clone();
        let thread = std::thread::Builder::new()
            .name("sizetree-session".to_string())
            .spawn(move || {
                let tree = scanner.run(&config, plan, scan_token);
                let _ = result_tx.send(tree);
            })
            .map_err(|e| ScanError::ThreadPool {
                message: e.to_string(),
            })?;

        Ok(ScanHandle {
            root_path,
            token,
            progress_tx,
            snapshot_tx,
            result_rx: Some(result_rx),
            thread: Some(thread),
        })
    }
}

/// Handle to a running scan.
///
/// Dropping the handle cancels the scan.
pub struct ScanHandle {
    root_path: PathBuf,
    token: CancellationToken,
    progress_tx: broadcast::Sender<ScanProgress>,
    snapshot_tx: Arc<watch::Sender<ScanSnapshot>>,
    result_rx: Option<oneshot::Receiver<FileTree>>,
    thread: Option<JoinHandle<()>>,
}

impl ScanHandle {
    /// Canonical root being scanned.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Ask the scan to stop. Directories already being read finish; nothing
    /// new is started.
    pub fn cancel(&self) {
        debug!(root = %self.root_path.display(), "Scan cancellation requested");
        self.token.cancel();
    }

    /// Whether cancellation was requested (by the caller or the timeout).
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token that cancels this scan; useful for tying it to other work.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether the background scan has finished.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Subscribe to progress counters.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Watch tree snapshots. Each value is at least as complete as the one
    /// before. If this receiver is still alive when the scan ends, the last
    /// value is the final tree.
    pub fn snapshots(&self) -> watch::Receiver<ScanSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Wait for the scan to finish.
    ///
    /// A cancelled scan returns its partial tree, not an error.
    pub async fn wait(mut self) -> Result<FileTree, ScanError> {
        let rx = self.result_rx.take().ok_or(ScanError::Interrupted)?;
        rx.await.map_err(|_| ScanError::Interrupted)
    }

    /// Blocking version of [`wait`](Self::wait).
    ///
    /// # Panics
    ///
    /// Panics if called from within an async runtime.
    pub fn wait_blocking(mut self) -> Result<FileTree, ScanError> {
        let rx = self.result_rx.take().ok_or(ScanError::Interrupted)?;
        let result = rx.blocking_recv().map_err(|_| ScanError::Interrupted);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        result
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
