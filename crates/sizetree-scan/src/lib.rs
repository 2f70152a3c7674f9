//! Parallel directory aggregation engine for sizetree.
//!
//! This crate walks a directory tree and builds a [`FileNode`] hierarchy in
//! which every directory carries totals over its whole subtree.
//!
//! # Overview
//!
//! - **Parallel traversal** on a bounded rayon pool, one job per directory
//! - **Bottom-up aggregation** of size, file count and newest mtime
//! - **Partial failures** stay local: unreadable directories become marked
//!   nodes, the rest of the tree is still scanned
//! - **Cancellation and timeouts** produce a partial tree, never an error
//! - **Progress** via broadcast channels and **snapshots** via a watch channel
//!
//! # Example
//!
//! ```rust,no_run
//! use sizetree_scan::{ScanConfig, TreeScanner};
//!
//! let config = ScanConfig::new("/path/to/scan");
//! let tree = TreeScanner::new().scan(&config).unwrap();
//!
//! println!("Total size: {} bytes", tree.total_size());
//! println!("Total files: {}", tree.total_files());
//! ```
//!
//! # Sessions
//!
//! Run a scan in the background, watch it grow and cancel it:
//!
//! ```rust,no_run
//! use sizetree_scan::{ScanConfig, ScanSession};
//!
//! # async fn demo() -> Result<(), sizetree_scan::ScanError> {
//! let handle = ScanSession::start(ScanConfig::new("/path/to/scan"))?;
//! let mut snapshots = handle.snapshots();
//!
//! tokio::spawn(async move {
//!     while snapshots.changed().await.is_ok() {
//!         let snapshot = snapshots.borrow_and_update();
//!         println!("{} bytes so far", snapshot.root.size);
//!     }
//! });
//!
//! let tree = handle.wait().await?;
//! println!("complete: {}", tree.is_complete());
//! # Ok(())
//! # }
//! ```

mod builder;
mod progress;
mod reader;
mod scanner;
mod scheduler;
mod session;
mod visited;

pub use progress::{ScanProgress, ScanSnapshot};
pub use reader::{DirListing, EntryInfo, EntryKind, ReadFailure, read_entries};
pub use scanner::TreeScanner;
pub use session::{ScanHandle, ScanSession};
pub use visited::VisitedDirs;

// Re-export core types for convenience
pub use sizetree_core::{
    FileNode, FileTree, NodeError, NodeErrorKind, NodeKind, ScanConfig, ScanError, ScanWarning,
    TreeStats, WarningKind,
};
