//! Core types for sizetree.
//!
//! This crate provides the data structures shared by the scanning engine and
//! its consumers: the aggregated [`FileNode`] tree, the [`FileTree`] scan
//! result, configuration and error types.

mod config;
mod error;
mod node;
mod tree;

pub use config::{DEFAULT_SNAPSHOT_INTERVAL, ScanConfig, ScanConfigBuilder};
pub use error::{NodeError, NodeErrorKind, ScanError, ScanWarning, WarningKind};
pub use node::{FileNode, NodeKind, Walk, unix_secs};
pub use tree::{FileTree, TreeStats};
