//! Scan configuration types.

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default minimum time between two published snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_millis(250);

/// Configuration for scanning operations.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root path to scan.
    pub root: PathBuf,

    /// Number of parallel directory jobs (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub max_concurrency: usize,

    /// Follow symbolic links into directories.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Sort children by name before a directory is finalized.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub sort_children: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Glob patterns matched against entry names; matches are skipped.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Descend into directories on other filesystems. When off, mount
    /// points stay in the tree as empty directories.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub cross_filesystems: bool,

    /// Stop starting new work after this long.
    #[builder(default)]
    #[serde(default)]
    pub timeout: Option<Duration>,

    /// Record informational diagnostics (skipped and broken symlinks).
    #[builder(default = "false")]
    #[serde(default)]
    pub collect_diagnostics: bool,

    /// Minimum time between two published snapshots.
    #[builder(default = "DEFAULT_SNAPSHOT_INTERVAL")]
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: Duration,
}

fn default_true() -> bool {
    true
}

fn default_snapshot_interval() -> Duration {
    DEFAULT_SNAPSHOT_INTERVAL
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if let Some(ref patterns) = self.ignore_patterns {
            if let Some(empty) = patterns.iter().position(|p| p.trim().is_empty()) {
                return Err(format!("Ignore pattern #{empty} is empty"));
            }
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_concurrency: 0,
            follow_symlinks: false,
            sort_children: true,
            include_hidden: true,
            ignore_patterns: Vec::new(),
            cross_filesystems: true,
            timeout: None,
            collect_diagnostics: false,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
        }
    }

    /// Check if hidden files should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }

    /// Resolve the worker count, treating 0 as "twice the available cores".
    pub fn effective_concurrency(&self) -> usize {
        match self.max_concurrency {
            0 => std::thread::available_parallelism()
                .map(|n| n.get() * 2)
                .unwrap_or(4),
            n => n,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}
