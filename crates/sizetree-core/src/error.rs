//! Error types for scanning operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a whole scan.
///
/// Problems below the root never show up here; they are recorded on the
/// affected node (see [`NodeError`]) and in the tree's warnings.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Root path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Permission denied for the root path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Generic I/O error on the root path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The worker pool could not be created.
    #[error("Failed to start worker pool: {message}")]
    ThreadPool { message: String },

    /// The scan thread went away without producing a result.
    #[error("Scan interrupted")]
    Interrupted,

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Why a directory's contents could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeErrorKind {
    /// Permission was denied.
    PermissionDenied,
    /// The directory disappeared between discovery and reading.
    Vanished,
    /// Any other I/O failure.
    Io,
}

impl From<std::io::ErrorKind> for NodeErrorKind {
    fn from(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            std::io::ErrorKind::NotFound => Self::Vanished,
            _ => Self::Io,
        }
    }
}

/// Error marker attached to a directory node that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
    /// Category of the failure.
    pub kind: NodeErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl NodeError {
    /// Build a marker from an I/O error.
    pub fn from_io(error: &std::io::Error) -> Self {
        Self {
            kind: error.kind().into(),
            message: error.to_string(),
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// A subdirectory could not be read.
    Unreadable,
    /// Error reading an entry's metadata.
    MetadataError,
    /// Symbolic link target does not exist.
    BrokenSymlink,
    /// A symlink was recorded as a leaf instead of being followed.
    SymlinkSkipped,
    /// Filesystem boundary crossed (when not allowed).
    CrossFilesystem,
}

/// Non-fatal warning encountered during scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning for a directory that could not be read.
    pub fn unreadable(path: impl Into<PathBuf>, error: &NodeError) -> Self {
        Self::new(path, error.message.clone(), WarningKind::Unreadable)
    }

    /// Create a metadata error warning.
    pub fn metadata_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self::new(path, format!("Metadata error: {error}"), WarningKind::MetadataError)
    }

    /// Create a broken symlink warning.
    pub fn broken_symlink(path: impl Into<PathBuf>, target: &str) -> Self {
        let path = path.into();
        Self {
            message: format!("Broken symlink: {} -> {target}", path.display()),
            path,
            kind: WarningKind::BrokenSymlink,
        }
    }

    /// Create a skipped symlink diagnostic.
    pub fn symlink_skipped(path: impl Into<PathBuf>, reason: &str) -> Self {
        let path = path.into();
        Self {
            message: format!("Symlink not followed ({reason}): {}", path.display()),
            path,
            kind: WarningKind::SymlinkSkipped,
        }
    }

    /// Create a cross-filesystem warning.
    pub fn cross_filesystem(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Skipped mount point: {}", path.display()),
            path,
            kind: WarningKind::CrossFilesystem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::PermissionDenied { .. }));

        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_node_error_kind_mapping() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(NodeError::from_io(&err).kind, NodeErrorKind::Vanished);

        let err = std::io::Error::other("boom");
        let marker = NodeError::from_io(&err);
        assert_eq!(marker.kind, NodeErrorKind::Io);
        assert_eq!(marker.message, "boom");
    }

    #[test]
    fn test_scan_warning_creation() {
        let marker = NodeError {
            kind: NodeErrorKind::PermissionDenied,
            message: "Permission denied".to_string(),
        };
        let warning = ScanWarning::unreadable("/test/path", &marker);
        assert_eq!(warning.kind, WarningKind::Unreadable);
        assert!(warning.message.contains("Permission denied"));

        let warning = ScanWarning::symlink_skipped("/test/link", "already visited");
        assert_eq!(warning.kind, WarningKind::SymlinkSkipped);
        assert!(warning.message.contains("already visited"));
    }
}
