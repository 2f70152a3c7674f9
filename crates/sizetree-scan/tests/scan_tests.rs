use std::fs;
use std::path::Path;
use std::time::Duration;

use sizetree_scan::{
    FileNode, NodeErrorKind, ScanConfig, ScanError, ScanSession, TreeScanner, WarningKind,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Check size, file count and mtime aggregation on every directory.
fn assert_consistent(root: &FileNode) {
    for (node, _) in root.walk() {
        if !node.is_dir() {
            assert!(node.children.is_none(), "leaf with children: {:?}", node.path);
            continue;
        }
        if node.has_error() {
            assert_eq!(node.size, 0);
            assert_eq!(node.file_count, 0);
            assert_eq!(node.last_modified, 0);
            assert_eq!(node.child_count(), 0);
            continue;
        }
        let size: u64 = node.children().iter().map(|c| c.size).sum();
        let files: u64 = node.children().iter().map(|c| c.file_count).sum();
        assert_eq!(node.size, size, "size mismatch at {:?}", node.path);
        assert_eq!(node.file_count, files, "file count mismatch at {:?}", node.path);
        for child in node.children() {
            assert!(
                node.last_modified >= child.last_modified,
                "{:?} older than child {:?}",
                node.path,
                child.path
            );
        }
        if node.children().iter().any(|c| c.incomplete) {
            assert!(node.incomplete);
        }
    }
}

fn write_sized(path: impl AsRef<Path>, size: usize) {
    fs::write(path, vec![b'x'; size]).unwrap();
}

/// `/r/a` (100 bytes) and `/r/b/{c (50), d (25)}`.
fn create_scenario_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    write_sized(temp.path().join("a"), 100);
    fs::create_dir(temp.path().join("b")).unwrap();
    write_sized(temp.path().join("b/c"), 50);
    write_sized(temp.path().join("b/d"), 25);
    temp
}

fn create_wide_tree(dirs: usize, files_per_dir: usize) -> TempDir {
    let temp = TempDir::new().unwrap();
    for d in 0..dirs {
        let dir = temp.path().join(format!("d{d:03}")).join("inner");
        fs::create_dir_all(&dir).unwrap();
        for f in 0..files_per_dir {
            write_sized(dir.join(format!("f{f}")), d + f);
        }
    }
    temp
}

#[test]
fn test_nested_aggregation_scenario() {
    let temp = create_scenario_tree();
    let tree = TreeScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();

    let b = tree.root.find("b").unwrap();
    assert_eq!(b.size, 75);
    assert_eq!(b.file_count, 2);
    assert!(b.is_dir());

    assert_eq!(tree.root.size, 175);
    assert_eq!(tree.root.file_count, 3);
    assert_eq!(tree.root.find("a").unwrap().file_count, 1);
    assert!(tree.is_complete());
    assert_consistent(&tree.root);
}

#[test]
fn test_paths_are_absolute_and_unique() {
    let temp = create_scenario_tree();
    let tree = TreeScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();

    let mut paths: Vec<_> = tree.root.walk().map(|(n, _)| n.path.clone()).collect();
    assert!(paths.iter().all(|p| p.is_absolute()));
    let total = paths.len();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), total);
    assert!(tree.root.walk().all(|(n, _)| !n.name.is_empty()));
}

#[test]
fn test_wide_tree_with_small_pool() {
    let temp = create_wide_tree(40, 5);
    let config = ScanConfig::builder()
        .root(temp.path())
        .max_concurrency(2usize)
        .build()
        .unwrap();

    let tree = TreeScanner::new().scan(&config).unwrap();

    assert_eq!(tree.total_files(), 200);
    assert_eq!(tree.total_dirs(), 80);
    let expected: u64 = (0..40u64).flat_map(|d| (0..5u64).map(move |f| d + f)).sum();
    assert_eq!(tree.total_size(), expected);
    assert_consistent(&tree.root);
}

#[test]
fn test_deep_tree() {
    let temp = TempDir::new().unwrap();
    let mut dir = temp.path().to_path_buf();
    for _ in 0..150 {
        dir = dir.join("d");
    }
    fs::create_dir_all(&dir).unwrap();
    write_sized(dir.join("leaf"), 9);

    let tree = TreeScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();
    assert_eq!(tree.total_size(), 9);
    assert_eq!(tree.stats.max_depth, 151);
    assert_consistent(&tree.root);
}

#[test]
fn test_rescan_is_identical() {
    let temp = create_wide_tree(10, 3);
    let config = ScanConfig::new(temp.path());

    let first = TreeScanner::new().scan(&config).unwrap();
    let second = TreeScanner::new().scan(&config).unwrap();
    assert_eq!(first.root, second.root);
}

#[test]
fn test_unsorted_scan_same_up_to_order() {
    let temp = create_wide_tree(10, 3);
    let mut config = ScanConfig::new(temp.path());
    let sorted = TreeScanner::new().scan(&config).unwrap();

    config.sort_children = false;
    let mut unsorted = TreeScanner::new().scan(&config).unwrap();
    unsorted.root.sort_children_by_name();
    assert_eq!(sorted.root, unsorted.root);
}

#[test]
fn test_pre_cancelled_scan_returns_partial_tree() {
    let temp = create_scenario_tree();
    let token = CancellationToken::new();
    token.cancel();

    let tree = TreeScanner::new()
        .scan_with_token(&ScanConfig::new(temp.path()), &token)
        .unwrap();

    assert!(!tree.is_complete());
    assert!(tree.root.incomplete);
    assert_eq!(tree.root.size, 0);
    assert_eq!(tree.root.child_count(), 0);
    assert_consistent(&tree.root);
}

#[test]
fn test_zero_timeout_behaves_like_cancel() {
    let temp = create_scenario_tree();
    let config = ScanConfig::builder()
        .root(temp.path())
        .timeout(Some(Duration::ZERO))
        .build()
        .unwrap();

    let tree = TreeScanner::new().scan(&config).unwrap();
    assert!(!tree.is_complete());
    assert_consistent(&tree.root);
}

#[test]
fn test_cancel_mid_scan_keeps_aggregates_consistent() {
    let temp = create_wide_tree(60, 4);
    let config = ScanConfig::builder()
        .root(temp.path())
        .max_concurrency(1usize)
        .snapshot_interval(Duration::ZERO)
        .build()
        .unwrap();

    let handle = ScanSession::start(config).unwrap();
    let snapshots = handle.snapshots();
    std::thread::sleep(Duration::from_millis(5));
    handle.cancel();
    let tree = handle.wait_blocking().unwrap();

    assert_consistent(&tree.root);
    if !tree.is_complete() {
        assert!(tree.root.incomplete);
    }
    let last = snapshots.borrow();
    assert_eq!(last.complete, tree.is_complete());
    assert_eq!(last.root, tree.root);
}

#[test]
fn test_snapshots_are_consistent() {
    let temp = create_wide_tree(30, 3);
    let config = ScanConfig::builder()
        .root(temp.path())
        .max_concurrency(2usize)
        .snapshot_interval(Duration::ZERO)
        .build()
        .unwrap();

    let scanner = TreeScanner::new();
    let snapshots = scanner.snapshots();
    let tree = scanner.scan(&config).unwrap();

    let last = snapshots.borrow();
    assert!(last.complete);
    assert_eq!(last.root, tree.root);
    assert_consistent(&last.root);
}

#[test]
fn test_root_not_found() {
    let temp = TempDir::new().unwrap();
    let err = TreeScanner::new()
        .scan(&ScanConfig::new(temp.path().join("missing")))
        .unwrap_err();
    assert!(matches!(err, ScanError::NotFound { .. }));
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::fs::{PermissionsExt, symlink};

    /// Make `dir` unreadable. Returns `false` when the current user can read
    /// it anyway (e.g. running as root), in which case the test is moot.
    fn lock(dir: &Path) -> bool {
        fs::set_permissions(dir, fs::Permissions::from_mode(0o000)).unwrap();
        fs::read_dir(dir).is_err()
    }

    fn unlock(dir: &Path) {
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_unreadable_directory_is_marked() {
        let temp = TempDir::new().unwrap();
        write_sized(temp.path().join("ok"), 10);
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        write_sized(locked.join("hidden"), 500);

        if !lock(&locked) {
            unlock(&locked);
            return;
        }
        let tree = TreeScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();
        unlock(&locked);

        assert_eq!(tree.root.size, 10);
        assert_eq!(tree.root.file_count, 1);

        let node = tree.root.find("locked").unwrap();
        assert!(node.is_dir());
        assert_eq!(node.size, 0);
        assert_eq!(node.file_count, 0);
        assert_eq!(
            node.error.as_ref().map(|e| e.kind),
            Some(NodeErrorKind::PermissionDenied)
        );

        assert!(tree.is_complete());
        assert_eq!(tree.stats.unreadable_dirs, 1);
        assert!(tree.warnings.iter().any(|w| w.kind == WarningKind::Unreadable));
        assert_consistent(&tree.root);
    }

    #[test]
    fn test_unreadable_equals_deleted() {
        let temp = create_wide_tree(5, 3);
        let victim = temp.path().join("d002");

        let inner = victim.join("inner");
        if !lock(&inner) {
            unlock(&inner);
            return;
        }
        let locked_tree = TreeScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();
        unlock(&inner);

        fs::remove_dir_all(&inner).unwrap();
        let deleted_tree = TreeScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();

        assert_eq!(locked_tree.root.size, deleted_tree.root.size);
        assert_eq!(locked_tree.root.file_count, deleted_tree.root.file_count);
    }

    #[test]
    fn test_symlink_to_ancestor_is_leaf() {
        let temp = create_scenario_tree();
        symlink(temp.path(), temp.path().join("b/loop")).unwrap();

        let tree = TreeScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();

        let link = tree.root.find("b/loop").unwrap();
        assert!(link.is_symlink());
        assert!(!link.is_dir());
        assert!(link.children.is_none());
        assert_eq!(link.file_count, 0);
        // files only; the link contributes its own small size
        assert_eq!(tree.root.file_count, 3);
        assert_eq!(tree.root.size, 175 + link.size);
        assert_consistent(&tree.root);
    }

    #[test]
    fn test_following_symlinks_stops_at_cycles() {
        let temp = create_scenario_tree();
        symlink(temp.path(), temp.path().join("b/loop")).unwrap();
        fs::create_dir(temp.path().join("elsewhere")).unwrap();
        write_sized(temp.path().join("elsewhere/e"), 7);
        let outside = TempDir::new().unwrap();
        write_sized(outside.path().join("x"), 3);
        symlink(outside.path(), temp.path().join("ext")).unwrap();

        let config = ScanConfig::builder()
            .root(temp.path())
            .follow_symlinks(true)
            .collect_diagnostics(true)
            .build()
            .unwrap();
        let tree = TreeScanner::new().scan(&config).unwrap();

        // the ancestor link stays a leaf
        assert!(tree.root.find("b/loop").unwrap().is_symlink());
        // a link to an unvisited directory is scanned like a directory
        let ext = tree.root.find("ext").unwrap();
        assert!(ext.is_dir());
        assert_eq!(ext.size, 3);
        assert_eq!(tree.root.file_count, 5);
        assert!(
            tree.warnings
                .iter()
                .any(|w| w.kind == WarningKind::SymlinkSkipped)
        );
        assert_consistent(&tree.root);
    }

    #[test]
    fn test_broken_symlink_is_leaf() {
        let temp = create_scenario_tree();
        symlink(temp.path().join("nowhere"), temp.path().join("dangling")).unwrap();

        let config = ScanConfig::builder()
            .root(temp.path())
            .collect_diagnostics(true)
            .build()
            .unwrap();
        let tree = TreeScanner::new().scan(&config).unwrap();

        let node = tree.root.find("dangling").unwrap();
        assert!(matches!(
            node.kind,
            sizetree_scan::NodeKind::Symlink { broken: true, .. }
        ));
        assert!(tree.warnings.iter().any(|w| w.kind == WarningKind::BrokenSymlink));
    }

    #[test]
    fn test_diagnostics_off_by_default() {
        let temp = create_scenario_tree();
        symlink(temp.path().join("a"), temp.path().join("link")).unwrap();

        let tree = TreeScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();
        assert!(!tree.has_warnings());
        assert_eq!(tree.stats.total_symlinks, 1);
    }
}
