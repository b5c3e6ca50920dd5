use tracing::{debug, info};

use crate::errors::CoreError;
use crate::report::{BatchReport, OperationResult};
use crate::storage::StorageBackend;

/// Remove every empty directory below `root`, deepest first.
///
/// A directory emptied by removing its children is removed too. The root
/// itself is never removed. Directories that cannot be listed or removed are
/// skipped silently; only an unlistable root fails the call.
pub fn remove_empty_dirs(
    backend: &dyn StorageBackend,
    root: &str,
) -> Result<BatchReport, CoreError> {
    backend.ensure_ready()?;
    let entries = backend.list_dir(root)?;

    let mut results = Vec::new();
    for entry in entries.iter().filter(|e| e.is_directory) {
        prune(backend, &entry.path, &mut results);
    }

    info!(
        "Removed {} empty directories under {} ({})",
        results.len(),
        root,
        backend.mode().as_str()
    );
    Ok(BatchReport::from_results("Remove empty directories", results))
}

/// Post-order walk. Returns whether `dir` was removed.
fn prune(backend: &dyn StorageBackend, dir: &str, results: &mut Vec<OperationResult>) -> bool {
    let entries = match backend.list_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Skipping {}: {}", dir, e);
            return false;
        }
    };

    let mut removed_any = false;
    for child in entries.iter().filter(|e| e.is_directory) {
        removed_any |= prune(backend, &child.path, results);
    }

    let is_empty = if removed_any {
        match backend.list_dir(dir) {
            Ok(remaining) => remaining.is_empty(),
            Err(e) => {
                debug!("Skipping {}: {}", dir, e);
                false
            }
        }
    } else {
        entries.is_empty()
    };
    if !is_empty {
        return false;
    }

    match backend.remove_dir(dir) {
        Ok(()) => {
            debug!("Removed empty directory {}", dir);
            results.push(OperationResult::ok(dir, "removed empty directory"));
            true
        }
        Err(e) => {
            debug!("Could not remove {}: {}", dir, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalBackend;
    use tempfile::TempDir;

    #[test]
    fn nested_empty_chain_is_removed_bottom_up() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        std::fs::create_dir_all(dir.path().join("keep")).unwrap();
        std::fs::write(dir.path().join("keep/file.txt"), "x").unwrap();

        let root = dir.path().to_string_lossy().replace('\\', "/");
        let report = remove_empty_dirs(&LocalBackend::new(), &root).unwrap();

        assert_eq!(report.succeeded, 3);
        assert!(report.results[0].subject.ends_with("a/b/c"));
        assert!(report.results[2].subject.ends_with("/a"));
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().join("keep/file.txt").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn second_run_removes_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("x/y")).unwrap();
        let root = dir.path().to_string_lossy().replace('\\', "/");

        let first = remove_empty_dirs(&LocalBackend::new(), &root).unwrap();
        assert_eq!(first.succeeded, 2);
        let second = remove_empty_dirs(&LocalBackend::new(), &root).unwrap();
        assert_eq!(second.succeeded, 0);
        assert!(second.results.is_empty());
    }

    #[test]
    fn empty_root_is_kept() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_string_lossy().replace('\\', "/");
        let report = remove_empty_dirs(&LocalBackend::new(), &root).unwrap();
        assert!(report.results.is_empty());
        assert!(dir.path().exists());
    }

    #[test]
    fn missing_root_is_an_error() {
        let result = remove_empty_dirs(&LocalBackend::new(), "/nonexistent/prune/root");
        assert!(matches!(result, Err(CoreError::File(_))));
    }
}
