use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::{CoreError, FileError};
use crate::report::{BatchReport, OperationResult};
use crate::storage::StorageBackend;

fn reject_root(path: &str) -> Result<(), CoreError> {
    if path.trim().is_empty() || path.trim_end_matches('/').is_empty() {
        return Err(CoreError::InvalidInput(format!(
            "refusing to delete '{path}'"
        )));
    }
    Ok(())
}

fn remove(backend: &dyn StorageBackend, path: &str, config: &AppConfig) -> Result<(), FileError> {
    if config.is_dangerous_path(path) {
        warn!("Deleting {} inside a system directory", path);
    }
    let entry = backend.lstat(path)?;
    if entry.is_directory {
        backend.remove_tree(path)
    } else {
        backend.remove_file(path)
    }
}

/// Delete a file, or a directory with everything below it.
pub fn delete_path(
    backend: &dyn StorageBackend,
    path: &str,
    config: &AppConfig,
) -> Result<(), CoreError> {
    reject_root(path)?;
    backend.ensure_ready()?;
    remove(backend, path, config)?;
    info!("Deleted {} ({})", path, backend.mode().as_str());
    Ok(())
}

/// Delete each path independently, itemizing the outcome.
pub fn batch_delete(
    backend: &dyn StorageBackend,
    paths: &[String],
    config: &AppConfig,
) -> Result<BatchReport, CoreError> {
    for path in paths {
        reject_root(path)?;
    }
    backend.ensure_ready()?;

    let results = paths
        .iter()
        .map(|path| match remove(backend, path, config) {
            Ok(()) => OperationResult::ok(path, "deleted"),
            Err(e) => {
                warn!("Delete of {} failed: {}", path, e);
                OperationResult::failed(path, e.to_string())
            }
        })
        .collect();

    let report = BatchReport::from_results("Delete", results);
    info!("{}", report.message);
    Ok(report)
}
