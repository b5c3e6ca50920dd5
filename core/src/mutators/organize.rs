use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::prune::remove_empty_dirs;
use crate::errors::{CoreError, FileError};
use crate::report::{BatchReport, OperationResult};
use crate::storage::utils::{join_path, split_extension};
use crate::storage::{DirectoryEntry, StorageBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizeType {
    /// Move each `name.ext` into its own new folder `name/`.
    CreateFoldersForFiles,
    RemoveEmptyDirs,
}

impl FromStr for OrganizeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_folders_for_files" => Ok(Self::CreateFoldersForFiles),
            "remove_empty_dirs" => Ok(Self::RemoveEmptyDirs),
            other => Err(CoreError::InvalidInput(format!(
                "unknown organize type '{other}'"
            ))),
        }
    }
}

pub fn organize(
    backend: &dyn StorageBackend,
    dir: &str,
    kind: OrganizeType,
) -> Result<BatchReport, CoreError> {
    match kind {
        OrganizeType::CreateFoldersForFiles => create_folders_for_files(backend, dir),
        OrganizeType::RemoveEmptyDirs => remove_empty_dirs(backend, dir),
    }
}

/// Give every file in `dir` its own folder named after the file's stem.
///
/// An existing directory of that name is reused. Files without an
/// extension are reported as failures, since the folder would collide with
/// the file itself.
pub fn create_folders_for_files(
    backend: &dyn StorageBackend,
    dir: &str,
) -> Result<BatchReport, CoreError> {
    backend.ensure_ready()?;
    let entries = backend.list_dir(dir)?;

    let results: Vec<OperationResult> = entries
        .iter()
        .filter(|e| !e.is_directory)
        .map(|file| move_into_own_folder(backend, dir, file))
        .collect();

    info!(
        "Organized {} file(s) into folders under {} ({})",
        results.len(),
        dir,
        backend.mode().as_str()
    );
    Ok(BatchReport::from_results("Create folders", results))
}

fn move_into_own_folder(
    backend: &dyn StorageBackend,
    dir: &str,
    file: &DirectoryEntry,
) -> OperationResult {
    let (stem, ext) = split_extension(&file.name);
    if ext.is_empty() || stem.is_empty() {
        return OperationResult::failed(
            &file.name,
            "file has no extension, folder name would collide with it",
        );
    }

    let folder = join_path(dir, stem);
    let target = join_path(&folder, &file.name);

    let prepared: Result<(), FileError> = match backend.stat(&folder) {
        Ok(existing) if existing.is_directory => Ok(()),
        Ok(_) => Err(FileError::OperationFailed(format!(
            "{folder} exists and is not a directory"
        ))),
        Err(e) if e.is_not_found() => backend.mkdir(&folder),
        Err(e) => Err(e),
    };

    match prepared.and_then(|()| backend.rename(&file.path, &target)) {
        Ok(()) => {
            debug!("Moved {} into {}", file.name, folder);
            OperationResult::ok(&file.name, "moved into folder").with_detail(folder)
        }
        Err(e) => {
            warn!("Could not move {} into {}: {}", file.name, folder, e);
            OperationResult::failed(&file.name, e.to_string()).with_detail(folder)
        }
    }
}
