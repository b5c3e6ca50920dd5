use std::io::Read;
use std::path::Path;

use super::utils::{chrono_from_epoch, normalize_path_separators};
use super::{DirectoryEntry, SessionMode, StorageBackend};
use crate::errors::{FileError, SessionError};

/// Provider backed by the host filesystem.
///
/// Always ready; never holds a live transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl StorageBackend for LocalBackend {
    fn mode(&self) -> SessionMode {
        SessionMode::Local
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<DirectoryEntry, FileError> {
        let metadata = std::fs::metadata(path).map_err(|e| FileError::from_io(e, path))?;
        Ok(entry_for_path(path, &metadata))
    }

    fn lstat(&self, path: &str) -> Result<DirectoryEntry, FileError> {
        let metadata =
            std::fs::symlink_metadata(path).map_err(|e| FileError::from_io(e, path))?;
        Ok(entry_for_path(path, &metadata))
    }

    fn list_dir(&self, path: &str) -> Result<Vec<DirectoryEntry>, FileError> {
        let entries = std::fs::read_dir(Path::new(path)).map_err(|e| FileError::from_io(e, path))?;

        let mut result = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FileError::from_io(e, path))?;
            let name = entry.file_name().to_string_lossy().to_string();

            if name == "." || name == ".." {
                continue;
            }

            let full_path = normalize_path_separators(&entry.path().to_string_lossy());
            let metadata = entry
                .metadata()
                .map_err(|e| FileError::from_io(e, &full_path))?;

            result.push(entry_from_metadata(name, full_path, &metadata));
        }

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn read_streamed(
        &self,
        path: &str,
        chunk_size: usize,
        sink: &mut dyn FnMut(&[u8]),
    ) -> Result<u64, FileError> {
        let mut file = std::fs::File::open(path).map_err(|e| FileError::from_io(e, path))?;
        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut total: u64 = 0;
        loop {
            let n = file.read(&mut buf).map_err(|e| FileError::from_io(e, path))?;
            if n == 0 {
                break;
            }
            sink(&buf[..n]);
            total += n as u64;
        }
        Ok(total)
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<(), FileError> {
        std::fs::write(path, data).map_err(|e| FileError::from_io(e, path))
    }

    fn remove_file(&self, path: &str) -> Result<(), FileError> {
        std::fs::remove_file(path).map_err(|e| FileError::from_io(e, path))
    }

    fn remove_dir(&self, path: &str) -> Result<(), FileError> {
        std::fs::remove_dir(path).map_err(|e| FileError::from_io(e, path))
    }

    fn remove_tree(&self, path: &str) -> Result<(), FileError> {
        std::fs::remove_dir_all(path).map_err(|e| FileError::from_io(e, path))
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FileError> {
        std::fs::rename(from, to).map_err(|e| FileError::from_io(e, from))
    }

    fn mkdir(&self, path: &str) -> Result<(), FileError> {
        std::fs::create_dir(path).map_err(|e| FileError::from_io(e, path))
    }

    fn mkdir_all(&self, path: &str) -> Result<(), FileError> {
        std::fs::create_dir_all(path).map_err(|e| FileError::from_io(e, path))
    }
}

fn entry_for_path(path: &str, metadata: &std::fs::Metadata) -> DirectoryEntry {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    entry_from_metadata(name, normalize_path_separators(path), metadata)
}

fn entry_from_metadata(name: String, path: String, metadata: &std::fs::Metadata) -> DirectoryEntry {
    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| {
            t.duration_since(std::time::UNIX_EPOCH)
                .ok()
                .map(|d| chrono_from_epoch(d.as_secs()))
        })
        .unwrap_or_default();

    DirectoryEntry {
        path,
        name,
        size: metadata.len(),
        is_directory: metadata.is_dir(),
        modified,
        permissions: get_permissions(metadata),
    }
}

/// Get permission string from metadata (Unix only).
#[cfg(unix)]
fn get_permissions(metadata: &std::fs::Metadata) -> Option<String> {
    use super::utils::format_permissions;
    use std::os::unix::fs::PermissionsExt;
    Some(format_permissions(metadata.permissions().mode()))
}

/// On non-Unix platforms, permissions are not available in rwx format.
#[cfg(not(unix))]
fn get_permissions(_metadata: &std::fs::Metadata) -> Option<String> {
    None
}
