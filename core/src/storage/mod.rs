//! Uniform storage capability over the local filesystem and SFTP.
//!
//! Call sites depend only on [`StorageBackend`]; the concrete provider is
//! picked once per side by [`OperatorContext::backend`](crate::context::OperatorContext::backend).

pub mod local;
pub mod remote;
pub mod utils;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{FileError, SessionError};

pub use local::LocalBackend;
pub use remote::RemoteBackend;

/// Suffix appended to a file's path when backing it up before an overwrite.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Which provider a session (or side of a comparison) uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Local,
    Remote,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// A file or directory entry produced by a listing or stat call.
///
/// Entries are built fresh on every call and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Forward-slash normalized path.
    pub path: String,
    pub name: String,
    pub size: u64,
    pub is_directory: bool,
    /// ISO 8601 timestamp, empty when unavailable.
    pub modified: String,
    /// Unix `rwxrwxrwx` format, `None` when not available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

/// Filesystem-like operations shared by the local and remote providers.
///
/// Paths are plain strings in forward-slash form. Implementations convert
/// every underlying fault into a [`FileError`].
pub trait StorageBackend: Send + Sync {
    fn mode(&self) -> SessionMode;

    /// Make sure the backend can serve requests. Local backends are always
    /// ready; the remote backend reconnects through its supervisor.
    fn ensure_ready(&self) -> Result<(), SessionError>;

    fn stat(&self, path: &str) -> Result<DirectoryEntry, FileError>;

    /// Like [`stat`](StorageBackend::stat) but describes a symlink itself.
    /// A symlink is never reported as a directory.
    fn lstat(&self, path: &str) -> Result<DirectoryEntry, FileError>;

    /// List a directory, excluding `.` and `..`.
    fn list_dir(&self, path: &str) -> Result<Vec<DirectoryEntry>, FileError>;

    /// Stream a file's contents to `sink` in chunks of at most `chunk_size`
    /// bytes. Returns the number of bytes read.
    fn read_streamed(
        &self,
        path: &str,
        chunk_size: usize,
        sink: &mut dyn FnMut(&[u8]),
    ) -> Result<u64, FileError>;

    /// Write `data`, creating or truncating the file.
    fn write_file(&self, path: &str, data: &[u8]) -> Result<(), FileError>;

    fn remove_file(&self, path: &str) -> Result<(), FileError>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &str) -> Result<(), FileError>;

    /// Remove a directory and everything below it.
    fn remove_tree(&self, path: &str) -> Result<(), FileError>;

    fn rename(&self, from: &str, to: &str) -> Result<(), FileError>;

    /// Create a single directory; the parent must exist.
    fn mkdir(&self, path: &str) -> Result<(), FileError>;

    /// Create a directory and any missing parents.
    fn mkdir_all(&self, path: &str) -> Result<(), FileError>;

    /// Read a whole file into memory.
    fn read_file(&self, path: &str) -> Result<Vec<u8>, FileError> {
        let mut data = Vec::new();
        self.read_streamed(path, 32 * 1024, &mut |chunk: &[u8]| {
            data.extend_from_slice(chunk)
        })?;
        Ok(data)
    }

    /// Whether `path` exists. Errors other than "not found" count as present.
    fn exists(&self, path: &str) -> bool {
        match self.stat(path) {
            Ok(_) => true,
            Err(e) => !e.is_not_found(),
        }
    }
}

/// Outcome of the backup step that precedes an overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum BackupStatus {
    /// The target did not exist, nothing to back up.
    NotNeeded,
    /// The previous contents were copied to this path.
    Created(String),
    /// The copy failed; the write went ahead anyway.
    Failed(String),
}

/// Result of [`write_with_backup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub bytes_written: u64,
    pub backup: BackupStatus,
}

/// Copy an existing file to `<path>.bak`, then overwrite it with `data`.
///
/// A failed backup is reported in the outcome but does not stop the write.
pub fn write_with_backup(
    backend: &dyn StorageBackend,
    path: &str,
    data: &[u8],
) -> Result<WriteOutcome, FileError> {
    let backup = match backend.stat(path) {
        Ok(entry) if entry.is_directory => {
            return Err(FileError::OperationFailed(format!(
                "{path} is a directory"
            )));
        }
        Ok(_) => {
            let backup_path = format!("{path}{BACKUP_SUFFIX}");
            match backend
                .read_file(path)
                .and_then(|old| backend.write_file(&backup_path, &old))
            {
                Ok(()) => {
                    debug!("Backed up {} to {}", path, backup_path);
                    BackupStatus::Created(backup_path)
                }
                Err(e) => {
                    warn!("Backup of {} failed: {}", path, e);
                    BackupStatus::Failed(e.to_string())
                }
            }
        }
        Err(e) if e.is_not_found() => BackupStatus::NotNeeded,
        Err(e) => {
            warn!("Could not stat {} before backup: {}", path, e);
            BackupStatus::Failed(e.to_string())
        }
    };

    backend.write_file(path, data)?;
    Ok(WriteOutcome {
        bytes_written: data.len() as u64,
        backup,
    })
}
