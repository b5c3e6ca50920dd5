use std::sync::Arc;

use tracing::debug;

use super::utils::ancestors_top_down;
use super::{DirectoryEntry, SessionMode, StorageBackend};
use crate::errors::{FileError, SessionError};
use crate::supervisor::{ConnectionSupervisor, Connector, Link, SshConnector};

/// Provider that forwards every call over the supervised SFTP session.
///
/// Each call first makes sure the session is usable, reconnecting through
/// the supervisor if it is not.
pub struct RemoteBackend<C: Connector = SshConnector> {
    supervisor: Arc<ConnectionSupervisor<C>>,
}

impl<C: Connector> RemoteBackend<C> {
    pub fn new(supervisor: Arc<ConnectionSupervisor<C>>) -> Self {
        Self { supervisor }
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<C> {
        &self.supervisor
    }
}

impl<C: Connector> Clone for RemoteBackend<C> {
    fn clone(&self) -> Self {
        Self {
            supervisor: Arc::clone(&self.supervisor),
        }
    }
}

impl<C: Connector> StorageBackend for RemoteBackend<C> {
    fn mode(&self) -> SessionMode {
        SessionMode::Remote
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        self.supervisor.ensure_connected().map(|outcome| {
            debug!("{}", outcome.message());
        })
    }

    fn stat(&self, path: &str) -> Result<DirectoryEntry, FileError> {
        self.supervisor.with_link(|link| link.stat(path))
    }

    fn lstat(&self, path: &str) -> Result<DirectoryEntry, FileError> {
        self.supervisor.with_link(|link| link.lstat(path))
    }

    fn list_dir(&self, path: &str) -> Result<Vec<DirectoryEntry>, FileError> {
        let mut entries = self.supervisor.with_link(|link| link.read_dir(path))?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_streamed(
        &self,
        path: &str,
        chunk_size: usize,
        sink: &mut dyn FnMut(&[u8]),
    ) -> Result<u64, FileError> {
        self.supervisor
            .with_link(|link| link.read_streamed(path, chunk_size, sink))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<(), FileError> {
        self.supervisor.with_link(|link| link.write(path, data))
    }

    fn remove_file(&self, path: &str) -> Result<(), FileError> {
        self.supervisor.with_link(|link| link.unlink(path))
    }

    fn remove_dir(&self, path: &str) -> Result<(), FileError> {
        self.supervisor.with_link(|link| link.rmdir(path))
    }

    fn remove_tree(&self, path: &str) -> Result<(), FileError> {
        // A symlink to a directory is removed as a link, never walked.
        let entry = self.lstat(path)?;
        if !entry.is_directory {
            return self.remove_file(path);
        }
        for child in self.list_dir(path)? {
            if child.is_directory {
                self.remove_tree(&child.path)?;
            } else {
                self.remove_file(&child.path)?;
            }
        }
        self.remove_dir(path)
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FileError> {
        self.supervisor.with_link(|link| link.rename(from, to))
    }

    fn mkdir(&self, path: &str) -> Result<(), FileError> {
        self.supervisor.with_link(|link| link.mkdir(path))
    }

    fn mkdir_all(&self, path: &str) -> Result<(), FileError> {
        for prefix in ancestors_top_down(path) {
            match self.stat(&prefix) {
                Ok(entry) if entry.is_directory => continue,
                Ok(_) => {
                    return Err(FileError::OperationFailed(format!(
                        "{prefix} exists and is not a directory"
                    )));
                }
                Err(e) if e.is_not_found() => self.mkdir(&prefix)?,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
