//! Transport seam between the supervisor and the concrete SSH stack.
//!
//! The supervisor only ever talks to a [`Connector`] (to open sessions) and
//! the [`Link`] it returns (to use them). The ssh2 implementation lives in
//! [`ssh`](super::ssh); tests substitute scripted fakes.

use std::time::Duration;

use crate::config::{SshConfig, Timeouts};
use crate::errors::{FileError, SessionError};
use crate::storage::DirectoryEntry;

/// An authenticated session with an open file subsystem.
///
/// All file methods map protocol statuses to `NotFound` /
/// `PermissionDenied` / `OperationFailed`, and transport breakage to
/// `FileError::Connectivity`, after which [`is_active`](Link::is_active)
/// must return `false`.
pub trait Link: Send + 'static {
    /// Cheap transport-level liveness flag. Never touches the network.
    fn is_active(&self) -> bool;

    /// Run a trivial remote command, bounded by `timeout`.
    fn probe(&self, timeout: Duration) -> Result<(), SessionError>;

    /// Send a keepalive message if one is due.
    fn keepalive(&self) -> Result<(), SessionError>;

    fn read_dir(&self, path: &str) -> Result<Vec<DirectoryEntry>, FileError>;

    /// Attributes of `path`, following a final symlink.
    fn stat(&self, path: &str) -> Result<DirectoryEntry, FileError>;

    /// Attributes of `path` itself, without following a symlink.
    fn lstat(&self, path: &str) -> Result<DirectoryEntry, FileError>;

    fn read_streamed(
        &self,
        path: &str,
        chunk_size: usize,
        sink: &mut dyn FnMut(&[u8]),
    ) -> Result<u64, FileError>;

    fn write(&self, path: &str, data: &[u8]) -> Result<(), FileError>;

    fn unlink(&self, path: &str) -> Result<(), FileError>;

    fn rmdir(&self, path: &str) -> Result<(), FileError>;

    /// Create one directory level. SFTP has no recursive variant.
    fn mkdir(&self, path: &str) -> Result<(), FileError>;

    fn rename(&self, from: &str, to: &str) -> Result<(), FileError>;

    /// Release the session. Must be safe to call more than once.
    fn close(&mut self);
}

/// Opens new [`Link`]s from stored credentials.
pub trait Connector: Send + Sync + 'static {
    type Link: Link;

    fn open(&self, config: &SshConfig, timeouts: &Timeouts) -> Result<Self::Link, SessionError>;
}
