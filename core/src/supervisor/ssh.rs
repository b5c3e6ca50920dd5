//! ssh2-backed [`Connector`] and [`Link`].
//!
//! One blocking SSH session per link, with an SFTP channel opened right
//! after authentication. Callers serialize access through the supervisor's
//! session lock, so nothing here synchronizes on its own beyond the
//! liveness flag.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use super::auth::{as_millis, connect_and_authenticate};
use super::link::{Connector, Link};
use crate::config::{SshConfig, Timeouts};
use crate::errors::{FileError, SessionError};
use crate::storage::utils::{base_name, chrono_from_epoch, format_permissions};
use crate::storage::DirectoryEntry;

// SFTP status codes from draft-ietf-secsh-filexfer-02.
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;
const FX_NO_SUCH_PATH: i32 = 10;

const PROBE_COMMAND: &str = "echo test";

/// Opens real SSH sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl Connector for SshConnector {
    type Link = SshLink;

    fn open(&self, config: &SshConfig, timeouts: &Timeouts) -> Result<SshLink, SessionError> {
        let session = connect_and_authenticate(config, timeouts)?;

        let interval = timeouts.keepalive_interval.as_secs();
        if interval > 0 {
            session.set_keepalive(true, u32::try_from(interval).unwrap_or(u32::MAX));
        }

        let sftp = session
            .sftp()
            .map_err(|e| SessionError::Transport(format!("SFTP init failed: {e}")))?;

        debug!(host = %config.host, port = config.port, "SFTP channel open");
        Ok(SshLink {
            session,
            sftp: Some(sftp),
            alive: AtomicBool::new(true),
        })
    }
}

/// A live SSH session plus its SFTP channel.
pub struct SshLink {
    session: ssh2::Session,
    sftp: Option<ssh2::Sftp>,
    alive: AtomicBool,
}

impl SshLink {
    fn sftp(&self) -> Result<&ssh2::Sftp, FileError> {
        self.sftp
            .as_ref()
            .ok_or(FileError::Connectivity(SessionError::NotConnected))
    }

    fn transport_failed(&self, detail: String) -> SessionError {
        if self.alive.swap(false, Ordering::SeqCst) {
            warn!("SSH transport marked dead: {}", detail);
        }
        SessionError::Transport(detail)
    }

    /// Map an ssh2 error to a [`FileError`], flagging the link dead when the
    /// failure came from the session rather than the SFTP server.
    fn map_error(&self, e: ssh2::Error, op: &str, path: &str) -> FileError {
        match e.code() {
            ssh2::ErrorCode::SFTP(FX_NO_SUCH_FILE) | ssh2::ErrorCode::SFTP(FX_NO_SUCH_PATH) => {
                FileError::NotFound(path.to_string())
            }
            ssh2::ErrorCode::SFTP(FX_PERMISSION_DENIED) => {
                FileError::PermissionDenied(path.to_string())
            }
            ssh2::ErrorCode::SFTP(_) => {
                FileError::OperationFailed(format!("{op} {path} failed: {e}"))
            }
            ssh2::ErrorCode::Session(_) => {
                FileError::Connectivity(self.transport_failed(format!("{op} {path}: {e}")))
            }
        }
    }

    fn map_io_error(&self, e: std::io::Error, op: &str, path: &str) -> FileError {
        match e.kind() {
            std::io::ErrorKind::NotFound => FileError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => FileError::PermissionDenied(path.to_string()),
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::TimedOut => {
                FileError::Connectivity(self.transport_failed(format!("{op} {path}: {e}")))
            }
            _ => FileError::OperationFailed(format!("{op} {path} failed: {e}")),
        }
    }

    fn run_probe(&self) -> Result<(), String> {
        let mut channel = self.session.channel_session().map_err(|e| e.to_string())?;
        channel.exec(PROBE_COMMAND).map_err(|e| e.to_string())?;
        let mut output = String::new();
        channel
            .read_to_string(&mut output)
            .map_err(|e| e.to_string())?;
        channel.wait_close().map_err(|e| e.to_string())?;
        if output.trim() == "test" {
            Ok(())
        } else {
            Err(format!("unexpected probe output: {:?}", output.trim()))
        }
    }
}

fn entry_from_stat(path: &str, stat: &ssh2::FileStat) -> DirectoryEntry {
    DirectoryEntry {
        path: path.to_string(),
        name: base_name(path),
        size: stat.size.unwrap_or(0),
        is_directory: stat.is_dir(),
        modified: stat.mtime.map(chrono_from_epoch).unwrap_or_default(),
        permissions: stat.perm.map(format_permissions),
    }
}

impl Link for SshLink {
    fn is_active(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && self.sftp.is_some()
    }

    fn probe(&self, timeout: Duration) -> Result<(), SessionError> {
        self.session.set_timeout(as_millis(timeout));
        let result = self.run_probe();
        self.session.set_timeout(0);
        result.map_err(|e| self.transport_failed(format!("probe failed: {e}")))
    }

    fn keepalive(&self) -> Result<(), SessionError> {
        self.session
            .keepalive_send()
            .map(|_| ())
            .map_err(|e| self.transport_failed(format!("keepalive failed: {e}")))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirectoryEntry>, FileError> {
        let entries = self
            .sftp()?
            .readdir(Path::new(path))
            .map_err(|e| self.map_error(e, "readdir", path))?;

        let mut result = Vec::with_capacity(entries.len());
        for (pathbuf, stat) in entries {
            let full = pathbuf.to_string_lossy().replace('\\', "/");
            let name = base_name(&full);
            if name.is_empty() || name == "." || name == ".." {
                continue;
            }
            result.push(entry_from_stat(&full, &stat));
        }
        Ok(result)
    }

    fn stat(&self, path: &str) -> Result<DirectoryEntry, FileError> {
        let stat = self
            .sftp()?
            .stat(Path::new(path))
            .map_err(|e| self.map_error(e, "stat", path))?;
        Ok(entry_from_stat(path, &stat))
    }

    fn lstat(&self, path: &str) -> Result<DirectoryEntry, FileError> {
        let stat = self
            .sftp()?
            .lstat(Path::new(path))
            .map_err(|e| self.map_error(e, "lstat", path))?;
        Ok(entry_from_stat(path, &stat))
    }

    fn read_streamed(
        &self,
        path: &str,
        chunk_size: usize,
        sink: &mut dyn FnMut(&[u8]),
    ) -> Result<u64, FileError> {
        let mut file = self
            .sftp()?
            .open(Path::new(path))
            .map_err(|e| self.map_error(e, "open", path))?;

        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut total: u64 = 0;
        loop {
            let n = file
                .read(&mut buf)
                .map_err(|e| self.map_io_error(e, "read", path))?;
            if n == 0 {
                break;
            }
            sink(&buf[..n]);
            total += n as u64;
        }
        Ok(total)
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), FileError> {
        let mut file = self
            .sftp()?
            .create(Path::new(path))
            .map_err(|e| self.map_error(e, "create", path))?;
        file.write_all(data)
            .map_err(|e| self.map_io_error(e, "write", path))
    }

    fn unlink(&self, path: &str) -> Result<(), FileError> {
        self.sftp()?
            .unlink(Path::new(path))
            .map_err(|e| self.map_error(e, "unlink", path))
    }

    fn rmdir(&self, path: &str) -> Result<(), FileError> {
        self.sftp()?
            .rmdir(Path::new(path))
            .map_err(|e| self.map_error(e, "rmdir", path))
    }

    fn mkdir(&self, path: &str) -> Result<(), FileError> {
        self.sftp()?
            .mkdir(Path::new(path), 0o755)
            .map_err(|e| self.map_error(e, "mkdir", path))
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FileError> {
        self.sftp()?
            .rename(Path::new(from), Path::new(to), None)
            .map_err(|e| self.map_error(e, "rename", from))
    }

    fn close(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        // The SFTP channel must go before the session it rides on.
        drop(self.sftp.take());
        if let Err(e) = self.session.disconnect(None, "closing", None) {
            debug!("SSH disconnect: {}", e);
        }
    }
}

impl Drop for SshLink {
    fn drop(&mut self) {
        if self.sftp.is_some() {
            self.close();
        }
    }
}
