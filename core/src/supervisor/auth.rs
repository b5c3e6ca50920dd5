//! SSH connection establishment and authentication.
//!
//! Provides [`connect_and_authenticate()`] for establishing an authenticated
//! `ssh2::Session` under the supervisor's fixed timeouts, and
//! [`check_ssh_agent_status()`] for querying agent availability.

use std::net::{TcpStream, ToSocketAddrs};
#[cfg(not(target_os = "windows"))]
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::config::expand::expand_tilde;
use crate::config::{AuthMethod, SshConfig, Timeouts};
use crate::errors::SessionError;

const DEFAULT_KEY_PATH: &str = "~/.ssh/id_rsa";

/// Connect to an SSH server, perform the handshake, and authenticate.
///
/// The TCP connect is bounded by `timeouts.connect`, the handshake by
/// `timeouts.banner` and authentication by `timeouts.auth`. The returned
/// session is in blocking mode with no timeout set.
pub fn connect_and_authenticate(
    config: &SshConfig,
    timeouts: &Timeouts,
) -> Result<ssh2::Session, SessionError> {
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| SessionError::ConnectFailed(format!("{}: {e}", config.host)))?
        .next()
        .ok_or_else(|| {
            SessionError::ConnectFailed(format!("{}: no address resolved", config.host))
        })?;

    let tcp = TcpStream::connect_timeout(&addr, timeouts.connect)
        .map_err(|e| SessionError::ConnectFailed(format!("{addr}: {e}")))?;

    let mut session =
        ssh2::Session::new().map_err(|e| SessionError::ConnectFailed(e.to_string()))?;
    session.set_tcp_stream(tcp);
    session.set_blocking(true);

    session.set_timeout(as_millis(timeouts.banner));
    session
        .handshake()
        .map_err(|e| SessionError::HandshakeFailed(e.to_string()))?;

    session.set_timeout(as_millis(timeouts.auth));
    match config.auth_method {
        AuthMethod::Agent => {
            if check_ssh_agent_status() == "stopped" {
                return Err(SessionError::AuthFailed(
                    "SSH agent is not running".to_string(),
                ));
            }
            session
                .userauth_agent(&config.username)
                .map_err(|e| SessionError::AuthFailed(format!("Agent auth failed: {e}")))?;
        }
        AuthMethod::Key => {
            let key_path_str = config
                .key_path
                .as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_KEY_PATH);
            let key_path = PathBuf::from(expand_tilde(key_path_str));
            debug!("Authenticating with key {}", key_path.display());
            session
                .userauth_pubkey_file(
                    &config.username,
                    None,
                    &key_path,
                    config.password.as_deref(),
                )
                .map_err(|e| SessionError::AuthFailed(format!("Key auth failed: {e}")))?;
        }
        AuthMethod::Password => {
            let password = config.password.as_deref().unwrap_or("");
            session
                .userauth_password(&config.username, password)
                .map_err(|e| SessionError::AuthFailed(format!("Password auth failed: {e}")))?;
        }
    }

    if !session.authenticated() {
        return Err(SessionError::AuthFailed(
            "Authentication failed".to_string(),
        ));
    }

    session.set_timeout(0);
    Ok(session)
}

/// Convert a duration to the millisecond timeout libssh2 expects.
pub(crate) fn as_millis(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}

/// Check whether the SSH agent is running or stopped.
///
/// - **Windows**: tries to open the `openssh-ssh-agent` named pipe.
/// - **Unix**: checks if `SSH_AUTH_SOCK` is set and the socket file exists.
///
/// Returns `"running"` or `"stopped"`.
pub fn check_ssh_agent_status() -> String {
    #[cfg(target_os = "windows")]
    {
        use std::fs::OpenOptions;
        let pipe_path = r"\\.\pipe\openssh-ssh-agent";
        match OpenOptions::new().read(true).open(pipe_path) {
            Ok(_) => "running".to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => "stopped".to_string(),
            Err(_) => "running".to_string(),
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        match std::env::var("SSH_AUTH_SOCK") {
            Ok(sock_path) if !sock_path.is_empty() => {
                if Path::new(&sock_path).exists() {
                    "running".to_string()
                } else {
                    "stopped".to_string()
                }
            }
            _ => "stopped".to_string(),
        }
    }
}
