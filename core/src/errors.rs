//! Error types for the dirbridge core crate.
//!
//! Every transport or filesystem fault is converted into one of these enums
//! at the backend boundary. Consumers (the agent's dispatcher) map them onto
//! their own response shape; nothing below this module leaks `std::io::Error`
//! or `ssh2::Error` to callers.

use serde::Serialize;
use thiserror::Error;

/// Coarse error classification reported alongside failed responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connect, auth or transport failure. Recoverable by reconnecting.
    Connectivity,
    /// Path missing. Reported, not retried.
    NotFound,
    /// Access denied.
    Permission,
    /// Malformed parameters, rejected before any I/O.
    InvalidInput,
    Other,
}

/// Top-level error type returned by every core entry point.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A connection-related error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// A file-operation error.
    #[error("File error: {0}")]
    File(#[from] FileError),

    /// Parameters were rejected before any I/O took place.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A configuration error (unreadable or unwritable config files).
    #[error("Config error: {0}")]
    Config(String),
}

impl CoreError {
    /// Classify this error into the coarse [`ErrorKind`] taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Session(_) => ErrorKind::Connectivity,
            Self::File(e) => e.kind(),
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Config(_) => ErrorKind::Other,
        }
    }
}

/// Errors related to the remote session lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The TCP connection could not be established.
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// The SSH handshake (banner exchange, key exchange) failed.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// The server rejected the supplied credentials.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The transport broke while in use.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No credentials are stored, so a reconnect cannot be attempted.
    #[error("No connection info available, connect first")]
    NoConnectionInfo,

    /// Every reconnect attempt failed.
    #[error("Reconnect failed after {attempts} attempt(s): {last_error}")]
    ReconnectFailed { attempts: u32, last_error: String },

    /// The operation requires a remote session but the supervisor is idle.
    #[error("Not connected")]
    NotConnected,
}

/// Errors related to file browsing and file operations.
#[derive(Error, Debug)]
pub enum FileError {
    /// The requested file or directory was not found.
    #[error("File not found: {0}")]
    NotFound(String),

    /// Permission was denied for the requested operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A file operation failed for any other reason.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// The remote backend could not reach a healthy session.
    #[error("Connectivity error: {0}")]
    Connectivity(#[from] SessionError),
}

impl FileError {
    /// Map a `std::io::Error` to a `FileError` based on its kind.
    pub fn from_io(e: std::io::Error, path: &str) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_string()),
            _ => Self::OperationFailed(format!("{path}: {e}")),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PermissionDenied(_) => ErrorKind::Permission,
            Self::OperationFailed(_) => ErrorKind::Other,
            Self::Connectivity(_) => ErrorKind::Connectivity,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
