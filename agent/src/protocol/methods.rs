use dirbridge_core::config::{AuthMethod, SshConfig};
use dirbridge_core::mutators::{RenameRequest, TreeOptions};
use dirbridge_core::storage::SessionMode;
use serde::{Deserialize, Serialize};

/// Every method the dispatcher answers, as advertised by `initialize`.
pub const METHODS: &[&str] = &[
    "initialize",
    "connection.connect",
    "connection.disconnect",
    "connection.status",
    "connection.history",
    "connection.history.remove",
    "connection.history.describe",
    "config.get",
    "fs.browse",
    "fs.read",
    "fs.write",
    "fs.delete",
    "fs.batch_delete",
    "compare.run",
    "rename.batch",
    "organize.run",
    "tree.print",
];

// ── initialize ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub client_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub agent_version: String,
    pub methods: Vec<String>,
}

// ── connection.* ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectParams {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub auth_method: AuthMethod,
    pub password: Option<String>,
    pub key_path: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// Params for `connection.history.remove`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryKeyParams {
    /// `username@host:port`, as listed by `connection.history`.
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DescribeHistoryParams {
    pub key: String,
    pub description: String,
}

fn default_port() -> u16 {
    22
}

impl ConnectParams {
    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            auth_method: self.auth_method,
            password: self.password.clone(),
            key_path: self.key_path.clone(),
        }
    }
}

// ── fs.* ────────────────────────────────────────────────────────────

/// Params for `fs.browse`, `fs.read` and `fs.delete`.
#[derive(Debug, Clone, Deserialize)]
pub struct PathParams {
    pub mode: SessionMode,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteParams {
    pub mode: SessionMode,
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchDeleteParams {
    pub mode: SessionMode,
    pub paths: Vec<String>,
}

// ── compare.run ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CompareParams {
    pub source_mode: SessionMode,
    pub target_mode: SessionMode,
    pub path_a: String,
    pub path_b: String,
    /// Falls back to the configured default when absent.
    pub similarity_threshold: Option<f64>,
}

// ── rename.batch / organize.run / tree.print ────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RenameParams {
    pub mode: SessionMode,
    pub path: String,
    #[serde(flatten)]
    pub request: RenameRequest,
}

/// `organize_type` stays a string so an unknown value is reported as a
/// failed operation rather than a protocol error.
#[derive(Debug, Clone, Deserialize)]
pub struct OrganizeParams {
    pub mode: SessionMode,
    pub path: String,
    pub organize_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeParams {
    pub mode: SessionMode,
    pub path: String,
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub use_ignore_file: bool,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

impl TreeParams {
    pub fn options(&self) -> TreeOptions {
        TreeOptions {
            max_depth: self.max_depth,
            use_ignore_file: self.use_ignore_file,
            ignore_patterns: self.ignore_patterns.clone(),
        }
    }
}
