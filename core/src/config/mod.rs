pub mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::CoreError;

const CONFIG_FILE_NAME: &str = "config.json";

/// How the client authenticates against the SSH server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    #[default]
    Password,
    Key,
    Agent,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Key => "key",
            Self::Agent => "agent",
        }
    }
}

/// Credentials and target for one remote session.
///
/// The supervisor stores this (not the live transport) so that a reconnect
/// can replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub auth_method: AuthMethod,
    /// Password for password auth, passphrase for key auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_ssh_port(),
            username: String::new(),
            auth_method: AuthMethod::default(),
            password: None,
            key_path: None,
        }
    }
}

impl SshConfig {
    /// Return a copy with `${env:...}` placeholders and `~` expanded.
    ///
    /// The password is taken literally.
    pub fn expand(mut self) -> Self {
        self.host = expand::expand_env_placeholders(&self.host);
        self.username = expand::expand_env_placeholders(&self.username);
        self.key_path = self.key_path.map(|s| {
            // Pasted paths often arrive quoted.
            let stripped = s.trim().trim_matches('"').trim_matches('\'');
            expand::expand_tilde(&expand::expand_env_placeholders(stripped))
        });
        self
    }

    /// Reject configs that cannot possibly connect.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.host.trim().is_empty() {
            return Err(CoreError::InvalidInput("Host is required".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(CoreError::InvalidInput("Username is required".to_string()));
        }
        if self.port == 0 {
            return Err(CoreError::InvalidInput("Port must be non-zero".to_string()));
        }
        Ok(())
    }

    /// History key: `username@host:port`.
    pub fn history_key(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Timeouts, keepalive and retry policy for the connection supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub connect_timeout_secs: u64,
    pub banner_timeout_secs: u64,
    pub auth_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    /// Interval of the background heartbeat; `0` disables the thread.
    pub keepalive_interval_secs: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            banner_timeout_secs: 30,
            auth_timeout_secs: 30,
            probe_timeout_secs: 5,
            keepalive_interval_secs: 30,
            max_reconnect_attempts: 3,
            reconnect_delay_ms: 2000,
        }
    }
}

impl SupervisorSettings {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            banner: Duration::from_secs(self.banner_timeout_secs),
            auth: Duration::from_secs(self.auth_timeout_secs),
            keepalive_interval: Duration::from_secs(self.keepalive_interval_secs),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Fixed bounds applied while establishing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub banner: Duration,
    pub auth: Duration,
    pub keepalive_interval: Duration,
}

/// Content hashing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashSettings {
    /// Bytes read per chunk while hashing.
    pub chunk_size: usize,
}

impl Default for HashSettings {
    fn default() -> Self {
        Self { chunk_size: 4096 }
    }
}

/// A server offered in the connect form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetServer {
    pub name: String,
    pub host: String,
    pub username: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub description: String,
}

/// Application configuration, read from `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub supervisor: SupervisorSettings,
    pub hashing: HashSettings,
    pub similarity_threshold: f64,
    pub history_limit: usize,
    /// Deleting below any of these logs a warning.
    pub dangerous_paths: Vec<String>,
    pub presets: Vec<PresetServer>,
    pub common_paths: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorSettings::default(),
            hashing: HashSettings::default(),
            similarity_threshold: 0.8,
            history_limit: 20,
            dangerous_paths: ["/boot", "/sys", "/proc", "/dev"]
                .into_iter()
                .map(String::from)
                .collect(),
            presets: Vec::new(),
            common_paths: ["/home", "/var/log", "/opt", "/tmp", "/usr/local", "/etc"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl AppConfig {
    /// Load from the default config directory.
    pub fn load() -> Self {
        Self::load_from(&config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load from a specific path. Missing or corrupt files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    debug!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                debug!("No config file at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Save as pretty-printed JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::Config(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| CoreError::Config(format!("Failed to write {}: {e}", path.display())))
    }

    /// Whether `path` is at or below one of the configured dangerous paths.
    pub fn is_dangerous_path(&self, path: &str) -> bool {
        self.dangerous_paths.iter().any(|d| {
            let d = d.trim_end_matches('/');
            path == d || path.starts_with(&format!("{d}/"))
        })
    }
}

/// The directory holding `config.json` and `history.json`.
///
/// `DIRBRIDGE_CONFIG_DIR` overrides the platform default.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DIRBRIDGE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("dirbridge");
    }
    if let Ok(home) = std::env::var("HOME") {
        #[cfg(target_os = "macos")]
        return PathBuf::from(&home)
            .join("Library")
            .join("Application Support")
            .join("dirbridge");
        #[cfg(not(target_os = "macos"))]
        return PathBuf::from(&home).join(".config").join("dirbridge");
    }
    PathBuf::from(".config").join("dirbridge")
}

fn default_ssh_port() -> u16 {
    22
}
