//! Persisted list of recently used connections, most recent first.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{AuthMethod, SshConfig};

pub const HISTORY_FILE_NAME: &str = "history.json";
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// One remembered connection. Never stores the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// `username@host:port`.
    pub key: String,
    pub host: String,
    pub username: String,
    pub port: u16,
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub description: String,
    /// RFC 3339 timestamp of the last successful connect.
    pub last_used: String,
    pub use_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHistory {
    pub entries: Vec<HistoryEntry>,
}

impl ConnectionHistory {
    /// Missing or corrupt files load as an empty history.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ConnectionHistory>(&contents) {
                Ok(history) => {
                    debug!(
                        "Loaded {} history entries from {}",
                        history.entries.len(),
                        path.display()
                    );
                    history
                }
                Err(e) => {
                    warn!("Failed to parse history from {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                debug!("No history file at {}", path.display());
                Self::default()
            }
        }
    }

    /// Persist as pretty JSON. Failures are logged, never fatal.
    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(
                    "Failed to create history directory {}: {}",
                    parent.display(),
                    e
                );
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("Failed to write history to {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("Failed to serialize history: {}", e),
        }
    }

    /// Move `config` to the front, bumping its use count, and trim to `limit`.
    pub fn record(&mut self, config: &SshConfig, description: &str, limit: usize) {
        let key = config.history_key();
        let previous = self
            .entries
            .iter()
            .position(|e| e.key == key)
            .map(|idx| self.entries.remove(idx));

        let description = if description.is_empty() {
            previous
                .as_ref()
                .map(|p| p.description.clone())
                .unwrap_or_default()
        } else {
            description.to_string()
        };

        self.entries.insert(
            0,
            HistoryEntry {
                key,
                host: config.host.clone(),
                username: config.username.clone(),
                port: config.port,
                auth_method: config.auth_method,
                description,
                last_used: Utc::now().to_rfc3339(),
                use_count: previous.map_or(1, |p| p.use_count.saturating_add(1)),
            },
        );
        self.entries.truncate(limit.max(1));
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        self.entries.len() != before
    }

    /// Replace the description of the entry with `key`. Order and use
    /// count are untouched.
    pub fn set_description(&mut self, key: &str, description: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.description = description.trim().to_string();
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }
}
