//! Per-operator state: configuration, the supervised remote session, both
//! storage providers and the connection history.
//!
//! Each user session owns one [`OperatorContext`]; nothing in the crate is
//! global.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{config_dir, AppConfig, PresetServer, SshConfig};
use crate::errors::CoreError;
use crate::history::{ConnectionHistory, HistoryEntry, HISTORY_FILE_NAME};
use crate::mutators::{
    self, OrganizeType, RenameRequest, TreeOptions, TreeReport,
};
use crate::reconcile::{compare_directories, ComparisonReport};
use crate::report::BatchReport;
use crate::storage::{
    write_with_backup, DirectoryEntry, LocalBackend, RemoteBackend, SessionMode, StorageBackend,
    WriteOutcome,
};
use crate::supervisor::{ConnectionSupervisor, Connector, SshConnector, SupervisorStatus};

/// Connection state plus a fresh health verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    #[serde(flatten)]
    pub status: SupervisorStatus,
    pub healthy: bool,
}

/// The part of the configuration a client needs to build its forms.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub presets: Vec<PresetServer>,
    pub common_paths: Vec<String>,
    pub similarity_threshold: f64,
    pub history_limit: usize,
}

pub struct OperatorContext<C: Connector = SshConnector> {
    config: AppConfig,
    supervisor: Arc<ConnectionSupervisor<C>>,
    local: LocalBackend,
    remote: RemoteBackend<C>,
    history: Mutex<ConnectionHistory>,
    history_path: Option<PathBuf>,
}

impl OperatorContext<SshConnector> {
    /// Context backed by real SSH, with history persisted in the config
    /// directory.
    pub fn new(config: AppConfig) -> Self {
        let history_path = config_dir().join(HISTORY_FILE_NAME);
        Self::with_connector(SshConnector, config, Some(history_path))
    }

    /// Load `config.json` from the config directory and build a context.
    pub fn load() -> Self {
        Self::new(AppConfig::load())
    }
}

impl<C: Connector> OperatorContext<C> {
    /// `history_path: None` keeps the history in memory only.
    pub fn with_connector(connector: C, config: AppConfig, history_path: Option<PathBuf>) -> Self {
        let supervisor = Arc::new(ConnectionSupervisor::with_connector(
            connector,
            config.supervisor.clone(),
        ));
        let history = history_path
            .as_deref()
            .map(ConnectionHistory::load_from)
            .unwrap_or_default();
        Self {
            remote: RemoteBackend::new(Arc::clone(&supervisor)),
            local: LocalBackend::new(),
            supervisor,
            history: Mutex::new(history),
            history_path,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            presets: self.config.presets.clone(),
            common_paths: self.config.common_paths.clone(),
            similarity_threshold: self.config.similarity_threshold,
            history_limit: self.config.history_limit,
        }
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<C> {
        &self.supervisor
    }

    /// The provider for one side of an operation.
    pub fn backend(&self, mode: SessionMode) -> &dyn StorageBackend {
        match mode {
            SessionMode::Local => &self.local,
            SessionMode::Remote => &self.remote,
        }
    }

    pub fn connect(
        &self,
        ssh: SshConfig,
        description: &str,
    ) -> Result<SupervisorStatus, CoreError> {
        let ssh = ssh.expand();
        ssh.validate()?;
        self.supervisor.connect(ssh.clone())?;
        self.record_history(&ssh, description);
        Ok(self.supervisor.status())
    }

    fn record_history(&self, ssh: &SshConfig, description: &str) {
        self.update_history(|history| {
            history.record(ssh, description, self.config.history_limit);
            true
        });
    }

    /// Apply `f` to the history and persist it if `f` changed anything.
    fn update_history(&self, f: impl FnOnce(&mut ConnectionHistory) -> bool) -> bool {
        let mut history = match self.history.lock() {
            Ok(history) => history,
            Err(poisoned) => poisoned.into_inner(),
        };
        let changed = f(&mut history);
        if changed {
            if let Some(path) = &self.history_path {
                history.save_to(path);
            }
        }
        changed
    }

    pub fn remove_history(&self, key: &str) -> Result<(), CoreError> {
        if self.update_history(|history| history.remove(key)) {
            info!("Removed {} from connection history", key);
            Ok(())
        } else {
            Err(CoreError::InvalidInput(format!("No history entry for {key}")))
        }
    }

    pub fn describe_history(&self, key: &str, description: &str) -> Result<(), CoreError> {
        if self.update_history(|history| history.set_description(key, description)) {
            Ok(())
        } else {
            Err(CoreError::InvalidInput(format!("No history entry for {key}")))
        }
    }

    pub fn disconnect(&self) {
        self.supervisor.disconnect();
    }

    pub fn status(&self) -> ConnectionReport {
        let healthy = self.supervisor.is_healthy();
        ConnectionReport {
            status: self.supervisor.status(),
            healthy,
        }
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        match self.history.lock() {
            Ok(history) => history.entries().to_vec(),
            Err(poisoned) => poisoned.into_inner().entries().to_vec(),
        }
    }

    pub fn browse(&self, mode: SessionMode, path: &str) -> Result<Vec<DirectoryEntry>, CoreError> {
        let backend = self.backend(mode);
        backend.ensure_ready()?;
        Ok(backend.list_dir(path)?)
    }

    /// Read a whole file as UTF-8 text for editing.
    pub fn read_text(&self, mode: SessionMode, path: &str) -> Result<String, CoreError> {
        let backend = self.backend(mode);
        backend.ensure_ready()?;
        let data = backend.read_file(path)?;
        String::from_utf8(data).map_err(|_| {
            CoreError::InvalidInput(format!("{path} is not UTF-8 text"))
        })
    }

    pub fn write_file(
        &self,
        mode: SessionMode,
        path: &str,
        data: &[u8],
    ) -> Result<WriteOutcome, CoreError> {
        let backend = self.backend(mode);
        backend.ensure_ready()?;
        let outcome = write_with_backup(backend, path, data)?;
        info!("Wrote {} bytes to {} ({})", outcome.bytes_written, path, mode.as_str());
        Ok(outcome)
    }

    pub fn delete(&self, mode: SessionMode, path: &str) -> Result<(), CoreError> {
        mutators::delete_path(self.backend(mode), path, &self.config)
    }

    pub fn batch_delete(&self, mode: SessionMode, paths: &[String]) -> Result<BatchReport, CoreError> {
        mutators::batch_delete(self.backend(mode), paths, &self.config)
    }

    /// Compare `path_a` on one side with `path_b` on the other. Without an
    /// explicit threshold the configured default applies.
    pub fn compare(
        &self,
        source_mode: SessionMode,
        path_a: &str,
        target_mode: SessionMode,
        path_b: &str,
        threshold: Option<f64>,
    ) -> Result<ComparisonReport, CoreError> {
        let threshold = threshold.unwrap_or(self.config.similarity_threshold);
        let report = compare_directories(
            self.backend(source_mode),
            path_a,
            self.backend(target_mode),
            path_b,
            threshold,
            self.config.hashing.chunk_size,
        )?;
        if report.matches.is_empty() {
            warn!("No matches between {} and {}", path_a, path_b);
        }
        Ok(report)
    }

    pub fn rename(
        &self,
        mode: SessionMode,
        path: &str,
        request: &RenameRequest,
    ) -> Result<BatchReport, CoreError> {
        mutators::batch_rename(self.backend(mode), path, request)
    }

    pub fn organize(
        &self,
        mode: SessionMode,
        path: &str,
        kind: OrganizeType,
    ) -> Result<BatchReport, CoreError> {
        mutators::organize(self.backend(mode), path, kind)
    }

    pub fn tree(
        &self,
        mode: SessionMode,
        path: &str,
        options: &TreeOptions,
    ) -> Result<TreeReport, CoreError> {
        mutators::print_tree(self.backend(mode), path, options)
    }
}

impl<C: Connector> Drop for OperatorContext<C> {
    fn drop(&mut self) {
        self.supervisor.disconnect();
    }
}
