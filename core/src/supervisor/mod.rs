//! Remote session supervision.
//!
//! [`ConnectionSupervisor`] owns the single remote session: it stores the
//! credentials of the last successful connect, probes health, reconnects
//! with a bounded number of attempts, and hands the live [`Link`] to the
//! remote storage provider one operation at a time.

pub mod auth;
mod heartbeat;
pub mod link;
pub mod ssh;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{SshConfig, SupervisorSettings};
use crate::errors::{FileError, SessionError};

use heartbeat::Heartbeat;
pub use link::{Connector, Link};
pub use ssh::{SshConnector, SshLink};

/// Lifecycle state of the supervised session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// A probe, keepalive or operation failed. The next call reconnects.
    Unhealthy,
    Reconnecting,
}

/// What [`ConnectionSupervisor::ensure_connected`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    AlreadyConnected,
    Reconnected { attempts: u32 },
}

impl ReconnectOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::AlreadyConnected => "Connection is healthy".to_string(),
            Self::Reconnected { attempts } => {
                format!("Reconnected after {attempts} attempt(s)")
            }
        }
    }
}

/// Point-in-time view of the supervisor, safe to serialize.
///
/// Never includes the password.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorStatus {
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<String>,
    pub reconnects: u32,
}

pub(crate) struct SessionSlot<L> {
    pub(crate) state: ConnectionState,
    pub(crate) link: Option<L>,
    credentials: Option<SshConfig>,
    last_health_check: Option<String>,
    reconnects: u32,
}

impl<L: Link> SessionSlot<L> {
    fn empty() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            link: None,
            credentials: None,
            last_health_check: None,
            reconnects: 0,
        }
    }

    fn drop_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
    }

    fn mark_checked(&mut self) {
        self.last_health_check = Some(Utc::now().to_rfc3339());
    }
}

/// Supervises one remote session.
///
/// All access to the link goes through an internal mutex, so concurrent
/// callers are serialized and a reconnect can never race an operation.
pub struct ConnectionSupervisor<C: Connector = SshConnector> {
    connector: C,
    settings: SupervisorSettings,
    slot: Arc<Mutex<SessionSlot<C::Link>>>,
    heartbeat: Mutex<Option<Heartbeat>>,
}

impl ConnectionSupervisor<SshConnector> {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self::with_connector(SshConnector, settings)
    }
}

impl<C: Connector> ConnectionSupervisor<C> {
    pub fn with_connector(connector: C, settings: SupervisorSettings) -> Self {
        Self {
            connector,
            settings,
            slot: Arc::new(Mutex::new(SessionSlot::empty())),
            heartbeat: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    fn lock_slot(&self) -> Result<MutexGuard<'_, SessionSlot<C::Link>>, SessionError> {
        self.slot
            .lock()
            .map_err(|e| SessionError::Transport(format!("Failed to lock session: {e}")))
    }

    /// Open a session with `config`, replacing any current one.
    ///
    /// On success the credentials are stored for later reconnects. On
    /// failure the supervisor is left `Disconnected` with no credentials.
    pub fn connect(&self, config: SshConfig) -> Result<(), SessionError> {
        info!(
            host = %config.host,
            port = config.port,
            user = %config.username,
            "Connecting"
        );

        let mut slot = self.lock_slot()?;
        slot.drop_link();
        slot.state = ConnectionState::Connecting;

        match self.connector.open(&config, &self.settings.timeouts()) {
            Ok(link) => {
                slot.link = Some(link);
                slot.credentials = Some(config);
                slot.state = ConnectionState::Connected;
                slot.reconnects = 0;
                slot.mark_checked();
                drop(slot);
                self.start_heartbeat();
                info!("Connected");
                Ok(())
            }
            Err(e) => {
                warn!("Connect failed: {}", e);
                slot.credentials = None;
                slot.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Probe the session with a trivial remote command.
    ///
    /// Returns `false` without touching the network when there is no link.
    /// A session currently held by another operation counts as healthy.
    pub fn is_healthy(&self) -> bool {
        let mut slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(std::sync::TryLockError::WouldBlock) => return true,
            Err(std::sync::TryLockError::Poisoned(_)) => return false,
        };

        let probe_timeout = self.settings.probe_timeout();
        let result = match slot.link.as_ref() {
            None => return false,
            Some(link) if !link.is_active() => {
                Err(SessionError::Transport("transport inactive".to_string()))
            }
            Some(link) => link.probe(probe_timeout),
        };

        slot.mark_checked();
        match result {
            Ok(()) => {
                slot.state = ConnectionState::Connected;
                true
            }
            Err(e) => {
                warn!("Health probe failed: {}", e);
                slot.state = ConnectionState::Unhealthy;
                false
            }
        }
    }

    /// Make sure a usable session exists, probing a connected one and
    /// reconnecting if needed.
    pub fn ensure_connected(&self) -> Result<ReconnectOutcome, SessionError> {
        let mut slot = self.lock_slot()?;
        self.ensure_connected_locked(&mut slot)
    }

    fn ensure_connected_locked(
        &self,
        slot: &mut SessionSlot<C::Link>,
    ) -> Result<ReconnectOutcome, SessionError> {
        if slot.state == ConnectionState::Connected {
            let probe = match slot.link.as_ref() {
                Some(link) if link.is_active() => link.probe(self.settings.probe_timeout()),
                _ => Err(SessionError::NotConnected),
            };
            slot.mark_checked();
            match probe {
                Ok(()) => return Ok(ReconnectOutcome::AlreadyConnected),
                Err(e) => {
                    warn!("Session failed its health probe: {}", e);
                    slot.state = ConnectionState::Unhealthy;
                }
            }
        }

        let Some(config) = slot.credentials.clone() else {
            return Err(SessionError::NoConnectionInfo);
        };

        slot.drop_link();
        slot.state = ConnectionState::Reconnecting;

        let max_attempts = self.settings.max_reconnect_attempts.max(1);
        let delay = self.settings.reconnect_delay();
        let timeouts = self.settings.timeouts();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            info!(
                attempt,
                max_attempts,
                host = %config.host,
                "Reconnecting"
            );
            match self.connector.open(&config, &timeouts) {
                Ok(link) => {
                    slot.link = Some(link);
                    slot.state = ConnectionState::Connected;
                    slot.reconnects += 1;
                    slot.mark_checked();
                    info!(attempt, "Reconnected");
                    return Ok(ReconnectOutcome::Reconnected { attempts: attempt });
                }
                Err(e) => {
                    warn!(attempt, "Reconnect attempt failed: {}", e);
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        // Credentials stay so a later call can try again.
        slot.state = ConnectionState::Disconnected;
        Err(SessionError::ReconnectFailed {
            attempts: max_attempts,
            last_error,
        })
    }

    /// Run `f` against a live link, reconnecting first if needed.
    ///
    /// A connectivity failure inside `f` marks the session unhealthy so the
    /// next call reconnects; the failed operation itself is not retried.
    pub fn with_link<R>(
        &self,
        f: impl FnOnce(&C::Link) -> Result<R, FileError>,
    ) -> Result<R, FileError> {
        let mut slot = self.lock_slot()?;
        self.ensure_connected_locked(&mut slot)?;

        let link = slot.link.as_ref().ok_or(SessionError::NotConnected)?;
        let result = f(link);

        if let Err(FileError::Connectivity(e)) = &result {
            warn!("Operation lost the transport: {}", e);
            slot.state = ConnectionState::Unhealthy;
        }
        result
    }

    /// Close the session and forget the credentials. Idempotent.
    pub fn disconnect(&self) {
        self.stop_heartbeat();

        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.link.is_some() || slot.credentials.is_some() {
            info!("Disconnecting");
        }
        slot.drop_link();
        slot.credentials = None;
        slot.state = ConnectionState::Disconnected;
    }

    pub fn status(&self) -> SupervisorStatus {
        let slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let creds = slot.credentials.as_ref();
        SupervisorStatus {
            state: slot.state,
            host: creds.map(|c| c.host.clone()),
            port: creds.map(|c| c.port),
            username: creds.map(|c| c.username.clone()),
            last_health_check: slot.last_health_check.clone(),
            reconnects: slot.reconnects,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    fn start_heartbeat(&self) {
        let interval = self.settings.timeouts().keepalive_interval;
        if interval.is_zero() {
            return;
        }
        let Ok(mut heartbeat) = self.heartbeat.lock() else {
            return;
        };
        if heartbeat.is_none() {
            debug!("Starting heartbeat every {:?}", interval);
            *heartbeat = Some(Heartbeat::spawn(Arc::clone(&self.slot), interval));
        }
    }

    fn stop_heartbeat(&self) {
        let taken = match self.heartbeat.lock() {
            Ok(mut heartbeat) => heartbeat.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(taken);
    }
}

impl<C: Connector> Drop for ConnectionSupervisor<C> {
    fn drop(&mut self) {
        self.stop_heartbeat();
        if let Ok(mut slot) = self.slot.lock() {
            slot.drop_link();
        }
    }
}
