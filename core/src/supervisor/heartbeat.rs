use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use super::link::Link;
use super::{ConnectionState, SessionSlot};

/// Background keepalive for the supervised session.
///
/// Every `interval` the thread sends a keepalive over the current link. A
/// failure downgrades the slot to `Unhealthy`; the next operation then
/// reconnects. Dropping the handle stops and joins the thread.
pub(crate) struct Heartbeat {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub(crate) fn spawn<L: Link>(slot: Arc<Mutex<SessionSlot<L>>>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("dirbridge-heartbeat".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => tick(&slot),
                    _ => break,
                }
            })
            .map_err(|e| warn!("Failed to spawn heartbeat thread: {}", e))
            .ok();

        Self { stop_tx, handle }
    }
}

fn tick<L: Link>(slot: &Mutex<SessionSlot<L>>) {
    // Skip the beat if an operation is holding the session.
    let Ok(mut guard) = slot.try_lock() else {
        return;
    };
    if guard.state != ConnectionState::Connected {
        return;
    }
    let Some(link) = guard.link.as_ref() else {
        return;
    };
    match link.keepalive() {
        Ok(()) => debug!("Heartbeat ok"),
        Err(e) => {
            warn!("Heartbeat failed: {}", e);
            guard.state = ConnectionState::Unhealthy;
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
