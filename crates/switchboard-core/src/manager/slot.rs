//! Per-service pool entry

use crate::config::{ServiceConfig, ServiceSettings};
use crate::connection::{Connection, ConnectionState};
use crate::error::ConnectorError;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Everything the manager keeps for one configured service.
///
/// `lifecycle` serializes open, reconnect and close for the service; the
/// connection pointer itself is read without waiting.
pub(crate) struct ServiceSlot {
    pub(crate) name: String,
    pub(crate) config: Arc<ServiceConfig>,
    pub(crate) settings: ServiceSettings,
    pub(crate) lifecycle: tokio::sync::Mutex<()>,
    connection: RwLock<Option<Arc<Connection>>>,
    last_error: Mutex<Option<ConnectorError>>,
    open_attempts: AtomicU64,
    probe: Mutex<Option<CancellationToken>>,
}

impl ServiceSlot {
    pub(crate) fn new(name: &str, config: ServiceConfig, settings: ServiceSettings) -> Self {
        Self {
            name: name.to_string(),
            config: Arc::new(config),
            settings,
            lifecycle: tokio::sync::Mutex::new(()),
            connection: RwLock::new(None),
            last_error: Mutex::new(None),
            open_attempts: AtomicU64::new(0),
            probe: Mutex::new(None),
        }
    }

    pub(crate) fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.read().clone()
    }

    pub(crate) fn state(&self) -> Option<ConnectionState> {
        self.connection.read().as_ref().map(|c| c.state())
    }

    /// Install a new connection, returning the one it replaces
    pub(crate) fn replace_connection(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        self.connection.write().replace(connection)
    }

    pub(crate) fn take_connection(&self) -> Option<Arc<Connection>> {
        self.connection.write().take()
    }

    pub(crate) fn record_error(&self, error: &ConnectorError) {
        *self.last_error.lock() = Some(error.clone());
    }

    pub(crate) fn clear_error(&self) {
        self.last_error.lock().take();
    }

    pub(crate) fn last_error(&self) -> Option<ConnectorError> {
        self.last_error.lock().clone()
    }

    /// Completed open attempts, successful or not
    pub(crate) fn open_attempts(&self) -> u64 {
        self.open_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn finish_open(&self) {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
    }

    /// Register the token of a freshly started probe loop, stopping any
    /// previous one
    pub(crate) fn replace_probe(&self, token: CancellationToken) {
        if let Some(previous) = self.probe.lock().replace(token) {
            previous.cancel();
        }
    }

    pub(crate) fn stop_probe(&self) {
        if let Some(token) = self.probe.lock().take() {
            token.cancel();
        }
    }
}
