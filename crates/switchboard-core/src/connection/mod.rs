//! A managed link to one backend
//!
//! ## State machine
//!
//! ```text
//! Disconnected → Connecting → Ready ⇄ Degraded → Disconnected
//!                     ↓
//!                   Failed → Connecting (external reconnect)
//! ```
//!
//! Operations are only accepted in `Ready`. A timeout or transport error while
//! `Ready` moves the connection to `Degraded`; a successful probe moves it back.

mod backend;
pub mod rpc;

pub use backend::{Backend, BackendFactory, BackendInfo, RpcBackend, TransportBackendFactory};
pub use rpc::RpcClient;

use crate::config::{ServiceConfig, ServiceSettings};
use crate::error::{ConnectorError, ConnectorResult};
use crate::registry::OperationDescriptor;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Degraded,
    Failed,
}

impl ConnectionState {
    /// Whether a backend transport is held in this state
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub service: String,
    pub state: ConnectionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub backend: Option<BackendInfo>,
}

#[derive(Debug)]
struct ConnectionStatus {
    state: ConnectionState,
    last_activity: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    backend_info: Option<BackendInfo>,
}

/// One link to one backend
pub struct Connection {
    service: String,
    config: Arc<ServiceConfig>,
    settings: ServiceSettings,
    created_at: DateTime<Utc>,
    backend: RwLock<Option<Arc<dyn Backend>>>,
    status: Mutex<ConnectionStatus>,
}

impl Connection {
    pub fn new(service: impl Into<String>, config: Arc<ServiceConfig>, settings: ServiceSettings) -> Self {
        Self {
            service: service.into(),
            config,
            settings,
            created_at: Utc::now(),
            backend: RwLock::new(None),
            status: Mutex::new(ConnectionStatus {
                state: ConnectionState::Disconnected,
                last_activity: None,
                consecutive_failures: 0,
                backend_info: None,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.status.lock().last_activity
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.status.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let status = self.status.lock();
        ConnectionSnapshot {
            service: self.service.clone(),
            state: status.state,
            created_at: self.created_at,
            last_activity: status.last_activity,
            consecutive_failures: status.consecutive_failures,
            backend: status.backend_info.clone(),
        }
    }

    /// Establish the transport and complete the handshake.
    ///
    /// Only valid from `Disconnected` or `Failed`.
    #[instrument(skip(self, factory), fields(service = %self.service))]
    pub async fn open(&self, factory: &dyn BackendFactory) -> ConnectorResult<BackendInfo> {
        {
            let mut status = self.status.lock();
            match status.state {
                ConnectionState::Disconnected | ConnectionState::Failed => {
                    status.state = ConnectionState::Connecting;
                }
                other => {
                    return Err(ConnectorError::connection(format!(
                        "cannot open a connection that is {}",
                        other
                    ))
                    .with_service(&self.service));
                }
            }
        }

        let timeout = self.settings.timeout;
        let result: ConnectorResult<(Arc<dyn Backend>, BackendInfo)> = async {
            let backend = factory
                .create(&self.service, &self.config, &self.settings)
                .await?;
            match tokio::time::timeout(timeout, backend.open(timeout)).await {
                Ok(Ok(info)) => Ok((backend, info)),
                Ok(Err(e)) => {
                    let _ = backend.close().await;
                    Err(e)
                }
                Err(_) => {
                    let _ = backend.close().await;
                    Err(ConnectorError::timeout(timeout))
                }
            }
        }
        .await;

        match result {
            Ok((backend, info)) => {
                let installed = {
                    let mut status = self.status.lock();
                    if status.state == ConnectionState::Connecting {
                        *self.backend.write() = Some(Arc::clone(&backend));
                        status.state = ConnectionState::Ready;
                        status.consecutive_failures = 0;
                        status.last_activity = Some(Utc::now());
                        status.backend_info = Some(info.clone());
                        true
                    } else {
                        false
                    }
                };
                if !installed {
                    // Closed while the handshake was in flight
                    let _ = backend.close().await;
                    return Err(ConnectorError::cancelled().with_service(&self.service));
                }

                info!(
                    service = %self.service,
                    backend = %info.name,
                    version = %info.version,
                    "connection ready"
                );
                Ok(info)
            }
            Err(e) => {
                {
                    let mut status = self.status.lock();
                    if status.state == ConnectionState::Connecting {
                        status.state = ConnectionState::Failed;
                    }
                    status.consecutive_failures += 1;
                }
                warn!(service = %self.service, error = %e, "connection failed to open");
                Err(e.with_service(&self.service))
            }
        }
    }

    /// Fetch the operation catalog from the backend
    pub async fn discover(&self) -> ConnectorResult<Vec<OperationDescriptor>> {
        let backend = self.backend_in(&[ConnectionState::Ready])?;
        let timeout = self.settings.timeout;

        let mut operations = match tokio::time::timeout(timeout, backend.discover(timeout)).await {
            Ok(result) => result.map_err(|e| e.with_service(&self.service))?,
            Err(_) => return Err(ConnectorError::timeout(timeout).with_service(&self.service)),
        };

        for op in &mut operations {
            op.service = self.service.clone();
            if op.category.is_none() {
                op.category = self.config.category.clone();
            }
        }
        debug!(service = %self.service, count = operations.len(), "discovered operations");
        Ok(operations)
    }

    /// Send one request and wait for its response.
    ///
    /// A timeout or connection-level failure leaves the connection `Degraded`.
    pub async fn invoke(
        &self,
        operation: &str,
        arguments: Value,
        timeout: Duration,
    ) -> ConnectorResult<Value> {
        let backend = self
            .backend_in(&[ConnectionState::Ready])
            .map_err(|e| e.with_operation(operation))?;

        let result = match tokio::time::timeout(timeout, backend.invoke(operation, arguments, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectorError::timeout(timeout)),
        };

        self.record_outcome(result.as_ref().err());
        result.map_err(|e| e.with_service(&self.service).with_operation(operation))
    }

    /// Probe the backend; returns the round-trip time.
    ///
    /// A successful probe restores a `Degraded` connection to `Ready`.
    pub async fn ping(&self) -> ConnectorResult<Duration> {
        let backend = self.backend_in(&[ConnectionState::Ready, ConnectionState::Degraded])?;
        let timeout = self.settings.timeout;
        let started = Instant::now();

        let result = match tokio::time::timeout(timeout, backend.ping(timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectorError::timeout(timeout)),
        };

        self.record_outcome(result.as_ref().err());
        result
            .map(|_| started.elapsed())
            .map_err(|e| e.with_service(&self.service))
    }

    /// Release the transport. Safe from any state and on repeated calls.
    pub async fn close(&self) -> ConnectorResult<()> {
        let backend = self.backend.write().take();
        {
            let mut status = self.status.lock();
            status.state = ConnectionState::Disconnected;
        }

        match backend {
            Some(backend) => {
                debug!(service = %self.service, "closing connection");
                backend.close().await.map_err(|e| e.with_service(&self.service))
            }
            None => Ok(()),
        }
    }

    fn record_outcome(&self, error: Option<&ConnectorError>) {
        let mut status = self.status.lock();
        status.last_activity = Some(Utc::now());

        match error {
            None => {
                status.consecutive_failures = 0;
                if status.state == ConnectionState::Degraded {
                    status.state = ConnectionState::Ready;
                    info!(service = %self.service, "connection recovered");
                }
            }
            Some(e) if e.kind().is_connection_level() => {
                status.consecutive_failures += 1;
                if status.state == ConnectionState::Ready {
                    status.state = ConnectionState::Degraded;
                    warn!(service = %self.service, error = %e, "connection degraded");
                }
            }
            Some(_) => {}
        }
    }

    fn backend_in(&self, allowed: &[ConnectionState]) -> ConnectorResult<Arc<dyn Backend>> {
        let state = self.state();
        if !allowed.contains(&state) {
            let err = if state == ConnectionState::Degraded {
                ConnectorError::connection("connection is degraded")
            } else {
                ConnectorError::not_ready(state)
            };
            return Err(err.with_service(&self.service));
        }
        self.backend
            .read()
            .clone()
            .ok_or_else(|| ConnectorError::not_ready(state).with_service(&self.service))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("service", &self.service)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish()
    }
}
