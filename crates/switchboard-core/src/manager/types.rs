//! Values returned by the connection manager

use crate::connection::{BackendInfo, Connection, ConnectionSnapshot, ConnectionState};
use crate::health::HealthRecord;
use crate::reconnect::{ReconnectPhase, ReconnectionState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Read-only handle on a pooled connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    connection: Arc<Connection>,
}

impl ConnectionHandle {
    pub(crate) fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    pub fn service(&self) -> &str {
        self.connection.service()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.connection.snapshot()
    }

    pub fn backend(&self) -> Option<BackendInfo> {
        self.connection.snapshot().backend
    }

    /// Whether both handles point at the same pooled connection
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.connection, &other.connection)
    }
}

/// Coarse status of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Healthy,
    Connecting,
    Degraded,
    Unhealthy,
    /// Automatic reconnection gave up
    Unavailable,
    Disconnected,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Healthy => "healthy",
            Self::Connecting => "connecting",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unavailable => "unavailable",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Health view of one service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub service: String,
    pub status: ServiceStatus,
    pub state: Option<ConnectionState>,
    pub record: Option<HealthRecord>,
    pub reconnection: Option<ReconnectionState>,
}

impl ServiceHealth {
    pub(crate) fn new(
        service: &str,
        state: Option<ConnectionState>,
        record: Option<HealthRecord>,
        reconnection: Option<ReconnectionState>,
    ) -> Self {
        let exhausted = reconnection
            .as_ref()
            .is_some_and(|r| r.phase == ReconnectPhase::Exhausted);
        let flagged_unhealthy = record
            .as_ref()
            .is_some_and(|r| r.last_check.is_some() && !r.healthy);

        let status = match state {
            _ if exhausted => ServiceStatus::Unavailable,
            Some(ConnectionState::Ready) if flagged_unhealthy => ServiceStatus::Unhealthy,
            Some(ConnectionState::Ready) => ServiceStatus::Healthy,
            Some(ConnectionState::Degraded) => ServiceStatus::Degraded,
            Some(ConnectionState::Connecting) => ServiceStatus::Connecting,
            Some(ConnectionState::Failed) => ServiceStatus::Unhealthy,
            Some(ConnectionState::Disconnected) | None => ServiceStatus::Disconnected,
        };

        Self {
            service: service.to_string(),
            status,
            state,
            record,
            reconnection,
        }
    }
}

/// Outcome of connecting every enabled service
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectReport {
    pub connected: Vec<String>,
    /// Service → error message
    pub failed: BTreeMap<String, String>,
}

impl ConnectReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
