//! Switchboard Core Library
//!
//! Connection management for tool-server backends: one pooled connection per
//! configured service, operation discovery, health tracking and automatic
//! recovery behind a single [`ConnectionManager`].

pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod health;
pub mod manager;
pub mod protocol;
pub mod reconnect;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{ConfigLoader, LoggingConfig, ManagerConfig, ServiceConfig, TransportKind};
pub use connection::{Backend, BackendFactory, BackendInfo, Connection, ConnectionState};
pub use diagnostics::{DiagnosticReport, ErrorDiagnosis, diagnose_error};
pub use error::{ConnectorError, ConnectorResult, ErrorContext, ErrorKind, UnifiedError};
pub use events::{
    BroadcastEventSink, EventSink, FanoutEventSink, InvocationEvent, InvocationOutcome,
    TracingEventSink,
};
pub use health::HealthRecord;
pub use manager::{
    ConnectReport, ConnectionHandle, ConnectionManager, ConnectionManagerBuilder, ServiceHealth,
    ServiceStatus,
};
pub use reconnect::{BackoffConfig, ReconnectPhase, ReconnectionState};
pub use registry::{
    OperationConflict, OperationDescriptor, OperationRegistry, ParameterSpec, ParameterType,
    ResolvedOperation,
};
