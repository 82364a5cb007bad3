//! Connection manager
//!
//! The single entry point for callers. Owns the connection pool, the
//! operation registry, the health monitor and the reconnection policy.
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = ConnectionManager::new(config)?;
//! let result = manager
//!     .invoke("zoho", "get_invoices", json!({"status": "open"}))
//!     .await?;
//! ```

mod builder;
mod inner;
mod slot;
mod types;


pub use builder::ConnectionManagerBuilder;
pub use types::{ConnectReport, ConnectionHandle, ServiceHealth, ServiceStatus};

use crate::config::{ManagerConfig, ServiceConfig};
use crate::diagnostics::DiagnosticReport;
use crate::error::{ConnectorError, ConnectorResult, ErrorKind};
use crate::events::{EventSink, InvocationEvent};
use crate::registry::{OperationConflict, OperationDescriptor, OperationRegistry, ResolvedOperation};
use inner::ManagerInner;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;

/// Pool of connections to configured services
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// Build a manager with the default transports and tracing event sink
    pub fn new(config: ManagerConfig) -> ConnectorResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ManagerConfig) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new(config)
    }

    /// Add a service after construction
    pub fn register_service(&self, name: &str, config: ServiceConfig) -> ConnectorResult<()> {
        self.inner.insert_service(name, config)
    }

    /// Configured service names, sorted
    pub fn services(&self) -> Vec<String> {
        self.inner.slots().iter().map(|s| s.name.clone()).collect()
    }

    /// The `Ready` connection for a service, opening one if needed.
    ///
    /// Concurrent callers share a single open attempt.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, service: &str) -> ConnectorResult<ConnectionHandle> {
        let slot = self.inner.slot(service)?;
        let connection = self.inner.ready_connection(&slot).await?;
        Ok(ConnectionHandle::new(connection))
    }

    /// Invoke an operation with the operation's or service's default timeout
    pub async fn invoke(
        &self,
        service: &str,
        operation: &str,
        arguments: Value,
    ) -> ConnectorResult<Value> {
        self.invoke_with_timeout(service, operation, arguments, None)
            .await
    }

    /// Invoke an operation, overriding the timeout when one is given.
    ///
    /// Failures are returned immediately; any reconnection happens in the
    /// background.
    #[instrument(skip(self, arguments))]
    pub async fn invoke_with_timeout(
        &self,
        service: &str,
        operation: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> ConnectorResult<Value> {
        let recorder = InvocationRecorder::new(self.inner.sink.as_ref(), service, operation);
        let result = self.dispatch(service, operation, arguments, timeout).await;
        recorder.finish(&result);
        result
    }

    async fn dispatch(
        &self,
        service: &str,
        operation: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> ConnectorResult<Value> {
        let slot = self.inner.slot(service)?;
        let connection = self
            .inner
            .ready_connection(&slot)
            .await
            .map_err(|e| e.with_operation(operation))?;

        let resolved = self.inner.registry.resolve(service, operation)?;
        resolved.descriptor.validate_arguments(&arguments)?;
        let timeout = timeout
            .or(resolved.descriptor.timeout)
            .unwrap_or(slot.settings.timeout);

        let started = Instant::now();
        let result = connection.invoke(&resolved.name, arguments, timeout).await;
        self.inner
            .record_invocation(&slot, &result, started.elapsed());
        result
    }

    /// Every registered catalog
    pub fn discover(&self) -> BTreeMap<String, Vec<OperationDescriptor>> {
        self.inner.registry.snapshot()
    }

    pub fn operations_for(&self, service: &str) -> Vec<OperationDescriptor> {
        self.inner.registry.operations_for(service)
    }

    pub fn services_for_category(&self, category: &str) -> Vec<String> {
        self.inner.registry.services_for_category(category)
    }

    pub fn resolve(&self, service: &str, operation: &str) -> ConnectorResult<ResolvedOperation> {
        self.inner.registry.resolve(service, operation)
    }

    /// Operation names exposed by several services
    pub fn conflicts(&self) -> Vec<OperationConflict> {
        self.inner.registry.conflicts()
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.inner.registry
    }

    /// Last-known health of a service; never waits on I/O
    pub fn health_status(&self, service: &str) -> ConnectorResult<ServiceHealth> {
        let slot = self.inner.slot(service)?;
        Ok(ServiceHealth::new(
            service,
            slot.state(),
            self.inner.health.status(service),
            self.inner.reconnect.snapshot(service),
        ))
    }

    /// Health of every configured service
    pub fn health_report(&self) -> Vec<ServiceHealth> {
        self.inner
            .slots()
            .iter()
            .map(|slot| {
                ServiceHealth::new(
                    &slot.name,
                    slot.state(),
                    self.inner.health.status(&slot.name),
                    self.inner.reconnect.snapshot(&slot.name),
                )
            })
            .collect()
    }

    /// Reconnect now, bypassing any backoff timer
    #[instrument(skip(self))]
    pub async fn reconnect(&self, service: &str) -> ConnectorResult<ConnectionHandle> {
        let slot = self.inner.slot(service)?;
        let inner = Arc::clone(&self.inner);
        let connection = tokio::spawn(async move { inner.manual_reconnect(&slot).await })
            .await
            .map_err(|e| ConnectorError::connection(format!("reconnect task failed: {}", e)))??;
        Ok(ConnectionHandle::new(connection))
    }

    /// Close a service's connection; idempotent
    pub async fn close(&self, service: &str) -> ConnectorResult<()> {
        let slot = self.inner.slot(service)?;
        self.inner.close_service(&slot).await
    }

    /// Open every enabled service concurrently
    pub async fn connect_all(&self) -> ConnectReport {
        let enabled: Vec<_> = self
            .inner
            .slots()
            .into_iter()
            .filter(|slot| slot.config.enabled)
            .collect();

        let attempts = enabled.iter().map(|slot| async move {
            let result = self.inner.ready_connection(slot).await;
            (slot.name.clone(), result)
        });

        let mut report = ConnectReport::default();
        for (service, result) in futures::future::join_all(attempts).await {
            match result {
                Ok(_) => report.connected.push(service),
                Err(e) => {
                    report.failed.insert(service, e.to_string());
                }
            }
        }
        report
    }

    /// Stop probes and retry timers and close every connection
    pub async fn shutdown(&self) {
        self.inner.shutdown().await;
    }

    /// Collect what is known about a service into an actionable report
    pub fn diagnose(&self, service: &str) -> ConnectorResult<DiagnosticReport> {
        let slot = self.inner.slot(service)?;
        let connection = slot.connection();
        let last_error = slot.last_error();
        let operations = self.inner.registry.operations_for(service);

        let mut report =
            DiagnosticReport::new(service, &slot.config).with_last_error(last_error.as_ref());
        report.state = connection.as_ref().map(|c| c.state());
        report.backend = connection.as_ref().and_then(|c| c.snapshot().backend);
        report.health = self.inner.health.status(service);
        report.reconnection = self.inner.reconnect.snapshot(service);
        report.operations = operations.len();
        report.auth_operations = operations.iter().filter(|o| o.requires_auth).count();
        Ok(report.finish(last_error.as_ref()))
    }
}

/// Emits exactly one event per invocation, including one for a caller that
/// drops the invocation before it completes
struct InvocationRecorder<'a> {
    sink: &'a dyn EventSink,
    service: &'a str,
    operation: &'a str,
    started: Instant,
    done: bool,
}

impl<'a> InvocationRecorder<'a> {
    fn new(sink: &'a dyn EventSink, service: &'a str, operation: &'a str) -> Self {
        Self {
            sink,
            service,
            operation,
            started: Instant::now(),
            done: false,
        }
    }

    fn finish(mut self, result: &ConnectorResult<Value>) {
        self.emit(result.as_ref().err().map(|e| e.kind()));
    }

    fn emit(&mut self, error_kind: Option<ErrorKind>) {
        self.done = true;
        self.sink.emit(&InvocationEvent::new(
            self.service,
            self.operation,
            self.started.elapsed(),
            error_kind,
        ));
    }
}

impl Drop for InvocationRecorder<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.emit(Some(ErrorKind::Cancelled));
        }
    }
}
