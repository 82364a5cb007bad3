//! Pool bookkeeping, connection lifecycle and retry scheduling

use super::slot::ServiceSlot;
use crate::config::{ServiceConfig, ServiceDefaults, validate_service_name};
use crate::connection::{BackendFactory, Connection, ConnectionState};
use crate::error::{ConnectorError, ConnectorResult};
use crate::events::EventSink;
use crate::health::{HealthMonitor, ProbeTarget, spawn_probe_loop};
use crate::reconnect::{BackoffConfig, ReconnectPolicy, RetryDecision};
use crate::registry::OperationRegistry;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) struct ManagerInner {
    this: Weak<ManagerInner>,
    slots: RwLock<HashMap<String, Arc<ServiceSlot>>>,
    pub(crate) registry: OperationRegistry,
    pub(crate) health: HealthMonitor,
    pub(crate) reconnect: ReconnectPolicy,
    factory: Arc<dyn BackendFactory>,
    pub(crate) sink: Arc<dyn EventSink>,
    defaults: ServiceDefaults,
    shutdown: CancellationToken,
    health_probes: bool,
}

impl ManagerInner {
    pub(crate) fn new(
        defaults: ServiceDefaults,
        factory: Arc<dyn BackendFactory>,
        sink: Arc<dyn EventSink>,
        health_probes: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            slots: RwLock::new(HashMap::new()),
            registry: OperationRegistry::new(),
            health: HealthMonitor::new(),
            reconnect: ReconnectPolicy::new(),
            factory,
            sink,
            defaults,
            shutdown: CancellationToken::new(),
            health_probes,
        })
    }

    /// Add a service to the pool; names are unique
    pub(crate) fn insert_service(&self, name: &str, config: ServiceConfig) -> ConnectorResult<()> {
        validate_service_name(name)?;
        let settings = config
            .validate(&self.defaults)
            .map_err(|e| e.with_service(name))?;

        let mut slots = self.slots.write();
        if slots.contains_key(name) {
            return Err(ConnectorError::configuration(format!(
                "service '{}' is already registered",
                name
            ))
            .with_service(name));
        }
        slots.insert(
            name.to_string(),
            Arc::new(ServiceSlot::new(name, config, settings)),
        );
        drop(slots);

        self.health.register(name, settings.failure_threshold);
        self.reconnect
            .register(name, settings.max_attempts, BackoffConfig::from(&settings));
        debug!(service = %name, "service registered");
        Ok(())
    }

    pub(crate) fn slot(&self, service: &str) -> ConnectorResult<Arc<ServiceSlot>> {
        self.slots.read().get(service).cloned().ok_or_else(|| {
            ConnectorError::configuration(format!("unknown service '{}'", service))
                .with_service(service)
        })
    }

    /// All slots sorted by service name
    pub(crate) fn slots(&self) -> Vec<Arc<ServiceSlot>> {
        let mut slots: Vec<_> = self.slots.read().values().cloned().collect();
        slots.sort_by(|a, b| a.name.cmp(&b.name));
        slots
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The `Ready` connection of a slot, opening one on demand
    pub(crate) async fn ready_connection(
        &self,
        slot: &Arc<ServiceSlot>,
    ) -> ConnectorResult<Arc<Connection>> {
        if let Some(connection) = slot.connection() {
            match connection.state() {
                ConnectionState::Ready => return Ok(connection),
                ConnectionState::Degraded => {
                    return Err(ConnectorError::connection("connection is degraded")
                        .with_service(&slot.name));
                }
                _ => {}
            }
        }
        self.get_or_create(slot).await
    }

    /// Single-flight creation. The open runs in its own task so a caller
    /// that gives up does not abandon a half-open transport.
    pub(crate) async fn get_or_create(
        &self,
        slot: &Arc<ServiceSlot>,
    ) -> ConnectorResult<Arc<Connection>> {
        if !slot.config.enabled {
            return Err(ConnectorError::configuration("service is disabled").with_service(&slot.name));
        }
        if let Some(attempts) = self.exhausted_attempts(&slot.name) {
            return Err(ConnectorError::unavailable(attempts).with_service(&slot.name));
        }
        if self.reconnect.is_pending(&slot.name) {
            return Err(ConnectorError::connection("reconnection in progress").with_service(&slot.name));
        }

        let inner = self.upgrade()?;
        let slot = Arc::clone(slot);
        tokio::spawn(async move { inner.ensure_connected(&slot).await })
            .await
            .map_err(|e| ConnectorError::connection(format!("connection task failed: {}", e)))?
    }

    async fn ensure_connected(&self, slot: &Arc<ServiceSlot>) -> ConnectorResult<Arc<Connection>> {
        let seen = slot.open_attempts();
        let _lifecycle = slot.lifecycle.lock().await;
        if self.is_shut_down() {
            return Err(ConnectorError::cancelled().with_service(&slot.name));
        }

        if let Some(connection) = slot.connection() {
            match connection.state() {
                ConnectionState::Ready => return Ok(connection),
                ConnectionState::Degraded => {
                    return Err(ConnectorError::connection("connection is degraded")
                        .with_service(&slot.name));
                }
                _ => {}
            }
        }
        if let Some(attempts) = self.exhausted_attempts(&slot.name) {
            return Err(ConnectorError::unavailable(attempts).with_service(&slot.name));
        }
        // An attempt finished while this caller waited for the lock; share its outcome
        if slot.open_attempts() != seen {
            if let Some(error) = slot.last_error() {
                return Err(error);
            }
        }
        if self.reconnect.is_pending(&slot.name) {
            return Err(ConnectorError::connection("reconnection in progress").with_service(&slot.name));
        }

        match self.open_connection(slot).await {
            Ok(connection) => Ok(connection),
            Err(e) => {
                self.note_failure(slot, &e);
                if e.kind().is_connection_level() {
                    self.schedule_reconnect(&slot.name, &e);
                }
                Err(e)
            }
        }
    }

    /// Replace the slot's connection with a freshly opened one.
    ///
    /// The caller holds the slot's lifecycle lock. The previous connection is
    /// closed before the new one opens, so at most one is ever `Ready`.
    async fn open_connection(&self, slot: &Arc<ServiceSlot>) -> ConnectorResult<Arc<Connection>> {
        let result = self.replace_and_open(slot).await;
        if let Err(e) = &result {
            slot.record_error(e);
        }
        slot.finish_open();
        result
    }

    async fn replace_and_open(&self, slot: &Arc<ServiceSlot>) -> ConnectorResult<Arc<Connection>> {
        slot.stop_probe();
        self.registry.remove(&slot.name);

        let connection = Arc::new(Connection::new(
            slot.name.clone(),
            Arc::clone(&slot.config),
            slot.settings,
        ));
        if let Some(previous) = slot.replace_connection(Arc::clone(&connection)) {
            if let Err(e) = previous.close().await {
                debug!(service = %slot.name, error = %e, "error closing previous connection");
            }
        }

        let started = Instant::now();
        connection.open(self.factory.as_ref()).await?;

        let catalog: ConnectorResult<()> = async {
            let operations = connection.discover().await?;
            self.registry.register(&slot.name, operations)
        }
        .await;
        if let Err(e) = catalog {
            if let Err(close_err) = connection.close().await {
                debug!(service = %slot.name, error = %close_err, "error closing connection after failed discovery");
            }
            return Err(e);
        }

        self.health.record_success(&slot.name, started.elapsed());
        self.reconnect.on_success(&slot.name);
        slot.clear_error();
        self.start_probe(slot);
        Ok(connection)
    }

    /// Manual reconnect: skips any backoff timer and resets the attempt count
    pub(crate) async fn manual_reconnect(
        &self,
        slot: &Arc<ServiceSlot>,
    ) -> ConnectorResult<Arc<Connection>> {
        let _lifecycle = slot.lifecycle.lock().await;
        if self.is_shut_down() {
            return Err(ConnectorError::cancelled().with_service(&slot.name));
        }
        let generation = self.reconnect.manual(&slot.name).ok_or_else(|| {
            ConnectorError::configuration("service has no reconnection state").with_service(&slot.name)
        })?;
        info!(service = %slot.name, "manual reconnect");

        match self.open_connection(slot).await {
            Ok(connection) => Ok(connection),
            Err(e) => {
                self.note_failure(slot, &e);
                self.after_attempt_failed(&slot.name, generation, &e);
                Err(e)
            }
        }
    }

    /// Close one service's connection and forget its catalog
    pub(crate) async fn close_service(&self, slot: &Arc<ServiceSlot>) -> ConnectorResult<()> {
        let _lifecycle = slot.lifecycle.lock().await;
        slot.stop_probe();
        self.reconnect.cancel(&slot.name);
        self.registry.remove(&slot.name);
        match slot.take_connection() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }

    pub(crate) async fn shutdown(&self) {
        self.shutdown.cancel();
        self.reconnect.cancel_all();

        let closes = self.slots().into_iter().map(|slot| async move {
            if let Err(e) = self.close_service(&slot).await {
                warn!(service = %slot.name, error = %e, "error during shutdown");
            }
        });
        futures::future::join_all(closes).await;
        info!("connection manager shut down");
    }

    /// Feed an invocation outcome into health tracking and, when the failure
    /// threshold is crossed, the reconnection policy
    pub(crate) fn record_invocation(
        &self,
        slot: &ServiceSlot,
        result: &ConnectorResult<Value>,
        latency: Duration,
    ) {
        match result {
            Ok(_) => self.health.record_success(&slot.name, latency),
            Err(e) => {
                slot.record_error(e);
                let crossed = self.health.record_failure(&slot.name, e, Some(latency));
                if crossed && e.kind().is_connection_level() {
                    self.schedule_reconnect(&slot.name, e);
                }
            }
        }
    }

    fn note_failure(&self, slot: &ServiceSlot, error: &ConnectorError) {
        slot.record_error(error);
        self.health.record_failure(&slot.name, error, None);
    }

    fn exhausted_attempts(&self, service: &str) -> Option<u32> {
        self.reconnect
            .snapshot(service)
            .filter(|_| self.reconnect.is_exhausted(service))
            .map(|s| s.attempt)
    }

    fn upgrade(&self) -> ConnectorResult<Arc<ManagerInner>> {
        self.this
            .upgrade()
            .ok_or_else(ConnectorError::cancelled)
    }

    fn start_probe(&self, slot: &ServiceSlot) {
        if !self.health_probes || self.is_shut_down() {
            return;
        }
        let token = self.shutdown.child_token();
        slot.replace_probe(token.clone());
        spawn_probe_loop(
            self.this.clone(),
            slot.name.clone(),
            slot.settings.health_check_interval,
            token,
        );
    }

    /// Hand a connection-level failure to the reconnection policy
    pub(crate) fn schedule_reconnect(&self, service: &str, error: &ConnectorError) {
        if self.is_shut_down() {
            return;
        }
        let decision = self.reconnect.on_failure(service, &error.to_string());
        self.apply_decision(service, decision);
    }

    fn after_attempt_failed(&self, service: &str, generation: u64, error: &ConnectorError) {
        if error.kind().is_connection_level() && !self.is_shut_down() {
            let decision = self
                .reconnect
                .on_attempt_failed(service, generation, &error.to_string());
            self.apply_decision(service, decision);
        } else {
            // Authentication and configuration problems are not retried
            self.reconnect.settle(service, generation);
        }
    }

    fn apply_decision(&self, service: &str, decision: RetryDecision) {
        match decision {
            RetryDecision::Schedule {
                delay,
                attempt,
                generation,
            } => {
                info!(
                    service = %service,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                self.spawn_retry(service.to_string(), delay, generation);
            }
            RetryDecision::AlreadyPending => {
                debug!(service = %service, "reconnect already pending");
            }
            RetryDecision::Exhausted { attempts } => {
                warn!(service = %service, attempts, "service unavailable");
            }
            RetryDecision::Stale => {}
        }
    }

    fn spawn_retry(&self, service: String, delay: Duration, generation: u64) {
        let weak = self.this.clone();
        let cancel = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Some(inner) = weak.upgrade() {
                inner.run_retry(&service, generation).await;
            }
        });
    }

    async fn run_retry(&self, service: &str, generation: u64) {
        if !self.reconnect.begin_attempt(service, generation) {
            return;
        }
        let Ok(slot) = self.slot(service) else {
            return;
        };

        let _lifecycle = slot.lifecycle.lock().await;
        if !self.reconnect.is_current(service, generation) || self.is_shut_down() {
            return;
        }
        if slot.state() == Some(ConnectionState::Ready) {
            self.reconnect.on_success(service);
            return;
        }

        match self.open_connection(&slot).await {
            Ok(_) => info!(service = %service, "reconnected"),
            Err(e) => {
                debug!(service = %service, error = %e, "reconnect attempt failed");
                self.note_failure(&slot, &e);
                self.after_attempt_failed(service, generation, &e);
            }
        }
    }
}

#[async_trait]
impl ProbeTarget for ManagerInner {
    async fn probe(&self, service: &str) {
        let Ok(slot) = self.slot(service) else {
            return;
        };
        let Some(connection) = slot.connection() else {
            return;
        };
        if !connection.state().is_live() {
            return;
        }

        match connection.ping().await {
            Ok(latency) => self.health.record_success(service, latency),
            Err(e) => {
                slot.record_error(&e);
                let crossed = self.health.record_failure(service, &e, None);
                if crossed && e.kind().is_connection_level() {
                    self.schedule_reconnect(service, &e);
                }
            }
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
