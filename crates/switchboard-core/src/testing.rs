//! Scripted backends for unit tests

use crate::config::{ServiceConfig, ServiceSettings};
use crate::connection::{Backend, BackendFactory, BackendInfo};
use crate::error::{ConnectorError, ConnectorResult};
use crate::registry::OperationDescriptor;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
struct ScriptState {
    catalog: Mutex<Vec<OperationDescriptor>>,
    open_failures: AtomicU32,
    open_delay: Mutex<Duration>,
    invoke_delay: Mutex<Duration>,
    invoke_error: Mutex<Option<ConnectorError>>,
    ping_error: Mutex<Option<ConnectorError>>,
    opens: AtomicU32,
    open_times: Mutex<Vec<Instant>>,
    invocations: AtomicU32,
    closes: AtomicU32,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

/// Shared behaviour script for every backend created from it
#[derive(Clone, Default)]
pub(crate) struct Script {
    state: Arc<ScriptState>,
}

impl Script {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_operations(self, names: &[&str]) -> Self {
        let ops = names
            .iter()
            .map(|name| OperationDescriptor::new("", *name))
            .collect();
        self.with_catalog(ops)
    }

    pub(crate) fn with_catalog(self, catalog: Vec<OperationDescriptor>) -> Self {
        *self.state.catalog.lock() = catalog;
        self
    }

    pub(crate) fn fail_opens(self, count: u32) -> Self {
        self.set_open_failures(count);
        self
    }

    pub(crate) fn with_open_delay(self, delay: Duration) -> Self {
        *self.state.open_delay.lock() = delay;
        self
    }

    pub(crate) fn with_invoke_delay(self, delay: Duration) -> Self {
        self.set_invoke_delay(delay);
        self
    }

    pub(crate) fn set_open_failures(&self, count: u32) {
        self.state.open_failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn set_invoke_delay(&self, delay: Duration) {
        *self.state.invoke_delay.lock() = delay;
    }

    pub(crate) fn set_invoke_error(&self, error: Option<ConnectorError>) {
        *self.state.invoke_error.lock() = error;
    }

    pub(crate) fn set_ping_error(&self, error: Option<ConnectorError>) {
        *self.state.ping_error.lock() = error;
    }

    pub(crate) fn set_catalog(&self, catalog: Vec<OperationDescriptor>) {
        *self.state.catalog.lock() = catalog;
    }

    /// Open attempts so far, successful or not
    pub(crate) fn opens(&self) -> u32 {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn open_times(&self) -> Vec<Instant> {
        self.state.open_times.lock().clone()
    }

    pub(crate) fn invocations(&self) -> u32 {
        self.state.invocations.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> u32 {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Backends opened and not yet closed
    pub(crate) fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open backends seen
    pub(crate) fn max_live(&self) -> usize {
        self.state.max_live.load(Ordering::SeqCst)
    }
}

pub(crate) struct ScriptedBackend {
    script: Script,
    opened: AtomicBool,
    closed: AtomicBool,
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn open(&self, _timeout: Duration) -> ConnectorResult<BackendInfo> {
        let state = &self.script.state;
        state.opens.fetch_add(1, Ordering::SeqCst);
        state.open_times.lock().push(Instant::now());

        let delay = *state.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = state
            .open_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ConnectorError::connection("scripted handshake failure"));
        }

        self.opened.store(true, Ordering::SeqCst);
        let live = state.live.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(BackendInfo {
            name: "scripted".to_string(),
            version: "1.0.0".to_string(),
            protocol_version: None,
        })
    }

    async fn discover(&self, _timeout: Duration) -> ConnectorResult<Vec<OperationDescriptor>> {
        Ok(self.script.state.catalog.lock().clone())
    }

    async fn invoke(
        &self,
        operation: &str,
        arguments: Value,
        _timeout: Duration,
    ) -> ConnectorResult<Value> {
        let state = &self.script.state;
        state.invocations.fetch_add(1, Ordering::SeqCst);

        let delay = *state.invoke_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let error = state.invoke_error.lock().clone();
        match error {
            Some(e) => Err(e),
            None => Ok(json!({ "operation": operation, "arguments": arguments })),
        }
    }

    async fn ping(&self, _timeout: Duration) -> ConnectorResult<()> {
        let error = self.script.state.ping_error.lock().clone();
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn close(&self) -> ConnectorResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let state = &self.script.state;
            state.closes.fetch_add(1, Ordering::SeqCst);
            if self.opened.load(Ordering::SeqCst) {
                state.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// Factory handing out scripted backends, optionally per service
#[derive(Clone, Default)]
pub(crate) struct ScriptedFactory {
    default: Script,
    services: HashMap<String, Script>,
}

impl ScriptedFactory {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            default: script,
            services: HashMap::new(),
        }
    }

    pub(crate) fn with_service(mut self, service: &str, script: Script) -> Self {
        self.services.insert(service.to_string(), script);
        self
    }

    pub(crate) fn script(&self) -> &Script {
        &self.default
    }
}

#[async_trait]
impl BackendFactory for ScriptedFactory {
    async fn create(
        &self,
        service: &str,
        _config: &ServiceConfig,
        _settings: &ServiceSettings,
    ) -> ConnectorResult<Arc<dyn Backend>> {
        let script = self
            .services
            .get(service)
            .unwrap_or(&self.default)
            .clone();
        Ok(Arc::new(ScriptedBackend {
            script,
            opened: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }
}
