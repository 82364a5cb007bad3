//! Connection manager builder

use super::ConnectionManager;
use super::inner::ManagerInner;
use crate::config::ManagerConfig;
use crate::connection::{BackendFactory, TransportBackendFactory};
use crate::error::ConnectorResult;
use crate::events::{EventSink, TracingEventSink};
use std::sync::Arc;

/// Builder for [`ConnectionManager`]
pub struct ConnectionManagerBuilder {
    config: ManagerConfig,
    factory: Arc<dyn BackendFactory>,
    sink: Arc<dyn EventSink>,
    health_probes: bool,
}

impl ConnectionManagerBuilder {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            factory: Arc::new(TransportBackendFactory),
            sink: Arc::new(TracingEventSink),
            health_probes: true,
        }
    }

    /// Replace how backends are created
    pub fn with_factory(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Replace where invocation events go
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Enable or disable the periodic health probes
    pub fn with_health_probes(mut self, enabled: bool) -> Self {
        self.health_probes = enabled;
        self
    }

    /// Validate the configuration and build the manager
    pub fn build(self) -> ConnectorResult<ConnectionManager> {
        self.config.validate()?;

        let inner = ManagerInner::new(
            self.config.defaults,
            self.factory,
            self.sink,
            self.health_probes,
        );
        for (name, service) in self.config.services {
            inner.insert_service(&name, service)?;
        }
        Ok(ConnectionManager { inner })
    }
}
