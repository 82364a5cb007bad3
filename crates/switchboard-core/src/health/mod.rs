//! Health monitor
//!
//! Keeps one [`HealthRecord`] per service, fed by the probe loop and by every
//! invocation outcome. Reads never wait on I/O.

mod probe;
mod record;

pub use probe::{ProbeTarget, spawn_probe_loop};
pub use record::HealthRecord;

use crate::error::ConnectorError;
use dashmap::DashMap;
use std::time::Duration;
use tracing::warn;

/// Last-known health of every registered service
#[derive(Debug, Default)]
pub struct HealthMonitor {
    records: DashMap<String, HealthRecord>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the record for a service; an existing record is kept
    pub fn register(&self, service: &str, failure_threshold: u32) {
        self.records
            .entry(service.to_string())
            .and_modify(|r| r.failure_threshold = failure_threshold.max(1))
            .or_insert_with(|| HealthRecord::new(service, failure_threshold));
    }

    /// Forget a service that is no longer configured
    pub fn remove(&self, service: &str) -> Option<HealthRecord> {
        self.records.remove(service).map(|(_, r)| r)
    }

    pub fn record_success(&self, service: &str, latency: Duration) {
        if let Some(mut record) = self.records.get_mut(service) {
            record.record_success(latency);
        }
    }

    /// Record a failed call or probe; returns true once the failure
    /// threshold is reached
    pub fn record_failure(
        &self,
        service: &str,
        error: &ConnectorError,
        latency: Option<Duration>,
    ) -> bool {
        let Some(mut record) = self.records.get_mut(service) else {
            return false;
        };
        let was_healthy = record.healthy;
        let crossed = record.record_failure(error, latency);
        if crossed && was_healthy {
            warn!(
                service = %service,
                failures = record.consecutive_failures,
                error = %error,
                "service marked unhealthy"
            );
        }
        crossed
    }

    /// Last-known record, never probes
    pub fn status(&self, service: &str) -> Option<HealthRecord> {
        self.records.get(service).map(|r| r.clone())
    }

    /// All records sorted by service name
    pub fn all(&self) -> Vec<HealthRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.service.cmp(&b.service));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
