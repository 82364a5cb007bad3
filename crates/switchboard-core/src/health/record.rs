//! Per-service health record

use crate::error::{ConnectorError, ErrorKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Weight of the newest sample in the response-time average
const EMA_ALPHA: f64 = 0.2;

/// Last-known health of one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    pub service: String,
    pub healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
    /// Exponential moving average of response times
    pub avg_response_ms: Option<f64>,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
    pub failure_threshold: u32,
}

impl HealthRecord {
    pub fn new(service: impl Into<String>, failure_threshold: u32) -> Self {
        Self {
            service: service.into(),
            healthy: false,
            last_check: None,
            avg_response_ms: None,
            consecutive_successes: 0,
            consecutive_failures: 0,
            total_successes: 0,
            total_failures: 0,
            last_error: None,
            last_error_kind: None,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// `unknown` until the first observation
    pub fn label(&self) -> &'static str {
        match (self.last_check, self.healthy) {
            (None, _) => "unknown",
            (Some(_), true) => "healthy",
            (Some(_), false) => "unhealthy",
        }
    }

    pub(crate) fn record_success(&mut self, latency: Duration) {
        self.observe(latency);
        self.healthy = true;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
        self.total_successes += 1;
    }

    /// Returns true when the failure threshold has been reached.
    ///
    /// Only connection-level errors count against liveness; other errors
    /// mean the backend answered and are kept for diagnostics.
    pub(crate) fn record_failure(&mut self, error: &ConnectorError, latency: Option<Duration>) -> bool {
        if let Some(latency) = latency {
            self.observe(latency);
        } else {
            self.last_check = Some(Utc::now());
        }
        self.total_failures += 1;
        self.last_error = Some(error.cause());
        self.last_error_kind = Some(error.kind());

        if !error.kind().is_connection_level() {
            return false;
        }

        self.consecutive_successes = 0;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.failure_threshold {
            self.healthy = false;
            true
        } else {
            false
        }
    }

    fn observe(&mut self, latency: Duration) {
        let sample = latency.as_secs_f64() * 1000.0;
        self.avg_response_ms = Some(match self.avg_response_ms {
            Some(avg) => avg * (1.0 - EMA_ALPHA) + sample * EMA_ALPHA,
            None => sample,
        });
        self.last_check = Some(Utc::now());
    }
}
