//! Actionable diagnostics for errors and services

use crate::config::{ServiceConfig, TransportKind};
use crate::connection::{BackendInfo, ConnectionState};
use crate::error::{ConnectorError, ErrorKind, UnifiedError};
use crate::health::HealthRecord;
use crate::reconnect::{ReconnectPhase, ReconnectionState};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Human-oriented explanation of one error
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDiagnosis {
    pub kind: ErrorKind,
    pub error_code: String,
    pub title: String,
    pub message: String,
    pub suggestions: Vec<String>,
    pub retryable: bool,
}

impl ErrorDiagnosis {
    fn new(error: &ConnectorError, title: impl Into<String>) -> Self {
        Self {
            kind: error.kind(),
            error_code: error.error_code().to_string(),
            title: title.into(),
            message: error.to_string(),
            suggestions: Vec::new(),
            retryable: error.is_retryable(),
        }
    }

    fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn format_display(&self) -> String {
        let mut output = format!("{}\n\n{}", self.title, self.message);
        if !self.suggestions.is_empty() {
            output.push_str("\n\nSuggested actions:");
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("\n  {}. {}", i + 1, suggestion));
            }
        }
        output
    }
}

impl From<&ConnectorError> for ErrorDiagnosis {
    fn from(error: &ConnectorError) -> Self {
        let service = error
            .context()
            .service
            .clone()
            .unwrap_or_else(|| "the service".to_string());

        match error {
            ConnectorError::Connection { .. } => {
                ErrorDiagnosis::new(error, format!("Cannot reach {}", service))
                    .suggest("Check that the backend process or endpoint is running")
                    .suggest("Automatic reconnection is in progress; retry shortly")
            }
            ConnectorError::NotReady { state, .. } => {
                ErrorDiagnosis::new(error, format!("{} is not ready ({})", service, state))
                    .suggest("Wait for the connection handshake to complete")
            }
            ConnectorError::OperationNotFound { operation, .. } => ErrorDiagnosis::new(
                error,
                format!("Operation '{}' is not offered by {}", operation, service),
            )
            .suggest("List the catalog to see available operations")
            .suggest("Operation names are resolved per service; check the service name"),
            ConnectorError::InvalidArguments { .. } => {
                ErrorDiagnosis::new(error, "Arguments rejected")
                    .suggest("Compare the arguments with the operation's parameter schema")
            }
            ConnectorError::Timeout { timeout, .. } => ErrorDiagnosis::new(
                error,
                format!("{} did not answer within {}ms", service, timeout.as_millis()),
            )
            .suggest("Raise the service or operation timeout if the backend is slow")
            .suggest("The connection is degraded until a health probe succeeds"),
            ConnectorError::Authentication { .. } => {
                ErrorDiagnosis::new(error, format!("{} rejected the credentials", service))
                    .suggest("Refresh the credentials passed through the service env or headers")
                    .suggest("Authentication errors are never retried automatically")
            }
            ConnectorError::Unavailable { attempts, .. } => ErrorDiagnosis::new(
                error,
                format!("{} is unavailable after {} attempts", service, attempts),
            )
            .suggest("Fix the backend, then trigger a manual reconnect"),
            ConnectorError::Configuration { .. } => {
                ErrorDiagnosis::new(error, "Invalid configuration")
                    .suggest("Run `switchboard validate` to check the configuration file")
            }
            ConnectorError::Protocol { .. } => {
                ErrorDiagnosis::new(error, format!("{} sent an unexpected message", service))
                    .suggest("Check that the backend speaks JSON-RPC 2.0 tool protocol")
            }
            ConnectorError::Server { code, .. } => {
                ErrorDiagnosis::new(error, format!("{} returned error {}", service, code))
                    .suggest("Inspect the backend logs for the failing operation")
            }
            ConnectorError::Cancelled { .. } => ErrorDiagnosis::new(error, "Request cancelled"),
        }
    }
}

/// Explain an error with suggested actions
pub fn diagnose_error(error: &ConnectorError) -> ErrorDiagnosis {
    ErrorDiagnosis::from(error)
}

/// Snapshot of everything known about one service
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub service: String,
    pub transport: TransportKind,
    pub target: String,
    pub enabled: bool,
    pub state: Option<ConnectionState>,
    pub backend: Option<BackendInfo>,
    pub health: Option<HealthRecord>,
    pub reconnection: Option<ReconnectionState>,
    pub operations: usize,
    pub auth_operations: usize,
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
    pub suggestions: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl DiagnosticReport {
    pub(crate) fn new(service: &str, config: &ServiceConfig) -> Self {
        Self {
            service: service.to_string(),
            transport: config.transport,
            target: config.target(),
            enabled: config.enabled,
            state: None,
            backend: None,
            health: None,
            reconnection: None,
            operations: 0,
            auth_operations: 0,
            last_error: None,
            last_error_kind: None,
            suggestions: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    pub(crate) fn with_last_error(mut self, error: Option<&ConnectorError>) -> Self {
        if let Some(error) = error {
            self.last_error = Some(error.to_string());
            self.last_error_kind = Some(error.kind());
        }
        self
    }

    /// Derive suggestions from the collected state
    pub(crate) fn finish(mut self, last_error: Option<&ConnectorError>) -> Self {
        let mut suggestions = Vec::new();

        if !self.enabled {
            suggestions.push("Service is disabled in the configuration".to_string());
        }

        let exhausted = self
            .reconnection
            .as_ref()
            .is_some_and(|r| r.phase == ReconnectPhase::Exhausted);

        match self.state {
            None | Some(ConnectionState::Disconnected) if self.enabled => {
                suggestions
                    .push("Service has not been connected; invoke an operation to connect".to_string());
            }
            Some(ConnectionState::Failed) => {
                suggestions.push(match self.transport {
                    TransportKind::Stdio => format!("Check that `{}` starts and speaks JSON-RPC on stdio", self.target),
                    TransportKind::Http => format!("Check that {} is reachable", self.target),
                });
            }
            Some(ConnectionState::Degraded) => {
                suggestions.push(
                    "Connection is degraded; calls are rejected until a health probe succeeds"
                        .to_string(),
                );
            }
            Some(ConnectionState::Ready) if self.operations == 0 => {
                suggestions.push("Backend reported an empty operation catalog".to_string());
            }
            _ => {}
        }

        if exhausted {
            suggestions.push("Automatic retries are exhausted; trigger a manual reconnect".to_string());
        } else if let Some(next) = self.reconnection.as_ref().and_then(|r| r.next_retry_at) {
            suggestions.push(format!("Next automatic reconnect at {}", next.to_rfc3339()));
        }

        if let Some(error) = last_error {
            if error.kind() == ErrorKind::Authentication && self.auth_operations > 0 {
                suggestions.push(format!(
                    "{} operations require pre-established authentication",
                    self.auth_operations
                ));
            }
            suggestions.extend(diagnose_error(error).suggestions);
        }

        let mut seen = std::collections::HashSet::new();
        suggestions.retain(|s| seen.insert(s.clone()));
        self.suggestions = suggestions;
        self
    }

    /// Ready and not flagged unhealthy
    pub fn is_healthy(&self) -> bool {
        self.state == Some(ConnectionState::Ready)
            && self.health.as_ref().is_none_or(|h| h.healthy || h.last_check.is_none())
    }

    pub fn format_display(&self) -> String {
        let state = self
            .state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "not connected".to_string());
        let mut output = format!(
            "Service: {}\nTransport: {} ({})\nState: {}\nOperations: {}",
            self.service, self.transport, self.target, state, self.operations
        );

        if let Some(backend) = &self.backend {
            output.push_str(&format!("\nBackend: {} {}", backend.name, backend.version));
        }
        if let Some(health) = &self.health {
            output.push_str(&format!("\nHealth: {}", health.label()));
            if let Some(avg) = health.avg_response_ms {
                output.push_str(&format!(" (avg {:.1}ms)", avg));
            }
        }
        if let Some(reconnect) = &self.reconnection {
            output.push_str(&format!(
                "\nReconnect: attempt {}/{} ({:?})",
                reconnect.attempt, reconnect.max_attempts, reconnect.phase
            ));
        }
        if let Some(error) = &self.last_error {
            output.push_str(&format!("\nLast error: {}", error));
        }
        if !self.suggestions.is_empty() {
            output.push_str("\n\nSuggested actions:");
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("\n  {}. {}", i + 1, suggestion));
            }
        }
        output
    }
}
