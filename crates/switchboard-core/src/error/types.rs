//! Connector error enumeration and classification

use super::context::ErrorContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type used throughout Switchboard
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// JSON-RPC code for an unknown method
const RPC_METHOD_NOT_FOUND: i32 = -32601;
/// JSON-RPC code for invalid params
const RPC_INVALID_PARAMS: i32 = -32602;
/// Server-defined code backends use for rejected credentials
const RPC_UNAUTHORIZED: i32 = -32001;

/// Flat classification of every failure the core can surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport or handshake failure
    Connection,
    /// Call attempted before the connection finished its handshake
    NotReady,
    /// The service catalog lacks the requested operation
    OperationNotFound,
    /// Arguments do not satisfy the operation's parameter schema
    InvalidArguments,
    /// No response within the time budget
    Timeout,
    /// Credentials rejected by the backend
    Authentication,
    /// Automatic reconnection gave up
    Unavailable,
    /// Malformed or missing configuration
    Configuration,
    /// Backend sent something that is not valid protocol
    Protocol,
    /// Backend answered with an application error
    Server,
    /// Caller or shutdown cancelled the call
    Cancelled,
}

impl ErrorKind {
    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::NotReady => "not_ready",
            Self::OperationNotFound => "operation_not_found",
            Self::InvalidArguments => "invalid_arguments",
            Self::Timeout => "timeout",
            Self::Authentication => "authentication",
            Self::Unavailable => "unavailable",
            Self::Configuration => "configuration",
            Self::Protocol => "protocol",
            Self::Server => "server",
            Self::Cancelled => "cancelled",
        }
    }

    /// Failures of the link itself rather than of the request.
    ///
    /// Only these feed the reconnection policy and are retried automatically.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Self::Connection | Self::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the connection manager and its collaborators
#[derive(Debug, Error, Clone)]
pub enum ConnectorError {
    /// Transport or handshake failure
    #[error("Connection error [{}]: {message}", .context.label())]
    Connection {
        message: String,
        context: ErrorContext,
    },

    /// Connection has not completed its handshake
    #[error("Connection not ready [{}]: state is {state}", .context.label())]
    NotReady {
        state: String,
        context: ErrorContext,
    },

    /// Operation missing from the service catalog
    #[error("Operation not found [{}]: {operation}", .context.label())]
    OperationNotFound {
        operation: String,
        context: ErrorContext,
    },

    /// Arguments rejected before the call was sent
    #[error("Invalid arguments [{}]: {message}", .context.label())]
    InvalidArguments {
        message: String,
        context: ErrorContext,
    },

    /// No response within budget
    #[error("Timeout [{}]: no response after {}ms", .context.label(), .timeout.as_millis())]
    Timeout {
        timeout: Duration,
        context: ErrorContext,
    },

    /// Credentials rejected
    #[error("Authentication failed [{}]: {message}", .context.label())]
    Authentication {
        message: String,
        context: ErrorContext,
    },

    /// Reconnection attempts exhausted
    #[error("Service unavailable [{}]: gave up after {attempts} reconnection attempts", .context.label())]
    Unavailable {
        attempts: u32,
        context: ErrorContext,
    },

    /// Configuration rejected
    #[error("Configuration error [{}]: {message}", .context.label())]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// Malformed protocol traffic
    #[error("Protocol error [{}]: {message}", .context.label())]
    Protocol {
        message: String,
        context: ErrorContext,
    },

    /// Application-level error from the backend
    #[error("Server error {code} [{}]: {message}", .context.label())]
    Server {
        code: i32,
        message: String,
        context: ErrorContext,
    },

    /// Call cancelled before completion
    #[error("Cancelled [{}]", .context.label())]
    Cancelled { context: ErrorContext },
}

impl ConnectorError {
    /// Create a Connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            context: ErrorContext::now(),
        }
    }

    /// Create a NotReady error for the given connection state
    pub fn not_ready(state: impl fmt::Display) -> Self {
        Self::NotReady {
            state: state.to_string(),
            context: ErrorContext::now(),
        }
    }

    /// Create an OperationNotFound error
    pub fn operation_not_found(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        let mut context = ErrorContext::now();
        context.operation = Some(operation.clone());
        Self::OperationNotFound { operation, context }
    }

    /// Create an InvalidArguments error
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
            context: ErrorContext::now(),
        }
    }

    /// Create a Timeout error
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout {
            timeout,
            context: ErrorContext::now(),
        }
    }

    /// Create an Authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            context: ErrorContext::now(),
        }
    }

    /// Create an Unavailable error
    pub fn unavailable(attempts: u32) -> Self {
        Self::Unavailable {
            attempts,
            context: ErrorContext::now(),
        }
    }

    /// Create a Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            context: ErrorContext::now(),
        }
    }

    /// Create a Protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            context: ErrorContext::now(),
        }
    }

    /// Create a Server error
    pub fn server(code: i32, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
            context: ErrorContext::now(),
        }
    }

    /// Create a Cancelled error
    pub fn cancelled() -> Self {
        Self::Cancelled {
            context: ErrorContext::now(),
        }
    }

    /// Classify a JSON-RPC error object returned by a backend
    pub fn from_rpc(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();

        if code == RPC_UNAUTHORIZED
            || code == 401
            || code == 403
            || lowered.contains("unauthorized")
            || lowered.contains("invalid credentials")
            || lowered.contains("token expired")
            || lowered.contains("authentication required")
        {
            return Self::authentication(message);
        }

        match code {
            RPC_METHOD_NOT_FOUND => Self::OperationNotFound {
                operation: message,
                context: ErrorContext::now(),
            },
            RPC_INVALID_PARAMS => Self::invalid_arguments(message),
            _ => Self::server(code, message),
        }
    }

    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::NotReady { .. } => ErrorKind::NotReady,
            Self::OperationNotFound { .. } => ErrorKind::OperationNotFound,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Server { .. } => ErrorKind::Server,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Only connection-level failures are retried automatically
    pub fn is_retryable(&self) -> bool {
        self.kind().is_connection_level()
    }

    /// Context attached to this error
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Connection { context, .. }
            | Self::NotReady { context, .. }
            | Self::OperationNotFound { context, .. }
            | Self::InvalidArguments { context, .. }
            | Self::Timeout { context, .. }
            | Self::Authentication { context, .. }
            | Self::Unavailable { context, .. }
            | Self::Configuration { context, .. }
            | Self::Protocol { context, .. }
            | Self::Server { context, .. }
            | Self::Cancelled { context } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Connection { context, .. }
            | Self::NotReady { context, .. }
            | Self::OperationNotFound { context, .. }
            | Self::InvalidArguments { context, .. }
            | Self::Timeout { context, .. }
            | Self::Authentication { context, .. }
            | Self::Unavailable { context, .. }
            | Self::Configuration { context, .. }
            | Self::Protocol { context, .. }
            | Self::Server { context, .. }
            | Self::Cancelled { context } => context,
        }
    }

    /// Attach the service name, keeping any service already recorded
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        let ctx = self.context_mut();
        if ctx.service.is_none() {
            ctx.service = Some(service.into());
        }
        self
    }

    /// Attach the operation name, keeping any operation already recorded
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        let ctx = self.context_mut();
        if ctx.operation.is_none() {
            ctx.operation = Some(operation.into());
        }
        self
    }

    /// Human-readable cause without the context prefix
    pub fn cause(&self) -> String {
        match self {
            Self::Connection { message, .. }
            | Self::InvalidArguments { message, .. }
            | Self::Authentication { message, .. }
            | Self::Configuration { message, .. }
            | Self::Protocol { message, .. }
            | Self::Server { message, .. } => message.clone(),
            Self::NotReady { state, .. } => format!("connection is {}", state),
            Self::OperationNotFound { operation, .. } => {
                format!("operation '{}' is not in the service catalog", operation)
            }
            Self::Timeout { timeout, .. } => {
                format!("no response within {}ms", timeout.as_millis())
            }
            Self::Unavailable { attempts, .. } => {
                format!("reconnection abandoned after {} attempts", attempts)
            }
            Self::Cancelled { .. } => "call cancelled".to_string(),
        }
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(err.to_string())
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(err: std::io::Error) -> Self {
        Self::connection(err.to_string())
    }
}
