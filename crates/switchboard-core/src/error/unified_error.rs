//! UnifiedError trait implementation for ConnectorError

use super::context::ErrorContext;
use super::types::ConnectorError;

/// Consistent error surface for callers that report or log failures
pub trait UnifiedError: std::error::Error {
    /// Stable machine-readable code
    fn error_code(&self) -> &str;

    /// Human-readable cause
    fn message(&self) -> String;

    /// Service/operation/time context
    fn error_context(&self) -> &ErrorContext;

    /// Whether the failure may succeed if tried again later
    fn is_retryable(&self) -> bool;
}

impl UnifiedError for ConnectorError {
    fn error_code(&self) -> &str {
        match self {
            Self::Connection { .. } => "SWB_CONNECTION",
            Self::NotReady { .. } => "SWB_NOT_READY",
            Self::OperationNotFound { .. } => "SWB_OPERATION_NOT_FOUND",
            Self::InvalidArguments { .. } => "SWB_INVALID_ARGUMENTS",
            Self::Timeout { .. } => "SWB_TIMEOUT",
            Self::Authentication { .. } => "SWB_AUTHENTICATION",
            Self::Unavailable { .. } => "SWB_UNAVAILABLE",
            Self::Configuration { .. } => "SWB_CONFIGURATION",
            Self::Protocol { .. } => "SWB_PROTOCOL",
            Self::Server { .. } => "SWB_SERVER",
            Self::Cancelled { .. } => "SWB_CANCELLED",
        }
    }

    fn message(&self) -> String {
        self.cause()
    }

    fn error_context(&self) -> &ErrorContext {
        self.context()
    }

    fn is_retryable(&self) -> bool {
        ConnectorError::is_retryable(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ConnectorError::unavailable(3).with_service("zoho");
        assert_eq!(err.error_code(), "SWB_UNAVAILABLE");
        assert_eq!(err.error_context().service.as_deref(), Some("zoho"));
        assert!(!UnifiedError::is_retryable(&err));
    }
}
