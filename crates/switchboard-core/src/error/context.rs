//! Context attached to every surfaced error

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Where and when a failure happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    /// Service the failing call targeted
    pub service: Option<String>,
    /// Functional operation being attempted, if any
    pub operation: Option<String>,
    /// When the failing attempt was made
    pub attempted_at: DateTime<Utc>,
}

impl ErrorContext {
    /// Create an empty context stamped with the current time
    pub fn now() -> Self {
        Self {
            service: None,
            operation: None,
            attempted_at: Utc::now(),
        }
    }

    /// Short `service/operation` label used in error messages
    pub fn label(&self) -> String {
        match (&self.service, &self.operation) {
            (Some(service), Some(operation)) => format!("{}/{}", service, operation),
            (Some(service), None) => service.clone(),
            (None, Some(operation)) => operation.clone(),
            (None, None) => "-".to_string(),
        }
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.label(), self.attempted_at.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_variants() {
        let mut ctx = ErrorContext::now();
        assert_eq!(ctx.label(), "-");

        ctx.operation = Some("send_email".to_string());
        assert_eq!(ctx.label(), "send_email");

        ctx.service = Some("gmail".to_string());
        assert_eq!(ctx.label(), "gmail/send_email");

        ctx.operation = None;
        assert_eq!(ctx.label(), "gmail");
    }
}
