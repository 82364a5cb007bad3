//! Error types for Switchboard
//!
//! Every fallible operation in the crate returns [`ConnectorResult`]. Failures are
//! a tagged enumeration ([`ConnectorError`]) whose variants map one-to-one onto
//! an [`ErrorKind`], so callers can match on the kind of failure without
//! downcasting. Each error carries an [`ErrorContext`] naming the service and
//! operation involved and the time the attempt was made.

mod context;
mod types;
mod unified_error;

pub use context::ErrorContext;
pub use types::{ConnectorError, ConnectorResult, ErrorKind};
pub use unified_error::UnifiedError;
