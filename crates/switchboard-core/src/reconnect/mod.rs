//! Reconnection policy
//!
//! Failed or degraded connections are retried on an exponential schedule,
//! at most one retry per service at a time. After `max_attempts` retries the
//! service is left `Exhausted` until a manual reconnect.

mod backoff;
mod policy;

pub use backoff::BackoffConfig;
pub use policy::{ReconnectPhase, ReconnectPolicy, ReconnectionState, RetryDecision};
