//! Configuration for managed services
//!
//! Services are described by [`ServiceConfig`] entries inside a
//! [`ManagerConfig`]. Tunables left unset on a service fall back to the
//! manager-wide [`ServiceDefaults`]; the merged, validated values are exposed
//! as [`ServiceSettings`].

mod loader;
mod logging;
mod service;

pub use loader::ConfigLoader;
pub use logging::LoggingConfig;
pub(crate) use service::validate_service_name;
pub use service::{ManagerConfig, ServiceConfig, ServiceDefaults, ServiceSettings, TransportKind};
