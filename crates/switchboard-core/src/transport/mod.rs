//! Transport layer for backend communication
//!
//! ## Available Transports
//!
//! - **Stdio**: spawned subprocess, newline-delimited JSON-RPC on stdin/stdout
//! - **HTTP**: JSON-RPC over HTTP POST, plain JSON or SSE response bodies
//!
//! Sending and receiving go through `&self` so the background receiver of an
//! RPC client can wait for frames while other tasks keep sending.

pub mod http;
pub mod stdio;

#[cfg(test)]
pub(crate) mod memory;

pub use http::{HttpTransport, HttpTransportConfig};
pub use stdio::StdioTransport;

use crate::config::{ServiceConfig, TransportKind};
use crate::error::{ConnectorError, ConnectorResult};
use crate::protocol::RpcMessage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Bidirectional message channel to one backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message
    async fn send(&self, message: RpcMessage) -> ConnectorResult<()>;

    /// Receive the next message
    async fn receive(&self) -> ConnectorResult<RpcMessage>;

    /// Release the underlying resources; calling it again is a no-op
    async fn close(&self) -> ConnectorResult<()>;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;
}

/// Build the transport described by a service config
pub async fn connect(config: &ServiceConfig, timeout: Duration) -> ConnectorResult<Arc<dyn Transport>> {
    match config.transport {
        TransportKind::Stdio => {
            let command = config
                .command
                .as_deref()
                .ok_or_else(|| ConnectorError::configuration("stdio transport requires command"))?;
            let transport = StdioTransport::spawn_with_env(command, &config.args, &config.env)?;
            Ok(Arc::new(transport))
        }
        TransportKind::Http => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| ConnectorError::configuration("http transport requires url"))?;
            let http_config = config
                .headers
                .iter()
                .fold(HttpTransportConfig::new(url), |cfg, (k, v)| {
                    cfg.with_header(k.clone(), v.clone())
                })
                .with_connect_timeout(timeout);
            Ok(Arc::new(HttpTransport::new(http_config)?))
        }
    }
}
