//! Backend capability set and its JSON-RPC realisation

use super::rpc::RpcClient;
use crate::config::{ServiceConfig, ServiceSettings};
use crate::error::{ConnectorError, ConnectorResult};
use crate::registry::OperationDescriptor;
use crate::transport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// JSON-RPC code used when a tool reports failure inside a successful response
const TOOL_ERROR_CODE: i32 = -32000;

/// Identity reported by a backend during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInfo {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
}

/// Anything that can serve as the far end of a [`Connection`](super::Connection)
#[async_trait]
pub trait Backend: Send + Sync {
    /// Perform the handshake
    async fn open(&self, timeout: Duration) -> ConnectorResult<BackendInfo>;

    /// Fetch the current operation catalog
    async fn discover(&self, timeout: Duration) -> ConnectorResult<Vec<OperationDescriptor>>;

    /// Call one operation
    async fn invoke(&self, operation: &str, arguments: Value, timeout: Duration)
    -> ConnectorResult<Value>;

    /// Liveness probe
    async fn ping(&self, timeout: Duration) -> ConnectorResult<()>;

    /// Release the transport
    async fn close(&self) -> ConnectorResult<()>;
}

/// Creates backends for configured services
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn create(
        &self,
        service: &str,
        config: &ServiceConfig,
        settings: &ServiceSettings,
    ) -> ConnectorResult<Arc<dyn Backend>>;
}

/// Factory building [`RpcBackend`]s over the configured transport
#[derive(Debug, Default, Clone, Copy)]
pub struct TransportBackendFactory;

#[async_trait]
impl BackendFactory for TransportBackendFactory {
    async fn create(
        &self,
        service: &str,
        config: &ServiceConfig,
        settings: &ServiceSettings,
    ) -> ConnectorResult<Arc<dyn Backend>> {
        let transport = transport::connect(config, settings.timeout).await?;
        Ok(Arc::new(RpcBackend::new(
            service,
            RpcClient::new(transport),
            config.category.clone(),
            config.requires_auth,
        )))
    }
}

/// Backend speaking MCP-style JSON-RPC through an [`RpcClient`]
pub struct RpcBackend {
    service: String,
    client: RpcClient,
    default_category: Option<String>,
    requires_auth: bool,
}

impl RpcBackend {
    pub fn new(
        service: impl Into<String>,
        client: RpcClient,
        default_category: Option<String>,
        requires_auth: bool,
    ) -> Self {
        Self {
            service: service.into(),
            client,
            default_category,
            requires_auth,
        }
    }
}

#[async_trait]
impl Backend for RpcBackend {
    async fn open(&self, timeout: Duration) -> ConnectorResult<BackendInfo> {
        let result = self.client.initialize(timeout).await?;
        if !result.capabilities.supports_tools() {
            warn!(service = %self.service, "backend does not advertise tool support");
        }
        Ok(BackendInfo {
            name: result.server_info.name,
            version: result.server_info.version,
            protocol_version: result.protocol_version,
        })
    }

    async fn discover(&self, timeout: Duration) -> ConnectorResult<Vec<OperationDescriptor>> {
        let tools = self.client.list_tools(timeout).await?;
        Ok(tools
            .iter()
            .map(|tool| {
                OperationDescriptor::from_tool(
                    &self.service,
                    tool,
                    self.default_category.as_deref(),
                    self.requires_auth,
                )
            })
            .collect())
    }

    async fn invoke(
        &self,
        operation: &str,
        arguments: Value,
        timeout: Duration,
    ) -> ConnectorResult<Value> {
        let result = self.client.call_tool(operation, arguments, timeout).await?;
        if result.is_error {
            let text = result.text();
            let message = if text.is_empty() {
                "tool reported an error".to_string()
            } else {
                text
            };
            return Err(ConnectorError::from_rpc(TOOL_ERROR_CODE, message));
        }
        Ok(result.into_value())
    }

    async fn ping(&self, timeout: Duration) -> ConnectorResult<()> {
        self.client.ping(timeout).await
    }

    async fn close(&self) -> ConnectorResult<()> {
        self.client.close().await
    }
}
