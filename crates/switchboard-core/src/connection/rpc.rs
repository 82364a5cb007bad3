//! Multiplexing JSON-RPC client
//!
//! Concurrent requests share one transport. A background receiver task routes
//! each response to its waiting caller by request id. A caller that times out
//! or is dropped removes its own pending slot, so late responses are discarded.

use crate::error::{ConnectorError, ConnectorResult};
use crate::protocol::{
    InitializeParams, InitializeResult, RequestId, RpcError, RpcMessage, RpcNotification,
    RpcRequest, RpcResponse, ToolCallResult, ToolDefinition, methods,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::transport::Transport;

/// Upper bound on `tools/list` pages followed during discovery
const MAX_CATALOG_PAGES: usize = 100;

type PendingMap = Mutex<HashMap<RequestId, oneshot::Sender<RpcResponse>>>;

/// Removes a pending request when its caller stops waiting
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolsPage {
    #[serde(default)]
    tools: Vec<ToolDefinition>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// JSON-RPC client over a shared transport
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    pending: Arc<PendingMap>,
    next_id: AtomicI64,
    running: Arc<AtomicBool>,
    receiver_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RpcClient {
    /// Create a client and start its background receiver
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));

        let receiver_handle = tokio::spawn(receive_loop(
            Arc::clone(&transport),
            Arc::clone(&pending),
            Arc::clone(&running),
        ));

        Self {
            transport,
            pending,
            next_id: AtomicI64::new(1),
            running,
            receiver_handle: Mutex::new(Some(receiver_handle)),
        }
    }

    /// Whether the receiver is still attached to a live transport
    pub fn is_connected(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.transport.is_connected()
    }

    /// Number of requests awaiting a response
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Perform the `initialize` handshake
    #[instrument(skip(self), level = "debug")]
    pub async fn initialize(&self, timeout: Duration) -> ConnectorResult<InitializeResult> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result: InitializeResult = self
            .request(methods::INITIALIZE, Some(params), timeout)
            .await?;
        self.notify(methods::INITIALIZED, None).await?;
        Ok(result)
    }

    /// Fetch the full tool catalog, following pagination cursors
    #[instrument(skip(self), level = "debug")]
    pub async fn list_tools(&self, timeout: Duration) -> ConnectorResult<Vec<ToolDefinition>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_CATALOG_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ToolsPage = self.request(methods::TOOLS_LIST, params, timeout).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        Err(ConnectorError::protocol(format!(
            "tool catalog exceeded {} pages",
            MAX_CATALOG_PAGES
        )))
    }

    /// Call a tool
    #[instrument(skip(self, arguments), fields(tool_name = %name))]
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> ConnectorResult<ToolCallResult> {
        let params = json!({ "name": name, "arguments": arguments });
        self.request(methods::TOOLS_CALL, Some(params), timeout).await
    }

    /// Ping the server
    pub async fn ping(&self, timeout: Duration) -> ConnectorResult<()> {
        let _: Value = self.request(methods::PING, None, timeout).await?;
        Ok(())
    }

    /// Make a request and wait for its response
    pub async fn request<T>(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> ConnectorResult<T>
    where
        T: DeserializeOwned,
    {
        if !self.running.load(Ordering::SeqCst) {
            return Err(ConnectorError::connection("client is closed"));
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut request = RpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        let (response_tx, response_rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), response_tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        self.transport.send(RpcMessage::Request(request)).await?;

        let response = match tokio::time::timeout(timeout, response_rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(ConnectorError::connection(
                    "connection lost while awaiting response",
                ));
            }
            Err(_) => {
                self.send_cancel(&id).await;
                return Err(ConnectorError::timeout(timeout));
            }
        };

        match response.into_result() {
            Ok(value) => serde_json::from_value(value).map_err(|e| {
                ConnectorError::protocol(format!("unexpected {} result: {}", method, e))
            }),
            Err(e) => Err(ConnectorError::from_rpc(e.code, e.message)),
        }
    }

    /// Send a notification (no response expected)
    pub async fn notify(&self, method: &str, params: Option<Value>) -> ConnectorResult<()> {
        let notification = RpcNotification::new(method).with_params(params);
        self.transport
            .send(RpcMessage::Notification(notification))
            .await
    }

    async fn send_cancel(&self, id: &RequestId) {
        let params = json!({ "requestId": id, "reason": "timeout" });
        if let Err(e) = self.notify(methods::CANCELLED, Some(params)).await {
            debug!(error = %e, "failed to send cancellation notice");
        }
    }

    /// Stop the receiver and close the transport; safe to call repeatedly
    pub async fn close(&self) -> ConnectorResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let result = self.transport.close().await;

        let handle = self.receiver_handle.lock().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        // Wake every waiter with a closed channel
        self.pending.lock().clear();
        result
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.receiver_handle.lock().take() {
            handle.abort();
        }
    }
}

/// Background task that receives messages and routes them
async fn receive_loop(
    transport: Arc<dyn Transport>,
    pending: Arc<PendingMap>,
    running: Arc<AtomicBool>,
) {
    loop {
        match transport.receive().await {
            Ok(RpcMessage::Response(response)) => {
                let waiter = pending.lock().remove(&response.id);
                match waiter {
                    Some(sender) => {
                        let _ = sender.send(response);
                    }
                    None => debug!(id = %response.id, "discarding response with no waiter"),
                }
            }
            Ok(RpcMessage::Notification(notification)) => {
                debug!(method = %notification.method, "backend notification");
            }
            Ok(RpcMessage::Request(request)) => {
                let reply = if request.method == methods::PING {
                    RpcResponse::success(request.id, json!({}))
                } else {
                    warn!(method = %request.method, "unsupported backend request");
                    RpcResponse::error(request.id, RpcError::method_not_found(&request.method))
                };
                if let Err(e) = transport.send(RpcMessage::Response(reply)).await {
                    debug!(error = %e, "failed to answer backend request");
                }
            }
            Err(e) => {
                if running.swap(false, Ordering::SeqCst) {
                    warn!(error = %e, "backend connection lost");
                }
                pending.lock().clear();
                break;
            }
        }
    }
}
