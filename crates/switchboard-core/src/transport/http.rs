//! HTTP transport
//!
//! Each outgoing message is POSTed to the endpoint. The response body may be a
//! single JSON-RPC message, a JSON array of messages, or a `text/event-stream`
//! body whose `data:` events carry messages. Everything received is queued for
//! [`Transport::receive`].

use super::Transport;
use crate::error::{ConnectorError, ConnectorResult};
use crate::protocol::RpcMessage;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

/// Session header used by streamable-HTTP servers
const SESSION_HEADER: &str = "mcp-session-id";

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Endpoint URL
    pub url: String,
    /// HTTP headers to include in requests
    pub headers: HashMap<String, String>,
    /// Bound on establishing the TCP/TLS connection. Request deadlines are
    /// set by the caller, so slow operations are not cut short here.
    pub connect_timeout: Duration,
}

impl HttpTransportConfig {
    /// Create a new HTTP transport config
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// HTTP transport for JSON-RPC backends
pub struct HttpTransport {
    client: Client,
    url: String,
    session_id: Mutex<Option<String>>,
    connect_timeout: Duration,
    connected: AtomicBool,
    inbound_tx: parking_lot::Mutex<Option<mpsc::Sender<RpcMessage>>>,
    inbound_rx: Mutex<mpsc::Receiver<RpcMessage>>,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(config: HttpTransportConfig) -> ConnectorResult<Self> {
        let mut header_map = HeaderMap::new();
        header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        header_map.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );

        for (key, value) in &config.headers {
            let name = HeaderName::try_from(key.as_str()).map_err(|e| {
                ConnectorError::configuration(format!("invalid header name '{}': {}", key, e))
            })?;
            let value = HeaderValue::try_from(value.as_str()).map_err(|e| {
                ConnectorError::configuration(format!("invalid header value for '{}': {}", key, e))
            })?;
            header_map.insert(name, value);
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(header_map)
            .build()
            .map_err(|e| ConnectorError::connection(format!("failed to create HTTP client: {}", e)))?;

        let (inbound_tx, inbound_rx) = mpsc::channel(100);

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            session_id: Mutex::new(None),
            connect_timeout: config.connect_timeout,
            connected: AtomicBool::new(true),
            inbound_tx: parking_lot::Mutex::new(Some(inbound_tx)),
            inbound_rx: Mutex::new(inbound_rx),
        })
    }

    async fn enqueue(&self, messages: Vec<RpcMessage>) -> ConnectorResult<()> {
        let sender = self
            .inbound_tx
            .lock()
            .clone()
            .ok_or_else(|| ConnectorError::connection("transport closed"))?;
        for message in messages {
            sender
                .send(message)
                .await
                .map_err(|_| ConnectorError::connection("transport closed"))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, message: RpcMessage) -> ConnectorResult<()> {
        if !self.is_connected() {
            return Err(ConnectorError::connection("transport closed"));
        }

        let body = serde_json::to_string(&message)?;
        let mut request = self.client.post(&self.url).body(body);
        if let Some(session) = self.session_id.lock().await.clone() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() && e.is_timeout() {
                ConnectorError::timeout(self.connect_timeout)
            } else {
                ConnectorError::connection(format!("POST {} failed: {}", self.url, e))
            }
        })?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(session.to_string());
        }

        let status = response.status();
        match status {
            StatusCode::ACCEPTED | StatusCode::NO_CONTENT => return Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                return Err(ConnectorError::authentication(format!("HTTP {}: {}", status, body)));
            }
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(ConnectorError::connection(format!("HTTP {}: {}", status, body)));
            }
            _ => {}
        }

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let text = response
            .text()
            .await
            .map_err(|e| ConnectorError::connection(format!("failed to read body: {}", e)))?;

        let messages = if is_sse {
            parse_sse_body(&text)
        } else {
            parse_json_body(&text)?
        };
        debug!(count = messages.len(), "received HTTP messages");
        self.enqueue(messages).await
    }

    async fn receive(&self) -> ConnectorResult<RpcMessage> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| ConnectorError::connection("transport closed"))
    }

    async fn close(&self) -> ConnectorResult<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            // Dropping the only sender ends a pending receive
            self.inbound_tx.lock().take();
            debug!(url = %self.url, "HTTP transport closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Parse a plain JSON body holding one message or an array of messages
fn parse_json_body(body: &str) -> ConnectorResult<Vec<RpcMessage>> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        Ok(serde_json::from_str(trimmed)?)
    } else {
        Ok(vec![serde_json::from_str(trimmed)?])
    }
}

/// Extract messages from the `data:` lines of an SSE body
fn parse_sse_body(body: &str) -> Vec<RpcMessage> {
    body.replace("\r\n", "\n")
        .split("\n\n")
        .filter_map(|event| {
            let data: String = event
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("");
            if data.is_empty() {
                return None;
            }
            match serde_json::from_str::<RpcMessage>(&data) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(error = %e, "ignoring malformed SSE event");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_builder() {
        let config = HttpTransportConfig::new("http://localhost:9000")
            .with_header("Authorization", "Bearer token")
            .with_connect_timeout(Duration::from_secs(5));

        assert_eq!(config.url, "http://localhost:9000");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.headers.contains_key("Authorization"));
    }

    /// Serve one POST, answering with `body` after `delay`
    async fn serve_once(delay: Duration, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .to_ascii_lowercase()
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:")?.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        url
    }

    #[tokio::test]
    async fn test_slow_response_outlives_connect_timeout() {
        let url = serve_once(
            Duration::from_millis(300),
            r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#,
        )
        .await;
        let config = HttpTransportConfig::new(url).with_connect_timeout(Duration::from_millis(100));
        let transport = HttpTransport::new(config).unwrap();

        let request = RpcMessage::Request(crate::protocol::RpcRequest::new(7i64, "tools/call"));
        transport.send(request).await.unwrap();
        let reply = transport.receive().await.unwrap();
        assert!(matches!(reply, RpcMessage::Response(_)));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let config = HttpTransportConfig::new("http://localhost").with_header("bad header", "x");
        assert!(HttpTransport::new(config).is_err());
    }

    #[test]
    fn test_parse_json_body_single_and_batch() {
        let single = parse_json_body(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert_eq!(single.len(), 1);

        let batch = parse_json_body(
            r#"[{"jsonrpc":"2.0","id":1,"result":{}},{"jsonrpc":"2.0","method":"x"}]"#,
        )
        .unwrap();
        assert_eq!(batch.len(), 2);

        assert!(parse_json_body("  ").unwrap().is_empty());
        assert!(parse_json_body("not json").is_err());
    }

    #[test]
    fn test_parse_sse_body() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{}}\n\n\
                    event: ping\n\n";
        let messages = parse_sse_body(body);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], RpcMessage::Response(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = HttpTransport::new(HttpTransportConfig::new("http://localhost:1")).unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert!(transport.receive().await.is_err());
    }
}
