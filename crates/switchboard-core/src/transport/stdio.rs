//! Standard I/O transport
//!
//! Spawns a subprocess and communicates via stdin/stdout.

use super::Transport;
use crate::error::{ConnectorError, ConnectorResult};
use crate::protocol::RpcMessage;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Grace period for the child to exit after stdin closes
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Stdio transport for a spawned backend process
pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<Option<BufReader<ChildStdout>>>,
    connected: AtomicBool,
}

impl StdioTransport {
    /// Spawn a backend process with extra environment variables
    pub fn spawn_with_env(
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> ConnectorResult<Self> {
        let mut cmd = Command::new(command);

        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ConnectorError::connection(format!("failed to spawn '{}': {}", command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConnectorError::connection("failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConnectorError::connection("failed to get stdout handle"))?;

        debug!(command, pid = ?child.id(), "spawned stdio backend");

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(Some(BufReader::new(stdout))),
            connected: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: RpcMessage) -> ConnectorResult<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| ConnectorError::connection("transport closed"))?;

        let mut line = serde_json::to_string(&message)?;
        line.push('\n');

        if let Err(e) = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await
        {
            self.connected.store(false, Ordering::SeqCst);
            return Err(ConnectorError::connection(format!("write failed: {}", e)));
        }
        Ok(())
    }

    async fn receive(&self) -> ConnectorResult<RpcMessage> {
        let mut guard = self.stdout.lock().await;
        let stdout = guard
            .as_mut()
            .ok_or_else(|| ConnectorError::connection("transport closed"))?;

        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = stdout.read_line(&mut line).await.map_err(|e| {
                self.connected.store(false, Ordering::SeqCst);
                ConnectorError::connection(format!("read failed: {}", e))
            })?;

            if bytes_read == 0 {
                self.connected.store(false, Ordering::SeqCst);
                return Err(ConnectorError::connection("backend closed its stdout"));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RpcMessage>(trimmed) {
                Ok(message) => return Ok(message),
                // Backends occasionally print diagnostics on stdout
                Err(e) => warn!(error = %e, line = trimmed, "skipping non-protocol output"),
            }
        }
    }

    async fn close(&self) -> ConnectorResult<()> {
        self.connected.store(false, Ordering::SeqCst);

        // Dropping stdin signals EOF
        self.stdin.lock().await.take();

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            tokio::select! {
                result = child.wait() => {
                    result.map_err(|e| ConnectorError::connection(e.to_string()))?;
                }
                _ = tokio::time::sleep(EXIT_GRACE) => {
                    child.kill().await.ok();
                }
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_command_is_connection_error() {
        let result = StdioTransport::spawn_with_env(
            "switchboard-definitely-not-a-real-binary",
            &[],
            &BTreeMap::new(),
        );
        let err = result.err().expect("spawn should fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::Connection);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_roundtrip_through_cat() {
        let transport = StdioTransport::spawn_with_env("cat", &[], &BTreeMap::new()).unwrap();
        let request = crate::protocol::RpcRequest::new(1i64, "ping");
        transport.send(RpcMessage::Request(request)).await.unwrap();

        let echoed = transport.receive().await.unwrap();
        assert_eq!(echoed.method(), Some("ping"));

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        // Second close is a no-op
        transport.close().await.unwrap();
    }
}
