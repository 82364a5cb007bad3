//! In-process transport pair for exercising the RPC client in tests

use super::Transport;
use crate::error::{ConnectorError, ConnectorResult};
use crate::protocol::RpcMessage;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};

/// One end of an in-memory duplex channel
pub(crate) struct MemoryTransport {
    tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<RpcMessage>>>,
    rx: Mutex<mpsc::UnboundedReceiver<RpcMessage>>,
    connected: AtomicBool,
}

impl MemoryTransport {
    /// Create two connected ends
    pub(crate) fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    fn new(tx: mpsc::UnboundedSender<RpcMessage>, rx: mpsc::UnboundedReceiver<RpcMessage>) -> Self {
        Self {
            tx: parking_lot::Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            connected: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, message: RpcMessage) -> ConnectorResult<()> {
        let guard = self.tx.lock();
        let tx = guard
            .as_ref()
            .ok_or_else(|| ConnectorError::connection("transport closed"))?;
        tx.send(message)
            .map_err(|_| ConnectorError::connection("peer closed"))
    }

    async fn receive(&self) -> ConnectorResult<RpcMessage> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| ConnectorError::connection("peer closed"))
    }

    async fn close(&self) -> ConnectorResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.tx.lock().take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
