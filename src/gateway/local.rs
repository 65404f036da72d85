//! In-process transport gateway backed by per-handle channels.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{GatewayError, TransportGateway};

const LINK_BUFFER: usize = 32;

/// In-process gateway used for local runs and tests.
///
/// Each open handle maps to an `mpsc` sender; the paired receiver is handed
/// to whoever opened the link. Closing a handle drops the sender, which ends
/// the receiver's stream.
pub struct LocalTransportGateway {
    links: DashMap<String, mpsc::Sender<Vec<u8>>>,
}

impl LocalTransportGateway {
    pub fn new() -> Self {
        Self {
            links: DashMap::new(),
        }
    }

    /// Open a link for a handle, returning the receiving end.
    ///
    /// Re-opening an existing handle replaces the previous link.
    pub fn open(&self, handle: impl Into<String>) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(LINK_BUFFER);
        self.links.insert(handle.into(), tx);
        rx
    }

    pub fn is_open(&self, handle: &str) -> bool {
        self.links.contains_key(handle)
    }

    pub fn open_links(&self) -> usize {
        self.links.len()
    }
}

impl Default for LocalTransportGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportGateway for LocalTransportGateway {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn send(&self, handle: &str, payload: &[u8]) -> Result<(), GatewayError> {
        // Clone the sender out so the map shard is not held across the await
        let tx = match self.links.get(handle) {
            Some(entry) => entry.clone(),
            None => return Err(GatewayError::Gone(handle.to_string())),
        };

        if tx.send(payload.to_vec()).await.is_err() {
            self.links.remove(handle);
            return Err(GatewayError::Gone(handle.to_string()));
        }
        Ok(())
    }

    async fn close(&self, handle: &str) -> Result<(), GatewayError> {
        match self.links.remove(handle) {
            Some(_) => Ok(()),
            None => Err(GatewayError::Gone(handle.to_string())),
        }
    }
}
