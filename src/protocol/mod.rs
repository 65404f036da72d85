//! Wire shapes exchanged with the hosting platform and connected clients.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level key that marks a self-continuation payload. Checked on the raw
/// event before any schema parsing so a marker is never mistaken for a
/// client event.
pub const CONTINUATION_KEY: &str = "continuation";

/// Marker value for a broadcast sweep hand-off.
pub const SWEEP_MARKER: &str = "broadcast-sweep";

/// Payload carried by an asynchronous self-invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationMarker {
    pub continuation: String,
}

impl ContinuationMarker {
    pub fn sweep() -> Self {
        Self {
            continuation: SWEEP_MARKER.to_string(),
        }
    }

    pub fn is_sweep(&self) -> bool {
        self.continuation == SWEEP_MARKER
    }
}

/// Events delivered by the platform on behalf of clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientEvent {
    Connect {
        remote_addr: String,
        handle: String,
    },
    Message {
        handle: String,
        #[serde(default)]
        body: serde_json::Value,
    },
    Disconnect {
        remote_addr: String,
    },
}

/// Invocation responses for successfully routed client events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventReply {
    Connected { identity: String },
    MessageAcked { handle: String },
    Disconnected { identity: String },
}

/// Frames pushed to connections through the transport gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Periodic broadcast payload carrying the current timestamp.
    Tick { now: DateTime<Utc> },
    /// Acknowledgement of an inbound client message.
    Ack { received_at: DateTime<Utc> },
}

/// Derive a connection identity from the client's network address.
///
/// Uses the host part only, matching the transport's view of a client.
/// Clients behind shared network address translation therefore collapse to
/// one identity; last writer wins. Known limitation.
pub fn identity_from_addr(remote_addr: &str) -> String {
    match remote_addr.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => remote_addr.to_string(),
    }
}
