use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::redis::PoolError;

/// One live client connection.
///
/// `handle` is assigned by the transport gateway at connect time and is not
/// unique across time: a reconnecting identity gets a fresh handle and the
/// superseded one must be closed before the row is overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// Key derived from the client's network address; unique per row.
    pub identity: String,
    /// Opaque transport handle for pushing frames to the client.
    pub handle: String,
    /// Set at connect time; not refreshed per message.
    pub last_seen: DateTime<Utc>,
}

impl Connection {
    pub fn new(identity: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            handle: handle.into(),
            last_seen: Utc::now(),
        }
    }

    /// Age of this row relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.last_seen)
    }
}

/// Opaque position token for resuming a registry scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCursor(pub String);

/// One page of a registry scan.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub rows: Vec<Connection>,
    /// Cursor for the next page; `None` when the scan is complete.
    pub next: Option<ScanCursor>,
}

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] PoolError),

    /// Row could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_age() {
        let mut row = Connection::new("203.0.113.7", "h-1");
        let now = Utc::now();
        row.last_seen = now - chrono::Duration::minutes(200);
        assert!(row.age(now) > chrono::Duration::minutes(130));
    }

    #[test]
    fn test_connection_roundtrip() {
        let row = Connection::new("203.0.113.7", "h-1");
        let json = serde_json::to_string(&row).unwrap();
        let back: Connection = serde_json::from_str(&json).unwrap();
        assert_eq!(back.identity, row.identity);
        assert_eq!(back.handle, row.handle);
    }
}
