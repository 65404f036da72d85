use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::LogShipConfig;
use crate::metrics::{LOG_FLUSH_FAILURES_TOTAL, LOG_LINES_SHIPPED_TOTAL};

use super::BlobStore;

/// Buffers log lines and ships them to the blob store in batches.
///
/// The buffer is append-only under its mutex; a flush swaps it out and
/// uploads one object per batch. A failed upload puts the lines back so the
/// next flush retries them. Everything here is best-effort: lines held at
/// process death are lost.
pub struct LogShipper {
    buffer: Mutex<Vec<String>>,
    store: Arc<dyn BlobStore>,
    config: LogShipConfig,
}

impl LogShipper {
    pub fn new(store: Arc<dyn BlobStore>, config: LogShipConfig) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            store,
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn backend_kind(&self) -> &'static str {
        self.store.kind()
    }

    /// Append one line to the ship buffer.
    pub fn append(&self, line: impl Into<String>) {
        if !self.config.enabled {
            return;
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push(line.into());
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Ship everything currently buffered. Returns the number of lines shipped.
    pub async fn flush(&self) -> usize {
        let lines = match self.buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => return 0,
        };
        if lines.is_empty() {
            return 0;
        }

        let key = format!(
            "{}/{}-{}.log",
            self.config.key_prefix,
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            Uuid::new_v4().simple()
        );
        let body = lines.join("\n").into_bytes();
        let count = lines.len();

        match self.store.put(&key, body).await {
            Ok(()) => {
                LOG_LINES_SHIPPED_TOTAL.inc_by(count as u64);
                tracing::debug!(key = %key, lines = count, "Shipped log batch");
                count
            }
            Err(e) => {
                LOG_FLUSH_FAILURES_TOTAL.inc();
                tracing::warn!(error = %e, lines = count, "Log flush failed, re-buffering");
                if let Ok(mut buffer) = self.buffer.lock() {
                    let mut restored = lines;
                    restored.extend(buffer.drain(..));
                    *buffer = restored;
                }
                0
            }
        }
    }

    /// Run the periodic flush loop until shutdown, then flush once more.
    pub fn spawn_flusher(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let shipper = self;
        tokio::spawn(async move {
            let interval = Duration::from_secs(shipper.config.flush_interval_secs.max(1));
            let mut timer = tokio::time::interval(interval);
            // Skip immediate first tick
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("Log shipper received shutdown signal");
                        break;
                    }
                    _ = timer.tick() => {
                        shipper.flush().await;
                    }
                }
            }

            let remaining = shipper.flush().await;
            tracing::info!(lines = remaining, "Log shipper stopped");
        })
    }
}
