//! Best-effort shipping of invocation log lines to a blob store.

mod blob;
mod shipper;

use std::sync::Arc;

pub use blob::{BlobStore, BlobStoreError, FsBlobStore, MemoryBlobStore};
pub use shipper::LogShipper;

use crate::config::LogShipConfig;

/// Create a blob store based on configuration.
pub fn create_blob_store(config: &LogShipConfig) -> Arc<dyn BlobStore> {
    if config.backend == "fs" {
        tracing::info!(output_dir = %config.output_dir, "Creating filesystem blob store");
        Arc::new(FsBlobStore::new(&config.output_dir))
    } else {
        tracing::info!("Using in-memory blob store");
        Arc::new(MemoryBlobStore::new())
    }
}
