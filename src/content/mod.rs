//! Static asset and index-page delivery.

use std::path::Path;

use tower_http::services::{ServeDir, ServeFile};

use crate::config::ContentConfig;

/// Build the asset service: files under `assets_dir` with precompressed
/// `.gz` siblings preferred, and the index page as the fallback for any
/// unmatched path.
pub fn asset_service(config: &ContentConfig) -> ServeDir<ServeFile> {
    let index = Path::new(&config.assets_dir).join(&config.index_file);
    ServeDir::new(&config.assets_dir)
        .precompressed_gzip()
        .fallback(ServeFile::new(index).precompressed_gzip())
}
