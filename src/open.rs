//! Opening containers by location, with a range-then-download strategy for URLs.
//!
//! The archive itself never retries. This module is the caller-side policy:
//! try HTTP Range access first and, if that fails with an I/O error, fetch
//! the whole container and index it from memory with the same code path.

use std::path::Path;
use tracing::warn;

use crate::archive::Archive;
use crate::error::Result;
use crate::io::fetch_full;

/// How a container ended up being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    LocalFile,
    RemoteRange,
    FullDownload,
}

pub fn is_http_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Load `url` with Range requests, falling back to a full download on I/O errors.
pub async fn load_url_with_fallback(archive: &mut Archive, url: &str) -> Result<LoadMode> {
    match archive.load_remote(url).await {
        Ok(()) => Ok(LoadMode::RemoteRange),
        Err(err) if err.is_io() => {
            warn!(%url, error = %err, "range access failed, downloading whole container");
            let data = fetch_full(url, archive.config()).await?;
            archive.load_from_bytes(data).await?;
            Ok(LoadMode::FullDownload)
        }
        Err(err) => Err(err),
    }
}

/// Load a local path or URL into `archive`.
///
/// With `allow_fallback` false, a URL is only ever read through Range requests.
pub async fn load_location(
    archive: &mut Archive,
    location: &str,
    allow_fallback: bool,
) -> Result<LoadMode> {
    if !is_http_url(location) {
        archive.load_from_file(Path::new(location)).await?;
        return Ok(LoadMode::LocalFile);
    }

    if allow_fallback {
        load_url_with_fallback(archive, location).await
    } else {
        archive.load_remote(location).await?;
        Ok(LoadMode::RemoteRange)
    }
}
