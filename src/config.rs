//! Reader configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ArchiveError, Result};

/// Maximum distance of the EOCD record from the end of a container:
/// 22-byte record plus a comment of up to 65535 bytes.
pub const DEFAULT_TAIL_WINDOW: u64 = 65535 + 22;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,

    /// Bytes read from the end of the container when searching for the EOCD
    pub tail_window: u64,

    /// Archive-internal path of the manifest document
    pub manifest_path: String,

    /// Repeating XOR key for obfuscated containers
    pub archive_key: Option<Vec<u8>>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            tail_window: DEFAULT_TAIL_WINDOW,
            manifest_path: "manifest.json".to_string(),
            archive_key: None,
        }
    }
}

impl ReaderConfig {
    /// Build a configuration from `A3D_*` environment variables.
    ///
    /// * `A3D_REQUEST_TIMEOUT` - seconds
    /// * `A3D_ARCHIVE_KEY` - hex-encoded XOR key
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(secs) = std::env::var("A3D_REQUEST_TIMEOUT") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ArchiveError::Config(format!("A3D_REQUEST_TIMEOUT is not a number: {secs}"))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Ok(key) = std::env::var("A3D_ARCHIVE_KEY") {
            config = config.with_hex_key(&key)?;
        }

        Ok(config)
    }

    /// Set the archive key from its hex representation.
    pub fn with_hex_key(mut self, key_hex: &str) -> Result<Self> {
        let key = hex::decode(key_hex.trim())
            .map_err(|e| ArchiveError::Config(format!("archive key is not valid hex: {e}")))?;
        self.archive_key = if key.is_empty() { None } else { Some(key) };
        Ok(self)
    }

    /// Tail window clamped so it always covers a bare EOCD record.
    pub fn effective_tail_window(&self) -> u64 {
        self.tail_window.max(22)
    }
}
