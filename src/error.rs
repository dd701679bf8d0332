//! Error types for archive reading.
//!
//! Every failure maps onto one [`ErrorKind`] so a UI layer can render a short,
//! stable reason string without matching on individual variants. A path that
//! is simply absent from an archive is not an error: extraction returns
//! `Ok(None)` for it.

use reqwest::StatusCode;
use thiserror::Error;

use crate::sanitize::Rejection;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// No backing store is established (never loaded, released or disposed)
    #[error("Archive not loaded")]
    NotLoaded,

    /// Bad magic bytes, missing EOCD, or a header signature mismatch
    #[error("Invalid container: {0}")]
    Format(String),

    /// An entry's bytes did not survive decoding intact
    #[error("Corrupt entry {path}: {detail}")]
    CorruptEntry { path: String, detail: String },

    /// Manifest is not valid JSON or lacks required fields
    #[error("Invalid manifest: {0}")]
    Schema(String),

    /// Compression method other than STORED or DEFLATE
    #[error("Unsupported compression method {method} for {path}")]
    UnsupportedCompression { method: u16, path: String },

    /// The filename sanitizer refused an archive-internal path
    #[error("Unsafe file name {name:?}: {reason}")]
    UnsafeName { name: String, reason: Rejection },

    /// Read past the end of the backing store
    #[error("Read of {length} bytes at offset {offset} exceeds source size {size}")]
    OutOfRange { offset: u64, length: u64, size: u64 },

    /// HEAD response carried no usable Content-Length
    #[error("Remote server did not return Content-Length")]
    MissingContentLength,

    /// Non-2xx HTTP status (or a Range response other than 200/206)
    #[error("HTTP request failed with status: {0}")]
    HttpStatus(StatusCode),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse failure taxonomy surfaced to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Format,
    Schema,
    Io,
    UnsupportedFeature,
    Security,
    NotLoaded,
    Config,
}

impl ErrorKind {
    /// Machine-readable reason string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Format => "format_error",
            ErrorKind::Schema => "schema_error",
            ErrorKind::Io => "io_error",
            ErrorKind::UnsupportedFeature => "unsupported_feature",
            ErrorKind::Security => "security_rejection",
            ErrorKind::NotLoaded => "not_loaded",
            ErrorKind::Config => "config_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::NotLoaded => ErrorKind::NotLoaded,
            ArchiveError::Format(_) | ArchiveError::CorruptEntry { .. } => ErrorKind::Format,
            ArchiveError::Schema(_) => ErrorKind::Schema,
            ArchiveError::UnsupportedCompression { .. } => ErrorKind::UnsupportedFeature,
            ArchiveError::UnsafeName { .. } => ErrorKind::Security,
            ArchiveError::OutOfRange { .. }
            | ArchiveError::MissingContentLength
            | ArchiveError::HttpStatus(_)
            | ArchiveError::Http(_)
            | ArchiveError::Io(_) => ErrorKind::Io,
            ArchiveError::Config(_) => ErrorKind::Config,
        }
    }

    /// Short reason string for notifications, e.g. `"format_error"`.
    pub fn reason(&self) -> &'static str {
        self.kind().as_str()
    }

    /// True for failures where a collaborator may retry with a full download.
    pub fn is_io(&self) -> bool {
        self.kind() == ErrorKind::Io
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(err: serde_json::Error) -> Self {
        ArchiveError::Schema(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
