//! Byte range sources.
//!
//! Every backing store answers one question: "give me `length` bytes at
//! `offset`". The indexer and extractor only ever talk to [`ReadAt`], so they
//! are unaware of whether the container lives on disk, in memory, or behind
//! an HTTP server that honours Range requests.

mod http;
mod local;
mod memory;
mod xor;

pub use http::{HttpRangeReader, fetch_full};
pub use local::LocalFileReader;
pub use memory::MemoryReader;
pub use xor::XorKey;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{ArchiveError, Result};

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// A zero-length read returns an empty buffer without touching the
    /// backing store.
    async fn read_bytes(&self, offset: u64, length: usize) -> Result<Bytes>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

/// Reject reads that run past the end of a source of `size` bytes.
pub(crate) fn check_range(offset: u64, length: usize, size: u64) -> Result<()> {
    let end = offset.checked_add(length as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(ArchiveError::OutOfRange {
            offset,
            length: length as u64,
            size,
        }),
    }
}

/// The three backing stores a container can be opened from.
pub enum ByteSource {
    File(LocalFileReader),
    Memory(MemoryReader),
    Remote(HttpRangeReader),
}

impl ByteSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ByteSource::File(_) => "file",
            ByteSource::Memory(_) => "memory",
            ByteSource::Remote(_) => "remote",
        }
    }
}

#[async_trait]
impl ReadAt for ByteSource {
    async fn read_bytes(&self, offset: u64, length: usize) -> Result<Bytes> {
        match self {
            ByteSource::File(r) => r.read_bytes(offset, length).await,
            ByteSource::Memory(r) => r.read_bytes(offset, length).await,
            ByteSource::Remote(r) => r.read_bytes(offset, length).await,
        }
    }

    fn size(&self) -> u64 {
        match self {
            ByteSource::File(r) => r.size(),
            ByteSource::Memory(r) => r.size(),
            ByteSource::Remote(r) => r.size(),
        }
    }
}

/// An established backing store, optionally XOR-obfuscated.
///
/// Owned by the archive facade; replacing or dropping it invalidates
/// everything derived from it.
pub struct ContainerHandle {
    source: ByteSource,
    key: Option<XorKey>,
}

impl ContainerHandle {
    pub fn new(source: ByteSource, key: Option<XorKey>) -> Self {
        Self { source, key }
    }

    pub fn source(&self) -> &ByteSource {
        &self.source
    }
}

#[async_trait]
impl ReadAt for ContainerHandle {
    async fn read_bytes(&self, offset: u64, length: usize) -> Result<Bytes> {
        let data = self.source.read_bytes(offset, length).await?;
        match &self.key {
            Some(key) => Ok(key.decode(offset, &data)),
            None => Ok(data),
        }
    }

    fn size(&self) -> u64 {
        self.source.size()
    }
}
