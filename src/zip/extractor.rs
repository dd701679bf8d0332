use bytes::Bytes;
use flate2::read::DeflateDecoder;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ArchiveError, Result};
use crate::io::ReadAt;

use super::parser::{CentralDirectory, ZipParser};
use super::structures::{CentralDirectoryEntry, CompressionMethod};

/// Decompressed entries keyed by archive-internal path.
///
/// Grows lazily and is only emptied by an explicit [`EntryCache::clear`].
#[derive(Debug, Default)]
pub struct EntryCache {
    entries: Mutex<HashMap<String, Bytes>>,
}

impl EntryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.entries.lock().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.lock().contains_key(path)
    }

    pub fn insert(&self, path: &str, data: Bytes) {
        self.entries.lock().insert(path.to_string(), data);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Total decompressed bytes held.
    pub fn total_bytes(&self) -> usize {
        self.entries.lock().values().map(Bytes::len).sum()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// On-demand single-entry extractor.
///
/// Holds the finished index; extraction is only possible once indexing has
/// completed.
pub struct ZipExtractor<R: ReadAt + ?Sized> {
    parser: ZipParser<R>,
    index: Arc<CentralDirectory>,
}

impl<R: ReadAt + ?Sized> ZipExtractor<R> {
    pub fn new(reader: Arc<R>, index: Arc<CentralDirectory>) -> Self {
        Self {
            parser: ZipParser::new(reader),
            index,
        }
    }

    /// Index the container behind `reader` and return an extractor for it.
    pub async fn open(reader: Arc<R>) -> Result<Self> {
        let parser = ZipParser::new(reader);
        let index = Arc::new(parser.build_index().await?);
        Ok(Self { parser, index })
    }

    pub fn index(&self) -> &Arc<CentralDirectory> {
        &self.index
    }

    pub fn reader(&self) -> &Arc<R> {
        self.parser.reader()
    }

    /// Extract `path`, consulting and then filling `cache`.
    ///
    /// Returns `Ok(None)` when the archive has no such entry.
    pub async fn extract(&self, path: &str, cache: &EntryCache) -> Result<Option<Bytes>> {
        if let Some(data) = cache.get(path) {
            return Ok(Some(data));
        }

        let Some(entry) = self.index.get(path) else {
            debug!(path, "entry not in central directory");
            return Ok(None);
        };

        let data = self.extract_entry(entry).await?;
        cache.insert(path, data.clone());
        Ok(Some(data))
    }

    /// Read and decompress a single entry, bypassing any cache.
    pub async fn extract_entry(&self, entry: &CentralDirectoryEntry) -> Result<Bytes> {
        if entry.is_directory {
            return Ok(Bytes::new());
        }

        // Reject before any payload I/O
        if let CompressionMethod::Unknown(method) = entry.method {
            return Err(ArchiveError::UnsupportedCompression {
                method,
                path: entry.name.clone(),
            });
        }

        let data_offset = self.parser.get_data_offset(entry).await?;
        let compressed_size = usize::try_from(entry.compressed_size).map_err(|_| {
            ArchiveError::CorruptEntry {
                path: entry.name.clone(),
                detail: format!("compressed size {} too large", entry.compressed_size),
            }
        })?;
        let raw = self
            .parser
            .reader()
            .read_bytes(data_offset, compressed_size)
            .await?;

        let data = match entry.method {
            CompressionMethod::Stored => raw,
            CompressionMethod::Deflate => inflate(entry, &raw)?,
            CompressionMethod::Unknown(method) => {
                return Err(ArchiveError::UnsupportedCompression {
                    method,
                    path: entry.name.clone(),
                });
            }
        };

        verify(entry, &data)?;

        debug!(
            path = %entry.name,
            method = entry.method.as_u16(),
            compressed = entry.compressed_size,
            size = data.len(),
            "entry extracted"
        );

        Ok(data)
    }
}

/// Raw-inflate a DEFLATE payload, stopping one byte past the declared size.
fn inflate(entry: &CentralDirectoryEntry, raw: &[u8]) -> Result<Bytes> {
    let capacity = entry.uncompressed_size.min(64 * 1024 * 1024) as usize;
    let mut out = Vec::with_capacity(capacity);
    DeflateDecoder::new(raw)
        .take(entry.uncompressed_size.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| ArchiveError::CorruptEntry {
            path: entry.name.clone(),
            detail: format!("deflate stream error: {e}"),
        })?;
    Ok(Bytes::from(out))
}

fn verify(entry: &CentralDirectoryEntry, data: &[u8]) -> Result<()> {
    if data.len() as u64 != entry.uncompressed_size {
        return Err(ArchiveError::CorruptEntry {
            path: entry.name.clone(),
            detail: format!(
                "expected {} bytes, decoded {}",
                entry.uncompressed_size,
                data.len()
            ),
        });
    }

    let crc = crc32fast::hash(data);
    if crc != entry.crc32 {
        return Err(ArchiveError::CorruptEntry {
            path: entry.name.clone(),
            detail: format!("CRC-32 mismatch: expected {:08x}, got {crc:08x}", entry.crc32),
        });
    }

    Ok(())
}
