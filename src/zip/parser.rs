//! Central directory indexing.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Read the tail window and find the End of Central Directory (EOCD)
//! 2. If ZIP64, follow the locator to the ZIP64 EOCD for 64-bit values
//! 3. Read the Central Directory in a single request and index every entry
//! 4. For extraction, read each file's Local File Header and data
//!
//! Indexing never touches entry payloads, which keeps the cost of opening a
//! remote container down to two or three small Range requests.

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::DEFAULT_TAIL_WINDOW;
use crate::error::{ArchiveError, Result};
use crate::io::ReadAt;

use super::structures::*;

/// In-memory file index built from the central directory.
///
/// Keyed by archive-internal path; a duplicate name overwrites the earlier
/// entry but keeps its listing position.
#[derive(Debug, Default, Clone)]
pub struct CentralDirectory {
    entries: HashMap<String, CentralDirectoryEntry>,
    order: Vec<String>,
}

impl CentralDirectory {
    fn insert(&mut self, entry: CentralDirectoryEntry) {
        if !self.entries.contains_key(&entry.name) {
            self.order.push(entry.name.clone());
        }
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&CentralDirectoryEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in central-directory order.
    pub fn entries(&self) -> impl Iterator<Item = &CentralDirectoryEntry> {
        self.order.iter().filter_map(|name| self.entries.get(name))
    }

    /// Names and sizes only, in central-directory order.
    pub fn file_index(&self) -> Vec<FileIndexEntry> {
        self.entries().map(CentralDirectoryEntry::summary).collect()
    }
}

/// Where the central directory lives, after resolving ZIP64 indirection
#[derive(Debug, Clone, Copy)]
struct DirectoryLocation {
    cd_offset: u64,
    cd_size: u64,
    total_entries: u64,
}

/// Low-level ZIP file parser.
///
/// Generic over the reader type so the same code indexes local files,
/// in-memory buffers and HTTP sources.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// let index = parser.build_index().await?;
/// for entry in index.entries() {
///     let offset = parser.get_data_offset(entry).await?;
///     // Read file data from offset...
/// }
/// ```
pub struct ZipParser<R: ReadAt + ?Sized> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
    /// How far back from the end to look for the EOCD
    tail_window: u64,
}

impl<R: ReadAt + ?Sized> ZipParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(reader: Arc<R>) -> Self {
        Self::with_tail_window(reader, DEFAULT_TAIL_WINDOW)
    }

    pub fn with_tail_window(reader: Arc<R>, tail_window: u64) -> Self {
        let size = reader.size();
        Self {
            reader,
            size,
            tail_window: tail_window.max(EndOfCentralDirectory::SIZE as u64),
        }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Reads the last `min(size, tail_window)` bytes in one request and
    /// searches backwards for the signature, so archives with a trailing
    /// comment are handled without a second read.
    ///
    /// # Returns
    ///
    /// The EOCD, its absolute offset, and the tail buffer with its start
    /// offset (the ZIP64 locator usually sits inside it).
    async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64, Bytes, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(ArchiveError::Format(
                "not a valid container: too small for an End of Central Directory".into(),
            ));
        }

        let search_size = self.tail_window.min(self.size);
        let search_start = self.size - search_size;
        let buf = self
            .reader
            .read_bytes(search_start, search_size as usize)
            .await?;

        // Search backwards for EOCD signature (PK\x05\x06)
        let mut fallback = None;
        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }

            // The comment must fit in what remains of the file
            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if i + EndOfCentralDirectory::SIZE + comment_len > buf.len() {
                continue;
            }

            let eocd = EndOfCentralDirectory::from_bytes(&buf[i..])?;
            let offset = search_start + i as u64;

            // Prefer a record whose directory ends where the record starts over
            // signature bytes that happen to sit in a comment
            let directory_end = eocd.cd_offset as u64 + eocd.cd_size as u64;
            if eocd.is_zip64() || directory_end == offset {
                return Ok((eocd, offset, buf, search_start));
            }
            if fallback.is_none() {
                fallback = Some((eocd, offset));
            }
        }

        match fallback {
            Some((eocd, offset)) => {
                debug!(
                    offset,
                    "EOCD does not abut its central directory; using nearest candidate"
                );
                Ok((eocd, offset, buf, search_start))
            }
            None => Err(ArchiveError::Format(
                "not a valid container: End of Central Directory not found".into(),
            )),
        }
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD has saturated fields. Returns `None` when
    /// no locator precedes the EOCD, which happens for plain archives that
    /// legitimately hold exactly 65535 entries.
    async fn read_zip64_eocd(
        &self,
        eocd_offset: u64,
        tail: &Bytes,
        tail_start: u64,
    ) -> Result<Option<Zip64EOCD>> {
        let Some(locator_offset) = eocd_offset.checked_sub(Zip64EOCDLocator::SIZE as u64) else {
            return Ok(None);
        };

        // The locator sits immediately before the EOCD, normally inside the tail
        let locator_buf = if locator_offset >= tail_start {
            let start = (locator_offset - tail_start) as usize;
            tail.slice(start..start + Zip64EOCDLocator::SIZE)
        } else {
            self.reader
                .read_bytes(locator_offset, Zip64EOCDLocator::SIZE)
                .await?
        };

        if !Zip64EOCDLocator::matches(&locator_buf) {
            return Ok(None);
        }
        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let record_end = locator.eocd64_offset.checked_add(Zip64EOCD::MIN_SIZE as u64);
        if record_end.is_none_or(|end| end > locator_offset) {
            return Err(ArchiveError::Format(format!(
                "ZIP64 record offset {} points outside the container",
                locator.eocd64_offset
            )));
        }

        let record = self
            .reader
            .read_bytes(locator.eocd64_offset, Zip64EOCD::MIN_SIZE)
            .await?;

        Zip64EOCD::from_bytes(&record).map(Some)
    }

    async fn locate_directory(&self) -> Result<DirectoryLocation> {
        let (eocd, eocd_offset, tail, tail_start) = self.find_eocd().await?;

        let mut location = DirectoryLocation {
            cd_offset: eocd.cd_offset as u64,
            cd_size: eocd.cd_size as u64,
            total_entries: eocd.total_entries as u64,
        };

        if eocd.is_zip64() {
            match self.read_zip64_eocd(eocd_offset, &tail, tail_start).await? {
                Some(eocd64) => {
                    debug!(
                        total_entries = eocd64.total_entries,
                        cd_offset = eocd64.cd_offset,
                        "using ZIP64 end of central directory"
                    );
                    location = DirectoryLocation {
                        cd_offset: eocd64.cd_offset,
                        cd_size: eocd64.cd_size,
                        total_entries: eocd64.total_entries,
                    };
                }
                None => {
                    warn!("EOCD has saturated fields but no ZIP64 locator; using 32-bit values")
                }
            }
        }

        let cd_end = location.cd_offset.checked_add(location.cd_size);
        if cd_end.is_none_or(|end| end > eocd_offset) {
            return Err(ArchiveError::Format(format!(
                "central directory ({} bytes at {}) overlaps the end record",
                location.cd_size, location.cd_offset
            )));
        }

        Ok(location)
    }

    /// Index every entry of the central directory.
    ///
    /// Reads the EOCD first, then fetches the entire Central Directory in a
    /// single request. A corrupt trailing header ends the scan with a warning
    /// instead of failing the whole load.
    pub async fn build_index(&self) -> Result<CentralDirectory> {
        let location = self.locate_directory().await?;

        let cd_size = usize::try_from(location.cd_size).map_err(|_| {
            ArchiveError::Format(format!(
                "central directory too large: {} bytes",
                location.cd_size
            ))
        })?;
        let cd_data = self.reader.read_bytes(location.cd_offset, cd_size).await?;

        let mut index = CentralDirectory::default();
        let mut cursor = Cursor::new(&cd_data[..]);

        for n in 0..location.total_entries {
            match Self::parse_cdfh(&mut cursor) {
                Some(entry) => index.insert(entry),
                None => {
                    warn!(
                        entry = n,
                        expected = location.total_entries,
                        position = cursor.position(),
                        "invalid central directory header, treating as end of directory"
                    );
                    break;
                }
            }
        }

        debug!(
            entries = index.len(),
            cd_offset = location.cd_offset,
            cd_size = location.cd_size,
            "central directory indexed"
        );

        Ok(index)
    }

    /// Parse a Central Directory File Header from a cursor.
    ///
    /// Returns `None` on a signature mismatch or a header that runs past the
    /// end of the directory.
    fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Option<CentralDirectoryEntry> {
        let data = *cursor.get_ref();
        let start = cursor.position() as usize;
        if data.len().saturating_sub(start) < CDFH_MIN_SIZE {
            return None;
        }

        // Read and verify the signature (PK\x01\x02)
        if &data[start..start + 4] != CDFH_SIGNATURE {
            return None;
        }
        cursor.set_position(start as u64 + 4);

        // Read fixed-size header fields
        let _version_made_by = cursor.read_u16::<LittleEndian>().ok()?;
        let _version_needed = cursor.read_u16::<LittleEndian>().ok()?;
        let _flags = cursor.read_u16::<LittleEndian>().ok()?;
        let compression_method = cursor.read_u16::<LittleEndian>().ok()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>().ok()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>().ok()?;
        let crc32 = cursor.read_u32::<LittleEndian>().ok()?;
        let compressed_size = cursor.read_u32::<LittleEndian>().ok()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>().ok()?;
        let file_name_length = cursor.read_u16::<LittleEndian>().ok()? as usize;
        let extra_field_length = cursor.read_u16::<LittleEndian>().ok()? as usize;
        let file_comment_length = cursor.read_u16::<LittleEndian>().ok()? as usize;
        let _disk_number_start = cursor.read_u16::<LittleEndian>().ok()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>().ok()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>().ok()?;
        let lfh_offset = cursor.read_u32::<LittleEndian>().ok()?;

        let name_start = start + CDFH_MIN_SIZE;
        let extra_start = name_start + file_name_length;
        let extra_end = extra_start + extra_field_length;
        let record_end = extra_end + file_comment_length;
        if record_end > data.len() {
            return None;
        }

        // Use lossy conversion to handle non-UTF8 filenames gracefully
        let file_name = String::from_utf8_lossy(&data[name_start..extra_start]).into_owned();

        // Directory entries end with '/'
        let is_directory = file_name.ends_with('/');

        let (uncompressed_size, compressed_size, lfh_offset) = apply_zip64_extra(
            &data[extra_start..extra_end],
            uncompressed_size,
            compressed_size,
            lfh_offset,
        );

        // Skip past the extra field and file comment
        cursor.set_position(record_end as u64);

        Some(CentralDirectoryEntry {
            name: file_name,
            method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            offset: lfh_offset,
            last_mod_time,
            last_mod_date,
            is_directory,
        })
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The Local File Header (LFH) has variable-length fields (filename,
    /// extra field) that may differ from the Central Directory entry.
    /// This method reads the LFH to calculate where the actual file
    /// data begins.
    pub async fn get_data_offset(&self, entry: &CentralDirectoryEntry) -> Result<u64> {
        let lfh_buf = self.reader.read_bytes(entry.offset, LFH_SIZE).await?;

        // Verify LFH signature (PK\x03\x04)
        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(ArchiveError::CorruptEntry {
                path: entry.name.clone(),
                detail: "invalid local file header signature".into(),
            });
        }

        // Name and extra lengths sit at fixed positions 26 and 28
        let file_name_length = u16::from_le_bytes([lfh_buf[26], lfh_buf[27]]) as u64;
        let extra_field_length = u16::from_le_bytes([lfh_buf[28], lfh_buf[29]]) as u64;

        Ok(entry.offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// Substitute 64-bit values from the ZIP64 extended information extra field.
///
/// Only the fields saturated in the fixed header are present in the block,
/// always in the order uncompressed, compressed, local header offset.
fn apply_zip64_extra(
    extra: &[u8],
    uncompressed_size: u32,
    compressed_size: u32,
    lfh_offset: u32,
) -> (u64, u64, u64) {
    let mut uncompressed = uncompressed_size as u64;
    let mut compressed = compressed_size as u64;
    let mut offset = lfh_offset as u64;

    let mut cursor = Cursor::new(extra);
    while (cursor.position() as usize) + 4 <= extra.len() {
        let (Ok(header_id), Ok(field_size)) = (
            cursor.read_u16::<LittleEndian>(),
            cursor.read_u16::<LittleEndian>(),
        ) else {
            break;
        };
        let block_start = cursor.position() as usize;
        let block_end = (block_start + field_size as usize).min(extra.len());

        if header_id == ZIP64_EXTRA_TAG {
            let mut block = Cursor::new(&extra[block_start..block_end]);
            if uncompressed_size == SENTINEL_32 {
                if let Ok(v) = block.read_u64::<LittleEndian>() {
                    uncompressed = v;
                }
            }
            if compressed_size == SENTINEL_32 {
                if let Ok(v) = block.read_u64::<LittleEndian>() {
                    compressed = v;
                }
            }
            if lfh_offset == SENTINEL_32 {
                if let Ok(v) = block.read_u64::<LittleEndian>() {
                    offset = v;
                }
            }
            break;
        }

        cursor.set_position(block_end as u64);
    }

    (uncompressed, compressed, offset)
}
