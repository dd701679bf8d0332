//! ZIP container indexing and extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: fixed-layout records (EOCD, ZIP64 locator/record, headers)
//! - [`parser`]: central directory indexing from the tail of the container
//! - [`extractor`]: single-entry extraction with a per-archive cache
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The EOCD is read first (from the end of the file), then the Central
//! Directory, which allows listing files without reading the whole archive.
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - STORED and DEFLATE only

mod extractor;
mod parser;
mod structures;

pub use extractor::{EntryCache, ZipExtractor};
pub use parser::{CentralDirectory, ZipParser};
pub use structures::*;
