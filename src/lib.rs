//! # a3d-archive
//!
//! Random-access reader for `.a3d`/`.a3z` 3D capture containers.
//!
//! A container is a ZIP archive holding gaussian splats, meshes, point
//! clouds, thumbnails and a `manifest.json` describing them. This crate opens
//! such a container from a local file, an in-memory buffer, or a remote URL
//! (via HTTP Range requests), indexes its central directory from the tail of
//! the file, and decompresses individual entries on demand.
//!
//! ## Features
//!
//! - Central directory indexing without reading entry payloads
//! - ZIP64 end records and extended-information extra fields
//! - STORED and DEFLATE entries, CRC-32 checked, cached per archive
//! - Path-traversal-safe filename sanitizing for untrusted manifests
//! - Typed manifest model with role queries and proxy selection
//!
//! ## Example
//!
//! ```no_run
//! use a3d_archive::Archive;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut archive = Archive::default();
//!     archive.load_remote("https://example.com/capture.a3d").await?;
//!     archive.parse_manifest().await?;
//!
//!     if let Some((_, entry)) = archive.primary_scene_entry() {
//!         let name = entry.file_name.clone().unwrap_or_default();
//!         if let Some(file) = archive.extract_file(&name).await? {
//!             println!("{} -> {} bytes ({})", file.name, file.data.len(), file.handle);
//!         }
//!     }
//!
//!     archive.dispose();
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod manifest;
pub mod open;
pub mod sanitize;
pub mod zip;

pub use archive::{Archive, DisplayHandle, ExtractedFile, PreExtractReport};
pub use cli::Cli;
pub use config::ReaderConfig;
pub use error::{ArchiveError, ErrorKind, Result};
pub use io::{ByteSource, HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use manifest::{ContentInfo, DataEntry, EntryRole, Manifest, Transform};
pub use sanitize::{Rejection, sanitize};
pub use zip::{CentralDirectory, CentralDirectoryEntry, EntryCache, FileIndexEntry, ZipExtractor};
