//! The archive facade.
//!
//! [`Archive`] owns the container handle, the central directory index, the
//! decompressed-entry cache and the parsed manifest for one loaded
//! container. Loading a new container tears all of them down first;
//! [`Archive::dispose`] tears them down for good.

use bytes::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::config::ReaderConfig;
use crate::error::{ArchiveError, Result};
use crate::io::{
    ByteSource, ContainerHandle, HttpRangeReader, LocalFileReader, MemoryReader, ReadAt, XorKey,
};
use crate::manifest::{ContentInfo, DataEntry, Manifest, Transform};
use crate::sanitize::sanitize;
use crate::zip::{CentralDirectory, EntryCache, FileIndexEntry, ZipExtractor, ZipParser};

static NEXT_ARCHIVE_ID: AtomicU64 = AtomicU64::new(1);

/// Revocable reference to extracted bytes, handed to renderers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayHandle(String);

impl DisplayHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DisplayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of [`Archive::extract_file`].
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    /// Sanitized archive-internal name
    pub name: String,
    pub data: Bytes,
    pub handle: DisplayHandle,
}

/// Outcome of warming the cache for several entries at once.
#[derive(Debug, Default)]
pub struct PreExtractReport {
    pub extracted: Vec<String>,
    pub missing: Vec<String>,
    pub failed: Vec<(String, ArchiveError)>,
}

impl PreExtractReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct DisplayRegistry {
    next_seq: u64,
    live: HashMap<String, DisplayHandle>,
}

/// Random-access reader for one `.a3d`/`.a3z` container.
pub struct Archive {
    config: ReaderConfig,
    id: u64,
    extractor: Option<ZipExtractor<ContainerHandle>>,
    index: Option<Arc<CentralDirectory>>,
    cache: EntryCache,
    manifest: Option<Manifest>,
    display: Mutex<DisplayRegistry>,
}

impl Default for Archive {
    fn default() -> Self {
        Self::new(ReaderConfig::default())
    }
}

impl Archive {
    pub fn new(config: ReaderConfig) -> Self {
        Self {
            config,
            id: NEXT_ARCHIVE_ID.fetch_add(1, Ordering::Relaxed),
            extractor: None,
            index: None,
            cache: EntryCache::new(),
            manifest: None,
            display: Mutex::new(DisplayRegistry::default()),
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Open a container on the local filesystem.
    ///
    /// Every load tears down the previous container first, so a failed load
    /// leaves the archive unloaded.
    pub async fn load_from_file(&mut self, path: &Path) -> Result<()> {
        self.dispose();
        let reader = LocalFileReader::new(path)?;
        self.establish(ByteSource::File(reader)).await
    }

    /// Open a container from an already open file handle.
    pub async fn load_from_file_handle(&mut self, file: File) -> Result<()> {
        self.dispose();
        let reader = LocalFileReader::from_file(file)?;
        self.establish(ByteSource::File(reader)).await
    }

    /// Open a container held entirely in memory.
    pub async fn load_from_bytes(&mut self, data: impl Into<Bytes>) -> Result<()> {
        self.establish(ByteSource::Memory(MemoryReader::new(data))).await
    }

    /// Open a remote container through HTTP Range requests.
    ///
    /// Fails with an I/O error when the server cannot report the size or
    /// rejects a range; callers may then fall back to [`Archive::load_from_bytes`].
    pub async fn load_remote(&mut self, url: &str) -> Result<()> {
        self.dispose();
        let reader = HttpRangeReader::new(url.to_string(), &self.config).await?;
        self.establish(ByteSource::Remote(reader)).await
    }

    async fn establish(&mut self, source: ByteSource) -> Result<()> {
        self.dispose();

        let kind = source.kind();
        let key = self.config.archive_key.clone().and_then(XorKey::new);
        let handle = Arc::new(ContainerHandle::new(source, key));
        let size = handle.size();

        let parser =
            ZipParser::with_tail_window(handle.clone(), self.config.effective_tail_window());
        let index = Arc::new(parser.build_index().await?);

        info!(
            archive = self.id,
            source = kind,
            size,
            entries = index.len(),
            "container indexed"
        );

        self.extractor = Some(ZipExtractor::new(handle, index.clone()));
        self.index = Some(index);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.extractor.is_some()
    }

    /// Extract and parse the manifest, replacing any earlier one.
    pub async fn parse_manifest(&mut self) -> Result<&Manifest> {
        self.manifest = None;
        let path = self.config.manifest_path.clone();
        let Some((_, data)) = self.extract_bytes(&path).await? else {
            return Err(ArchiveError::Schema(format!("{path} not found in container")));
        };

        let manifest = Manifest::from_slice(&data)?;
        debug!(
            archive = self.id,
            version = %manifest.container_version,
            entries = manifest.data_entries.len(),
            "manifest parsed"
        );
        let manifest = self.manifest.insert(manifest);
        Ok(&*manifest)
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// Data entries of the parsed manifest; `None` before a successful parse.
    pub fn data_entries(&self) -> Option<&BTreeMap<String, DataEntry>> {
        self.manifest.as_ref().map(|m| &m.data_entries)
    }

    pub fn find_by_prefix<'a>(&'a self, prefix: &'a str) -> Vec<(&'a str, &'a DataEntry)> {
        self.manifest
            .as_ref()
            .map(|m| m.find_by_prefix(prefix))
            .unwrap_or_default()
    }

    pub fn primary_scene_entry(&self) -> Option<(&str, &DataEntry)> {
        self.manifest.as_ref()?.primary_scene()
    }

    pub fn primary_mesh_entry(&self) -> Option<(&str, &DataEntry)> {
        self.manifest.as_ref()?.primary_mesh()
    }

    pub fn primary_pointcloud_entry(&self) -> Option<(&str, &DataEntry)> {
        self.manifest.as_ref()?.primary_pointcloud()
    }

    pub fn primary_thumbnail_entry(&self) -> Option<(&str, &DataEntry)> {
        self.manifest.as_ref()?.primary_thumbnail()
    }

    pub fn primary_image_entry(&self) -> Option<(&str, &DataEntry)> {
        self.manifest.as_ref()?.primary_image()
    }

    pub fn scene_proxy_entry(&self) -> Option<(&str, &DataEntry)> {
        self.manifest.as_ref()?.scene_proxy()
    }

    pub fn mesh_proxy_entry(&self) -> Option<(&str, &DataEntry)> {
        self.manifest.as_ref()?.mesh_proxy()
    }

    pub fn content_info(&self) -> ContentInfo {
        self.manifest
            .as_ref()
            .map(Manifest::content_info)
            .unwrap_or_default()
    }

    pub fn entry_transform(&self, key: &str) -> Option<Transform> {
        self.manifest.as_ref()?.entry_transform(key)
    }

    /// Names and sizes of every entry, without decompressing anything.
    pub fn file_index(&self) -> Result<Vec<FileIndexEntry>> {
        self.index
            .as_ref()
            .map(|index| index.file_index())
            .ok_or(ArchiveError::NotLoaded)
    }

    pub fn central_directory(&self) -> Option<&Arc<CentralDirectory>> {
        self.index.as_ref()
    }

    /// Whether the decompressed bytes of `name` are already held.
    pub fn is_cached(&self, name: &str) -> bool {
        match sanitize(name) {
            Ok(cleaned) => self.cache.contains(&cleaned) || self.cache.contains(name),
            Err(_) => false,
        }
    }

    /// Sanitize `name`, then extract it through the cache.
    ///
    /// Returns the sanitized name with the bytes, or `None` when the
    /// container has no such entry.
    async fn extract_bytes(&self, name: &str) -> Result<Option<(String, Bytes)>> {
        let cleaned = sanitize(name).map_err(|reason| ArchiveError::UnsafeName {
            name: name.to_string(),
            reason,
        })?;

        // The index may hold the entry under its raw spelling (e.g. "./a.ply")
        let cached = self
            .cache
            .get(&cleaned)
            .or_else(|| self.cache.get(name));
        if let Some(data) = cached {
            return Ok(Some((cleaned, data)));
        }

        let extractor = self.extractor.as_ref().ok_or(ArchiveError::NotLoaded)?;
        let index = extractor.index();
        let key = if index.contains(&cleaned) {
            cleaned.as_str()
        } else if index.contains(name) {
            name
        } else {
            debug!(archive = self.id, name = %cleaned, "entry not found");
            return Ok(None);
        };

        let data = extractor.extract(key, &self.cache).await?;
        Ok(data.map(|data| (cleaned, data)))
    }

    /// Extract one entry and register a display handle for it.
    pub async fn extract_file(&self, name: &str) -> Result<Option<ExtractedFile>> {
        let Some((name, data)) = self.extract_bytes(name).await? else {
            return Ok(None);
        };
        let handle = self.display_handle_for(&name);
        Ok(Some(ExtractedFile { name, data, handle }))
    }

    /// Extract the file behind a manifest data entry such as `scene_0`.
    pub async fn extract_data_entry(&self, key: &str) -> Result<Option<ExtractedFile>> {
        let manifest = self
            .manifest
            .as_ref()
            .ok_or_else(|| ArchiveError::Schema("manifest has not been parsed".into()))?;
        let Some(entry) = manifest.data_entries.get(key) else {
            return Ok(None);
        };
        let file_name = entry
            .file_name
            .as_deref()
            .ok_or_else(|| ArchiveError::Schema(format!("data entry {key} has no file_name")))?;
        self.extract_file(file_name).await
    }

    /// Warm the cache for several entries; each one succeeds or fails on its own.
    pub async fn pre_extract<S: AsRef<str>>(&self, names: &[S]) -> PreExtractReport {
        let results = join_all(names.iter().map(|n| self.extract_bytes(n.as_ref()))).await;

        let mut report = PreExtractReport::default();
        for (name, result) in names.iter().zip(results) {
            let name = name.as_ref().to_string();
            match result {
                Ok(Some(_)) => report.extracted.push(name),
                Ok(None) => report.missing.push(name),
                Err(err) => report.failed.push((name, err)),
            }
        }
        report
    }

    fn display_handle_for(&self, name: &str) -> DisplayHandle {
        let mut registry = self.display.lock();
        if let Some(handle) = registry.live.get(name) {
            return handle.clone();
        }
        registry.next_seq += 1;
        let handle = DisplayHandle(format!("a3d-blob:{}/{}/{}", self.id, registry.next_seq, name));
        registry.live.insert(name.to_string(), handle.clone());
        handle
    }

    pub fn is_handle_live(&self, handle: &DisplayHandle) -> bool {
        self.display.lock().live.values().any(|h| h == handle)
    }

    /// Revoke one display handle; returns false if it was not live.
    pub fn revoke_display_handle(&self, handle: &DisplayHandle) -> bool {
        let mut registry = self.display.lock();
        let before = registry.live.len();
        registry.live.retain(|_, h| h != handle);
        registry.live.len() != before
    }

    /// Bytes received from the network, for remote containers.
    pub fn transferred_bytes(&self) -> Option<u64> {
        match self.extractor.as_ref()?.reader().source() {
            ByteSource::Remote(reader) => Some(reader.transferred_bytes()),
            _ => None,
        }
    }

    /// Drop the backing store but keep the index and cache.
    ///
    /// Cached entries stay extractable; anything else fails with `NotLoaded`.
    pub fn release_raw_data(&mut self) {
        if self.extractor.take().is_some() {
            debug!(
                archive = self.id,
                cached = self.cache.len(),
                cached_bytes = self.cache.total_bytes(),
                "raw container data released"
            );
        }
    }

    /// Tear everything down and revoke every display handle.
    pub fn dispose(&mut self) {
        self.extractor = None;
        self.index = None;
        self.manifest = None;
        self.cache.clear();
        let registry = self.display.get_mut();
        let revoked = registry.live.len();
        registry.live.clear();
        if revoked > 0 {
            debug!(archive = self.id, revoked, "display handles revoked");
        }
    }
}
