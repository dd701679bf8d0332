//! Shared fixtures: an in-memory ZIP writer and a read-recording source.

#![allow(dead_code)]

use a3d_archive::{MemoryReader, ReadAt};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use parking_lot::Mutex;
use std::io::Write;

#[derive(Debug, Clone, Copy)]
pub enum Method {
    Stored,
    Deflate,
}

#[derive(Debug, Default, Clone)]
pub struct EntryOptions {
    /// Extra field written only into the local header
    pub local_extra: Vec<u8>,
    /// Put sizes and offset in a ZIP64 extra field, sentinels in the header
    pub zip64_extra: bool,
    /// Override the method code written to both headers
    pub method_code: Option<u16>,
}

/// Minimal ZIP writer for building test containers.
#[derive(Default)]
pub struct ZipBuilder {
    body: Vec<u8>,
    central: Vec<u8>,
    count: u64,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, data: &[u8], method: Method) -> &mut Self {
        self.add_with(name, data, method, EntryOptions::default())
    }

    pub fn add_with(
        &mut self,
        name: &str,
        data: &[u8],
        method: Method,
        opts: EntryOptions,
    ) -> &mut Self {
        let (payload, code) = match method {
            Method::Stored => (data.to_vec(), 0u16),
            Method::Deflate => (deflate(data), 8u16),
        };
        let code = opts.method_code.unwrap_or(code);
        let crc = crc32fast::hash(data);
        let offset = self.body.len() as u64;

        // Local file header
        self.body.extend_from_slice(b"PK\x03\x04");
        put16(&mut self.body, 20);
        put16(&mut self.body, 0);
        put16(&mut self.body, code);
        put16(&mut self.body, 0);
        put16(&mut self.body, 0x0021);
        put32(&mut self.body, crc);
        put32(&mut self.body, payload.len() as u32);
        put32(&mut self.body, data.len() as u32);
        put16(&mut self.body, name.len() as u16);
        put16(&mut self.body, opts.local_extra.len() as u16);
        self.body.extend_from_slice(name.as_bytes());
        self.body.extend_from_slice(&opts.local_extra);
        self.body.extend_from_slice(&payload);

        let mut extra = Vec::new();
        let (csize, usize_, off) = if opts.zip64_extra {
            put16(&mut extra, 0x0001);
            put16(&mut extra, 24);
            put64(&mut extra, data.len() as u64);
            put64(&mut extra, payload.len() as u64);
            put64(&mut extra, offset);
            (0xFFFF_FFFF, 0xFFFF_FFFF, 0xFFFF_FFFF)
        } else {
            (payload.len() as u32, data.len() as u32, offset as u32)
        };

        // Central directory header
        let cd = &mut self.central;
        cd.extend_from_slice(b"PK\x01\x02");
        put16(cd, 20);
        put16(cd, 20);
        put16(cd, 0);
        put16(cd, code);
        put16(cd, 0);
        put16(cd, 0x0021);
        put32(cd, crc);
        put32(cd, csize);
        put32(cd, usize_);
        put16(cd, name.len() as u16);
        put16(cd, extra.len() as u16);
        put16(cd, 0);
        put16(cd, 0);
        put16(cd, 0);
        put32(cd, 0);
        put32(cd, off);
        cd.extend_from_slice(name.as_bytes());
        cd.extend_from_slice(&extra);

        self.count += 1;
        self
    }

    pub fn comment(&mut self, comment: &[u8]) -> &mut Self {
        self.comment = comment.to_vec();
        self
    }

    /// Append raw bytes to the central directory (for corruption tests).
    pub fn append_central_garbage(&mut self, bytes: &[u8], counts_as_entry: bool) -> &mut Self {
        self.central.extend_from_slice(bytes);
        if counts_as_entry {
            self.count += 1;
        }
        self
    }

    pub fn finish(&self) -> Vec<u8> {
        let mut out = self.body.clone();
        let cd_offset = out.len() as u32;
        out.extend_from_slice(&self.central);
        out.extend_from_slice(b"PK\x05\x06");
        put16(&mut out, 0);
        put16(&mut out, 0);
        put16(&mut out, self.count as u16);
        put16(&mut out, self.count as u16);
        put32(&mut out, self.central.len() as u32);
        put32(&mut out, cd_offset);
        put16(&mut out, self.comment.len() as u16);
        out.extend_from_slice(&self.comment);
        out
    }

    /// Finish with a ZIP64 record and locator; the 32-bit EOCD is saturated.
    pub fn finish_zip64(&self) -> Vec<u8> {
        let mut out = self.body.clone();
        let cd_offset = out.len() as u64;
        out.extend_from_slice(&self.central);

        let record_offset = out.len() as u64;
        out.extend_from_slice(b"PK\x06\x06");
        put64(&mut out, 44);
        put16(&mut out, 45);
        put16(&mut out, 45);
        put32(&mut out, 0);
        put32(&mut out, 0);
        put64(&mut out, self.count);
        put64(&mut out, self.count);
        put64(&mut out, self.central.len() as u64);
        put64(&mut out, cd_offset);

        out.extend_from_slice(b"PK\x06\x07");
        put32(&mut out, 0);
        put64(&mut out, record_offset);
        put32(&mut out, 1);

        out.extend_from_slice(b"PK\x05\x06");
        put16(&mut out, 0);
        put16(&mut out, 0);
        put16(&mut out, 0xFFFF);
        put16(&mut out, 0xFFFF);
        put32(&mut out, 0xFFFF_FFFF);
        put32(&mut out, 0xFFFF_FFFF);
        put16(&mut out, self.comment.len() as u16);
        out.extend_from_slice(&self.comment);
        out
    }
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn put16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// In-memory source that records every `(offset, length)` read.
pub struct RecordingReader {
    inner: MemoryReader,
    reads: Mutex<Vec<(u64, usize)>>,
}

impl RecordingReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: MemoryReader::new(data),
            reads: Mutex::new(Vec::new()),
        }
    }

    pub fn reads(&self) -> Vec<(u64, usize)> {
        self.reads.lock().clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().len()
    }

    pub fn reset(&self) {
        self.reads.lock().clear();
    }
}

#[async_trait]
impl ReadAt for RecordingReader {
    async fn read_bytes(&self, offset: u64, length: usize) -> a3d_archive::Result<Bytes> {
        self.reads.lock().push((offset, length));
        self.inner.read_bytes(offset, length).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }
}

/// Deterministic pseudo-random bytes that do not compress well.
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

pub fn manifest_json() -> String {
    serde_json::json!({
        "container_version": "1.0",
        "packer": "test-packer",
        "packer_version": "0.1.0",
        "_creation_date": "2025-06-01T12:00:00Z",
        "data_entries": {
            "scene_0": {
                "file_name": "scene_0.ply",
                "created_by": "capture-tool",
                "_created_by_version": "3.2",
                "_parameters": { "position": [0.0, 1.5, 0.0], "scale": 2.0 }
            },
            "thumbnail_0": { "file_name": "thumbnail_0.jpg" }
        }
    })
    .to_string()
}
