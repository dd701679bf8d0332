use async_trait::async_trait;
use bytes::Bytes;
use std::fs::File;
use std::path::Path;

use super::{ReadAt, check_range};
use crate::error::Result;

/// Local file reader with random access support.
///
/// Only the requested slice is ever read; the file is never materialized.
pub struct LocalFileReader {
    #[cfg(not(any(unix, windows)))]
    file: parking_lot::Mutex<File>,
    #[cfg(any(unix, windows))]
    file: File,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        Self::from_file(File::open(path)?)
    }

    /// Wrap an already open file handle.
    pub fn from_file(file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        #[cfg(not(any(unix, windows)))]
        let file = parking_lot::Mutex::new(file);
        Ok(Self { file, size })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_bytes(&self, offset: u64, length: usize) -> Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        check_range(offset, length, self.size)?;

        let mut buf = vec![0u8; length];

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_exact_at(&mut buf, offset)?;
        }

        #[cfg(windows)]
        {
            // seek_read may return short counts
            use std::os::windows::fs::FileExt;
            let mut filled = 0;
            while filled < length {
                let n = self
                    .file
                    .seek_read(&mut buf[filled..], offset + filled as u64)?;
                if n == 0 {
                    return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
                }
                filled += n;
            }
        }

        #[cfg(not(any(unix, windows)))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf)?;
        }

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }
}
