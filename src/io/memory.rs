use async_trait::async_trait;
use bytes::Bytes;

use super::{ReadAt, check_range};
use crate::error::Result;

/// In-memory container; ranges are zero-copy views of the retained buffer
pub struct MemoryReader {
    data: Bytes,
}

impl MemoryReader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_bytes(&self, offset: u64, length: usize) -> Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        check_range(offset, length, self.size())?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + length))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
