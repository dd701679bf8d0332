use bytes::Bytes;

/// Repeating XOR key used by obfuscated containers.
///
/// Byte `o` of the container is stored as `plain[o] ^ key[o % key.len()]`,
/// so any range can be decoded on its own given its absolute offset.
#[derive(Debug, Clone)]
pub struct XorKey {
    key: Vec<u8>,
}

impl XorKey {
    /// Returns `None` for an empty key.
    pub fn new(key: Vec<u8>) -> Option<Self> {
        if key.is_empty() {
            None
        } else {
            Some(Self { key })
        }
    }

    /// Decode `data` read from absolute offset `offset`.
    pub fn decode(&self, offset: u64, data: &[u8]) -> Bytes {
        let len = self.key.len() as u64;
        let mut phase = (offset % len) as usize;
        let mut out = Vec::with_capacity(data.len());
        for byte in data {
            out.push(byte ^ self.key[phase]);
            phase += 1;
            if phase == self.key.len() {
                phase = 0;
            }
        }
        Bytes::from(out)
    }
}
