use std::fmt::Debug;

/// An index key: totally ordered, copyable, and encodable at a fixed width
/// so node layouts can compute slot offsets.
pub trait IndexKey: Copy + Ord + Debug + Send + Sync + 'static {
    /// Encoded width in bytes
    const ENCODED_LEN: usize;

    /// Writes the key into `buf` (exactly ENCODED_LEN bytes).
    fn encode(&self, buf: &mut [u8]);

    /// Reads a key back from `buf` (exactly ENCODED_LEN bytes).
    fn decode(buf: &[u8]) -> Self;
}

impl IndexKey for u32 {
    const ENCODED_LEN: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        u32::from_le_bytes(buf.try_into().unwrap())
    }
}

impl IndexKey for u64 {
    const ENCODED_LEN: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        u64::from_le_bytes(buf.try_into().unwrap())
    }
}
