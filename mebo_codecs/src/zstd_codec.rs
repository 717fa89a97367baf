use log::warn;
use mebo_core::codec::Codec;
use mebo_core::error::MeboError;

/// Zstandard whole-section codec.
///
/// Applied to an entire timestamp or value section after the columnar codec
/// has produced its bytes. A zstd frame carries its own content size, so the
/// decoder can hand it a slice that runs past the real payload into the
/// section's trailing zero padding without needing to know the exact length
/// up front.
pub struct ZstdCodec {
    /// Compression level (1 = fast / larger, 22 = slow / smallest).
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Codec for ZstdCodec {
    fn compress(&self, bytes: &[u8]) -> Vec<u8> {
        zstd::bulk::compress(bytes, self.level).expect("zstd compression of an in-memory buffer cannot fail")
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, MeboError> {
        zstd::decode_all(bytes).map_err(|e| {
            warn!("zstd decode failed on a {}-byte section: {e}", bytes.len());
            MeboError::MalformedPayload { reason: format!("zstd decode failed: {e}") }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(16);
        let codec = ZstdCodec::default();
        let compressed = codec.compress(&data);
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn tolerates_trailing_padding() {
        let data = b"metric timestamps go here".to_vec();
        let codec = ZstdCodec::default();
        let mut compressed = codec.compress(&data);
        compressed.extend_from_slice(&[0u8; 7]);
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }
}
