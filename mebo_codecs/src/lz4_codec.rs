use log::warn;
use mebo_core::codec::Codec;
use mebo_core::error::MeboError;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

/// LZ4 whole-section codec.
///
/// Fastest decompression of the bundled codecs. `compress_prepend_size`
/// stores the uncompressed length as a 4-byte prefix, so `decompress` never
/// needs to over-read into a section's trailing zero padding.
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn compress(&self, bytes: &[u8]) -> Vec<u8> {
        compress_prepend_size(bytes)
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, MeboError> {
        decompress_size_prepended(bytes).map_err(|e| {
            warn!("lz4 decode failed on a {}-byte section: {e}", bytes.len());
            MeboError::MalformedPayload { reason: format!("lz4 decode failed: {e}") }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"0123456789".repeat(40);
        let codec = Lz4Codec;
        let compressed = codec.compress(&data);
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn tolerates_trailing_padding() {
        let data = b"metric values".to_vec();
        let codec = Lz4Codec;
        let mut compressed = codec.compress(&data);
        compressed.extend_from_slice(&[0u8; 5]);
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }
}
