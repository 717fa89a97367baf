use log::warn;
use mebo_core::codec::Codec;
use mebo_core::error::MeboError;

/// S2 whole-section codec.
///
/// `CompressionKind::S2` names Klaus Post's S2 format, a snappy-compatible
/// extension with better ratios; no pure-Rust S2 encoder exists on
/// crates.io, so this backs the `S2` kind with `snap`, which reads and
/// writes the snappy frame format S2 is a superset of. A real S2 stream
/// (one actually using its non-snappy extensions) would not decode here.
pub struct S2Codec;

impl Codec for S2Codec {
    fn compress(&self, bytes: &[u8]) -> Vec<u8> {
        let mut encoder = snap::raw::Encoder::new();
        encoder.compress_vec(bytes).expect("snap compression of an in-memory buffer cannot fail")
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, MeboError> {
        let mut decoder = snap::raw::Decoder::new();
        decoder.decompress_vec(bytes).map_err(|e| {
            warn!("s2/snappy decode failed on a {}-byte section: {e}", bytes.len());
            MeboError::MalformedPayload { reason: format!("s2/snappy decode failed: {e}") }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"repeated repeated repeated repeated data".repeat(8);
        let codec = S2Codec;
        let compressed = codec.compress(&data);
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }
}
