//! The whole-section compression contract. Concrete backends (`none`,
//! `zstd`, `s2`, `lz4`) live in the sibling `mebo_codecs` crate so the core
//! never depends on a specific compression library — it only needs
//! something implementing this trait.

use crate::error::MeboError;

/// A general-purpose compressor applied to an entire payload section after
/// the columnar codecs have produced its uncompressed bytes.
pub trait Codec: Send + Sync {
    fn compress(&self, bytes: &[u8]) -> Vec<u8>;
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, MeboError>;
}

/// The identity codec: `compress`/`decompress` both return a copy of the
/// input. Used directly by the core (so `CompressionKind::None` needs no
/// external crate) and as the baseline the other backends are measured
/// against.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneCodec;

impl Codec for NoneCodec {
    fn compress(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, MeboError> {
        Ok(bytes.to_vec())
    }
}
