//! Whole-section compression backends for mebo blob payloads, plus a
//! dispatcher from [`mebo_core::CompressionKind`] to a boxed [`Codec`].
//!
//! `mebo_core` only knows the `Codec` trait; it never links against zstd,
//! lz4, or snap directly. Anything that needs to open a compressed blob
//! (the CLI, this crate's own tests, a future server) depends on this crate
//! and calls [`codec_for`].

mod lz4_codec;
mod s2_codec;
mod zstd_codec;

pub use lz4_codec::Lz4Codec;
pub use s2_codec::S2Codec;
pub use zstd_codec::ZstdCodec;

use mebo_core::codec::{Codec, NoneCodec};
use mebo_core::format::CompressionKind;

/// Resolves a [`Codec`] for a header's declared [`CompressionKind`], at the
/// crate's default settings (zstd level 3).
pub fn codec_for(kind: CompressionKind) -> Box<dyn Codec> {
    match kind {
        CompressionKind::None => Box::new(NoneCodec),
        CompressionKind::Zstd => Box::new(ZstdCodec::default()),
        CompressionKind::S2 => Box::new(S2Codec),
        CompressionKind::Lz4 => Box::new(Lz4Codec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_for_roundtrips_every_kind() {
        let data = b"columnar timestamp bytes go here, repeated for compressibility ".repeat(4);
        for kind in [CompressionKind::None, CompressionKind::Zstd, CompressionKind::S2, CompressionKind::Lz4] {
            let codec = codec_for(kind);
            let compressed = codec.compress(&data);
            let decompressed = codec.decompress(&compressed).unwrap();
            assert_eq!(decompressed, data, "roundtrip failed for {kind:?}");
        }
    }
}
