//! Columnar time-series blob codec.
//!
//! A blob is a header, an index of per-metric byte ranges, and up to three
//! payload sections (timestamps, values, tags) laid out back to back and
//! individually compressible. See [`encoder::BlobEncoder`] and
//! [`decoder::BlobDecoder`] for the two halves of the round trip.

pub mod bitio;
pub mod codec;
pub mod columnar;
pub mod decoder;
pub mod encoder;
pub mod endian;
pub mod error;
pub mod format;
pub mod hash;
pub mod index;
pub mod names;
pub mod pool;
pub mod varint;

pub use codec::{Codec, NoneCodec};
pub use decoder::BlobDecoder;
pub use encoder::BlobEncoder;
pub use endian::Endian;
pub use error::{MeboError, MeboResult};
pub use format::{BlobKind, CompressionKind, TimestampEncoding, ValueEncoding};
pub use hash::default_hash_id;
