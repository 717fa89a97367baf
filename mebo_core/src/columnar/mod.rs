//! Per-column encoders/decoders: one pair per `{timestamp, value, text}` ×
//! `{raw, compact}` combination, all sharing the same encoder contract.
//!
//! Decoders are deliberately *not* behind a shared trait: each yields a
//! different concrete iterator type, and giving every decoder the same two
//! free functions (`all`, `at`) gets the shared vocabulary from §4.4 without
//! paying for a boxed trait object on every decode.

pub mod numeric;
pub mod text;
pub mod timestamp;

pub use numeric::{NumericGorillaDecoder, NumericGorillaEncoder, NumericRawDecoder, NumericRawEncoder};
pub use text::{TagDecoder, TagEncoder, VarStringDecoder, VarStringEncoder};
pub use timestamp::{TimestampDeltaDecoder, TimestampDeltaEncoder, TimestampRawDecoder, TimestampRawEncoder};

/// Shared write-side contract for a column codec over element type `T`.
///
/// `reset` clears only the per-stream decode/encode state (e.g. Gorilla's
/// `prev_bits`, delta's `prev_ts`) while leaving bytes already pushed to the
/// shared buffer untouched, so one buffer can carry several metrics'
/// back-to-back streams. `finish` is the terminal call: further writes after
/// it are a programmer error.
pub trait ColumnarEncoder<T> {
    fn write(&mut self, value: T);

    fn write_slice(&mut self, values: &[T])
    where
        T: Copy,
    {
        for &v in values {
            self.write(v);
        }
    }

    /// Bytes produced since the encoder was created or last `reset`, valid
    /// until the next mutating call.
    fn bytes(&self) -> &[u8];

    /// Number of elements written since creation or last `reset`.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bytes this stream occupies since creation or last `reset`.
    /// Takes `&mut self`: bit-level codecs must byte-align a pending partial
    /// register before the length is meaningful.
    fn size(&mut self) -> usize;

    /// Clears per-stream state so the next metric's encoding starts fresh,
    /// without discarding bytes already written to the shared buffer.
    fn reset(&mut self);

    /// Flushes any pending bit-level state and returns everything written
    /// since creation as an owned buffer. The terminal call: no further
    /// `write`/`write_slice` on this encoder is meaningful afterward.
    /// [`BlobEncoder::finish`](crate::encoder::BlobEncoder::finish) calls
    /// this exactly once per column, after the last metric's `end_metric`.
    fn finish(&mut self) -> Vec<u8> {
        self.size();
        self.bytes().to_vec()
    }
}
