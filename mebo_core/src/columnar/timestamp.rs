//! Timestamp column codecs: `TimestampRaw` (fixed-width, O(1) random access)
//! and `TimestampDelta` (delta-of-delta + zig-zag + varint, sequential only).

use crate::columnar::ColumnarEncoder;
use crate::endian::Endian;
use crate::varint::{decode_i64, decode_u64, encode_i64, encode_u64};

/// Fixed 8-byte-per-element encoding in the blob's declared byte order.
pub struct TimestampRawEncoder {
    buf: Vec<u8>,
    stream_start: usize,
    count: usize,
    endian: Endian,
}

impl TimestampRawEncoder {
    pub fn new(endian: Endian) -> Self {
        Self {
            buf: Vec::new(),
            stream_start: 0,
            count: 0,
            endian,
        }
    }
}

impl ColumnarEncoder<i64> for TimestampRawEncoder {
    fn write(&mut self, value: i64) {
        let mut bytes = [0u8; 8];
        self.endian.put_i64(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
        self.count += 1;
    }

    fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn len(&self) -> usize {
        self.count
    }

    fn size(&mut self) -> usize {
        self.buf.len() - self.stream_start
    }

    fn reset(&mut self) {
        self.stream_start = self.buf.len();
        self.count = 0;
    }
}

pub struct TimestampRawDecoder;

impl TimestampRawDecoder {
    pub fn all(bytes: &[u8], count: usize, endian: Endian) -> TimestampRawIter<'_> {
        TimestampRawIter { bytes, endian, index: 0, count }
    }

    /// O(1): each element is a fixed 8-byte slot.
    pub fn at(bytes: &[u8], index: usize, count: usize, endian: Endian) -> Option<i64> {
        if index >= count {
            return None;
        }
        let off = index * 8;
        bytes.get(off..off + 8).map(|s| endian.get_i64(s))
    }
}

pub struct TimestampRawIter<'a> {
    bytes: &'a [u8],
    endian: Endian,
    index: usize,
    count: usize,
}

impl Iterator for TimestampRawIter<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.index >= self.count {
            return None;
        }
        let off = self.index * 8;
        let v = self.bytes.get(off..off + 8)?;
        self.index += 1;
        Some(self.endian.get_i64(v))
    }
}

/// Delta-of-delta + zig-zag + varint, per §4.5: the first value is a raw
/// varint of its bit pattern, the second is a zig-zag varint of its delta
/// from the first, and every later value is a zig-zag varint of the change
/// in delta. `reset` uses a sequence counter rather than a sentinel `prev_ts`
/// of zero, so a legitimate timestamp of 0 can never be confused with "no
/// previous value yet".
pub struct TimestampDeltaEncoder {
    buf: Vec<u8>,
    stream_start: usize,
    count: usize,
    seq: u8,
    prev_ts: i64,
    prev_delta: i64,
}

impl TimestampDeltaEncoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            stream_start: 0,
            count: 0,
            seq: 0,
            prev_ts: 0,
            prev_delta: 0,
        }
    }
}

impl Default for TimestampDeltaEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnarEncoder<i64> for TimestampDeltaEncoder {
    fn write(&mut self, value: i64) {
        match self.seq {
            0 => {
                encode_u64(value as u64, &mut self.buf);
            }
            1 => {
                let delta = value.wrapping_sub(self.prev_ts);
                encode_i64(delta, &mut self.buf);
                self.prev_delta = delta;
            }
            _ => {
                let delta = value.wrapping_sub(self.prev_ts);
                let dod = delta.wrapping_sub(self.prev_delta);
                encode_i64(dod, &mut self.buf);
                self.prev_delta = delta;
            }
        }
        self.prev_ts = value;
        if self.seq < 2 {
            self.seq += 1;
        }
        self.count += 1;
    }

    fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn len(&self) -> usize {
        self.count
    }

    fn size(&mut self) -> usize {
        self.buf.len() - self.stream_start
    }

    fn reset(&mut self) {
        self.stream_start = self.buf.len();
        self.count = 0;
        self.seq = 0;
        self.prev_ts = 0;
        self.prev_delta = 0;
    }
}

pub struct TimestampDeltaDecoder;

impl TimestampDeltaDecoder {
    pub fn all(bytes: &[u8], count: usize) -> TimestampDeltaIter<'_> {
        TimestampDeltaIter {
            bytes,
            pos: 0,
            remaining: count,
            seq: 0,
            prev_ts: 0,
            prev_delta: 0,
        }
    }

    /// Requires a sequential decode from the start: O(index).
    pub fn at(bytes: &[u8], index: usize, count: usize) -> Option<i64> {
        if index >= count {
            return None;
        }
        Self::all(bytes, count).nth(index)
    }
}

pub struct TimestampDeltaIter<'a> {
    bytes: &'a [u8],
    pos: usize,
    remaining: usize,
    seq: u8,
    prev_ts: i64,
    prev_delta: i64,
}

impl Iterator for TimestampDeltaIter<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.remaining == 0 {
            return None;
        }
        let rest = &self.bytes[self.pos..];
        let ts = match self.seq {
            0 => {
                let (bits, n) = decode_u64(rest)?;
                self.pos += n;
                bits as i64
            }
            1 => {
                let (delta, n) = decode_i64(rest)?;
                self.pos += n;
                self.prev_delta = delta;
                self.prev_ts.wrapping_add(delta)
            }
            _ => {
                let (dod, n) = decode_i64(rest)?;
                self.pos += n;
                self.prev_delta = self.prev_delta.wrapping_add(dod);
                self.prev_ts.wrapping_add(self.prev_delta)
            }
        };
        self.prev_ts = ts;
        if self.seq < 2 {
            self.seq += 1;
        }
        self.remaining -= 1;
        Some(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip_and_random_access() {
        let ts = [1_672_531_200_000_000i64, -5, 0, i64::MAX, i64::MIN];
        let mut enc = TimestampRawEncoder::new(Endian::Little);
        enc.write_slice(&ts);
        assert_eq!(enc.len(), ts.len());
        let bytes = enc.bytes().to_vec();
        let decoded: Vec<i64> = TimestampRawDecoder::all(&bytes, ts.len(), Endian::Little).collect();
        assert_eq!(decoded, ts);
        for (i, v) in ts.iter().enumerate() {
            assert_eq!(TimestampRawDecoder::at(&bytes, i, ts.len(), Endian::Little), Some(*v));
        }
    }

    #[test]
    fn delta_roundtrip_s1_single_value() {
        let ts = [1_672_531_200_000_000i64];
        let mut enc = TimestampDeltaEncoder::new();
        enc.write_slice(&ts);
        let bytes = enc.bytes().to_vec();
        let decoded: Vec<i64> = TimestampDeltaDecoder::all(&bytes, 1).collect();
        assert_eq!(decoded, ts);
    }

    #[test]
    fn delta_roundtrip_s2_regular_interval() {
        let ts: Vec<i64> = (0..10).map(|i| 1_700_000_000_000_000 + i * 1_000_000).collect();
        let mut enc = TimestampDeltaEncoder::new();
        enc.write_slice(&ts);
        assert!(enc.size() <= 16, "regular delta stream should compress tightly, got {}", enc.size());
        let bytes = enc.bytes().to_vec();
        let decoded: Vec<i64> = TimestampDeltaDecoder::all(&bytes, ts.len()).collect();
        assert_eq!(decoded, ts);
        for i in [0usize, 5, 9] {
            assert_eq!(TimestampDeltaDecoder::at(&bytes, i, ts.len()), Some(ts[i]));
        }
    }

    #[test]
    fn delta_roundtrip_negative_and_duplicate_and_extremes() {
        let ts = [0i64, -10, -10, i64::MIN, i64::MIN + 1, i64::MAX, 0, -1];
        let mut enc = TimestampDeltaEncoder::new();
        enc.write_slice(&ts);
        let bytes = enc.bytes().to_vec();
        let decoded: Vec<i64> = TimestampDeltaDecoder::all(&bytes, ts.len()).collect();
        assert_eq!(decoded, ts);
    }

    #[test]
    fn reset_starts_next_metric_fresh_in_shared_buffer() {
        let mut enc = TimestampDeltaEncoder::new();
        enc.write_slice(&[100i64, 200, 300]);
        let first_len = enc.size();
        enc.reset();
        enc.write_slice(&[5i64, 5, 5]);
        let second_bytes_start = enc.bytes().len() - enc.size();
        assert_eq!(second_bytes_start, first_len);

        let whole = enc.bytes();
        let second_metric_bytes = &whole[second_bytes_start..];
        let decoded: Vec<i64> = TimestampDeltaDecoder::all(second_metric_bytes, 3).collect();
        assert_eq!(decoded, vec![5, 5, 5]);
    }

    #[test]
    fn truncated_delta_stream_ends_iteration_early() {
        let mut enc = TimestampDeltaEncoder::new();
        enc.write_slice(&[1i64, 2, 3, 4]);
        let bytes = enc.bytes().to_vec();
        let truncated = &bytes[..bytes.len() - 1];
        let decoded: Vec<i64> = TimestampDeltaDecoder::all(truncated, 4).collect();
        assert!(decoded.len() < 4);
    }
}
