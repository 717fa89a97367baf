//! Numeric column codecs: `NumericRaw` (fixed-width) and `NumericGorilla`
//! (XOR bit-level compression).

use crate::bitio::{BitReader, BitWriter};
use crate::columnar::ColumnarEncoder;
use crate::endian::Endian;
use crate::pool::PooledBuffer;

/// The raw value column is pool-backed: it's the plain byte-copy codec with
/// no bit-level flushing concerns, so it's the simplest place to route
/// through [`PooledBuffer`] and avoid a fresh allocation per metric.
pub struct NumericRawEncoder {
    buf: PooledBuffer,
    stream_start: usize,
    count: usize,
    endian: Endian,
}

impl NumericRawEncoder {
    pub fn new(endian: Endian) -> Self {
        Self {
            buf: PooledBuffer::acquire(),
            stream_start: 0,
            count: 0,
            endian,
        }
    }
}

impl ColumnarEncoder<f64> for NumericRawEncoder {
    fn write(&mut self, value: f64) {
        let mut bytes = [0u8; 8];
        self.endian.put_f64(&mut bytes, value);
        self.buf.append_bytes(&bytes);
        self.count += 1;
    }

    fn bytes(&self) -> &[u8] {
        self.buf.as_bytes()
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

pub struct NumericRawDecoder;

impl NumericRawDecoder {
    pub fn all(bytes: &[u8], count: usize, endian: Endian) -> NumericRawIter<'_> {
        NumericRawIter { bytes, endian, index: 0, count }
    }

    /// Safe, bounds-checked O(1) access. A zero-copy unsafe variant would be
    /// a straightforward `bytemuck`-style reinterpretation when `bytes` is
    /// 8-byte aligned and little-endian native; the safe path here is always
    /// correct regardless of alignment and is what callers get by default.
    pub fn at(bytes: &[u8], index: usize, count: usize, endian: Endian) -> Option<f64> {
        if index >= count {
            return None;
        }
        let off = index * 8;
        bytes.get(off..off + 8).map(|s| endian.get_f64(s))
    }
}

pub struct NumericRawIter<'a> {
    bytes: &'a [u8],
    endian: Endian,
    index: usize,
    count: usize,
}

impl Iterator for NumericRawIter<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.index >= self.count {
            return None;
        }
        let off = self.index * 8;
        let v = self.bytes.get(off..off + 8)?;
        self.index += 1;
        Some(self.endian.get_f64(v))
    }
}

/// The five fields of Gorilla XOR state, kept together for cache locality,
/// plus the `first_value` flag. `prev_block_size == 0` doubles as "no window
/// established yet" since a real block is always in `[1, 64]`.
#[derive(Debug, Clone, Copy)]
struct GorillaState {
    prev_bits: u64,
    prev_lead: u32,
    prev_trail: u32,
    prev_block_size: u32,
    first_value: bool,
}

impl GorillaState {
    fn new() -> Self {
        Self {
            prev_bits: 0,
            prev_lead: 0,
            prev_trail: 0,
            prev_block_size: 0,
            first_value: true,
        }
    }
}

/// Clamps `lead` to the 5-bit field width, reducing `trail` downward by the
/// same excess so the emitted window still covers every set bit of `x` (the
/// clamp always happens before `block` is derived from it — computing block
/// first and clamping after can yield `block > 64`).
fn clamp_lead_trail(lead: u32, trail: u32) -> (u32, u32) {
    if lead <= 31 {
        return (lead, trail);
    }
    let excess = lead - 31;
    (31, trail.saturating_sub(excess))
}

pub struct NumericGorillaEncoder {
    writer: BitWriter,
    stream_start: usize,
    count: usize,
    state: GorillaState,
}

impl NumericGorillaEncoder {
    pub fn new() -> Self {
        Self {
            writer: BitWriter::new(),
            stream_start: 0,
            count: 0,
            state: GorillaState::new(),
        }
    }
}

impl Default for NumericGorillaEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnarEncoder<f64> for NumericGorillaEncoder {
    fn write(&mut self, value: f64) {
        let bits = value.to_bits();
        if self.state.first_value {
            self.writer.write_64_bits(bits);
            self.state.first_value = false;
        } else {
            let x = bits ^ self.state.prev_bits;
            if x == 0 {
                self.writer.write_bit(false);
            } else {
                self.writer.write_bit(true);
                let lead = x.leading_zeros();
                let trail = x.trailing_zeros();
                let window_reusable = self.state.prev_block_size != 0
                    && lead >= self.state.prev_lead
                    && trail >= self.state.prev_trail;
                if window_reusable {
                    self.writer.write_bit(false);
                    let window = x >> self.state.prev_trail;
                    self.writer.write_bits(window, self.state.prev_block_size as u8);
                } else {
                    self.writer.write_bit(true);
                    let (lead_c, trail_c) = clamp_lead_trail(lead, trail);
                    let block = 64 - lead_c - trail_c;
                    self.writer.write_5_bits(lead_c as u64);
                    self.writer.write_6_bits((block - 1) as u64);
                    let window = x >> trail_c;
                    self.writer.write_bits(window, block as u8);
                    self.state.prev_lead = lead_c;
                    self.state.prev_trail = trail_c;
                    self.state.prev_block_size = block;
                }
            }
        }
        self.state.prev_bits = bits;
        self.count += 1;
    }

    fn bytes(&self) -> &[u8] {
        self.writer.bytes()
    }

    fn len(&self) -> usize {
        self.count
    }

    fn size(&mut self) -> usize {
        self.writer.flush_partial();
        self.writer.flushed_len() - self.stream_start
    }

    fn reset(&mut self) {
        self.writer.flush_partial();
        self.stream_start = self.writer.flushed_len();
        self.count = 0;
        self.state = GorillaState::new();
    }
}

pub struct NumericGorillaDecoder;

impl NumericGorillaDecoder {
    pub fn all(bytes: &[u8], count: usize) -> NumericGorillaIter<'_> {
        NumericGorillaIter {
            reader: BitReader::new(bytes),
            remaining: count,
            state: GorillaState::new(),
        }
    }

    /// Random access requires a sequential decode from the start: Gorilla's
    /// state is a running XOR chain.
    pub fn at(bytes: &[u8], index: usize, count: usize) -> Option<f64> {
        if index >= count {
            return None;
        }
        Self::all(bytes, count).nth(index)
    }

    /// Exact number of bytes the first `count` values occupy, for a decoder
    /// that needs to know where a metric's Gorilla stream ends within a
    /// shared payload buffer.
    pub fn byte_length(bytes: &[u8], count: usize) -> usize {
        let mut iter = Self::all(bytes, count);
        for _ in 0..count {
            if iter.next().is_none() {
                break;
            }
        }
        iter.reader.bits_consumed().div_ceil(8)
    }
}

pub struct NumericGorillaIter<'a> {
    reader: BitReader<'a>,
    remaining: usize,
    state: GorillaState,
}

impl Iterator for NumericGorillaIter<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.remaining == 0 {
            return None;
        }
        let bits = if self.state.first_value {
            let bits = self.reader.read_64_bits()?;
            self.state.first_value = false;
            bits
        } else {
            let changed = self.reader.read_bit()?;
            if !changed {
                self.state.prev_bits
            } else {
                let new_window = self.reader.read_bit()?;
                if !new_window {
                    let window = self.reader.read_bits(self.state.prev_block_size as u8)?;
                    self.state.prev_bits ^ (window << self.state.prev_trail)
                } else {
                    let lead = self.reader.read_5_bits()? as u32;
                    let block = self.reader.read_6_bits()? as u32 + 1;
                    let trail = 64 - lead - block;
                    let window = self.reader.read_bits(block as u8)?;
                    self.state.prev_lead = lead;
                    self.state.prev_trail = trail;
                    self.state.prev_block_size = block;
                    self.state.prev_bits ^ (window << trail)
                }
            }
        };
        self.state.prev_bits = bits;
        self.remaining -= 1;
        Some(f64::from_bits(bits))
    }
}
