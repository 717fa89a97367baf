//! Text column codecs: `Tag` (varint-length-prefixed, unbounded) and
//! `VarString` (1-byte-length-prefixed, 255-byte cap).
//!
//! Both take `&str` rather than an owned `Copy` element, so they expose the
//! same write/bytes/len/size/reset vocabulary as [`super::ColumnarEncoder`]
//! through inherent methods instead of the trait itself — a generic trait
//! impl over a borrowed, lifetime-carrying element type buys nothing here.

use crate::error::MeboError;
use crate::varint::{decode_u64, encode_u64};
use crate::format::VARSTRING_MAX_LEN;

/// Per tag: unsigned varint `len`, then `len` UTF-8 bytes. An empty tag is
/// one byte (`0x00`).
pub struct TagEncoder {
    buf: Vec<u8>,
    stream_start: usize,
    count: usize,
}

impl TagEncoder {
    pub fn new() -> Self {
        Self { buf: Vec::new(), stream_start: 0, count: 0 }
    }

    pub fn write(&mut self, tag: &str) {
        encode_u64(tag.len() as u64, &mut self.buf);
        self.buf.extend_from_slice(tag.as_bytes());
        self.count += 1;
    }

    pub fn write_slice(&mut self, tags: &[&str]) {
        for t in tags {
            self.write(t);
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn size(&self) -> usize {
        self.buf.len() - self.stream_start
    }

    pub fn reset(&mut self) {
        self.stream_start = self.buf.len();
        self.count = 0;
    }

    /// Terminal call: returns everything written since creation as an owned
    /// buffer. No further `write`/`write_slice` call is meaningful afterward.
    pub fn finish(&mut self) -> Vec<u8> {
        self.bytes().to_vec()
    }
}

impl Default for TagEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes one `(len varint ‖ utf8 bytes)` record at `offset`. Returns the
/// decoded string and the total bytes consumed, or `None` on truncation or
/// invalid UTF-8.
fn decode_tag_at(bytes: &[u8], offset: usize) -> Option<(&str, usize)> {
    let rest = bytes.get(offset..)?;
    let (len, n) = decode_u64(rest)?;
    let start = offset + n;
    let end = start.checked_add(len as usize)?;
    let payload = bytes.get(start..end)?;
    let s = std::str::from_utf8(payload).ok()?;
    Some((s, end - offset))
}

pub struct TagDecoder;

impl TagDecoder {
    pub fn all(bytes: &[u8], count: usize) -> TagIter<'_> {
        TagIter { bytes, pos: 0, remaining: count }
    }

    /// Requires scanning from the start.
    pub fn at(bytes: &[u8], index: usize, count: usize) -> Option<&str> {
        if index >= count {
            return None;
        }
        Self::all(bytes, count).nth(index)
    }
}

pub struct TagIter<'a> {
    bytes: &'a [u8],
    pos: usize,
    remaining: usize,
}

impl<'a> Iterator for TagIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.remaining == 0 {
            return None;
        }
        let (s, consumed) = decode_tag_at(self.bytes, self.pos)?;
        self.pos += consumed;
        self.remaining -= 1;
        Some(s)
    }
}

/// 1-byte `len:u8` then `len` UTF-8 bytes. Used for the metric-names payload
/// entries and anywhere a hard 255-byte cap is appropriate.
pub struct VarStringEncoder {
    buf: Vec<u8>,
    stream_start: usize,
    count: usize,
}

impl VarStringEncoder {
    pub fn new() -> Self {
        Self { buf: Vec::new(), stream_start: 0, count: 0 }
    }

    /// Fails without mutating state if `s` exceeds 255 bytes: the counter is
    /// not incremented and no partial bytes are appended.
    pub fn write(&mut self, s: &str) -> Result<(), MeboError> {
        if s.len() > VARSTRING_MAX_LEN {
            return Err(MeboError::TextTooLong { len: s.len(), max: VARSTRING_MAX_LEN });
        }
        self.buf.push(s.len() as u8);
        self.buf.extend_from_slice(s.as_bytes());
        self.count += 1;
        Ok(())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn size(&self) -> usize {
        self.buf.len() - self.stream_start
    }

    pub fn reset(&mut self) {
        self.stream_start = self.buf.len();
        self.count = 0;
    }

    /// Terminal call: returns everything written since creation as an owned
    /// buffer. No further `write` call is meaningful afterward.
    pub fn finish(&mut self) -> Vec<u8> {
        self.bytes().to_vec()
    }
}

impl Default for VarStringEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_varstring_at(bytes: &[u8], offset: usize) -> Option<(&str, usize)> {
    let &len = bytes.get(offset)?;
    let start = offset + 1;
    let end = start + len as usize;
    let payload = bytes.get(start..end)?;
    let s = std::str::from_utf8(payload).ok()?;
    Some((s, 1 + len as usize))
}

pub struct VarStringDecoder;

impl VarStringDecoder {
    pub fn all(bytes: &[u8], count: usize) -> VarStringIter<'_> {
        VarStringIter { bytes, pos: 0, remaining: count }
    }

    pub fn at(bytes: &[u8], index: usize, count: usize) -> Option<&str> {
        if index >= count {
            return None;
        }
        Self::all(bytes, count).nth(index)
    }
}

pub struct VarStringIter<'a> {
    bytes: &'a [u8],
    pos: usize,
    remaining: usize,
}

impl<'a> Iterator for VarStringIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.remaining == 0 {
            return None;
        }
        let (s, consumed) = decode_varstring_at(self.bytes, self.pos)?;
        self.pos += consumed;
        self.remaining -= 1;
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_s5_roundtrip_with_empties() {
        let tags = ["", "host=a", "", "host=b"];
        let mut enc = TagEncoder::new();
        enc.write_slice(&tags);
        assert_eq!(enc.size(), 1 + 7 + 1 + 7);
        let bytes = enc.bytes().to_vec();
        let decoded: Vec<&str> = TagDecoder::all(&bytes, tags.len()).collect();
        assert_eq!(decoded, tags);
        assert_eq!(TagDecoder::at(&bytes, 2, tags.len()), Some(""));
        assert_eq!(TagDecoder::at(&bytes, 3, tags.len()), Some("host=b"));
    }

    #[test]
    fn tag_reset_starts_next_metric_fresh() {
        let mut enc = TagEncoder::new();
        enc.write_slice(&["a", "bb"]);
        let first_len = enc.size();
        enc.reset();
        enc.write_slice(&["ccc"]);
        let whole = enc.bytes();
        let second = &whole[first_len..];
        let decoded: Vec<&str> = TagDecoder::all(second, 1).collect();
        assert_eq!(decoded, vec!["ccc"]);
    }

    #[test]
    fn varstring_roundtrip() {
        let names = ["cpu.usage", "mem.free", ""];
        let mut enc = VarStringEncoder::new();
        for n in names {
            enc.write(n).unwrap();
        }
        let bytes = enc.bytes().to_vec();
        let decoded: Vec<&str> = VarStringDecoder::all(&bytes, names.len()).collect();
        assert_eq!(decoded, names);
    }

    #[test]
    fn varstring_rejects_oversized_without_partial_write() {
        let long = "x".repeat(256);
        let mut enc = VarStringEncoder::new();
        let before = enc.bytes().len();
        let err = enc.write(&long).unwrap_err();
        assert!(matches!(err, MeboError::TextTooLong { len: 256, max: 255 }));
        assert_eq!(enc.bytes().len(), before);
        assert_eq!(enc.len(), 0);
    }

    #[test]
    fn varstring_255_bytes_is_accepted() {
        let s = "y".repeat(255);
        let mut enc = VarStringEncoder::new();
        assert!(enc.write(&s).is_ok());
    }

    #[test]
    fn truncated_tag_stream_ends_early() {
        let mut enc = TagEncoder::new();
        enc.write_slice(&["host=a", "host=b", "host=c"]);
        let bytes = enc.bytes().to_vec();
        let truncated = &bytes[..bytes.len() - 1];
        let decoded: Vec<&str> = TagDecoder::all(truncated, 3).collect();
        assert!(decoded.len() < 3);
    }
}
