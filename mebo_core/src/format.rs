//! On-disk layout constants, the packed `Flag`, and the 32-byte numeric/text
//! headers.

use log::warn;

use crate::endian::Endian;
use crate::error::MeboError;

/// Size of the fixed header, in bytes, for both blob kinds.
pub const HEADER_SIZE: usize = 32;
/// Size of one on-disk index entry, in bytes, for both blob kinds.
pub const INDEX_ENTRY_SIZE: usize = 16;
/// Maximum number of metrics a single blob can hold.
pub const MAX_METRIC_COUNT: u32 = 65_535;
/// Maximum number of points a single metric can hold.
pub const MAX_POINT_COUNT: u32 = 65_535;
/// Hard cap on strings encoded with the `VarString` codec (1-byte length
/// prefix).
pub const VARSTRING_MAX_LEN: usize = 255;

/// Top 12 bits of the options word, for the numeric blob kind.
const MAGIC_NUMERIC: u16 = 0xEA1;
/// Top 12 bits of the options word, for the text blob kind.
const MAGIC_TEXT: u16 = 0xEB1;
const MAGIC_SHIFT: u32 = 4;
const MAGIC_MASK: u16 = 0xFFF0;

/// Full options word (other bits zero) identifying a numeric v1 blob.
pub const MAGIC_NUMERIC_WORD: u16 = MAGIC_NUMERIC << MAGIC_SHIFT;
/// Full options word (other bits zero) identifying a text v1 blob.
pub const MAGIC_TEXT_WORD: u16 = MAGIC_TEXT << MAGIC_SHIFT;

const FLAG_BIT_HAS_TAGS: u16 = 1 << 0;
const FLAG_BIT_ENDIAN: u16 = 1 << 1;
const FLAG_BIT_HAS_METRIC_NAMES: u16 = 1 << 2;
const FLAG_BIT_RESERVED: u16 = 1 << 3;

/// Which of the two blob kinds a header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Numeric,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampEncoding {
    Raw = 1,
    Delta = 2,
}

impl TimestampEncoding {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Raw),
            2 => Some(Self::Delta),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueEncoding {
    Raw = 1,
    Gorilla = 3,
}

impl ValueEncoding {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Raw),
            3 => Some(Self::Gorilla),
            _ => None,
        }
    }
}

/// Whole-section general-purpose compressor applied to a payload section
/// after the columnar codecs have produced its uncompressed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    None = 1,
    Zstd = 2,
    S2 = 3,
    Lz4 = 4,
}

impl CompressionKind {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::None),
            2 => Some(Self::Zstd),
            3 => Some(Self::S2),
            4 => Some(Self::Lz4),
            _ => None,
        }
    }
}

/// The packed 4-byte flag: 2 bytes of options, 1 byte of column encodings,
/// 1 byte of column compression choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flag {
    pub kind: BlobKind,
    pub has_tags: bool,
    pub endian: Endian,
    pub has_metric_names: bool,
    pub timestamp_encoding: TimestampEncoding,
    pub value_encoding: ValueEncoding,
    pub timestamp_compression: CompressionKind,
    pub value_compression: CompressionKind,
}

impl Flag {
    pub fn to_bytes(self) -> [u8; 4] {
        let mut options = 0u16;
        if self.has_tags {
            options |= FLAG_BIT_HAS_TAGS;
        }
        if self.endian.flag_bit() {
            options |= FLAG_BIT_ENDIAN;
        }
        if self.has_metric_names {
            options |= FLAG_BIT_HAS_METRIC_NAMES;
        }
        let magic = match self.kind {
            BlobKind::Numeric => MAGIC_NUMERIC,
            BlobKind::Text => MAGIC_TEXT,
        };
        options |= magic << MAGIC_SHIFT;

        let encoding_byte =
            (self.timestamp_encoding as u8) | ((self.value_encoding as u8) << 4);
        let compression_byte =
            (self.timestamp_compression as u8) | ((self.value_compression as u8) << 4);

        let mut out = [0u8; 4];
        out[0..2].copy_from_slice(&options.to_le_bytes());
        out[2] = encoding_byte;
        out[3] = compression_byte;
        out
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Result<Self, MeboError> {
        // The options word's own byte order is fixed at little-endian,
        // chosen before any engine is selected.
        let options = u16::from_le_bytes([bytes[0], bytes[1]]);
        let encoding_byte = bytes[2];
        let compression_byte = bytes[3];

        if options & FLAG_BIT_RESERVED != 0 {
            warn!("rejecting header: reserved flag bit 3 is set");
            return Err(MeboError::InvalidHeaderFlags {
                reason: "reserved bit 3 is set".to_string(),
            });
        }

        let magic = options & MAGIC_MASK;
        let kind = if magic == MAGIC_NUMERIC_WORD {
            BlobKind::Numeric
        } else if magic == MAGIC_TEXT_WORD {
            BlobKind::Text
        } else {
            warn!("rejecting header: magic 0x{magic:04X} matches neither numeric nor text");
            return Err(MeboError::InvalidMagicNumber {
                found: magic,
                expected: MAGIC_NUMERIC_WORD,
            });
        };

        let timestamp_encoding = TimestampEncoding::from_nibble(encoding_byte & 0x0F)
            .ok_or_else(|| {
                warn!("rejecting header: unknown timestamp encoding nibble {:#x}", encoding_byte & 0x0F);
                MeboError::InvalidHeaderFlags {
                    reason: format!("unknown timestamp encoding nibble {:#x}", encoding_byte & 0x0F),
                }
            })?;
        let value_encoding = ValueEncoding::from_nibble(encoding_byte >> 4).ok_or_else(|| {
            warn!("rejecting header: unknown value encoding nibble {:#x}", encoding_byte >> 4);
            MeboError::InvalidHeaderFlags {
                reason: format!("unknown value encoding nibble {:#x}", encoding_byte >> 4),
            }
        })?;
        let timestamp_compression = CompressionKind::from_nibble(compression_byte & 0x0F)
            .ok_or_else(|| {
                warn!(
                    "rejecting header: unknown timestamp compression nibble {:#x}",
                    compression_byte & 0x0F
                );
                MeboError::InvalidHeaderFlags {
                    reason: format!(
                        "unknown timestamp compression nibble {:#x}",
                        compression_byte & 0x0F
                    ),
                }
            })?;
        let value_compression = CompressionKind::from_nibble(compression_byte >> 4).ok_or_else(
            || {
                warn!(
                    "rejecting header: unknown value compression nibble {:#x}",
                    compression_byte >> 4
                );
                MeboError::InvalidHeaderFlags {
                    reason: format!(
                        "unknown value compression nibble {:#x}",
                        compression_byte >> 4
                    ),
                }
            },
        )?;

        Ok(Flag {
            kind,
            has_tags: options & FLAG_BIT_HAS_TAGS != 0,
            endian: Endian::from_flag_bit(options & FLAG_BIT_ENDIAN != 0),
            has_metric_names: options & FLAG_BIT_HAS_METRIC_NAMES != 0,
            timestamp_encoding,
            value_encoding,
            timestamp_compression,
            value_compression,
        })
    }
}

/// The 32-byte header for a numeric blob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericHeader {
    pub flag: Flag,
    /// Start time in microseconds since epoch, stored bit-exact as `i64`.
    pub start_time_micros: i64,
    pub metric_count: u32,
    pub index_offset: u32,
    pub timestamp_payload_offset: u32,
    pub value_payload_offset: u32,
    pub tag_payload_offset: u32,
}

impl NumericHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.flag.to_bytes());
        let e = self.flag.endian;
        e.put_i64(&mut out[4..12], self.start_time_micros);
        e.put_u32(&mut out[12..16], self.metric_count);
        e.put_u32(&mut out[16..20], self.index_offset);
        e.put_u32(&mut out[20..24], self.timestamp_payload_offset);
        e.put_u32(&mut out[24..28], self.value_payload_offset);
        e.put_u32(&mut out[28..32], self.tag_payload_offset);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MeboError> {
        if bytes.len() < HEADER_SIZE {
            warn!("rejecting numeric header: {} bytes, need at least {HEADER_SIZE}", bytes.len());
            return Err(MeboError::InvalidHeaderSize {
                len: bytes.len(),
                expected: HEADER_SIZE,
            });
        }
        let flag = Flag::from_bytes(bytes[0..4].try_into().unwrap())?;
        if flag.kind != BlobKind::Numeric {
            warn!("rejecting numeric header: flag bytes identify a text blob");
            return Err(MeboError::InvalidMagicNumber {
                found: u16::from_le_bytes([bytes[0], bytes[1]]) & MAGIC_MASK,
                expected: MAGIC_NUMERIC_WORD,
            });
        }
        let e = flag.endian;
        let metric_count = e.get_u32(&bytes[12..16]);
        if metric_count > MAX_METRIC_COUNT {
            warn!("rejecting numeric header: metric_count {metric_count} exceeds max of {MAX_METRIC_COUNT}");
            return Err(MeboError::InvalidMetricCount {
                count: metric_count as u64,
                reason: format!("exceeds max of {MAX_METRIC_COUNT}"),
            });
        }
        Ok(NumericHeader {
            flag,
            start_time_micros: e.get_i64(&bytes[4..12]),
            metric_count,
            index_offset: e.get_u32(&bytes[16..20]),
            timestamp_payload_offset: e.get_u32(&bytes[20..24]),
            value_payload_offset: e.get_u32(&bytes[24..28]),
            tag_payload_offset: e.get_u32(&bytes[28..32]),
        })
    }
}

/// The 32-byte header for a text blob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextHeader {
    pub flag: Flag,
    pub start_time_micros: i64,
    pub metric_count: u32,
    pub index_offset: u32,
    pub data_offset: u32,
    pub data_size: u32,
}

impl TextHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.flag.to_bytes());
        let e = self.flag.endian;
        e.put_i64(&mut out[4..12], self.start_time_micros);
        e.put_u32(&mut out[12..16], self.metric_count);
        e.put_u32(&mut out[16..20], self.index_offset);
        e.put_u32(&mut out[20..24], self.data_offset);
        e.put_u32(&mut out[24..28], self.data_size);
        // out[28..32] reserved, stays zero
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MeboError> {
        if bytes.len() < HEADER_SIZE {
            warn!("rejecting text header: {} bytes, need at least {HEADER_SIZE}", bytes.len());
            return Err(MeboError::InvalidHeaderSize {
                len: bytes.len(),
                expected: HEADER_SIZE,
            });
        }
        let flag = Flag::from_bytes(bytes[0..4].try_into().unwrap())?;
        if flag.kind != BlobKind::Text {
            warn!("rejecting text header: flag bytes identify a numeric blob");
            return Err(MeboError::InvalidMagicNumber {
                found: u16::from_le_bytes([bytes[0], bytes[1]]) & MAGIC_MASK,
                expected: MAGIC_TEXT_WORD,
            });
        }
        let e = flag.endian;
        let metric_count = e.get_u32(&bytes[12..16]);
        if metric_count > MAX_METRIC_COUNT {
            warn!("rejecting text header: metric_count {metric_count} exceeds max of {MAX_METRIC_COUNT}");
            return Err(MeboError::InvalidMetricCount {
                count: metric_count as u64,
                reason: format!("exceeds max of {MAX_METRIC_COUNT}"),
            });
        }
        Ok(TextHeader {
            flag,
            start_time_micros: e.get_i64(&bytes[4..12]),
            metric_count,
            index_offset: e.get_u32(&bytes[16..20]),
            data_offset: e.get_u32(&bytes[20..24]),
            data_size: e.get_u32(&bytes[24..28]),
        })
    }
}

/// Inspects the first 16 bits of `bytes` (always little-endian) and reports
/// whether they identify a numeric v1 blob. Robust to trailing bytes; does
/// not otherwise validate the blob.
pub fn is_numeric_blob(bytes: &[u8]) -> bool {
    first_options_word(bytes).map(|w| w & MAGIC_MASK == MAGIC_NUMERIC_WORD).unwrap_or(false)
}

/// As [`is_numeric_blob`], for the text blob kind.
pub fn is_text_blob(bytes: &[u8]) -> bool {
    first_options_word(bytes).map(|w| w & MAGIC_MASK == MAGIC_TEXT_WORD).unwrap_or(false)
}

fn first_options_word(bytes: &[u8]) -> Option<u16> {
    if bytes.len() < 2 {
        return None;
    }
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Pads `len` up to the next 8-byte boundary, returning the number of zero
/// bytes needed.
pub fn padding_to_8(len: usize) -> usize {
    (8 - (len % 8)) % 8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_flag(kind: BlobKind) -> Flag {
        Flag {
            kind,
            has_tags: true,
            endian: Endian::Little,
            has_metric_names: true,
            timestamp_encoding: TimestampEncoding::Delta,
            value_encoding: ValueEncoding::Gorilla,
            timestamp_compression: CompressionKind::Zstd,
            value_compression: CompressionKind::Lz4,
        }
    }

    #[test]
    fn flag_roundtrip() {
        for kind in [BlobKind::Numeric, BlobKind::Text] {
            let flag = sample_flag(kind);
            let bytes = flag.to_bytes();
            let back = Flag::from_bytes(bytes).unwrap();
            assert_eq!(flag, back);
        }
    }

    #[test]
    fn magic_words_match_spec_constants() {
        assert_eq!(MAGIC_NUMERIC_WORD, 0xEA10);
        assert_eq!(MAGIC_TEXT_WORD, 0xEB10);
    }

    #[test]
    fn reserved_bit_set_is_rejected() {
        let mut bytes = sample_flag(BlobKind::Numeric).to_bytes();
        bytes[0] |= FLAG_BIT_RESERVED as u8;
        assert!(matches!(
            Flag::from_bytes(bytes),
            Err(MeboError::InvalidHeaderFlags { .. })
        ));
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let mut bytes = sample_flag(BlobKind::Numeric).to_bytes();
        bytes[0] = 0x00;
        bytes[1] = 0x00;
        assert!(matches!(
            Flag::from_bytes(bytes),
            Err(MeboError::InvalidMagicNumber { .. })
        ));
    }

    #[test]
    fn numeric_header_roundtrip() {
        let header = NumericHeader {
            flag: sample_flag(BlobKind::Numeric),
            start_time_micros: -1,
            metric_count: 3,
            index_offset: 32,
            timestamp_payload_offset: 100,
            value_payload_offset: 200,
            tag_payload_offset: 300,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let back = NumericHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header, back);
    }

    #[test]
    fn text_header_roundtrip() {
        let header = TextHeader {
            flag: sample_flag(BlobKind::Text),
            start_time_micros: 1_700_000_000_000_000,
            metric_count: 7,
            index_offset: 32,
            data_offset: 400,
            data_size: 1234,
        };
        let bytes = header.to_bytes();
        let back = TextHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header, back);
    }

    #[test]
    fn detection_helpers() {
        let numeric = NumericHeader {
            flag: sample_flag(BlobKind::Numeric),
            start_time_micros: 0,
            metric_count: 0,
            index_offset: 32,
            timestamp_payload_offset: 32,
            value_payload_offset: 32,
            tag_payload_offset: 32,
        }
        .to_bytes();
        let text = TextHeader {
            flag: sample_flag(BlobKind::Text),
            start_time_micros: 0,
            metric_count: 0,
            index_offset: 32,
            data_offset: 32,
            data_size: 0,
        }
        .to_bytes();

        assert!(is_numeric_blob(&numeric));
        assert!(!is_text_blob(&numeric));
        assert!(is_text_blob(&text));
        assert!(!is_numeric_blob(&text));

        // Robust to trailing bytes.
        let mut padded = numeric.to_vec();
        padded.extend_from_slice(&[0xAB; 16]);
        assert!(is_numeric_blob(&padded));
    }

    #[test]
    fn short_input_is_invalid_header_size() {
        assert!(matches!(
            NumericHeader::from_bytes(&[0u8; 10]),
            Err(MeboError::InvalidHeaderSize { .. })
        ));
    }
}
