//! Parses a blob's header and index, decompresses its payload sections, and
//! offers random and sequential per-metric access.

use std::collections::HashMap;

use log::warn;

use crate::codec::{Codec, NoneCodec};
use crate::columnar::numeric::{NumericGorillaIter, NumericRawIter};
use crate::columnar::text::TagIter;
use crate::columnar::timestamp::{TimestampDeltaIter, TimestampRawIter};
use crate::columnar::{NumericGorillaDecoder, NumericRawDecoder, TagDecoder, TimestampDeltaDecoder, TimestampRawDecoder};
use crate::endian::Endian;
use crate::error::{MeboError, MeboResult};
use crate::format::{CompressionKind, NumericHeader, TimestampEncoding, ValueEncoding, HEADER_SIZE};
use crate::index::{decode_numeric_index, NumericIndexEntry};
use crate::names::{decode_names, verify_hashes};

enum TimestampIter<'a> {
    Raw(TimestampRawIter<'a>),
    Delta(TimestampDeltaIter<'a>),
}

impl Iterator for TimestampIter<'_> {
    type Item = i64;
    fn next(&mut self) -> Option<i64> {
        match self {
            TimestampIter::Raw(it) => it.next(),
            TimestampIter::Delta(it) => it.next(),
        }
    }
}

enum ValueIter<'a> {
    Raw(NumericRawIter<'a>),
    Gorilla(NumericGorillaIter<'a>),
}

impl Iterator for ValueIter<'_> {
    type Item = f64;
    fn next(&mut self) -> Option<f64> {
        match self {
            ValueIter::Raw(it) => it.next(),
            ValueIter::Gorilla(it) => it.next(),
        }
    }
}

/// Lazy `(timestamp, value, tag?)` sequence for one metric, yielded in call
/// order. Ends early (yields fewer than `count` elements) if the backing
/// bytes are truncated, rather than panicking.
pub struct MetricIter<'a> {
    ts: TimestampIter<'a>,
    val: ValueIter<'a>,
    tags: Option<TagIter<'a>>,
}

impl Iterator for MetricIter<'_> {
    type Item = (i64, f64, Option<String>);

    fn next(&mut self) -> Option<Self::Item> {
        let ts = self.ts.next()?;
        let val = self.val.next()?;
        let tag = self.tags.as_mut().and_then(|t| t.next()).map(|s| s.to_string());
        Some((ts, val, tag))
    }
}

/// Immutable, thread-safe-to-share handle over a parsed numeric blob.
pub struct BlobDecoder {
    header: NumericHeader,
    entries: Vec<NumericIndexEntry>,
    id_to_slot: HashMap<u64, usize>,
    names: Option<Vec<String>>,
    timestamp_bytes: Vec<u8>,
    value_bytes: Vec<u8>,
    tag_bytes: Vec<u8>,
}

impl BlobDecoder {
    /// Opens a blob whose timestamp and value sections are both uncompressed
    /// (`CompressionKind::None`). For a blob using zstd/s2/lz4, use
    /// [`Self::open_with_codecs`] with matching codec instances.
    pub fn open(bytes: &[u8], hash_fn: impl Fn(&str) -> u64) -> MeboResult<Self> {
        let preview: [u8; 4] = bytes
            .get(0..4)
            .ok_or(MeboError::InvalidHeaderSize { len: bytes.len(), expected: HEADER_SIZE })?
            .try_into()
            .unwrap();
        let flag = crate::format::Flag::from_bytes(preview)?;
        if flag.timestamp_compression != CompressionKind::None || flag.value_compression != CompressionKind::None {
            warn!("rejecting open(): blob declares section compression, needs open_with_codecs");
            return Err(MeboError::MalformedPayload {
                reason: "blob uses section compression; call BlobDecoder::open_with_codecs with matching codecs"
                    .to_string(),
            });
        }
        Self::open_with_codecs(bytes, hash_fn, |_| Box::new(NoneCodec))
    }

    /// General entry point: `codec_for` resolves a [`Codec`] for whichever
    /// [`CompressionKind`] the header declares for each section.
    pub fn open_with_codecs(
        bytes: &[u8],
        hash_fn: impl Fn(&str) -> u64,
        codec_for: impl Fn(CompressionKind) -> Box<dyn Codec>,
    ) -> MeboResult<Self> {
        let header = NumericHeader::from_bytes(bytes)?;
        let endian = header.flag.endian;
        let metric_count = header.metric_count as usize;

        let names = if header.flag.has_metric_names {
            let (names, consumed) = decode_names(&bytes[HEADER_SIZE..], endian)?;
            if names.len() != metric_count {
                warn!(
                    "rejecting blob: names payload has {} entries, header declares {metric_count}",
                    names.len()
                );
                return Err(MeboError::InvalidMetricNamesPayload {
                    reason: format!("names payload has {} entries, header declares {metric_count}", names.len()),
                });
            }
            let expected_index_offset = HEADER_SIZE + consumed;
            if header.index_offset as usize != expected_index_offset {
                warn!(
                    "rejecting blob: index_offset {} does not match header size + names payload ({expected_index_offset})",
                    header.index_offset
                );
                return Err(MeboError::InvalidHeaderFlags {
                    reason: format!(
                        "index_offset {} does not match header size + names payload ({expected_index_offset})",
                        header.index_offset
                    ),
                });
            }
            Some(names)
        } else {
            if header.index_offset as usize != HEADER_SIZE {
                warn!(
                    "rejecting blob: index_offset {} does not match header size {HEADER_SIZE}",
                    header.index_offset
                );
                return Err(MeboError::InvalidHeaderFlags {
                    reason: format!("index_offset {} does not match header size {HEADER_SIZE}", header.index_offset),
                });
            }
            None
        };

        let index_start = header.index_offset as usize;
        let index_len = metric_count * crate::format::INDEX_ENTRY_SIZE;
        let index_bytes = bytes.get(index_start..index_start + index_len).ok_or_else(|| {
            warn!(
                "rejecting blob: index section needs {index_len} bytes at offset {index_start}, blob has {}",
                bytes.len()
            );
            MeboError::InvalidIndexEntrySize { expected: index_len, found: bytes.len().saturating_sub(index_start) }
        })?;
        let entries = decode_numeric_index(index_bytes, metric_count, endian)?;

        if let Some(names) = &names {
            let ids: Vec<u64> = entries.iter().map(|e| e.metric_id).collect();
            verify_hashes(names, &ids, &hash_fn)?;
        }

        let ts_start = header.timestamp_payload_offset as usize;
        let val_start = header.value_payload_offset as usize;
        let tag_start = header.tag_payload_offset as usize;
        let val_end = if header.flag.has_tags { tag_start } else { bytes.len() };

        let ts_section = bytes.get(ts_start..val_start).ok_or_else(|| {
            warn!("rejecting blob: timestamp payload offset {ts_start}..{val_start} out of range");
            MeboError::MalformedPayload { reason: "timestamp payload offset out of range".to_string() }
        })?;
        let val_section = bytes.get(val_start..val_end).ok_or_else(|| {
            warn!("rejecting blob: value payload offset {val_start}..{val_end} out of range");
            MeboError::MalformedPayload { reason: "value payload offset out of range".to_string() }
        })?;

        let timestamp_bytes = codec_for(header.flag.timestamp_compression).decompress(ts_section)?;
        let value_bytes = codec_for(header.flag.value_compression).decompress(val_section)?;
        let tag_bytes = if header.flag.has_tags {
            bytes
                .get(tag_start..)
                .ok_or_else(|| {
                    warn!("rejecting blob: tag payload offset {tag_start} out of range");
                    MeboError::MalformedPayload { reason: "tag payload offset out of range".to_string() }
                })?
                .to_vec()
        } else {
            Vec::new()
        };

        let id_to_slot = entries.iter().enumerate().map(|(i, e)| (e.metric_id, i)).collect();

        log::debug!("opened blob: {metric_count} metrics, start_time={}", header.start_time_micros);
        Ok(Self { header, entries, id_to_slot, names, timestamp_bytes, value_bytes, tag_bytes })
    }

    pub fn metric_count(&self) -> usize {
        self.entries.len()
    }

    pub fn start_time(&self) -> i64 {
        self.header.start_time_micros
    }

    pub fn has_tags(&self) -> bool {
        self.header.flag.has_tags
    }

    pub fn has_metric_names(&self) -> bool {
        self.names.is_some()
    }

    pub fn endian(&self) -> Endian {
        self.header.flag.endian
    }

    pub fn timestamp_encoding(&self) -> TimestampEncoding {
        self.header.flag.timestamp_encoding
    }

    pub fn value_encoding(&self) -> ValueEncoding {
        self.header.flag.value_encoding
    }

    pub fn metric_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|e| e.metric_id)
    }

    fn entry(&self, metric_id: u64) -> Option<&NumericIndexEntry> {
        self.id_to_slot.get(&metric_id).map(|&i| &self.entries[i])
    }

    pub fn count(&self, metric_id: u64) -> Option<usize> {
        self.entry(metric_id).map(|e| e.count)
    }

    pub fn timestamp_at(&self, metric_id: u64, index: usize) -> Option<i64> {
        let e = self.entry(metric_id)?;
        let bytes = &self.timestamp_bytes[e.timestamp_offset..];
        match self.header.flag.timestamp_encoding {
            TimestampEncoding::Raw => TimestampRawDecoder::at(bytes, index, e.count, self.endian()),
            TimestampEncoding::Delta => TimestampDeltaDecoder::at(bytes, index, e.count),
        }
    }

    pub fn value_at(&self, metric_id: u64, index: usize) -> Option<f64> {
        let e = self.entry(metric_id)?;
        let bytes = &self.value_bytes[e.value_offset..];
        match self.header.flag.value_encoding {
            ValueEncoding::Raw => NumericRawDecoder::at(bytes, index, e.count, self.endian()),
            ValueEncoding::Gorilla => NumericGorillaDecoder::at(bytes, index, e.count),
        }
    }

    pub fn tag_at(&self, metric_id: u64, index: usize) -> Option<String> {
        if !self.has_tags() {
            return None;
        }
        let e = self.entry(metric_id)?;
        let bytes = &self.tag_bytes[e.tag_offset..];
        TagDecoder::at(bytes, index, e.count).map(|s| s.to_string())
    }

    pub fn all(&self, metric_id: u64) -> Option<MetricIter<'_>> {
        let e = *self.entry(metric_id)?;
        let ts_bytes = &self.timestamp_bytes[e.timestamp_offset..];
        let ts = match self.header.flag.timestamp_encoding {
            TimestampEncoding::Raw => TimestampIter::Raw(TimestampRawDecoder::all(ts_bytes, e.count, self.endian())),
            TimestampEncoding::Delta => TimestampIter::Delta(TimestampDeltaDecoder::all(ts_bytes, e.count)),
        };
        let val_bytes = &self.value_bytes[e.value_offset..];
        let val = match self.header.flag.value_encoding {
            ValueEncoding::Raw => ValueIter::Raw(NumericRawDecoder::all(val_bytes, e.count, self.endian())),
            ValueEncoding::Gorilla => ValueIter::Gorilla(NumericGorillaDecoder::all(val_bytes, e.count)),
        };
        let tags = if self.has_tags() {
            Some(TagDecoder::all(&self.tag_bytes[e.tag_offset..], e.count))
        } else {
            None
        };
        Some(MetricIter { ts, val, tags })
    }

    pub fn all_timestamps(&self, metric_id: u64) -> Option<impl Iterator<Item = i64> + '_> {
        self.all(metric_id).map(|it| it.map(|(ts, _, _)| ts))
    }

    pub fn all_values(&self, metric_id: u64) -> Option<impl Iterator<Item = f64> + '_> {
        self.all(metric_id).map(|it| it.map(|(_, v, _)| v))
    }

    pub fn all_tags(&self, metric_id: u64) -> Option<impl Iterator<Item = Option<String>> + '_> {
        self.all(metric_id).map(|it| it.map(|(_, _, t)| t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{BlobEncoder, ColumnCodecs, EncoderOptions};
    use crate::hash::default_hash_id;

    fn codecs() -> ColumnCodecs {
        ColumnCodecs { timestamp: Box::new(NoneCodec), value: Box::new(NoneCodec) }
    }

    #[test]
    fn random_access_equals_iteration() {
        let mut enc = BlobEncoder::new(0, EncoderOptions::default(), codecs());
        enc.start_metric("m", 6).unwrap();
        let ts: Vec<i64> = (0..6).map(|i| i * 1000).collect();
        let vals: Vec<f64> = (0..6).map(|i| i as f64 * 1.5).collect();
        enc.add_points(&ts, &vals, None).unwrap();
        enc.end_metric().unwrap();
        let bytes = enc.finish().unwrap();

        let decoder = BlobDecoder::open(&bytes, default_hash_id).unwrap();
        let id = default_hash_id("m");
        let all: Vec<_> = decoder.all(id).unwrap().collect();
        for i in 0..6 {
            assert_eq!(decoder.timestamp_at(id, i), Some(all[i].0));
            assert_eq!(decoder.value_at(id, i), Some(all[i].1));
        }
    }

    #[test]
    fn unknown_metric_id_is_none() {
        let mut enc = BlobEncoder::new(0, EncoderOptions::default(), codecs());
        enc.start_metric("m", 1).unwrap();
        enc.add_points(&[0], &[0.0], None).unwrap();
        enc.end_metric().unwrap();
        let bytes = enc.finish().unwrap();

        let decoder = BlobDecoder::open(&bytes, default_hash_id).unwrap();
        assert_eq!(decoder.count(999), None);
        assert_eq!(decoder.timestamp_at(999, 0), None);
        assert!(decoder.all(999).is_none());
    }

    #[test]
    fn magic_detection_is_robust_to_trailing_bytes() {
        let mut enc = BlobEncoder::new(0, EncoderOptions::default(), codecs());
        enc.start_metric("m", 1).unwrap();
        enc.add_points(&[0], &[0.0], None).unwrap();
        enc.end_metric().unwrap();
        let mut bytes = enc.finish().unwrap();
        assert!(crate::format::is_numeric_blob(&bytes));
        assert!(!crate::format::is_text_blob(&bytes));
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        assert!(crate::format::is_numeric_blob(&bytes));
    }

    #[test]
    fn tag_round_trip_through_decoder() {
        let options = EncoderOptions { has_tags: true, ..Default::default() };
        let mut enc = BlobEncoder::new(0, options, codecs());
        enc.start_metric("m", 2).unwrap();
        enc.add_points(&[0, 1], &[1.0, 2.0], Some(&["host=a", "host=b"])).unwrap();
        enc.end_metric().unwrap();
        let bytes = enc.finish().unwrap();

        let decoder = BlobDecoder::open(&bytes, default_hash_id).unwrap();
        let id = default_hash_id("m");
        assert_eq!(decoder.tag_at(id, 0), Some("host=a".to_string()));
        assert_eq!(decoder.tag_at(id, 1), Some("host=b".to_string()));
        let tags: Vec<_> = decoder.all_tags(id).unwrap().collect();
        assert_eq!(tags, vec![Some("host=a".to_string()), Some("host=b".to_string())]);
    }

    #[test]
    fn compressed_blob_rejects_plain_open() {
        use crate::format::CompressionKind;
        let options = EncoderOptions { value_compression: CompressionKind::Zstd, ..Default::default() };
        // Encoding with NoneCodec but declaring Zstd in the header is an
        // inconsistent test fixture deliberately, solely to exercise
        // open()'s guard against compressed sections.
        let mut enc = BlobEncoder::new(0, options, codecs());
        enc.start_metric("m", 1).unwrap();
        enc.add_points(&[0], &[0.0], None).unwrap();
        enc.end_metric().unwrap();
        let bytes = enc.finish().unwrap();
        assert!(matches!(BlobDecoder::open(&bytes, default_hash_id), Err(MeboError::MalformedPayload { .. })));
    }
}
