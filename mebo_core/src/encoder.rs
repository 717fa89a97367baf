//! Orchestrates per-metric column encoding into a single blob: tracks
//! offsets, enforces the `Idle -> InMetric -> Idle -> ... -> Finished`
//! lifecycle, and assembles the final byte layout on `finish`.

use std::collections::HashSet;

use log::warn;

use crate::codec::Codec;
use crate::columnar::{
    ColumnarEncoder, NumericGorillaEncoder, NumericRawEncoder, TagEncoder,
    TimestampDeltaEncoder, TimestampRawEncoder,
};
use crate::endian::Endian;
use crate::error::{MeboError, MeboResult};
use crate::format::{
    padding_to_8, BlobKind, CompressionKind, Flag, NumericHeader, TimestampEncoding, ValueEncoding,
    HEADER_SIZE, MAX_METRIC_COUNT, MAX_POINT_COUNT,
};
use crate::hash::default_hash_id;
use crate::index::{encode_numeric_index, NumericIndexEntry};
use crate::names::encode_names;
use crate::pool;

/// Construction-time choices for a numeric blob. `tag_compression` is part
/// of the documented operation surface but is not currently representable
/// in the 32-byte numeric header (only timestamp/value compression have a
/// nibble in the flag's compression byte); `BlobEncoder` accepts it and
/// always writes the tag section uncompressed rather than silently
/// inventing a header field or guessing an undocumented encoding.
#[derive(Debug, Clone, Copy)]
pub struct EncoderOptions {
    pub timestamp_encoding: TimestampEncoding,
    pub value_encoding: ValueEncoding,
    pub timestamp_compression: CompressionKind,
    pub value_compression: CompressionKind,
    pub tag_compression: CompressionKind,
    pub endian: Endian,
    pub has_tags: bool,
    pub emit_metric_names: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            timestamp_encoding: TimestampEncoding::Delta,
            value_encoding: ValueEncoding::Gorilla,
            timestamp_compression: CompressionKind::None,
            value_compression: CompressionKind::None,
            tag_compression: CompressionKind::None,
            endian: Endian::Little,
            has_tags: false,
            emit_metric_names: false,
        }
    }
}

/// Whole-section compressors for the two sections whose choice the header
/// actually records. Pass [`crate::codec::NoneCodec`] for a `None` kind;
/// `BlobEncoder` does not itself verify the codec matches the declared
/// `CompressionKind` — that pairing is the caller's responsibility, the same
/// way `mebo_codecs::codec_for` hands one out.
pub struct ColumnCodecs {
    pub timestamp: Box<dyn Codec>,
    pub value: Box<dyn Codec>,
}

enum TimestampColumn {
    Raw(TimestampRawEncoder),
    Delta(TimestampDeltaEncoder),
}

impl TimestampColumn {
    fn new(encoding: TimestampEncoding, endian: Endian) -> Self {
        match encoding {
            TimestampEncoding::Raw => TimestampColumn::Raw(TimestampRawEncoder::new(endian)),
            TimestampEncoding::Delta => TimestampColumn::Delta(TimestampDeltaEncoder::new()),
        }
    }

    fn write_slice(&mut self, values: &[i64]) {
        match self {
            TimestampColumn::Raw(e) => e.write_slice(values),
            TimestampColumn::Delta(e) => e.write_slice(values),
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            TimestampColumn::Raw(e) => e.bytes(),
            TimestampColumn::Delta(e) => e.bytes(),
        }
    }

    fn size(&mut self) -> usize {
        match self {
            TimestampColumn::Raw(e) => e.size(),
            TimestampColumn::Delta(e) => e.size(),
        }
    }

    fn reset(&mut self) {
        match self {
            TimestampColumn::Raw(e) => e.reset(),
            TimestampColumn::Delta(e) => e.reset(),
        }
    }

    fn finish(&mut self) -> Vec<u8> {
        match self {
            TimestampColumn::Raw(e) => e.finish(),
            TimestampColumn::Delta(e) => e.finish(),
        }
    }
}

enum ValueColumn {
    Raw(NumericRawEncoder),
    Gorilla(NumericGorillaEncoder),
}

impl ValueColumn {
    fn new(encoding: ValueEncoding, endian: Endian) -> Self {
        match encoding {
            ValueEncoding::Raw => ValueColumn::Raw(NumericRawEncoder::new(endian)),
            ValueEncoding::Gorilla => ValueColumn::Gorilla(NumericGorillaEncoder::new()),
        }
    }

    fn write_slice(&mut self, values: &[f64]) {
        match self {
            ValueColumn::Raw(e) => e.write_slice(values),
            ValueColumn::Gorilla(e) => e.write_slice(values),
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            ValueColumn::Raw(e) => e.bytes(),
            ValueColumn::Gorilla(e) => e.bytes(),
        }
    }

    fn size(&mut self) -> usize {
        match self {
            ValueColumn::Raw(e) => e.size(),
            ValueColumn::Gorilla(e) => e.size(),
        }
    }

    fn reset(&mut self) {
        match self {
            ValueColumn::Raw(e) => e.reset(),
            ValueColumn::Gorilla(e) => e.reset(),
        }
    }

    fn finish(&mut self) -> Vec<u8> {
        match self {
            ValueColumn::Raw(e) => e.finish(),
            ValueColumn::Gorilla(e) => e.finish(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    Idle,
    InMetric,
}

struct PendingMetric {
    metric_id: u64,
    name: Option<String>,
    declared_count: usize,
    supplied_count: usize,
    timestamp_offset: usize,
    value_offset: usize,
    tag_offset: usize,
}

pub struct BlobEncoder {
    options: EncoderOptions,
    codecs: ColumnCodecs,
    start_time: i64,
    state: State,
    seen_ids: HashSet<u64>,
    entries: Vec<NumericIndexEntry>,
    names: Vec<String>,
    timestamp_column: TimestampColumn,
    value_column: ValueColumn,
    tag_column: TagEncoder,
    pending: Option<PendingMetric>,
}

impl BlobEncoder {
    pub fn new(start_time_micros: i64, options: EncoderOptions, codecs: ColumnCodecs) -> Self {
        let timestamp_column = TimestampColumn::new(options.timestamp_encoding, options.endian);
        let value_column = ValueColumn::new(options.value_encoding, options.endian);
        Self {
            options,
            codecs,
            start_time: start_time_micros,
            state: State::Idle,
            seen_ids: HashSet::new(),
            entries: Vec::new(),
            names: Vec::new(),
            timestamp_column,
            value_column,
            tag_column: TagEncoder::new(),
            pending: None,
        }
    }

    /// Begins a metric, hashing `name` with the reference hasher to obtain
    /// its ID.
    pub fn start_metric(&mut self, name: &str, count: usize) -> MeboResult<()> {
        self.start_metric_inner(default_hash_id(name), Some(name.to_string()), count)
    }

    /// Begins a metric with a caller-supplied ID, bypassing name hashing.
    /// Fails if the encoder is configured to emit a metric-names payload,
    /// since there would be no name to record.
    pub fn start_metric_with_id(&mut self, metric_id: u64, count: usize) -> MeboResult<()> {
        if self.options.emit_metric_names {
            warn!("rejecting start_metric_with_id: emit_metric_names is on, needs a name to record");
            return Err(MeboError::EncoderStateError {
                reason: "emit_metric_names requires start_metric(name, count), not a pre-hashed id".to_string(),
            });
        }
        self.start_metric_inner(metric_id, None, count)
    }

    fn start_metric_inner(&mut self, metric_id: u64, name: Option<String>, count: usize) -> MeboResult<()> {
        if self.state != State::Idle {
            warn!("rejecting start_metric: another metric is already open");
            return Err(MeboError::EncoderStateError {
                reason: "start_metric called while another metric is open".to_string(),
            });
        }
        if count == 0 || count > MAX_POINT_COUNT as usize {
            warn!("rejecting start_metric: count {count} outside [1, {MAX_POINT_COUNT}]");
            return Err(MeboError::InvalidMetricCount {
                count: count as u64,
                reason: format!("per-metric point count must be in [1, {MAX_POINT_COUNT}]"),
            });
        }
        if !self.seen_ids.insert(metric_id) {
            warn!("rejecting start_metric: metric id {metric_id:#x} already seen in this blob");
            return Err(MeboError::DuplicateMetric { metric_id });
        }

        let timestamp_offset = self.timestamp_column.bytes().len();
        let value_offset = self.value_column.bytes().len();
        let tag_offset = if self.options.has_tags { self.tag_column.bytes().len() } else { 0 };

        self.pending = Some(PendingMetric {
            metric_id,
            name,
            declared_count: count,
            supplied_count: 0,
            timestamp_offset,
            value_offset,
            tag_offset,
        });
        self.state = State::InMetric;
        Ok(())
    }

    /// Appends a batch of points to the currently open metric.
    pub fn add_points(&mut self, timestamps: &[i64], values: &[f64], tags: Option<&[&str]>) -> MeboResult<()> {
        let pending = self.pending.as_mut().ok_or_else(|| {
            warn!("rejecting add_points: no metric open");
            MeboError::EncoderStateError { reason: "add_points called with no metric open".to_string() }
        })?;
        if timestamps.len() != values.len() {
            warn!("rejecting add_points: {} timestamps but {} values", timestamps.len(), values.len());
            return Err(MeboError::EncoderStateError {
                reason: format!("{} timestamps but {} values", timestamps.len(), values.len()),
            });
        }
        match (self.options.has_tags, tags) {
            (true, None) => {
                warn!("rejecting add_points: blob has tags enabled but no tags were supplied");
                return Err(MeboError::EncoderStateError {
                    reason: "blob has tags enabled but no tags were supplied".to_string(),
                })
            }
            (false, Some(_)) => {
                warn!("rejecting add_points: blob has tags disabled but tags were supplied");
                return Err(MeboError::EncoderStateError {
                    reason: "blob has tags disabled but tags were supplied".to_string(),
                })
            }
            (true, Some(tags)) if tags.len() != timestamps.len() => {
                warn!("rejecting add_points: {} tags but {} points", tags.len(), timestamps.len());
                return Err(MeboError::EncoderStateError {
                    reason: format!("{} tags but {} points", tags.len(), timestamps.len()),
                })
            }
            _ => {}
        }

        self.timestamp_column.write_slice(timestamps);
        self.value_column.write_slice(values);
        if let Some(tags) = tags {
            self.tag_column.write_slice(tags);
        }
        pending.supplied_count += timestamps.len();
        Ok(())
    }

    /// Convenience wrapper over [`Self::add_points`] for a single point.
    pub fn add_point(&mut self, timestamp: i64, value: f64, tag: Option<&str>) -> MeboResult<()> {
        let tags = tag.map(|t| [t]);
        self.add_points(&[timestamp], &[value], tags.as_ref().map(|t| t.as_slice()))
    }

    pub fn end_metric(&mut self) -> MeboResult<()> {
        let pending = self.pending.take().ok_or_else(|| {
            warn!("rejecting end_metric: no metric open");
            MeboError::EncoderStateError { reason: "end_metric called with no metric open".to_string() }
        })?;
        if pending.supplied_count != pending.declared_count {
            warn!(
                "rejecting end_metric: metric {:#x} declared {} points, got {}",
                pending.metric_id, pending.declared_count, pending.supplied_count
            );
            self.state = State::Idle;
            return Err(MeboError::CountMismatch {
                metric_id: pending.metric_id,
                declared: pending.declared_count,
                supplied: pending.supplied_count,
            });
        }

        self.entries.push(NumericIndexEntry {
            metric_id: pending.metric_id,
            count: pending.declared_count,
            timestamp_offset: pending.timestamp_offset,
            value_offset: pending.value_offset,
            tag_offset: pending.tag_offset,
        });
        if self.options.emit_metric_names {
            self.names.push(pending.name.unwrap_or_default());
        }

        self.timestamp_column.reset();
        self.value_column.reset();
        if self.options.has_tags {
            self.tag_column.reset();
        }
        self.state = State::Idle;
        Ok(())
    }

    /// Assembles the final blob. Consumes the encoder: the `Idle ->
    /// Finished` transition is encoded in the type system rather than a
    /// runtime flag, so there is no way to call any further method on a
    /// finished encoder.
    pub fn finish(mut self) -> MeboResult<Vec<u8>> {
        if self.state != State::Idle {
            warn!("rejecting finish: a metric is still open");
            return Err(MeboError::EncoderStateError {
                reason: "finish called with a metric still open".to_string(),
            });
        }
        if self.entries.len() > MAX_METRIC_COUNT as usize {
            warn!("rejecting finish: {} metrics exceeds max of {MAX_METRIC_COUNT}", self.entries.len());
            return Err(MeboError::InvalidMetricCount {
                count: self.entries.len() as u64,
                reason: format!("exceeds max of {MAX_METRIC_COUNT}"),
            });
        }
        log::debug!("assembling blob: {} metrics, start_time={}", self.entries.len(), self.start_time);

        let endian = self.options.endian;
        let names_bytes = if self.options.emit_metric_names {
            Some(encode_names(
                &self.names.iter().map(String::as_str).collect::<Vec<_>>(),
                endian,
            )?)
        } else {
            None
        };
        let index_bytes = encode_numeric_index(&self.entries, endian)?;

        let index_offset = HEADER_SIZE + names_bytes.as_ref().map_or(0, Vec::len);
        let after_index = index_offset + index_bytes.len();
        let ts_pad = padding_to_8(after_index);
        let ts_start = after_index + ts_pad;

        let ts_raw = self.timestamp_column.finish();
        let ts_compressed = self.codecs.timestamp.compress(&ts_raw);

        let val_pad = padding_to_8(ts_start + ts_compressed.len());
        let val_start = ts_start + ts_compressed.len() + val_pad;

        let val_raw = self.value_column.finish();
        let val_compressed = self.codecs.value.compress(&val_raw);

        let (tag_start, tag_pad, tag_bytes) = if self.options.has_tags {
            let pad = padding_to_8(val_start + val_compressed.len());
            let start = val_start + val_compressed.len() + pad;
            (start, pad, self.tag_column.finish())
        } else {
            (val_start + val_compressed.len(), 0, Vec::new())
        };

        let header = NumericHeader {
            flag: Flag {
                kind: BlobKind::Numeric,
                has_tags: self.options.has_tags,
                endian,
                has_metric_names: self.options.emit_metric_names,
                timestamp_encoding: self.options.timestamp_encoding,
                value_encoding: self.options.value_encoding,
                timestamp_compression: self.options.timestamp_compression,
                value_compression: self.options.value_compression,
            },
            start_time_micros: self.start_time,
            metric_count: self.entries.len() as u32,
            index_offset: index_offset as u32,
            timestamp_payload_offset: ts_start as u32,
            value_payload_offset: val_start as u32,
            tag_payload_offset: tag_start as u32,
        };

        let total_len = if self.options.has_tags { tag_start + tag_bytes.len() } else { tag_start };

        let mut out = pool::PooledBuffer::acquire();
        out.append_bytes(&header.to_bytes());
        if let Some(names) = &names_bytes {
            out.append_bytes(names);
        }
        out.append_bytes(&index_bytes);
        out.append_bytes(&vec![0u8; ts_pad]);
        out.append_bytes(&ts_compressed);
        out.append_bytes(&vec![0u8; val_pad]);
        out.append_bytes(&val_compressed);
        if self.options.has_tags {
            out.append_bytes(&vec![0u8; tag_pad]);
            out.append_bytes(&tag_bytes);
        }
        debug_assert_eq!(out.len(), total_len);
        Ok(out.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::NoneCodec;
    use crate::decoder::BlobDecoder;

    fn codecs() -> ColumnCodecs {
        ColumnCodecs { timestamp: Box::new(NoneCodec), value: Box::new(NoneCodec) }
    }

    #[test]
    fn s6_multi_metric_blob_roundtrips() {
        let options = EncoderOptions {
            timestamp_encoding: TimestampEncoding::Delta,
            value_encoding: ValueEncoding::Gorilla,
            has_tags: false,
            ..Default::default()
        };
        let mut enc = BlobEncoder::new(1_700_000_000_000_000, options, codecs());

        let counts = [5usize, 3, 7];
        for (m, &count) in counts.iter().enumerate() {
            enc.start_metric(&format!("metric.{m}"), count).unwrap();
            let ts: Vec<i64> = (0..count as i64).map(|i| 1_700_000_000_000_000 + i * 1_000_000).collect();
            let vals: Vec<f64> = (0..count).map(|i| 10.0 + m as f64 + i as f64 * 0.1).collect();
            enc.add_points(&ts, &vals, None).unwrap();
            enc.end_metric().unwrap();
        }

        let bytes = enc.finish().unwrap();
        let decoder = BlobDecoder::open(&bytes, default_hash_id).unwrap();
        assert_eq!(decoder.metric_count(), 3);
        for (m, &count) in counts.iter().enumerate() {
            let id = default_hash_id(&format!("metric.{m}"));
            assert_eq!(decoder.count(id), Some(count));
            let all: Vec<_> = decoder.all(id).unwrap().collect();
            assert_eq!(all.len(), count);
        }
    }

    #[test]
    fn duplicate_metric_id_is_rejected() {
        let mut enc = BlobEncoder::new(0, EncoderOptions::default(), codecs());
        enc.start_metric("m", 1).unwrap();
        enc.add_points(&[0], &[0.0], None).unwrap();
        enc.end_metric().unwrap();
        let err = enc.start_metric("m", 1).unwrap_err();
        assert!(matches!(err, MeboError::DuplicateMetric { .. }));
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let mut enc = BlobEncoder::new(0, EncoderOptions::default(), codecs());
        enc.start_metric("m", 3).unwrap();
        enc.add_points(&[0, 1], &[0.0, 1.0], None).unwrap();
        let err = enc.end_metric().unwrap_err();
        assert!(matches!(err, MeboError::CountMismatch { declared: 3, supplied: 2, .. }));

        // the encoder must not be stuck in `InMetric` after the mismatch
        enc.start_metric("n", 1).unwrap();
        enc.add_points(&[0], &[0.0], None).unwrap();
        enc.end_metric().unwrap();
    }

    #[test]
    fn write_without_start_metric_is_state_error() {
        let mut enc = BlobEncoder::new(0, EncoderOptions::default(), codecs());
        let err = enc.add_points(&[0], &[0.0], None).unwrap_err();
        assert!(matches!(err, MeboError::EncoderStateError { .. }));
    }

    #[test]
    fn finish_with_open_metric_is_state_error() {
        let mut enc = BlobEncoder::new(0, EncoderOptions::default(), codecs());
        enc.start_metric("m", 1).unwrap();
        let err = enc.finish().unwrap_err();
        assert!(matches!(err, MeboError::EncoderStateError { .. }));
    }

    #[test]
    fn emit_metric_names_roundtrips_with_hash_verification() {
        let options = EncoderOptions { emit_metric_names: true, ..Default::default() };
        let mut enc = BlobEncoder::new(0, options, codecs());
        enc.start_metric("cpu.usage", 1).unwrap();
        enc.add_points(&[0], &[1.0], None).unwrap();
        enc.end_metric().unwrap();
        let bytes = enc.finish().unwrap();

        let decoder = BlobDecoder::open(&bytes, default_hash_id).unwrap();
        assert!(decoder.has_metric_names());
    }
}
