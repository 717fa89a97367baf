//! The 16-byte on-disk index entry, in its numeric (delta-offset) and text
//! (absolute-offset) shapes, plus the widen-on-decode / narrow-on-encode
//! conversions between on-disk and in-memory representations.

use log::warn;

use crate::endian::Endian;
use crate::error::MeboError;
use crate::format::INDEX_ENTRY_SIZE;

/// One metric's location within a numeric blob's three payload sections, in
/// memory. Offsets are absolute and widened to `usize`; the on-disk form
/// stores them as per-field deltas from the previous entry, each required to
/// fit in `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericIndexEntry {
    pub metric_id: u64,
    pub count: usize,
    pub timestamp_offset: usize,
    pub value_offset: usize,
    pub tag_offset: usize,
}

/// One metric's location within a text blob's single data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextIndexEntry {
    pub metric_id: u64,
    pub count: usize,
    pub offset: usize,
    /// Derived by differencing consecutive absolute offsets (and, for the
    /// last entry, against the section's total size) — never stored.
    pub data_size: usize,
}

fn delta_offset(prev: usize, cur: usize, metric_index: usize, section: &'static str) -> Result<u16, MeboError> {
    let delta = cur.checked_sub(prev).ok_or_else(|| {
        warn!("rejecting index: {section} offsets are not non-decreasing at metric {metric_index}");
        MeboError::MalformedPayload {
            reason: format!("{section} offsets are not non-decreasing at metric {metric_index}"),
        }
    })?;
    u16::try_from(delta).map_err(|_| {
        warn!("splitting index: {section} delta {delta} at metric {metric_index} overflows u16");
        MeboError::IndexOffsetOverflow { metric_index, section, delta: delta as u64 }
    })
}

/// Encodes numeric index entries, converting each entry's absolute offsets
/// to per-field deltas from the previous entry (or the absolute value itself
/// for entry 0). Errors if any delta does not fit in `u16`.
pub fn encode_numeric_index(entries: &[NumericIndexEntry], endian: Endian) -> Result<Vec<u8>, MeboError> {
    let mut out = Vec::with_capacity(entries.len() * INDEX_ENTRY_SIZE);
    let mut prev_ts = 0usize;
    let mut prev_val = 0usize;
    let mut prev_tag = 0usize;
    for (i, entry) in entries.iter().enumerate() {
        let ts_delta = delta_offset(prev_ts, entry.timestamp_offset, i, "timestamp")?;
        let val_delta = delta_offset(prev_val, entry.value_offset, i, "value")?;
        let tag_delta = delta_offset(prev_tag, entry.tag_offset, i, "tag")?;

        let mut record = [0u8; INDEX_ENTRY_SIZE];
        endian.put_u64(&mut record[0..8], entry.metric_id);
        endian.put_u16(&mut record[8..10], entry.count as u16);
        endian.put_u16(&mut record[10..12], ts_delta);
        endian.put_u16(&mut record[12..14], val_delta);
        endian.put_u16(&mut record[14..16], tag_delta);
        out.extend_from_slice(&record);

        prev_ts = entry.timestamp_offset;
        prev_val = entry.value_offset;
        prev_tag = entry.tag_offset;
    }
    Ok(out)
}

/// Decodes `metric_count` numeric index entries and reconstructs absolute
/// offsets by running cumulative sums over the stored deltas.
pub fn decode_numeric_index(bytes: &[u8], metric_count: usize, endian: Endian) -> Result<Vec<NumericIndexEntry>, MeboError> {
    let expected = metric_count * INDEX_ENTRY_SIZE;
    if bytes.len() < expected {
        warn!("rejecting numeric index: need {expected} bytes for {metric_count} entries, found {}", bytes.len());
        return Err(MeboError::InvalidIndexEntrySize { expected, found: bytes.len() });
    }
    let mut out = Vec::with_capacity(metric_count);
    let mut ts_cum = 0usize;
    let mut val_cum = 0usize;
    let mut tag_cum = 0usize;
    for i in 0..metric_count {
        let record = &bytes[i * INDEX_ENTRY_SIZE..(i + 1) * INDEX_ENTRY_SIZE];
        let metric_id = endian.get_u64(&record[0..8]);
        let count = endian.get_u16(&record[8..10]) as usize;
        let ts_delta = endian.get_u16(&record[10..12]) as usize;
        let val_delta = endian.get_u16(&record[12..14]) as usize;
        let tag_delta = endian.get_u16(&record[14..16]) as usize;

        ts_cum += ts_delta;
        val_cum += val_delta;
        tag_cum += tag_delta;

        out.push(NumericIndexEntry {
            metric_id,
            count,
            timestamp_offset: ts_cum,
            value_offset: val_cum,
            tag_offset: tag_cum,
        });
    }
    Ok(out)
}

/// Encodes text index entries. Offsets are stored absolute; `reserved`
/// stays zero.
pub fn encode_text_index(entries: &[TextIndexEntry], endian: Endian) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * INDEX_ENTRY_SIZE);
    for entry in entries {
        let mut record = [0u8; INDEX_ENTRY_SIZE];
        endian.put_u64(&mut record[0..8], entry.metric_id);
        endian.put_u16(&mut record[8..10], entry.count as u16);
        // record[10..12] reserved, stays zero
        endian.put_u32(&mut record[12..16], entry.offset as u32);
        out.extend_from_slice(&record);
    }
    out
}

/// Decodes `metric_count` text index entries and derives each entry's
/// `data_size` by differencing consecutive offsets (and, for the final
/// entry, against `total_data_size`).
pub fn decode_text_index(
    bytes: &[u8],
    metric_count: usize,
    endian: Endian,
    total_data_size: usize,
) -> Result<Vec<TextIndexEntry>, MeboError> {
    let expected = metric_count * INDEX_ENTRY_SIZE;
    if bytes.len() < expected {
        warn!("rejecting text index: need {expected} bytes for {metric_count} entries, found {}", bytes.len());
        return Err(MeboError::InvalidIndexEntrySize { expected, found: bytes.len() });
    }
    let mut raw = Vec::with_capacity(metric_count);
    for i in 0..metric_count {
        let record = &bytes[i * INDEX_ENTRY_SIZE..(i + 1) * INDEX_ENTRY_SIZE];
        let metric_id = endian.get_u64(&record[0..8]);
        let count = endian.get_u16(&record[8..10]) as usize;
        let offset = endian.get_u32(&record[12..16]) as usize;
        raw.push((metric_id, count, offset));
    }
    let mut out = Vec::with_capacity(metric_count);
    for i in 0..metric_count {
        let (metric_id, count, offset) = raw[i];
        let next_offset = raw.get(i + 1).map(|(_, _, o)| *o).unwrap_or(total_data_size);
        let data_size = next_offset.checked_sub(offset).ok_or_else(|| {
            warn!("rejecting text index: offsets are not non-decreasing at metric {i}");
            MeboError::MalformedPayload { reason: format!("text index offsets are not non-decreasing at metric {i}") }
        })?;
        out.push(TextIndexEntry { metric_id, count, offset, data_size });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_index_roundtrip_reconstructs_absolute_offsets() {
        let entries = vec![
            NumericIndexEntry { metric_id: 1, count: 5, timestamp_offset: 0, value_offset: 0, tag_offset: 0 },
            NumericIndexEntry { metric_id: 2, count: 3, timestamp_offset: 16, value_offset: 40, tag_offset: 0 },
            NumericIndexEntry { metric_id: 3, count: 7, timestamp_offset: 30, value_offset: 64, tag_offset: 20 },
        ];
        let bytes = encode_numeric_index(&entries, Endian::Little).unwrap();
        assert_eq!(bytes.len(), entries.len() * INDEX_ENTRY_SIZE);
        let decoded = decode_numeric_index(&bytes, entries.len(), Endian::Little).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn numeric_index_offset_overflow_is_reported() {
        let entries = vec![
            NumericIndexEntry { metric_id: 1, count: 1, timestamp_offset: 0, value_offset: 0, tag_offset: 0 },
            NumericIndexEntry { metric_id: 2, count: 1, timestamp_offset: 100_000, value_offset: 0, tag_offset: 0 },
        ];
        let err = encode_numeric_index(&entries, Endian::Little).unwrap_err();
        assert!(matches!(err, MeboError::IndexOffsetOverflow { section: "timestamp", .. }));
    }

    #[test]
    fn text_index_roundtrip_derives_data_size_by_differencing() {
        let entries = vec![
            TextIndexEntry { metric_id: 1, count: 2, offset: 0, data_size: 0 },
            TextIndexEntry { metric_id: 2, count: 3, offset: 20, data_size: 0 },
            TextIndexEntry { metric_id: 3, count: 1, offset: 45, data_size: 0 },
        ];
        let bytes = encode_text_index(&entries, Endian::Big);
        let decoded = decode_text_index(&bytes, entries.len(), Endian::Big, 60).unwrap();
        assert_eq!(decoded[0].data_size, 20);
        assert_eq!(decoded[1].data_size, 25);
        assert_eq!(decoded[2].data_size, 15);
    }

    #[test]
    fn truncated_index_bytes_is_error() {
        assert!(matches!(
            decode_numeric_index(&[0u8; 10], 1, Endian::Little),
            Err(MeboError::InvalidIndexEntrySize { .. })
        ));
    }
}
