//! The optional metric-names payload: `count:u16` followed by `count`
//! records of `length:u16 ‖ utf8_bytes`, plus the hash-verification helper
//! used when a blob carries names for collision detection or name recovery.

use log::warn;

use crate::endian::Endian;
use crate::error::MeboError;

const MAX_NAME_LEN: usize = u16::MAX as usize;

/// Encodes `names` in index order. Fails if any name's length in bytes
/// exceeds `u16::MAX`; no partial payload is produced on error.
pub fn encode_names(names: &[&str], endian: Endian) -> Result<Vec<u8>, MeboError> {
    for name in names {
        if name.len() > MAX_NAME_LEN {
            warn!("rejecting metric name: {} bytes exceeds max of {MAX_NAME_LEN}", name.len());
            return Err(MeboError::InvalidMetricName { len: name.len(), max: MAX_NAME_LEN });
        }
    }
    let mut out = Vec::new();
    let mut count_bytes = [0u8; 2];
    endian.put_u16(&mut count_bytes, names.len() as u16);
    out.extend_from_slice(&count_bytes);
    for name in names {
        let mut len_bytes = [0u8; 2];
        endian.put_u16(&mut len_bytes, name.len() as u16);
        out.extend_from_slice(&len_bytes);
        out.extend_from_slice(name.as_bytes());
    }
    Ok(out)
}

/// Decodes the names payload starting at the front of `bytes`. Returns the
/// names in order and the total number of bytes consumed (so the caller can
/// locate the index that immediately follows).
pub fn decode_names(bytes: &[u8], endian: Endian) -> Result<(Vec<String>, usize), MeboError> {
    if bytes.len() < 2 {
        warn!("rejecting names payload: shorter than the 2-byte count prefix");
        return Err(MeboError::InvalidMetricNamesPayload {
            reason: "payload shorter than the 2-byte count prefix".to_string(),
        });
    }
    let count = endian.get_u16(&bytes[0..2]) as usize;
    let mut pos = 2;
    let mut names = Vec::with_capacity(count);
    for i in 0..count {
        let header = bytes.get(pos..pos + 2).ok_or_else(|| {
            warn!("rejecting names payload: truncated length prefix for name {i}");
            MeboError::InvalidMetricNamesPayload { reason: format!("truncated length prefix for name {i}") }
        })?;
        let len = endian.get_u16(header) as usize;
        pos += 2;
        let payload = bytes.get(pos..pos + len).ok_or_else(|| {
            warn!("rejecting names payload: truncated utf8 bytes for name {i} (declared length {len})");
            MeboError::InvalidMetricNamesPayload {
                reason: format!("truncated utf8 bytes for name {i} (declared length {len})"),
            }
        })?;
        let s = std::str::from_utf8(payload).map_err(|_| {
            warn!("rejecting names payload: name {i} is not valid utf-8");
            MeboError::InvalidMetricNamesPayload { reason: format!("name {i} is not valid utf-8") }
        })?;
        names.push(s.to_string());
        pos += len;
    }
    Ok((names, pos))
}

/// Verifies that `hash_fn(names[i]) == ids[i]` for every `i`. Errors on the
/// first mismatch (or on a length mismatch between the two slices).
pub fn verify_hashes(
    names: &[String],
    ids: &[u64],
    hash_fn: impl Fn(&str) -> u64,
) -> Result<(), MeboError> {
    if names.len() != ids.len() {
        warn!("rejecting blob: {} names but {} ids", names.len(), ids.len());
        return Err(MeboError::InvalidMetricNamesPayload {
            reason: format!("{} names but {} ids", names.len(), ids.len()),
        });
    }
    for (i, (name, &expected)) in names.iter().zip(ids.iter()).enumerate() {
        let computed = hash_fn(name);
        if computed != expected {
            warn!("rejecting blob: name {i} (\"{name}\") hashes to {computed:#x}, index declares {expected:#x}");
            return Err(MeboError::HashMismatch { index: i, computed, expected });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::default_hash_id;

    #[test]
    fn names_roundtrip_both_endians() {
        let names = ["cpu.usage", "mem.free", "disk.io.read"];
        for endian in [Endian::Little, Endian::Big] {
            let bytes = encode_names(&names, endian).unwrap();
            let (decoded, consumed) = decode_names(&bytes, endian).unwrap();
            assert_eq!(consumed, bytes.len());
            assert_eq!(decoded, names.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn names_empty_set_roundtrips() {
        let bytes = encode_names(&[], Endian::Little).unwrap();
        let (decoded, consumed) = decode_names(&bytes, Endian::Little).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(consumed, 2);
    }

    #[test]
    fn verify_hashes_s9_property() {
        let names: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let ids: Vec<u64> = names.iter().map(|n| default_hash_id(n)).collect();
        assert!(verify_hashes(&names, &ids, default_hash_id).is_ok());

        let mut swapped = ids.clone();
        swapped.swap(0, 1);
        assert!(matches!(
            verify_hashes(&names, &swapped, default_hash_id),
            Err(MeboError::HashMismatch { .. })
        ));
    }

    #[test]
    fn decode_truncated_payload_is_error() {
        let bytes = [0u8, 1]; // count = 1, but no length/bytes follow
        assert!(matches!(
            decode_names(&bytes, Endian::Big),
            Err(MeboError::InvalidMetricNamesPayload { .. })
        ));
    }
}
