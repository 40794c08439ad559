//! On-disk record format: `<obfuscated record><separator>` repeated, no header, no index.
//!
//! The obfuscation is a reversible base64 encoding. It keeps events out of plain text on disk
//! and guarantees the separator byte never appears inside a record.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::persistence::error::{StorageError, StorageErrorCode, StorageResult};

pub const RECORD_SEPARATOR: u8 = b'\n';

pub fn obfuscate(record: &[u8]) -> Vec<u8> {
    STANDARD.encode(record).into_bytes()
}

pub fn deobfuscate(record: &[u8]) -> StorageResult<Vec<u8>> {
    STANDARD.decode(record).map_err(|err| {
        StorageError::new(
            StorageErrorCode::Serialization,
            format!("Corrupted record: {err}"),
        )
    })
}

/// Bytes appended to a batch file for one record, separator included.
pub fn encode_record(record: &[u8]) -> Vec<u8> {
    let mut encoded = obfuscate(record);
    encoded.push(RECORD_SEPARATOR);
    encoded
}

/// Splits raw batch content on the separator, skipping empty fragments left by a truncated
/// trailing write.
pub fn split_records(batch: &[u8]) -> Vec<&[u8]> {
    batch
        .split(|byte| *byte == RECORD_SEPARATOR)
        .filter(|record| !record.is_empty())
        .collect()
}

/// Decodes every record of a batch, dropping the ones that fail to decode.
pub fn decode_batch(batch: &[u8]) -> Vec<Vec<u8>> {
    split_records(batch)
        .into_iter()
        .filter_map(|record| match deobfuscate(record) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                log::warn!("skipping unreadable record: {err}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_record_never_contains_separator_inside() {
        let record = b"{\"message\":\"line one\\nline two\"}\n\n";
        let encoded = encode_record(record);
        let body = &encoded[..encoded.len() - 1];
        assert!(!body.contains(&RECORD_SEPARATOR));
        assert_eq!(encoded.last(), Some(&RECORD_SEPARATOR));
        assert!(!body.windows(7).any(|w| w == b"message"));
    }

    #[test]
    fn batch_decodes_back_to_original_records() {
        let first = br#"{"type":"view","id":1}"#.to_vec();
        let second = "caf\u{e9} \u{2603}".as_bytes().to_vec();
        let mut batch = encode_record(&first);
        batch.extend(encode_record(&second));

        assert_eq!(decode_batch(&batch), vec![first, second]);
    }

    #[test]
    fn corrupted_records_are_skipped() {
        let mut batch = encode_record(b"kept");
        batch.extend_from_slice(b"%%%not-base64%%%\n");
        assert_eq!(decode_batch(&batch), vec![b"kept".to_vec()]);
    }
}
