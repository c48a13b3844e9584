//! Packed-int index results: VLQ values plus single-byte sentinels.

use crate::formats::{vlq, vlq_max_bytes};
use crate::pipeline::printers::IndexResultsFormat;

pub struct PackedIntIndexFormat;

impl IndexResultsFormat for PackedIntIndexFormat {
    fn extension(&self) -> &'static str {
        ".pint"
    }

    fn format_name(&self) -> &'static str {
        "packedint"
    }

    fn with_result(&self, out: &mut Vec<u8>, value: u64) {
        vlq::encode_into(out, value);
    }

    fn with_not_found(&self, out: &mut Vec<u8>) {
        out.push(vlq::NOT_FOUND_BYTE);
    }

    fn with_invalid(&self, out: &mut Vec<u8>) {
        out.push(vlq::INVALID_BYTE);
    }

    fn with_newline(&self, out: &mut Vec<u8>) {
        out.push(vlq::NEWLINE_BYTE);
    }
}

/// Sized from `max_index`: small indexes make for much smaller buffers than
/// the 10-byte worst case of a full u64.
#[must_use]
pub fn bits_per_element(max_index: u64) -> u64 {
    vlq_max_bytes(max_index) * 8
}

#[must_use]
pub fn bits_per_seq() -> u64 {
    8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_bytes() {
        let format = PackedIntIndexFormat;
        let mut out = Vec::new();
        format.with_not_found(&mut out);
        format.with_invalid(&mut out);
        format.with_newline(&mut out);
        assert_eq!(out, vec![0x40, 0x41, 0x42]);
    }

    #[test]
    fn test_values_use_vlq() {
        let format = PackedIntIndexFormat;
        let mut out = Vec::new();
        format.with_result(&mut out, 128);
        assert_eq!(out, vec![0x80, 0x01]);
    }
}
