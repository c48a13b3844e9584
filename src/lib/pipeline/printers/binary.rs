//! Binary index results: little-endian u64 stream.
//!
//! Not-found, invalid and the record separator take the three largest
//! 64-bit values, so any legitimate column index round-trips unchanged.

use crate::formats::{INVALID, NEWLINE, NOT_FOUND};
use crate::pipeline::printers::IndexResultsFormat;

pub struct BinaryIndexFormat;

impl IndexResultsFormat for BinaryIndexFormat {
    fn extension(&self) -> &'static str {
        ".bin"
    }

    fn format_name(&self) -> &'static str {
        "binary"
    }

    fn with_result(&self, out: &mut Vec<u8>, value: u64) {
        out.extend_from_slice(&value.to_le_bytes());
    }

    fn with_not_found(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&NOT_FOUND.to_le_bytes());
    }

    fn with_invalid(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&INVALID.to_le_bytes());
    }

    fn with_newline(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&NEWLINE.to_le_bytes());
    }
}

#[must_use]
pub fn bits_per_element() -> u64 {
    64
}

#[must_use]
pub fn bits_per_seq() -> u64 {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_the_three_largest_values() {
        let format = BinaryIndexFormat;
        let mut out = Vec::new();
        format.with_not_found(&mut out);
        format.with_invalid(&mut out);
        format.with_newline(&mut out);
        assert_eq!(out.len(), 24);
        assert_eq!(u64::from_le_bytes(out[0..8].try_into().unwrap()), u64::MAX);
        assert_eq!(u64::from_le_bytes(out[8..16].try_into().unwrap()), u64::MAX - 1);
        assert_eq!(u64::from_le_bytes(out[16..24].try_into().unwrap()), u64::MAX - 2);
    }
}
