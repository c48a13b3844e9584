//! ASCII index results: decimal integers, one record per line.
//!
//! Every element, sentinels included, is followed by a single space, so a
//! line ends with a space before its newline; that trailing byte is part of
//! the wire format and is preserved exactly.

use std::io::Write;

use crate::formats::decimal_digits;
use crate::pipeline::printers::IndexResultsFormat;

pub struct AsciiIndexFormat;

impl IndexResultsFormat for AsciiIndexFormat {
    fn extension(&self) -> &'static str {
        ".txt"
    }

    fn format_name(&self) -> &'static str {
        "ascii"
    }

    fn with_result(&self, out: &mut Vec<u8>, value: u64) {
        write!(out, "{value} ").expect("writing to a Vec cannot fail");
    }

    fn with_not_found(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"-1 ");
    }

    fn with_invalid(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"-2 ");
    }

    fn with_newline(&self, out: &mut Vec<u8>) {
        out.push(b'\n');
    }
}

/// Worst-case bits per printed element: the digits of `max_index` plus the
/// separating space.
#[must_use]
pub fn bits_per_element(max_index: u64) -> u64 {
    (decimal_digits(max_index) + 1) * 8
}

/// The newline is not budgeted separately for ascii output.
#[must_use]
pub fn bits_per_seq() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_bytes_keep_trailing_space() {
        let format = AsciiIndexFormat;
        let mut out = Vec::new();
        format.with_result(&mut out, 10);
        format.with_not_found(&mut out);
        format.with_newline(&mut out);
        assert_eq!(out, b"10 -1 \n".to_vec());
    }

    #[test]
    fn test_bits_per_element_tracks_digits() {
        assert_eq!(bits_per_element(9), 16);
        assert_eq!(bits_per_element(10), 24);
        assert_eq!(bits_per_element(999_999), 56);
    }
}
