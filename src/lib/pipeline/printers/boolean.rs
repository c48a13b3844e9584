//! Bool index results: `0` found, `1` not found, `2` invalid.
//!
//! The index value itself is lost, which makes this the smallest and
//! fastest encoding; it cannot be fed back into color search.

use crate::pipeline::printers::IndexResultsFormat;

pub struct BoolIndexFormat;

impl IndexResultsFormat for BoolIndexFormat {
    fn extension(&self) -> &'static str {
        ".txt"
    }

    fn format_name(&self) -> &'static str {
        "bool"
    }

    fn with_result(&self, out: &mut Vec<u8>, _value: u64) {
        out.extend_from_slice(b"0 ");
    }

    fn with_not_found(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"1 ");
    }

    fn with_invalid(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"2 ");
    }

    fn with_newline(&self, out: &mut Vec<u8>) {
        out.push(b'\n');
    }
}

#[must_use]
pub fn bits_per_element() -> u64 {
    16
}

#[must_use]
pub fn bits_per_seq() -> u64 {
    8
}
