//! Result-stream codecs shared by the printers, the color-mode index file
//! parsers, and the `formatdiff` tool.
//!
//! A result stream is a sequence of records, one per input read, where each
//! element is either an SBWT column index or one of the sentinels below.
//! Four wire encodings exist: `ascii`, `binary`, `packedint` and `themisto`
//! (the last is read-only). All of them decode to the same
//! sequence-of-integer-sequences, which is what [`reader::SequenceReader`]
//! exposes and what the cross-checker compares.

pub mod reader;
pub mod vlq;

use std::fmt;
use std::str::FromStr;

/// Sentinel for a k-mer absent from the index. Occupies the largest
/// representable value so it can never collide with a column index.
pub const NOT_FOUND: u64 = u64::MAX;
/// Sentinel for a k-mer containing a non-ACGT character.
pub const INVALID: u64 = u64::MAX - 1;
/// Sentinel separating records in the binary encoding.
pub const NEWLINE: u64 = u64::MAX - 2;

/// Warp padding value inside [`crate::pipeline::batches::IndexesBatch`].
pub const PAD: u64 = u64::MAX;

/// The four wire encodings of a result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultFormat {
    /// Whitespace-separated decimal integers, `-1` not-found, `-2` invalid.
    Ascii,
    /// Little-endian u64 stream with the three top sentinels.
    Binary,
    /// Variable-length quantity encoding, see [`vlq`].
    PackedInt,
    /// One line per record: ascending record index then a sorted id list.
    Themisto,
}

impl ResultFormat {
    /// The format name as stored in file headers and used on the CLI.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ResultFormat::Ascii => "ascii",
            ResultFormat::Binary => "binary",
            ResultFormat::PackedInt => "packedint",
            ResultFormat::Themisto => "themisto",
        }
    }

    /// Whether files of this format begin with the two-string header.
    #[must_use]
    pub fn has_header(&self) -> bool {
        !matches!(self, ResultFormat::Themisto)
    }
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResultFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ascii" => Ok(ResultFormat::Ascii),
            "binary" => Ok(ResultFormat::Binary),
            "packedint" => Ok(ResultFormat::PackedInt),
            "themisto" => Ok(ResultFormat::Themisto),
            other => Err(format!("Unknown format: {other}")),
        }
    }
}

/// Number of decimal digits needed to print any value up to `max_value`.
#[must_use]
pub fn decimal_digits(max_value: u64) -> u64 {
    if max_value == 0 { 1 } else { u64::from(max_value.ilog10()) + 1 }
}

/// Number of bytes the VLQ encoding needs for any value up to `max_value`.
///
/// One byte per started 7-bit group, plus one for the possible bit-6
/// disambiguation group.
#[must_use]
pub fn vlq_max_bytes(max_value: u64) -> u64 {
    u64::from(64 - max_value.leading_zeros()) / 7 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_the_three_largest_values() {
        assert_eq!(NOT_FOUND, u64::MAX);
        assert_eq!(INVALID, u64::MAX - 1);
        assert_eq!(NEWLINE, u64::MAX - 2);
    }

    #[test]
    fn test_format_name_round_trip() {
        for format in [
            ResultFormat::Ascii,
            ResultFormat::Binary,
            ResultFormat::PackedInt,
            ResultFormat::Themisto,
        ] {
            assert_eq!(format.name().parse::<ResultFormat>().unwrap(), format);
        }
        assert!("csv".parse::<ResultFormat>().is_err());
    }

    #[test]
    fn test_decimal_digits() {
        assert_eq!(decimal_digits(0), 1);
        assert_eq!(decimal_digits(9), 1);
        assert_eq!(decimal_digits(10), 2);
        assert_eq!(decimal_digits(u64::MAX), 20);
    }

    #[test]
    fn test_vlq_max_bytes() {
        assert_eq!(vlq_max_bytes(0), 1);
        assert_eq!(vlq_max_bytes(0x3f), 1);
        assert_eq!(vlq_max_bytes(0x7f), 2);
        assert_eq!(vlq_max_bytes(u64::MAX), 10);
    }
}
