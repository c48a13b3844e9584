//! Length-prefixed header strings shared by every non-Themisto codec.
//!
//! A header string is stored as a little-endian `u64` length followed by the
//! raw bytes, no NUL terminator. Result files written with headers enabled
//! start with two such strings: the format name (`"ascii"`, `"binary"`,
//! `"packedint"`) and the version (`"v1.0"`).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use std::path::Path;

use crate::errors::{Result, SbwtqError};

/// Version string written into and required from every result file header.
pub const HEADER_VERSION: &str = "v1.0";

/// Upper bound on a header string length; anything larger is corrupt input.
pub const MAX_HEADER_LENGTH: u64 = 100_000;

/// Write one length-prefixed string.
pub fn write_string<W: Write>(writer: &mut W, value: &str) -> std::io::Result<()> {
    writer.write_u64::<LittleEndian>(value.len() as u64)?;
    writer.write_all(value.as_bytes())
}

/// Write the two-string header (format name, then version).
pub fn write_header<W: Write>(writer: &mut W, format_name: &str) -> std::io::Result<()> {
    write_string(writer, format_name)?;
    write_string(writer, HEADER_VERSION)
}

/// Read one length-prefixed string, rejecting oversize lengths.
///
/// `path` and `offset` are used only for error reporting; on success the
/// caller should advance its offset by `8 + returned.len()`.
pub fn read_string<R: Read>(reader: &mut R, path: &Path, offset: u64) -> Result<String> {
    let length = reader
        .read_u64::<LittleEndian>()
        .map_err(|e| SbwtqError::io(path, e))?;
    if length > MAX_HEADER_LENGTH {
        return Err(SbwtqError::format(
            path,
            offset,
            format!("Header string length is too large: {length}"),
        ));
    }
    let mut bytes = vec![0_u8; length as usize];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| SbwtqError::io(path, e))?;
    String::from_utf8(bytes)
        .map_err(|_| SbwtqError::format(path, offset, "Header string is not valid UTF-8"))
}

/// Byte length of one encoded header string.
pub fn encoded_len(value: &str) -> u64 {
    8 + value.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    #[test]
    fn test_write_then_read() {
        let mut buffer = Vec::new();
        write_header(&mut buffer, "binary").unwrap();
        let mut cursor = Cursor::new(&buffer);
        let path = PathBuf::from("test");
        assert_eq!(read_string(&mut cursor, &path, 0).unwrap(), "binary");
        assert_eq!(read_string(&mut cursor, &path, 14).unwrap(), "v1.0");
    }

    #[test]
    fn test_binary_header_bytes() {
        let mut buffer = Vec::new();
        write_header(&mut buffer, "binary").unwrap();
        let expected: &[u8] = &[
            0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // length 6
            b'b', b'i', b'n', b'a', b'r', b'y', // "binary"
            0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // length 4
            b'v', b'1', b'.', b'0', // "v1.0"
        ];
        assert_eq!(buffer, expected);
    }

    #[test]
    fn test_oversize_length_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(MAX_HEADER_LENGTH + 1).to_le_bytes());
        let err = read_string(&mut Cursor::new(&buffer), &PathBuf::from("x"), 0).unwrap_err();
        assert!(format!("{err}").contains("too large"));
    }
}
