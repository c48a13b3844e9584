//! Format-agnostic decoding of result-stream files.
//!
//! [`SequenceReader`] turns a file in any of the four encodings into the
//! common sequence-of-integer-sequences form, with not-found and invalid
//! elements mapped to the shared sentinels. This is the decode half used by
//! the `formatdiff` cross-checker and by tests; the color-mode pipeline has
//! its own incremental parsers that additionally track per-read statistics.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};

use crate::errors::{Result, SbwtqError};
use crate::formats::{vlq, ResultFormat, INVALID, NEWLINE, NOT_FOUND};
use crate::headers;

const READ_BUFFER_SIZE: usize = 1 << 20;

/// Streaming decoder for one result file.
#[derive(Debug)]
pub struct SequenceReader {
    format: ResultFormat,
    reader: BufReader<File>,
    path: PathBuf,
    offset: u64,
    eof: bool,
    /// Next record index a themisto line must start with.
    expected_index: u64,
}

impl SequenceReader {
    /// Open `path` and validate its header (non-Themisto formats only).
    pub fn open<P: AsRef<Path>>(path: P, format: ResultFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| SbwtqError::io(&path, e))?;
        let mut reader = Self {
            format,
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            path,
            offset: 0,
            eof: false,
            expected_index: 0,
        };
        if format.has_header() {
            reader.check_header()?;
        }
        Ok(reader)
    }

    /// Byte offset of the next unread byte, for diagnostics.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the end of the file has been reached.
    #[must_use]
    pub fn eof(&self) -> bool {
        self.eof
    }

    fn check_header(&mut self) -> Result<()> {
        let format_name = headers::read_string(&mut self.reader, &self.path, self.offset)?;
        self.offset += headers::encoded_len(&format_name);
        let version = headers::read_string(&mut self.reader, &self.path, self.offset)?;
        self.offset += headers::encoded_len(&version);
        if format_name != self.format.name() || version != headers::HEADER_VERSION {
            return Err(SbwtqError::format(
                &self.path,
                0,
                format!(
                    "Invalid header. Expected: {} {}. Got: {} {}",
                    self.format.name(),
                    headers::HEADER_VERSION,
                    format_name,
                    version
                ),
            ));
        }
        Ok(())
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0_u8; 1];
        let read = self
            .reader
            .read(&mut byte)
            .map_err(|e| SbwtqError::io(&self.path, e))?;
        if read == 0 {
            return Ok(None);
        }
        self.offset += 1;
        Ok(Some(byte[0]))
    }

    fn format_error<S: Into<String>>(&self, reason: S) -> SbwtqError {
        SbwtqError::format(&self.path, self.offset, reason)
    }

    /// Decode the next record into `out`. Returns `false` once the file is
    /// exhausted; `out` is cleared first either way.
    pub fn read_record(&mut self, out: &mut Vec<u64>) -> Result<bool> {
        out.clear();
        if self.eof {
            return Ok(false);
        }
        match self.format {
            ResultFormat::Ascii => self.read_ascii(out),
            ResultFormat::Binary => self.read_binary(out),
            ResultFormat::PackedInt => self.read_packed_int(out),
            ResultFormat::Themisto => self.read_themisto(out),
        }
    }

    /// Decode the whole remaining file.
    pub fn read_all(&mut self) -> Result<Vec<Vec<u64>>> {
        let mut records = Vec::new();
        let mut record = Vec::new();
        while self.read_record(&mut record)? {
            records.push(record.clone());
        }
        Ok(records)
    }

    /// Reads bytes until a newline; returns `false` when EOF hit with no bytes.
    fn read_line(&mut self, line: &mut Vec<u8>) -> Result<bool> {
        line.clear();
        loop {
            match self.next_byte()? {
                None => {
                    if line.is_empty() {
                        self.eof = true;
                        return Ok(false);
                    }
                    return Ok(true);
                }
                Some(b'\n') => return Ok(true),
                Some(byte) => line.push(byte),
            }
        }
    }

    fn read_ascii(&mut self, out: &mut Vec<u64>) -> Result<bool> {
        let mut line = Vec::new();
        if !self.read_line(&mut line)? {
            return Ok(false);
        }
        for token in line.split(|b| *b == b' ').filter(|t| !t.is_empty()) {
            let text = std::str::from_utf8(token)
                .map_err(|_| self.format_error("Failed to read number"))?;
            let value: i64 = text
                .parse()
                .map_err(|_| self.format_error(format!("Failed to read number: {text}")))?;
            let decoded = match value {
                -1 => NOT_FOUND,
                -2 => INVALID,
                v if v < 0 => {
                    return Err(self.format_error(format!("Negative value in sequence: {v}")));
                }
                v => v as u64,
            };
            out.push(decoded);
        }
        Ok(true)
    }

    fn read_binary(&mut self, out: &mut Vec<u64>) -> Result<bool> {
        let mut word = [0_u8; 8];
        loop {
            let mut filled = 0;
            while filled < 8 {
                match self.next_byte()? {
                    Some(byte) => {
                        word[filled] = byte;
                        filled += 1;
                    }
                    None => {
                        if filled != 0 {
                            return Err(self.format_error("Truncated u64 in sequence"));
                        }
                        self.eof = true;
                        // a trailing record without a newline sentinel is valid
                        return Ok(!out.is_empty());
                    }
                }
            }
            let value = LittleEndian::read_u64(&word);
            if value == NEWLINE {
                return Ok(true);
            }
            out.push(value);
        }
    }

    fn read_packed_int(&mut self, out: &mut Vec<u64>) -> Result<bool> {
        loop {
            let Some(byte) = self.next_byte()? else {
                self.eof = true;
                return Ok(!out.is_empty());
            };
            match byte {
                vlq::NOT_FOUND_BYTE => out.push(NOT_FOUND),
                vlq::INVALID_BYTE => out.push(INVALID),
                vlq::NEWLINE_BYTE => return Ok(true),
                byte if byte & 0x80 == 0 => out.push(u64::from(byte)),
                first => {
                    let mut io_error = None;
                    let value = vlq::decode_continuation(first, || match self.next_byte() {
                        Ok(byte) => byte,
                        Err(e) => {
                            io_error = Some(e);
                            None
                        }
                    });
                    if let Some(e) = io_error {
                        return Err(e);
                    }
                    match value {
                        Ok(value) => out.push(value),
                        Err(e) => return Err(self.format_error(e.to_string())),
                    }
                }
            }
        }
    }

    fn read_themisto(&mut self, out: &mut Vec<u64>) -> Result<bool> {
        let mut line = Vec::new();
        if !self.read_line(&mut line)? {
            return Ok(false);
        }
        let mut tokens = line.split(|b| *b == b' ').filter(|t| !t.is_empty());
        let index = match tokens.next() {
            Some(token) => self.parse_decimal(token)?,
            None => return Err(self.format_error("Failed to read sequence index")),
        };
        if index != self.expected_index {
            return Err(self.format_error(format!("Unexpected sequence index: {index}")));
        }
        self.expected_index += 1;
        let mut previous: Option<u64> = None;
        for token in tokens {
            let value = self.parse_decimal(token)?;
            if let Some(previous) = previous {
                if value <= previous {
                    return Err(self
                        .format_error(format!("Sequence is not sorted: {value} <= {previous}")));
                }
            }
            previous = Some(value);
            out.push(value);
        }
        Ok(true)
    }

    fn parse_decimal(&self, token: &[u8]) -> Result<u64> {
        std::str::from_utf8(token)
            .ok()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| self.format_error("Failed to read number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn reader_for(bytes: &[u8], format: ResultFormat) -> (NamedTempFile, SequenceReader) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        let reader = SequenceReader::open(file.path(), format).unwrap();
        (file, reader)
    }

    fn with_header(format: &str, body: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        headers::write_header(&mut bytes, format).unwrap();
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_ascii_records() {
        let bytes = with_header("ascii", b"10 -1 \n30 40 -2 -2 \n");
        let (_file, mut reader) = reader_for(&bytes, ResultFormat::Ascii);
        let records = reader.read_all().unwrap();
        assert_eq!(records, vec![vec![10, NOT_FOUND], vec![30, 40, INVALID, INVALID]]);
    }

    #[test]
    fn test_ascii_rejects_other_negatives() {
        let bytes = with_header("ascii", b"-3 \n");
        let (_file, mut reader) = reader_for(&bytes, ResultFormat::Ascii);
        let err = reader.read_all().unwrap_err();
        assert!(format!("{err}").contains("Negative value in sequence"));
    }

    #[test]
    fn test_binary_records() {
        let mut body = Vec::new();
        for value in [10, NOT_FOUND, NEWLINE, 70, NEWLINE] {
            body.extend_from_slice(&value.to_le_bytes());
        }
        let bytes = with_header("binary", &body);
        let (_file, mut reader) = reader_for(&bytes, ResultFormat::Binary);
        let records = reader.read_all().unwrap();
        assert_eq!(records, vec![vec![10, NOT_FOUND], vec![70]]);
    }

    #[test]
    fn test_packed_int_records() {
        let body = [
            0x0a, // 10
            vlq::NOT_FOUND_BYTE,
            vlq::NEWLINE_BYTE,
            0x80, 0x01, // 128
            vlq::INVALID_BYTE,
            vlq::NEWLINE_BYTE,
        ];
        let bytes = with_header("packedint", &body);
        let (_file, mut reader) = reader_for(&bytes, ResultFormat::PackedInt);
        let records = reader.read_all().unwrap();
        assert_eq!(records, vec![vec![10, NOT_FOUND], vec![128, INVALID]]);
    }

    #[test]
    fn test_packed_int_overflow_diagnostic() {
        let bytes = with_header("packedint", &[0xff; 10]);
        let (_file, mut reader) = reader_for(&bytes, ResultFormat::PackedInt);
        let err = reader.read_all().unwrap_err();
        assert!(format!("{err}").contains("Packed int too large"));
    }

    #[test]
    fn test_themisto_records() {
        let (_file, mut reader) = reader_for(b"0 3 5\n1\n2 7\n", ResultFormat::Themisto);
        let records = reader.read_all().unwrap();
        assert_eq!(records, vec![vec![3, 5], vec![], vec![7]]);
    }

    #[test]
    fn test_themisto_rejects_unsorted() {
        let (_file, mut reader) = reader_for(b"0 1 2\n1 4\n2 5 5 7\n", ResultFormat::Themisto);
        let err = reader.read_all().unwrap_err();
        assert!(format!("{err}").contains("Sequence is not sorted: 5 <= 5"));
    }

    #[test]
    fn test_themisto_rejects_bad_index() {
        let (_file, mut reader) = reader_for(b"1 2 3\n", ResultFormat::Themisto);
        let err = reader.read_all().unwrap_err();
        assert!(format!("{err}").contains("Unexpected sequence index: 1"));
    }

    #[test]
    fn test_header_mismatch_is_fatal() {
        let bytes = with_header("binary", b"");
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        let err = SequenceReader::open(file.path(), ResultFormat::Ascii).unwrap_err();
        assert!(format!("{err}").contains("Invalid header"));
    }
}
