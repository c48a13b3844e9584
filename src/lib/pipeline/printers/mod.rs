//! Stage 5: framed, buffered, per-record result output.
//!
//! One printer instance runs per stream and writes one output file per input
//! file, switching files as directed by the interval batches. Every encoding
//! implements the same four emit primitives plus the metadata the planner
//! needs, so the driver below is encoding-agnostic.

pub mod ascii;
pub mod binary;
pub mod boolean;
pub mod color;
pub mod packed_int;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::{Result, SbwtqError};
use crate::formats::NOT_FOUND;
use crate::headers;
use crate::logging::TimedEvent;
use crate::pipeline::batches::{IntervalBatch, InvalidCharsBatch, ResultsBatch};
use crate::pipeline::channel::SharedBatches;

/// The output encoding selected with `--print-mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintMode {
    Ascii,
    Binary,
    Bool,
    PackedInt,
    Csv,
}

impl PrintMode {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PrintMode::Ascii => "ascii",
            PrintMode::Binary => "binary",
            PrintMode::Bool => "bool",
            PrintMode::PackedInt => "packedint",
            PrintMode::Csv => "csv",
        }
    }

    /// Printer contribution to the planner's per-character bit cost in
    /// index mode. `Csv` is color-mode only.
    pub fn index_bits_per_element(&self, max_index: u64) -> Result<u64> {
        match self {
            PrintMode::Ascii => Ok(ascii::bits_per_element(max_index)),
            PrintMode::Binary => Ok(binary::bits_per_element()),
            PrintMode::Bool => Ok(boolean::bits_per_element()),
            PrintMode::PackedInt => Ok(packed_int::bits_per_element(max_index)),
            PrintMode::Csv => Err(SbwtqError::UnknownPrintMode("csv".to_string())),
        }
    }

    /// Printer contribution to the planner's per-sequence bit cost in
    /// index mode.
    pub fn index_bits_per_seq(&self) -> Result<u64> {
        match self {
            PrintMode::Ascii => Ok(ascii::bits_per_seq()),
            PrintMode::Binary => Ok(binary::bits_per_seq()),
            PrintMode::Bool => Ok(boolean::bits_per_seq()),
            PrintMode::PackedInt => Ok(packed_int::bits_per_seq()),
            PrintMode::Csv => Err(SbwtqError::UnknownPrintMode("csv".to_string())),
        }
    }

    /// Printer contribution to the planner's per-sequence bit cost in
    /// color mode. `Bool` is index-mode only.
    pub fn color_bits_per_seq(&self, num_colors: u64) -> Result<u64> {
        match self {
            PrintMode::Ascii => Ok((crate::formats::decimal_digits(num_colors) + 1) * 8 * num_colors + 8),
            PrintMode::Binary => Ok(64 * num_colors + 64),
            PrintMode::PackedInt => Ok(crate::formats::vlq_max_bytes(num_colors) * 8 * num_colors + 8),
            PrintMode::Csv => Ok(16 * num_colors + 8),
            PrintMode::Bool => Err(SbwtqError::UnknownPrintMode("bool".to_string())),
        }
    }
}

impl FromStr for PrintMode {
    type Err = SbwtqError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ascii" => Ok(PrintMode::Ascii),
            "binary" => Ok(PrintMode::Binary),
            "bool" => Ok(PrintMode::Bool),
            "packedint" => Ok(PrintMode::PackedInt),
            "csv" => Ok(PrintMode::Csv),
            other => Err(SbwtqError::UnknownPrintMode(other.to_string())),
        }
    }
}

/// The four emit primitives plus metadata, identical across encodings.
pub trait IndexResultsFormat: Send {
    /// File extension, dot included.
    fn extension(&self) -> &'static str;
    /// Name stored in the file header.
    fn format_name(&self) -> &'static str;
    /// Version stored in the file header.
    fn version(&self) -> &'static str {
        headers::HEADER_VERSION
    }
    fn with_result(&self, out: &mut Vec<u8>, value: u64);
    fn with_not_found(&self, out: &mut Vec<u8>);
    fn with_invalid(&self, out: &mut Vec<u8>);
    fn with_newline(&self, out: &mut Vec<u8>);
}

/// Build the formatter for an index-mode print mode.
pub fn index_formatter(mode: PrintMode) -> Result<Box<dyn IndexResultsFormat>> {
    match mode {
        PrintMode::Ascii => Ok(Box::new(ascii::AsciiIndexFormat)),
        PrintMode::Binary => Ok(Box::new(binary::BinaryIndexFormat)),
        PrintMode::Bool => Ok(Box::new(boolean::BoolIndexFormat)),
        PrintMode::PackedInt => Ok(Box::new(packed_int::PackedIntIndexFormat)),
        PrintMode::Csv => Err(SbwtqError::UnknownPrintMode("csv".to_string())),
    }
}

/// The index-mode results printer stage.
pub struct ResultsPrinter {
    stream_id: u64,
    results_input: Arc<SharedBatches<ResultsBatch>>,
    interval_input: Arc<SharedBatches<IntervalBatch>>,
    invalid_input: Arc<SharedBatches<InvalidCharsBatch>>,
    filenames: Vec<PathBuf>,
    kmer_size: u64,
    write_headers: bool,
    formatter: Box<dyn IndexResultsFormat>,
    /// Index of the output file the *next* `advance_file` call opens.
    next_file: usize,
    writer: Option<BufWriter<File>>,
    /// Reused per-record emit buffer.
    record_buffer: Vec<u8>,
    /// Reused invalid-character prefix sums, one entry per char plus one.
    invalid_prefix: Vec<u64>,
}

const WRITE_BUFFER_SIZE: usize = 1 << 20;

impl ResultsPrinter {
    pub fn new(
        stream_id: u64,
        results_input: Arc<SharedBatches<ResultsBatch>>,
        interval_input: Arc<SharedBatches<IntervalBatch>>,
        invalid_input: Arc<SharedBatches<InvalidCharsBatch>>,
        output_filenames: Vec<PathBuf>,
        kmer_size: u64,
        max_chars: usize,
        write_headers: bool,
        formatter: Box<dyn IndexResultsFormat>,
    ) -> Self {
        let filenames = output_filenames
            .into_iter()
            .map(|path| append_extension(path, formatter.extension()))
            .collect();
        Self {
            stream_id,
            results_input,
            interval_input,
            invalid_input,
            filenames,
            kmer_size,
            write_headers,
            formatter,
            next_file: 0,
            writer: None,
            record_buffer: Vec::with_capacity(256),
            invalid_prefix: Vec::with_capacity(max_chars + 1),
        }
    }

    /// Close the current output file and open the next one, if any.
    fn advance_file(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| {
                SbwtqError::io(&self.filenames[self.next_file - 1], e)
            })?;
        }
        if self.next_file >= self.filenames.len() {
            return Ok(());
        }
        let path = &self.filenames[self.next_file];
        let file = File::create(path).map_err(|e| SbwtqError::io(path, e))?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        if self.write_headers {
            headers::write_string(&mut writer, self.formatter.format_name())
                .and_then(|()| headers::write_string(&mut writer, self.formatter.version()))
                .map_err(|e| SbwtqError::io(path, e))?;
        }
        self.writer = Some(writer);
        self.next_file += 1;
        Ok(())
    }

    fn print_batch(
        &mut self,
        results: &[u64],
        intervals: &IntervalBatch,
        invalid_chars: &[u8],
    ) -> Result<()> {
        self.invalid_prefix.clear();
        self.invalid_prefix.push(0);
        let mut running = 0_u64;
        for &flag in invalid_chars {
            running += u64::from(flag);
            self.invalid_prefix.push(running);
        }

        let mut newfile_markers = intervals.strings_before_newfile.iter().copied();
        let mut until_newfile = newfile_markers.next().unwrap_or(u64::MAX);
        let mut char_offset = 0_usize;
        let mut result_index = 0_usize;
        for &length in &intervals.string_lengths {
            while until_newfile == 0 {
                self.advance_file()?;
                until_newfile = newfile_markers.next().unwrap_or(u64::MAX);
            }
            let kmers = length.saturating_sub(self.kmer_size - 1) as usize;
            self.record_buffer.clear();
            for kmer in 0..kmers {
                let window_start = char_offset + kmer;
                let window_end = window_start + self.kmer_size as usize;
                let window_is_invalid =
                    self.invalid_prefix[window_end] > self.invalid_prefix[window_start];
                let result = results[result_index];
                result_index += 1;
                if window_is_invalid {
                    self.formatter.with_invalid(&mut self.record_buffer);
                } else if result == NOT_FOUND {
                    self.formatter.with_not_found(&mut self.record_buffer);
                } else {
                    self.formatter.with_result(&mut self.record_buffer, result);
                }
            }
            self.formatter.with_newline(&mut self.record_buffer);
            if let Some(writer) = self.writer.as_mut() {
                writer.write_all(&self.record_buffer).map_err(|e| {
                    SbwtqError::io(&self.filenames[self.next_file - 1], e)
                })?;
            }
            char_offset += length as usize;
            if until_newfile != u64::MAX {
                until_newfile -= 1;
            }
        }
        while until_newfile == 0 {
            self.advance_file()?;
            until_newfile = newfile_markers.next().unwrap_or(u64::MAX);
        }
        Ok(())
    }

    /// The stage worker.
    pub fn run(&mut self) -> Result<()> {
        self.advance_file()?;
        let mut batch_id = 0_u64;
        loop {
            let Some(results) = self.results_input.next() else { break };
            let Some(intervals) = self.interval_input.next() else {
                self.results_input.recycle(results);
                break;
            };
            let Some(invalid) = self.invalid_input.next() else {
                self.results_input.recycle(results);
                self.interval_input.recycle(intervals);
                break;
            };
            let outcome = {
                let _event =
                    TimedEvent::start(&format!("ResultsPrinter_{}", self.stream_id), batch_id);
                self.print_batch(&results.results, &intervals, &invalid.invalid_chars)
            };
            self.results_input.recycle(results);
            self.interval_input.recycle(intervals);
            self.invalid_input.recycle(invalid);
            if let Err(e) = outcome {
                self.results_input.drain();
                self.interval_input.drain();
                self.invalid_input.drain();
                return Err(e);
            }
            batch_id += 1;
        }
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| SbwtqError::io(&self.filenames[self.next_file - 1], e))?;
        }
        Ok(())
    }
}

/// `results/sample1` with extension `.txt` becomes `results/sample1.txt`.
fn append_extension(path: PathBuf, extension: &str) -> PathBuf {
    let mut name = path.into_os_string();
    name.push(extension);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn run_printer(
        mode: PrintMode,
        results: Vec<Vec<u64>>,
        lengths: Vec<Vec<u64>>,
        newfiles: Vec<Vec<u64>>,
        invalid: Vec<Vec<u8>>,
        num_files: usize,
        kmer_size: u64,
        write_headers: bool,
    ) -> Vec<Vec<u8>> {
        let dir = TempDir::new().unwrap();
        let outputs: Vec<PathBuf> =
            (0..num_files).map(|i| dir.path().join(format!("out{i}"))).collect();
        let results_ring: Arc<SharedBatches<ResultsBatch>> =
            SharedBatches::with_batches(2, ResultsBatch::default);
        let interval_ring: Arc<SharedBatches<IntervalBatch>> =
            SharedBatches::with_batches(2, IntervalBatch::default);
        let invalid_ring: Arc<SharedBatches<InvalidCharsBatch>> =
            SharedBatches::with_batches(2, InvalidCharsBatch::default);
        let mut printer = ResultsPrinter::new(
            0,
            Arc::clone(&results_ring),
            Arc::clone(&interval_ring),
            Arc::clone(&invalid_ring),
            outputs.clone(),
            kmer_size,
            1024,
            write_headers,
            index_formatter(mode).unwrap(),
        );
        let extension = index_formatter(mode).unwrap().extension().to_string();
        thread::scope(|scope| {
            scope.spawn(move || {
                for ((results, (lengths, newfiles)), invalid) in results
                    .into_iter()
                    .zip(lengths.into_iter().zip(newfiles.into_iter()))
                    .zip(invalid.into_iter())
                {
                    let mut batch = results_ring.acquire();
                    batch.results = results;
                    results_ring.publish(batch);
                    let mut batch = interval_ring.acquire();
                    batch.string_lengths = lengths;
                    batch.strings_before_newfile = newfiles;
                    interval_ring.publish(batch);
                    let mut batch = invalid_ring.acquire();
                    batch.invalid_chars = invalid;
                    invalid_ring.publish(batch);
                }
                results_ring.finish();
                interval_ring.finish();
                invalid_ring.finish();
            });
            printer.run().unwrap();
        });
        outputs
            .iter()
            .map(|path| {
                let mut name = path.clone().into_os_string();
                name.push(&extension);
                std::fs::read(PathBuf::from(name)).unwrap()
            })
            .collect()
    }

    /// Four files, k = 3: empty records, an empty file, file switches
    /// mid-batch, and invalid-window masking all at once.
    #[test]
    fn test_ascii_framing_across_files() {
        let results = vec![vec![10, NOT_FOUND, 30, 40, 50, 60, 70, 80, 90, 100]];
        #[rustfmt::skip]
        let invalid = vec![vec![
            0, 0, 0, 0, // first string
            0, 0, 0, 0, 1, 0, // second string
            0, 0, 0, // third string
            0, 1, 0, 0, 0, // last string
        ]];
        let lengths = vec![vec![0, 0, 4, 0, 0, 6, 0, 0, 0, 3, 0, 5]];
        let newfiles = vec![vec![7, 0, 2, 3, u64::MAX]];
        let out = run_printer(
            PrintMode::Ascii,
            results,
            lengths,
            newfiles,
            invalid,
            4,
            3,
            false,
        );
        assert_eq!(out[0], b"\n\n10 -1 \n\n\n30 40 -2 -2 \n\n".to_vec());
        assert_eq!(out[1], b"".to_vec());
        assert_eq!(out[2], b"\n\n".to_vec());
        assert_eq!(out[3], b"70 \n\n-2 -2 100 \n".to_vec());
    }

    #[test]
    fn test_ascii_multiple_batches_match_single() {
        let results =
            vec![vec![10, NOT_FOUND], vec![30, 40, 50, 60, 70], vec![80, 90, 100]];
        let invalid = vec![
            vec![0, 0, 0, 0],
            vec![0, 0, 0, 0, 1, 0, 0, 0, 0],
            vec![0, 1, 0, 0, 0],
        ];
        let lengths = vec![vec![0, 0, 4, 0, 0], vec![6, 0, 0, 0, 3, 0], vec![5]];
        let newfiles =
            vec![vec![u64::MAX], vec![2, 0, 2, u64::MAX], vec![1, u64::MAX]];
        let out = run_printer(
            PrintMode::Ascii,
            results,
            lengths,
            newfiles,
            invalid,
            4,
            3,
            false,
        );
        assert_eq!(out[0], b"\n\n10 -1 \n\n\n30 40 -2 -2 \n\n".to_vec());
        assert_eq!(out[1], b"".to_vec());
        assert_eq!(out[2], b"\n\n".to_vec());
        assert_eq!(out[3], b"70 \n\n-2 -2 100 \n".to_vec());
    }

    #[test]
    fn test_binary_output_with_header() {
        let out = run_printer(
            PrintMode::Binary,
            vec![vec![5, NOT_FOUND]],
            vec![vec![4]],
            vec![vec![1, u64::MAX]],
            vec![vec![0, 0, 0, 0]],
            1,
            3,
            true,
        );
        let mut expected = Vec::new();
        headers::write_header(&mut expected, "binary").unwrap();
        expected.extend_from_slice(&5_u64.to_le_bytes());
        expected.extend_from_slice(&NOT_FOUND.to_le_bytes());
        expected.extend_from_slice(&crate::formats::NEWLINE.to_le_bytes());
        assert_eq!(out[0], expected);
    }

    #[test]
    fn test_bool_output_loses_index() {
        let out = run_printer(
            PrintMode::Bool,
            vec![vec![5, NOT_FOUND, 9]],
            vec![vec![5]],
            vec![vec![1, u64::MAX]],
            vec![vec![0, 0, 0, 0, 1]],
            1,
            3,
            false,
        );
        assert_eq!(out[0], b"0 1 2 \n".to_vec());
    }

    #[test]
    fn test_invalid_window_masks_search_result() {
        // one record "XACG" (4 chars, k=2): windows X A, A C, C G
        let out = run_printer(
            PrintMode::Ascii,
            vec![vec![7, 8, 9]],
            vec![vec![4]],
            vec![vec![1, u64::MAX]],
            vec![vec![1, 0, 0, 0]],
            1,
            2,
            false,
        );
        assert_eq!(out[0], b"-2 8 9 \n".to_vec());
    }
}
