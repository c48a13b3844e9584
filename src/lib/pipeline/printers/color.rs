//! Color-mode results printers.
//!
//! One line per sequence that has at least one eligible k-mer: the sorted
//! ids of every color whose score clears the threshold (ascii, binary,
//! packedint), or a full row of 0/1 cells (csv). A sequence whose k-mers
//! are all excluded by the `--include-not-found` / `--include-invalid`
//! flags produces no output line at all.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::{Result, SbwtqError};
use crate::formats::{vlq, NEWLINE};
use crate::headers;
use crate::logging::TimedEvent;
use crate::pipeline::batches::{ColorsBatch, SeqStatisticsBatch};
use crate::pipeline::channel::SharedBatches;
use crate::pipeline::printers::PrintMode;

const WRITE_BUFFER_SIZE: usize = 1 << 20;

/// Per-encoding serialization of one sequence's passing colors.
pub trait ColorResultsFormat: Send {
    /// File extension, dot included.
    fn extension(&self) -> &'static str;
    /// Whole-file header bytes (empty when headers are disabled).
    fn file_header(&self, out: &mut Vec<u8>, num_colors: u64);
    /// Serialize one sequence. A color passes when its score reaches
    /// `min_score`.
    fn write_seq(&self, out: &mut Vec<u8>, scores: &[u64], min_score: f64);
}

pub struct AsciiColorFormat;

impl ColorResultsFormat for AsciiColorFormat {
    fn extension(&self) -> &'static str {
        ".txt"
    }

    fn file_header(&self, out: &mut Vec<u8>, _num_colors: u64) {
        headers::write_string(out, "ascii").expect("writing to a Vec cannot fail");
        headers::write_string(out, headers::HEADER_VERSION)
            .expect("writing to a Vec cannot fail");
    }

    fn write_seq(&self, out: &mut Vec<u8>, scores: &[u64], min_score: f64) {
        for (color, &score) in scores.iter().enumerate() {
            if score as f64 >= min_score {
                write!(out, "{color} ").expect("writing to a Vec cannot fail");
            }
        }
        out.push(b'\n');
    }
}

pub struct BinaryColorFormat;

impl ColorResultsFormat for BinaryColorFormat {
    fn extension(&self) -> &'static str {
        ".bin"
    }

    fn file_header(&self, out: &mut Vec<u8>, _num_colors: u64) {
        headers::write_string(out, "binary").expect("writing to a Vec cannot fail");
        headers::write_string(out, headers::HEADER_VERSION)
            .expect("writing to a Vec cannot fail");
    }

    fn write_seq(&self, out: &mut Vec<u8>, scores: &[u64], min_score: f64) {
        for (color, &score) in scores.iter().enumerate() {
            if score as f64 >= min_score {
                out.extend_from_slice(&(color as u64).to_le_bytes());
            }
        }
        out.extend_from_slice(&NEWLINE.to_le_bytes());
    }
}

pub struct PackedIntColorFormat;

impl ColorResultsFormat for PackedIntColorFormat {
    fn extension(&self) -> &'static str {
        ".pint"
    }

    fn file_header(&self, out: &mut Vec<u8>, _num_colors: u64) {
        headers::write_string(out, "packedint").expect("writing to a Vec cannot fail");
        headers::write_string(out, headers::HEADER_VERSION)
            .expect("writing to a Vec cannot fail");
    }

    fn write_seq(&self, out: &mut Vec<u8>, scores: &[u64], min_score: f64) {
        for (color, &score) in scores.iter().enumerate() {
            if score as f64 >= min_score {
                vlq::encode_into(out, color as u64);
            }
        }
        out.push(vlq::NEWLINE_BYTE);
    }
}

pub struct CsvColorFormat;

impl ColorResultsFormat for CsvColorFormat {
    fn extension(&self) -> &'static str {
        ".csv"
    }

    fn file_header(&self, out: &mut Vec<u8>, num_colors: u64) {
        for color in 0..num_colors {
            if color > 0 {
                out.push(b',');
            }
            write!(out, "color_{color}").expect("writing to a Vec cannot fail");
        }
        out.push(b'\n');
    }

    fn write_seq(&self, out: &mut Vec<u8>, scores: &[u64], min_score: f64) {
        for (color, &score) in scores.iter().enumerate() {
            if color > 0 {
                out.push(b',');
            }
            out.push(if score as f64 >= min_score { b'1' } else { b'0' });
        }
        out.push(b'\n');
    }
}

/// Build the formatter for a color-mode print mode.
pub fn color_formatter(mode: PrintMode) -> Result<Box<dyn ColorResultsFormat>> {
    match mode {
        PrintMode::Ascii => Ok(Box::new(AsciiColorFormat)),
        PrintMode::Binary => Ok(Box::new(BinaryColorFormat)),
        PrintMode::PackedInt => Ok(Box::new(PackedIntColorFormat)),
        PrintMode::Csv => Ok(Box::new(CsvColorFormat)),
        PrintMode::Bool => Err(SbwtqError::UnknownPrintMode("bool".to_string())),
    }
}

/// The color-mode results printer stage.
pub struct ColorResultsPrinter {
    stream_id: u64,
    statistics_input: Arc<SharedBatches<SeqStatisticsBatch>>,
    colors_input: Arc<SharedBatches<ColorsBatch>>,
    filenames: Vec<PathBuf>,
    num_colors: u64,
    threshold: f64,
    include_not_found: bool,
    include_invalid: bool,
    write_headers: bool,
    formatter: Box<dyn ColorResultsFormat>,
    next_file: usize,
    writer: Option<BufWriter<File>>,
    seq_buffer: Vec<u8>,
}

impl ColorResultsPrinter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream_id: u64,
        statistics_input: Arc<SharedBatches<SeqStatisticsBatch>>,
        colors_input: Arc<SharedBatches<ColorsBatch>>,
        output_filenames: Vec<PathBuf>,
        num_colors: u64,
        threshold: f64,
        include_not_found: bool,
        include_invalid: bool,
        write_headers: bool,
        formatter: Box<dyn ColorResultsFormat>,
    ) -> Self {
        let filenames = output_filenames
            .into_iter()
            .map(|path| {
                let mut name = path.into_os_string();
                name.push(formatter.extension());
                PathBuf::from(name)
            })
            .collect();
        Self {
            stream_id,
            statistics_input,
            colors_input,
            filenames,
            num_colors,
            threshold,
            include_not_found,
            include_invalid,
            write_headers,
            formatter,
            next_file: 0,
            writer: None,
            seq_buffer: Vec::with_capacity(1024),
        }
    }

    fn advance_file(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| SbwtqError::io(&self.filenames[self.next_file - 1], e))?;
        }
        if self.next_file >= self.filenames.len() {
            return Ok(());
        }
        let path = &self.filenames[self.next_file];
        let file = File::create(path).map_err(|e| SbwtqError::io(path, e))?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        if self.write_headers {
            let mut header = Vec::new();
            self.formatter.file_header(&mut header, self.num_colors);
            writer.write_all(&header).map_err(|e| SbwtqError::io(path, e))?;
        }
        self.writer = Some(writer);
        self.next_file += 1;
        Ok(())
    }

    fn print_batch(&mut self, statistics: &SeqStatisticsBatch, colors: &[u64]) -> Result<()> {
        let num_colors = self.num_colors as usize;
        let mut newfile_markers = statistics.seqs_before_newfile.iter().copied();
        let mut until_newfile = newfile_markers.next().unwrap_or(u64::MAX);
        for seq in 0..statistics.num_seqs() {
            while until_newfile == 0 {
                self.advance_file()?;
                until_newfile = newfile_markers.next().unwrap_or(u64::MAX);
            }
            let mut eligible = statistics.found_idxs[seq];
            if self.include_not_found {
                eligible += statistics.not_found_idxs[seq];
            }
            if self.include_invalid {
                eligible += statistics.invalid_idxs[seq];
            }
            if eligible > 0 {
                let min_score = self.threshold * eligible as f64;
                let scores = &colors[seq * num_colors..(seq + 1) * num_colors];
                self.seq_buffer.clear();
                self.formatter.write_seq(&mut self.seq_buffer, scores, min_score);
                if let Some(writer) = self.writer.as_mut() {
                    writer
                        .write_all(&self.seq_buffer)
                        .map_err(|e| SbwtqError::io(&self.filenames[self.next_file - 1], e))?;
                }
            }
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
            let Some(statistics) = self.statistics_input.next() else { break };
            let Some(colors) = self.colors_input.next() else {
                self.statistics_input.recycle(statistics);
                break;
            };
            let outcome = {
                let _event =
                    TimedEvent::start(&format!("ResultsPrinter_{}", self.stream_id), batch_id);
                self.print_batch(&statistics, &colors.results)
            };
            self.statistics_input.recycle(statistics);
            self.colors_input.recycle(colors);
            if let Err(e) = outcome {
                self.statistics_input.drain();
                self.colors_input.drain();
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    #[allow(clippy::too_many_arguments)]
    fn run_printer(
        mode: PrintMode,
        num_colors: u64,
        threshold: f64,
        include_not_found: bool,
        include_invalid: bool,
        found: Vec<u64>,
        not_found: Vec<u64>,
        invalid: Vec<u64>,
        scores: Vec<u64>,
        write_headers: bool,
    ) -> Vec<u8> {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("colors");
        let statistics_ring: Arc<SharedBatches<SeqStatisticsBatch>> =
            SharedBatches::with_batches(2, SeqStatisticsBatch::default);
        let colors_ring: Arc<SharedBatches<ColorsBatch>> =
            SharedBatches::with_batches(2, ColorsBatch::default);
        let formatter = color_formatter(mode).unwrap();
        let extension = formatter.extension().to_string();
        let mut printer = ColorResultsPrinter::new(
            0,
            Arc::clone(&statistics_ring),
            Arc::clone(&colors_ring),
            vec![output.clone()],
            num_colors,
            threshold,
            include_not_found,
            include_invalid,
            write_headers,
            formatter,
        );
        thread::scope(|scope| {
            scope.spawn(move || {
                let num_seqs = found.len() as u64;
                let mut batch = statistics_ring.acquire();
                batch.reset();
                batch.found_idxs = found;
                batch.not_found_idxs = not_found;
                batch.invalid_idxs = invalid;
                batch.colored_seq_id = (0..num_seqs).collect();
                batch.seqs_before_newfile = vec![num_seqs, u64::MAX];
                statistics_ring.publish(batch);
                statistics_ring.finish();
                let mut batch = colors_ring.acquire();
                batch.reset();
                batch.results = scores;
                colors_ring.publish(batch);
                colors_ring.finish();
            });
            printer.run().unwrap();
        });
        let mut name = output.into_os_string();
        name.push(extension);
        std::fs::read(PathBuf::from(name)).unwrap()
    }

    #[test]
    fn test_ascii_threshold_selects_colors() {
        // 2 seqs, 3 colors; seq 0: 4 found k-mers, scores 4,2,0;
        // seq 1: 2 found, scores 2,2,1
        let out = run_printer(
            PrintMode::Ascii,
            3,
            0.8,
            false,
            false,
            vec![4, 2],
            vec![0, 0],
            vec![0, 0],
            vec![4, 2, 0, 2, 2, 1],
            false,
        );
        assert_eq!(out, b"0 \n0 1 \n".to_vec());
    }

    #[test]
    fn test_fully_not_found_seq_is_suppressed() {
        let out = run_printer(
            PrintMode::Ascii,
            2,
            0.5,
            false,
            false,
            vec![0, 1],
            vec![3, 0],
            vec![0, 0],
            vec![0, 0, 1, 0],
            false,
        );
        // seq 0 has no eligible k-mers and vanishes entirely
        assert_eq!(out, b"0 \n".to_vec());
    }

    #[test]
    fn test_include_not_found_changes_the_divisor() {
        // seq with 1 found and 3 not-found k-mers, color score 1
        let strict = run_printer(
            PrintMode::Ascii,
            1,
            0.5,
            true,
            false,
            vec![1],
            vec![3],
            vec![0],
            vec![1],
            false,
        );
        // divisor 4, score 1 < 2 -> no color passes
        assert_eq!(strict, b"\n".to_vec());
        let lenient = run_printer(
            PrintMode::Ascii,
            1,
            0.5,
            false,
            false,
            vec![1],
            vec![3],
            vec![0],
            vec![1],
            false,
        );
        // divisor 1, score 1 >= 0.5 -> color 0 passes
        assert_eq!(lenient, b"0 \n".to_vec());
    }

    #[test]
    fn test_csv_rows() {
        let out = run_printer(
            PrintMode::Csv,
            3,
            0.5,
            false,
            false,
            vec![2],
            vec![0],
            vec![0],
            vec![2, 1, 0],
            true,
        );
        assert_eq!(out, b"color_0,color_1,color_2\n1,1,0\n".to_vec());
    }

    #[test]
    fn test_binary_colors_with_newline_sentinel() {
        let out = run_printer(
            PrintMode::Binary,
            2,
            1.0,
            false,
            false,
            vec![1],
            vec![0],
            vec![0],
            vec![1, 0],
            false,
        );
        let mut expected = Vec::new();
        expected.extend_from_slice(&0_u64.to_le_bytes());
        expected.extend_from_slice(&NEWLINE.to_le_bytes());
        assert_eq!(out, expected);
    }
}
