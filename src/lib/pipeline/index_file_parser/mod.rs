//! Color-mode entry point: reads previously written index result files.
//!
//! The encoding of each input file is taken from its header: the first
//! length-prefixed string selects the codec, and files with no parseable
//! header fall back to the headerless themisto format. Decoded records feed
//! two synchronized batches: warp-packed found indexes for the color
//! searcher, and per-sequence statistics for the printer.
//!
//! Format errors here are fatal for the run (the file path and byte offset
//! are in the error); an unopenable input file is skipped like in the
//! sequence parser, leaving its paired output file empty.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::Result;
use crate::formats::reader::SequenceReader;
use crate::formats::{ResultFormat, INVALID, NOT_FOUND};
use crate::gpu::WARP_SIZE;
use crate::headers::MAX_HEADER_LENGTH;
use crate::logging::TimedEvent;
use crate::pipeline::batches::{IndexesBatch, SeqStatisticsBatch};
use crate::pipeline::channel::SharedBatches;

/// Decide the codec of `path` from its leading header string, falling back
/// to themisto when the first bytes do not form one.
pub fn sniff_format(path: &Path) -> std::io::Result<ResultFormat> {
    let mut reader = BufReader::new(File::open(path)?);
    let Ok(length) = reader.read_u64::<LittleEndian>() else {
        return Ok(ResultFormat::Themisto);
    };
    if length > MAX_HEADER_LENGTH {
        return Ok(ResultFormat::Themisto);
    }
    let mut name = vec![0_u8; length as usize];
    if reader.read_exact(&mut name).is_err() {
        return Ok(ResultFormat::Themisto);
    }
    Ok(match name.as_slice() {
        b"ascii" => ResultFormat::Ascii,
        b"binary" => ResultFormat::Binary,
        b"packedint" => ResultFormat::PackedInt,
        _ => ResultFormat::Themisto,
    })
}

/// The index file parser stage and its two output rings.
pub struct IndexFileParser {
    stream_id: u64,
    filenames: Vec<PathBuf>,
    max_indexes: usize,
    max_seqs: usize,
    indexes_ring: Arc<SharedBatches<IndexesBatch>>,
    statistics_ring: Arc<SharedBatches<SeqStatisticsBatch>>,
}

struct OpenBatches {
    indexes: IndexesBatch,
    statistics: SeqStatisticsBatch,
    seqs_since_newfile: u64,
}

impl IndexFileParser {
    #[must_use]
    pub fn new(
        stream_id: u64,
        filenames: Vec<PathBuf>,
        max_indexes: usize,
        max_seqs: usize,
        max_batches: usize,
    ) -> Self {
        Self {
            stream_id,
            filenames,
            max_indexes,
            max_seqs,
            indexes_ring: SharedBatches::with_batches(max_batches, || {
                IndexesBatch::with_capacity(max_indexes, max_seqs)
            }),
            statistics_ring: SharedBatches::with_batches(max_batches, || {
                SeqStatisticsBatch::with_capacity(max_seqs)
            }),
        }
    }

    /// Ring consumed by the color searcher.
    #[must_use]
    pub fn indexes_batches(&self) -> Arc<SharedBatches<IndexesBatch>> {
        Arc::clone(&self.indexes_ring)
    }

    /// Ring consumed by the color results printer.
    #[must_use]
    pub fn seq_statistics_batches(&self) -> Arc<SharedBatches<SeqStatisticsBatch>> {
        Arc::clone(&self.statistics_ring)
    }

    fn acquire(&self) -> OpenBatches {
        let mut open = OpenBatches {
            indexes: self.indexes_ring.acquire(),
            statistics: self.statistics_ring.acquire(),
            seqs_since_newfile: 0,
        };
        open.indexes.reset();
        open.statistics.reset();
        open
    }

    fn publish(&self, mut open: OpenBatches, batch_id: u64) {
        let _event = TimedEvent::start(&format!("IndexFileParser_{}", self.stream_id), batch_id);
        open.statistics.seqs_before_newfile.push(u64::MAX);
        self.indexes_ring.publish(open.indexes);
        self.statistics_ring.publish(open.statistics);
    }

    /// Room one more record with `found` found indexes would need.
    fn record_fits(&self, open: &OpenBatches, found: usize) -> bool {
        let padded = found.next_multiple_of(WARP_SIZE as usize);
        open.indexes.warped_indexes.len() + padded <= self.max_indexes
            && open.statistics.num_seqs() < self.max_seqs
    }

    /// The stage worker.
    pub fn run(&self) -> Result<()> {
        let mut batch_id = 0_u64;
        let mut seq_id = 0_u64;
        let mut open = self.acquire();
        let mut record = Vec::new();
        let mut found = Vec::new();
        for path in &self.filenames {
            let format = match sniff_format(path) {
                Ok(format) => format,
                Err(_) => {
                    eprintln!("The file {} cannot be opened", path.display());
                    open.statistics.seqs_before_newfile.push(open.seqs_since_newfile);
                    open.seqs_since_newfile = 0;
                    continue;
                }
            };
            let mut reader = match SequenceReader::open(path, format) {
                Ok(reader) => reader,
                Err(crate::errors::SbwtqError::Io { .. }) => {
                    eprintln!("The file {} cannot be opened", path.display());
                    open.statistics.seqs_before_newfile.push(open.seqs_since_newfile);
                    open.seqs_since_newfile = 0;
                    continue;
                }
                Err(e) => {
                    self.indexes_ring.finish();
                    self.statistics_ring.finish();
                    return Err(e);
                }
            };
            loop {
                let more = match reader.read_record(&mut record) {
                    Ok(more) => more,
                    Err(e) => {
                        // fatal: close the rings so downstream terminates
                        self.indexes_ring.finish();
                        self.statistics_ring.finish();
                        return Err(e);
                    }
                };
                if !more {
                    break;
                }
                found.clear();
                let mut not_found = 0_u64;
                let mut invalid = 0_u64;
                for &value in &record {
                    match value {
                        NOT_FOUND => not_found += 1,
                        INVALID => invalid += 1,
                        value => found.push(value),
                    }
                }
                let padded = found.len().next_multiple_of(WARP_SIZE as usize);
                if padded > self.max_indexes {
                    self.indexes_ring.finish();
                    self.statistics_ring.finish();
                    return Err(crate::errors::SbwtqError::format(
                        path,
                        reader.offset(),
                        "Sequence has too many indexes for one batch",
                    ));
                }
                if !self.record_fits(&open, found.len()) {
                    self.publish(open, batch_id);
                    batch_id += 1;
                    open = self.acquire();
                }
                open.statistics.push_seq(seq_id, found.len() as u64, not_found, invalid);
                open.indexes.warped_indexes.extend_from_slice(&found);
                open.indexes.end_seq();
                seq_id += 1;
                open.seqs_since_newfile += 1;
            }
            open.statistics.seqs_before_newfile.push(open.seqs_since_newfile);
            open.seqs_since_newfile = 0;
        }
        self.publish(open, batch_id);
        self.indexes_ring.finish();
        self.statistics_ring.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{NEWLINE, PAD};
    use crate::headers;
    use std::io::Write;
    use std::thread;
    use tempfile::NamedTempFile;

    fn binary_file(records: &[Vec<u64>]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let mut bytes = Vec::new();
        headers::write_header(&mut bytes, "binary").unwrap();
        for record in records {
            for value in record {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            bytes.extend_from_slice(&NEWLINE.to_le_bytes());
        }
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    struct Collected {
        warped: Vec<Vec<u64>>,
        intervals: Vec<Vec<u64>>,
        found: Vec<Vec<u64>>,
        not_found: Vec<Vec<u64>>,
        invalid: Vec<Vec<u64>>,
        seq_ids: Vec<Vec<u64>>,
    }

    fn run_parser(filenames: Vec<PathBuf>, max_indexes: usize, max_seqs: usize) -> Collected {
        let parser = IndexFileParser::new(0, filenames, max_indexes, max_seqs, 2);
        let indexes = parser.indexes_batches();
        let statistics = parser.seq_statistics_batches();
        thread::scope(|scope| {
            scope.spawn(|| parser.run().unwrap());
            let mut out = Collected {
                warped: Vec::new(),
                intervals: Vec::new(),
                found: Vec::new(),
                not_found: Vec::new(),
                invalid: Vec::new(),
                seq_ids: Vec::new(),
            };
            while let Some(batch) = indexes.next() {
                out.warped.push(batch.warped_indexes.clone());
                out.intervals.push(batch.warps_intervals.clone());
                indexes.recycle(batch);
                let batch = statistics.next().unwrap();
                out.found.push(batch.found_idxs.clone());
                out.not_found.push(batch.not_found_idxs.clone());
                out.invalid.push(batch.invalid_idxs.clone());
                out.seq_ids.push(batch.colored_seq_id.clone());
                statistics.recycle(batch);
            }
            out
        })
    }

    #[test]
    fn test_sniff_format() {
        let file = binary_file(&[vec![1]]);
        assert_eq!(sniff_format(file.path()).unwrap(), ResultFormat::Binary);
        let mut themisto = NamedTempFile::new().unwrap();
        themisto.write_all(b"0 1 2\n").unwrap();
        assert_eq!(sniff_format(themisto.path()).unwrap(), ResultFormat::Themisto);
    }

    #[test]
    fn test_binary_file_fills_statistics_and_warps() {
        let file =
            binary_file(&[vec![10, NOT_FOUND, 20, INVALID], vec![], vec![30]]);
        let out = run_parser(vec![file.path().to_path_buf()], 1024, 16);
        assert_eq!(out.intervals, vec![vec![0, 1, 1, 2]]);
        assert_eq!(out.found, vec![vec![2, 0, 1]]);
        assert_eq!(out.not_found, vec![vec![1, 0, 0]]);
        assert_eq!(out.invalid, vec![vec![1, 0, 0]]);
        assert_eq!(out.seq_ids, vec![vec![0, 1, 2]]);
        let warped = &out.warped[0];
        assert_eq!(warped.len(), 64);
        assert_eq!(&warped[0..3], &[10, 20, PAD]);
        assert_eq!(warped[32], 30);
    }

    #[test]
    fn test_batches_split_on_max_seqs() {
        let file = binary_file(&[vec![1], vec![2], vec![3]]);
        let out = run_parser(vec![file.path().to_path_buf()], 1024, 2);
        assert_eq!(out.seq_ids, vec![vec![0, 1], vec![2]]);
        assert_eq!(out.intervals, vec![vec![0, 1, 2], vec![0, 1]]);
    }

    #[test]
    fn test_themisto_file_counts_everything_found() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"0 5 7\n1\n").unwrap();
        file.flush().unwrap();
        let out = run_parser(vec![file.path().to_path_buf()], 1024, 16);
        assert_eq!(out.found, vec![vec![2, 0]]);
        assert_eq!(out.not_found, vec![vec![0, 0]]);
    }
}
