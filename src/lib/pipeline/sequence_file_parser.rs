//! Stage 1 of index mode: FASTA/FASTQ records into character batches.
//!
//! Emits three synchronized batches per step: the raw character buffer, the
//! record boundaries within it, and the framing intervals the printer needs.
//! Records are never split across batches; a record longer than the batch
//! budget is dropped with a message on standard error, and an unopenable
//! input file is skipped the same way (its paired output file stays empty).

use seq_io::fasta;
use seq_io::fastq;
use seq_io::fastq::Record as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::Result;
use crate::logging::TimedEvent;
use crate::pipeline::batches::{IntervalBatch, StringBreakBatch, StringSequenceBatch};
use crate::pipeline::channel::SharedBatches;

const READ_BUFFER_SIZE: usize = 1 << 20;

/// FASTA or FASTQ, sniffed from the first byte of each file.
enum RecordReader {
    Fasta(fasta::Reader<BufReader<File>>),
    Fastq(fastq::Reader<BufReader<File>>),
}

impl RecordReader {
    fn open(path: &PathBuf) -> std::io::Result<Option<Self>> {
        let file = File::open(path)?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
        let first = reader.fill_buf()?.first().copied();
        Ok(match first {
            Some(b'@') => Some(RecordReader::Fastq(fastq::Reader::new(reader))),
            Some(_) => Some(RecordReader::Fasta(fasta::Reader::new(reader))),
            None => None, // empty file: zero records
        })
    }

    /// Next record's sequence bytes, or a per-record parse error.
    fn next_seq(&mut self) -> Option<std::result::Result<Vec<u8>, String>> {
        match self {
            RecordReader::Fasta(reader) => reader.next().map(|record| {
                record.map(|r| r.full_seq().into_owned()).map_err(|e| e.to_string())
            }),
            RecordReader::Fastq(reader) => reader.next().map(|record| {
                record.map(|r| r.seq().to_vec()).map_err(|e| e.to_string())
            }),
        }
    }
}

/// The sequence file parser stage and the three rings it owns.
pub struct SequenceFileParser {
    stream_id: u64,
    filenames: Vec<PathBuf>,
    max_chars: usize,
    max_seqs: usize,
    string_ring: Arc<SharedBatches<StringSequenceBatch>>,
    break_ring: Arc<SharedBatches<StringBreakBatch>>,
    interval_ring: Arc<SharedBatches<IntervalBatch>>,
}

/// The triple of batches filled together during one step.
struct OpenBatches {
    strings: StringSequenceBatch,
    breaks: StringBreakBatch,
    intervals: IntervalBatch,
    /// Records added since the last file-end marker.
    seqs_since_newfile: u64,
}

impl SequenceFileParser {
    #[must_use]
    pub fn new(
        stream_id: u64,
        filenames: Vec<PathBuf>,
        max_chars: usize,
        max_seqs: usize,
        max_batches: usize,
    ) -> Self {
        Self {
            stream_id,
            filenames,
            max_chars,
            max_seqs,
            string_ring: SharedBatches::with_batches(max_batches, || {
                StringSequenceBatch::with_capacity(max_chars)
            }),
            break_ring: SharedBatches::with_batches(max_batches, || {
                StringBreakBatch::with_capacity(max_seqs)
            }),
            interval_ring: SharedBatches::with_batches(max_batches, || {
                IntervalBatch::with_capacity(max_seqs)
            }),
        }
    }

    /// Ring consumed by the seq-to-bits converter.
    #[must_use]
    pub fn string_sequence_batches(&self) -> Arc<SharedBatches<StringSequenceBatch>> {
        Arc::clone(&self.string_ring)
    }

    /// Ring consumed by the positions builder.
    #[must_use]
    pub fn string_break_batches(&self) -> Arc<SharedBatches<StringBreakBatch>> {
        Arc::clone(&self.break_ring)
    }

    /// Ring consumed by the results printer.
    #[must_use]
    pub fn interval_batches(&self) -> Arc<SharedBatches<IntervalBatch>> {
        Arc::clone(&self.interval_ring)
    }

    fn acquire(&self) -> OpenBatches {
        let mut open = OpenBatches {
            strings: self.string_ring.acquire(),
            breaks: self.break_ring.acquire(),
            intervals: self.interval_ring.acquire(),
            seqs_since_newfile: 0,
        };
        open.strings.reset();
        open.breaks.reset();
        open.intervals.reset();
        open
    }

    fn publish(&self, mut open: OpenBatches, batch_id: u64) {
        let _event = TimedEvent::start(&format!("SequenceFileParser_{}", self.stream_id), batch_id);
        open.breaks.string_size = open.strings.buffer.len() as u64;
        open.intervals.strings_before_newfile.push(u64::MAX);
        self.string_ring.publish(open.strings);
        self.break_ring.publish(open.breaks);
        self.interval_ring.publish(open.intervals);
    }

    /// The stage worker: read every file, emit batches, close the rings.
    pub fn run(&self) -> Result<()> {
        let mut batch_id = 0_u64;
        let mut open = self.acquire();
        for path in &self.filenames {
            let mut reader = match RecordReader::open(path) {
                Ok(Some(reader)) => Some(reader),
                Ok(None) => None,
                Err(_) => {
                    eprintln!("The file {} cannot be opened", path.display());
                    None
                }
            };
            let mut record_index = 0_u64;
            while let Some(record) = reader.as_mut().and_then(RecordReader::next_seq) {
                record_index += 1;
                let seq = match record {
                    Ok(seq) => seq,
                    Err(message) => {
                        eprintln!(
                            "Error parsing record {} of file {}: {}",
                            record_index,
                            path.display(),
                            message
                        );
                        break;
                    }
                };
                if seq.len() > self.max_chars {
                    eprintln!(
                        "The string at position {} in file {} is too large",
                        record_index,
                        path.display()
                    );
                    continue;
                }
                let batch_is_full = open.strings.buffer.len() + seq.len() > self.max_chars
                    || open.intervals.string_lengths.len() >= self.max_seqs;
                if batch_is_full {
                    self.publish(open, batch_id);
                    batch_id += 1;
                    open = self.acquire();
                }
                open.strings.buffer.extend_from_slice(&seq);
                open.breaks.chars_before_newline.push(open.strings.buffer.len() as u64);
                open.intervals.string_lengths.push(seq.len() as u64);
                open.seqs_since_newfile += 1;
            }
            open.intervals.strings_before_newfile.push(open.seqs_since_newfile);
            open.seqs_since_newfile = 0;
        }
        self.publish(open, batch_id);
        self.string_ring.finish();
        self.break_ring.finish();
        self.interval_ring.finish();
        Ok(())
    }
}
