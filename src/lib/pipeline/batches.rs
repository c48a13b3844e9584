//! Batch objects carried between pipeline stages.
//!
//! Each batch type is owned by the stage that writes it and handed
//! downstream read-only through a ring; all vectors are pre-allocated to the
//! planner's capacities and `reset` between uses, so nothing allocates on
//! the hot path.

use crate::formats::PAD;
use crate::gpu::WARP_SIZE;

/// Concatenated raw record characters for one batch.
#[derive(Debug, Default)]
pub struct StringSequenceBatch {
    /// Record bytes back to back, no separators.
    pub buffer: Vec<u8>,
}

impl StringSequenceBatch {
    #[must_use]
    pub fn with_capacity(max_chars: usize) -> Self {
        Self { buffer: Vec::with_capacity(max_chars) }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Record boundaries within the character buffer.
#[derive(Debug, Default)]
pub struct StringBreakBatch {
    /// Cumulative (exclusive) end offset of each record.
    pub chars_before_newline: Vec<u64>,
    /// Total characters in the batch buffer.
    pub string_size: u64,
}

impl StringBreakBatch {
    #[must_use]
    pub fn with_capacity(max_seqs: usize) -> Self {
        Self { chars_before_newline: Vec::with_capacity(max_seqs), string_size: 0 }
    }

    pub fn reset(&mut self) {
        self.chars_before_newline.clear();
        self.string_size = 0;
    }
}

/// Per-record lengths and file-boundary markers used for output framing.
#[derive(Debug, Default)]
pub struct IntervalBatch {
    /// Character length of every record in the batch, empties included.
    pub string_lengths: Vec<u64>,
    /// Number of records before each switch to a new output file;
    /// terminated by a `u64::MAX` sentinel.
    pub strings_before_newfile: Vec<u64>,
}

impl IntervalBatch {
    #[must_use]
    pub fn with_capacity(max_seqs: usize) -> Self {
        Self {
            string_lengths: Vec::with_capacity(max_seqs),
            strings_before_newfile: Vec::with_capacity(8),
        }
    }

    pub fn reset(&mut self) {
        self.string_lengths.clear();
        self.strings_before_newfile.clear();
    }
}

/// 2-bit packed characters, 32 bases per word, first base in the two most
/// significant bits.
#[derive(Debug, Default)]
pub struct BitsBatch {
    pub bits: Vec<u64>,
}

impl BitsBatch {
    #[must_use]
    pub fn with_capacity(max_chars: usize) -> Self {
        Self { bits: Vec::with_capacity(max_chars.div_ceil(32)) }
    }

    pub fn reset(&mut self) {
        self.bits.clear();
    }
}

/// One byte per input character, 1 where the character is not ACGT.
#[derive(Debug, Default)]
pub struct InvalidCharsBatch {
    pub invalid_chars: Vec<u8>,
}

impl InvalidCharsBatch {
    #[must_use]
    pub fn with_capacity(max_chars: usize) -> Self {
        Self { invalid_chars: Vec::with_capacity(max_chars) }
    }

    pub fn reset(&mut self) {
        self.invalid_chars.clear();
    }
}

/// K-mer start offsets into the packed character stream.
#[derive(Debug, Default)]
pub struct PositionsBatch {
    pub positions: Vec<u64>,
}

impl PositionsBatch {
    #[must_use]
    pub fn with_capacity(max_chars: usize) -> Self {
        Self { positions: Vec::with_capacity(max_chars) }
    }

    pub fn reset(&mut self) {
        self.positions.clear();
    }
}

/// One search result per k-mer position: an SBWT column index or
/// [`crate::formats::NOT_FOUND`].
#[derive(Debug, Default)]
pub struct ResultsBatch {
    pub results: Vec<u64>,
}

impl ResultsBatch {
    #[must_use]
    pub fn with_capacity(max_chars: usize) -> Self {
        Self { results: Vec::with_capacity(max_chars) }
    }

    pub fn reset(&mut self) {
        self.results.clear();
    }
}

/// Warp-packed SBWT column indexes for the color search.
#[derive(Debug, Default)]
pub struct IndexesBatch {
    /// Found indexes, each sequence padded with [`PAD`] to a warp multiple.
    pub warped_indexes: Vec<u64>,
    /// Cumulative warp count before each sequence; always starts at 0.
    pub warps_intervals: Vec<u64>,
}

impl IndexesBatch {
    #[must_use]
    pub fn with_capacity(max_indexes: usize, max_seqs: usize) -> Self {
        let mut batch = Self {
            warped_indexes: Vec::with_capacity(max_indexes),
            warps_intervals: Vec::with_capacity(max_seqs + 1),
        };
        batch.reset();
        batch
    }

    pub fn reset(&mut self) {
        self.warped_indexes.clear();
        self.warps_intervals.clear();
        self.warps_intervals.push(0);
    }

    /// Pad the current sequence to a warp boundary and close its interval.
    pub fn end_seq(&mut self) {
        while self.warped_indexes.len() % WARP_SIZE as usize != 0 {
            self.warped_indexes.push(PAD);
        }
        self.warps_intervals.push(self.warped_indexes.len() as u64 / WARP_SIZE);
    }
}

/// Per-sequence result statistics from the index file parser.
#[derive(Debug, Default)]
pub struct SeqStatisticsBatch {
    /// Found k-mers per sequence.
    pub found_idxs: Vec<u64>,
    /// Not-found k-mers per sequence.
    pub not_found_idxs: Vec<u64>,
    /// Invalid k-mers per sequence.
    pub invalid_idxs: Vec<u64>,
    /// Global id of each sequence in this batch.
    pub colored_seq_id: Vec<u64>,
    /// Sequences before each switch to a new output file; `u64::MAX` ends
    /// the list (same convention as [`IntervalBatch`]).
    pub seqs_before_newfile: Vec<u64>,
}

impl SeqStatisticsBatch {
    #[must_use]
    pub fn with_capacity(max_seqs: usize) -> Self {
        Self {
            found_idxs: Vec::with_capacity(max_seqs),
            not_found_idxs: Vec::with_capacity(max_seqs),
            invalid_idxs: Vec::with_capacity(max_seqs),
            colored_seq_id: Vec::with_capacity(max_seqs),
            seqs_before_newfile: Vec::with_capacity(8),
        }
    }

    pub fn reset(&mut self) {
        self.found_idxs.clear();
        self.not_found_idxs.clear();
        self.invalid_idxs.clear();
        self.colored_seq_id.clear();
        self.seqs_before_newfile.clear();
    }

    /// Record the statistics of one more sequence.
    pub fn push_seq(&mut self, seq_id: u64, found: u64, not_found: u64, invalid: u64) {
        self.found_idxs.push(found);
        self.not_found_idxs.push(not_found);
        self.invalid_idxs.push(invalid);
        self.colored_seq_id.push(seq_id);
    }

    /// Number of sequences recorded so far.
    #[must_use]
    pub fn num_seqs(&self) -> usize {
        self.colored_seq_id.len()
    }
}

/// Per-color hit counts, `num_colors` values per sequence, flattened.
#[derive(Debug, Default)]
pub struct ColorsBatch {
    pub results: Vec<u64>,
}

impl ColorsBatch {
    #[must_use]
    pub fn with_capacity(max_seqs: usize, num_colors: usize) -> Self {
        Self { results: Vec::with_capacity(max_seqs.saturating_mul(num_colors)) }
    }

    pub fn reset(&mut self) {
        self.results.clear();
    }
}
