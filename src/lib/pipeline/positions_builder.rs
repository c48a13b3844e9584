//! Stage 3 of index mode: k-mer start offsets from record boundaries.
//!
//! A record of length `L` contributes the strictly increasing positions
//! `start ..= start + L - k`, and nothing when `L < k`; k-mers therefore
//! never straddle a record boundary.

use std::sync::Arc;

use crate::errors::Result;
use crate::logging::TimedEvent;
use crate::pipeline::batches::{PositionsBatch, StringBreakBatch};
use crate::pipeline::channel::SharedBatches;

/// The positions builder stage and its output ring.
pub struct PositionsBuilder {
    stream_id: u64,
    kmer_size: u64,
    input: Arc<SharedBatches<StringBreakBatch>>,
    positions_ring: Arc<SharedBatches<PositionsBatch>>,
}

impl PositionsBuilder {
    #[must_use]
    pub fn new(
        stream_id: u64,
        input: Arc<SharedBatches<StringBreakBatch>>,
        kmer_size: u64,
        max_chars: usize,
        max_batches: usize,
    ) -> Self {
        Self {
            stream_id,
            kmer_size,
            input,
            positions_ring: SharedBatches::with_batches(max_batches, || {
                PositionsBatch::with_capacity(max_chars)
            }),
        }
    }

    /// Ring consumed by the index searcher.
    #[must_use]
    pub fn positions_batches(&self) -> Arc<SharedBatches<PositionsBatch>> {
        Arc::clone(&self.positions_ring)
    }

    /// Fill `positions` for one batch of record boundaries.
    pub fn build_positions(
        kmer_size: u64,
        chars_before_newline: &[u64],
        positions: &mut Vec<u64>,
    ) {
        positions.clear();
        let mut start = 0_u64;
        for &end in chars_before_newline {
            let length = end - start;
            if length >= kmer_size {
                positions.extend(start..=end - kmer_size);
            }
            start = end;
        }
    }

    /// The stage worker.
    pub fn run(&self) -> Result<()> {
        let mut batch_id = 0_u64;
        while let Some(breaks) = self.input.next() {
            let mut out = self.positions_ring.acquire();
            {
                let _event =
                    TimedEvent::start(&format!("PositionsBuilder_{}", self.stream_id), batch_id);
                Self::build_positions(
                    self.kmer_size,
                    &breaks.chars_before_newline,
                    &mut out.positions,
                );
            }
            self.input.recycle(breaks);
            self.positions_ring.publish(out);
            batch_id += 1;
        }
        self.positions_ring.finish();
        Ok(())
    }
}
