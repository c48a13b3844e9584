//! Stage 4 of index mode: batched SBWT lookups on the accelerator.
//!
//! The searcher owns one accelerator stream and device buffers sized for
//! `max_chars_per_batch` once, up front. Per batch it copies the packed bits
//! and positions in, launches the opaque search kernel, copies the results
//! out, and synchronizes the stream before publishing. Any device failure is
//! fatal for the run.

use std::sync::Arc;

use crate::errors::Result;
use crate::gpu::{DeviceBuffer, GpuStream};
use crate::index::SbwtContainer;
use crate::logging::TimedEvent;
use crate::pipeline::batches::{BitsBatch, PositionsBatch, ResultsBatch};
use crate::pipeline::channel::SharedBatches;

/// The index searcher stage and its output ring.
pub struct IndexSearcher {
    stream_id: u64,
    container: Arc<SbwtContainer>,
    bits_input: Arc<SharedBatches<BitsBatch>>,
    positions_input: Arc<SharedBatches<PositionsBatch>>,
    results_ring: Arc<SharedBatches<ResultsBatch>>,
    gpu_stream: GpuStream,
    d_bits: DeviceBuffer<u64>,
    d_positions: DeviceBuffer<u64>,
    d_results: DeviceBuffer<u64>,
}

impl IndexSearcher {
    pub fn new(
        stream_id: u64,
        container: Arc<SbwtContainer>,
        bits_input: Arc<SharedBatches<BitsBatch>>,
        positions_input: Arc<SharedBatches<PositionsBatch>>,
        max_chars: usize,
        max_batches: usize,
    ) -> Result<Self> {
        Ok(Self {
            stream_id,
            container,
            bits_input,
            positions_input,
            results_ring: SharedBatches::with_batches(max_batches, || {
                ResultsBatch::with_capacity(max_chars)
            }),
            gpu_stream: GpuStream::new(stream_id)?,
            d_bits: DeviceBuffer::alloc(max_chars.div_ceil(32))?,
            d_positions: DeviceBuffer::alloc(max_chars)?,
            d_results: DeviceBuffer::alloc(max_chars)?,
        })
    }

    /// Ring consumed by the results printer.
    #[must_use]
    pub fn results_batches(&self) -> Arc<SharedBatches<ResultsBatch>> {
        Arc::clone(&self.results_ring)
    }

    /// One full search round trip: host to device, kernel, device to host.
    fn search(&mut self, bits: &[u64], positions: &[u64], results: &mut Vec<u64>) -> Result<()> {
        self.d_bits.copy_to(&self.gpu_stream, bits)?;
        self.d_positions.copy_to(&self.gpu_stream, positions)?;
        self.container.launch_search(
            &self.gpu_stream,
            &self.d_bits,
            &self.d_positions,
            &mut self.d_results,
            positions.len(),
        )?;
        self.d_results.copy_from(&self.gpu_stream, results, positions.len())?;
        self.gpu_stream.sync()
    }

    /// The stage worker.
    pub fn run(&mut self) -> Result<()> {
        let mut batch_id = 0_u64;
        loop {
            let Some(bits) = self.bits_input.next() else { break };
            let Some(positions) = self.positions_input.next() else {
                self.bits_input.recycle(bits);
                break;
            };
            let mut out = self.results_ring.acquire();
            out.reset();
            let search_result = {
                let _event =
                    TimedEvent::start(&format!("Searcher_{}", self.stream_id), batch_id);
                self.search(&bits.bits, &positions.positions, &mut out.results)
            };
            self.bits_input.recycle(bits);
            self.positions_input.recycle(positions);
            if let Err(e) = search_result {
                self.results_ring.finish();
                self.bits_input.drain();
                self.positions_input.drain();
                return Err(e);
            }
            self.results_ring.publish(out);
            batch_id += 1;
        }
        self.results_ring.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::NOT_FOUND;
    use std::thread;

    fn pack(bases: &[u8]) -> Vec<u64> {
        let mut words = vec![0_u64; bases.len().div_ceil(32)];
        for (i, base) in bases.iter().enumerate() {
            let bits = match base {
                b'A' => 0_u64,
                b'C' => 1,
                b'G' => 2,
                _ => 3,
            };
            words[i / 32] |= bits << (62 - 2 * (i % 32));
        }
        words
    }

    #[test]
    fn test_search_stage_end_to_end() {
        // 2-mers of "ACGT": AC=0b0001(1), CG=0b0110(6), GT=0b1011(11);
        // index contains AC and GT only
        let container = Arc::new(SbwtContainer::from_codes(2, vec![1, 11]));
        let bits_ring: Arc<SharedBatches<BitsBatch>> =
            SharedBatches::with_batches(2, BitsBatch::default);
        let positions_ring: Arc<SharedBatches<PositionsBatch>> =
            SharedBatches::with_batches(2, PositionsBatch::default);
        let mut searcher = IndexSearcher::new(
            0,
            container,
            Arc::clone(&bits_ring),
            Arc::clone(&positions_ring),
            1024,
            2,
        )
        .unwrap();
        let results_ring = searcher.results_batches();
        thread::scope(|scope| {
            scope.spawn(move || searcher.run().unwrap());
            let mut bits = bits_ring.acquire();
            bits.reset();
            bits.bits.extend_from_slice(&pack(b"ACGT"));
            bits_ring.publish(bits);
            bits_ring.finish();
            let mut positions = positions_ring.acquire();
            positions.reset();
            positions.positions.extend_from_slice(&[0, 1, 2]);
            positions_ring.publish(positions);
            positions_ring.finish();

            let results = results_ring.next().unwrap();
            assert_eq!(results.results, vec![0, NOT_FOUND, 1]);
            results_ring.recycle(results);
            assert!(results_ring.next().is_none());
        });
    }
}
