//! Color-mode stage 2: batched color lookups on the accelerator.
//!
//! Mirrors the index searcher: one stream, device buffers sized up front,
//! copy in, launch the opaque color kernel, copy out, synchronize. The
//! output is one score per (sequence, color) pair, flattened.

use std::sync::Arc;

use crate::errors::Result;
use crate::gpu::{DeviceBuffer, GpuStream};
use crate::index::ColorIndexContainer;
use crate::logging::TimedEvent;
use crate::pipeline::batches::{ColorsBatch, IndexesBatch};
use crate::pipeline::channel::SharedBatches;

/// The color searcher stage and its output ring.
pub struct ColorSearcher {
    stream_id: u64,
    container: Arc<ColorIndexContainer>,
    indexes_input: Arc<SharedBatches<IndexesBatch>>,
    colors_ring: Arc<SharedBatches<ColorsBatch>>,
    gpu_stream: GpuStream,
    d_indexes: DeviceBuffer<u64>,
    d_results: DeviceBuffer<u64>,
}

impl ColorSearcher {
    pub fn new(
        stream_id: u64,
        container: Arc<ColorIndexContainer>,
        indexes_input: Arc<SharedBatches<IndexesBatch>>,
        max_indexes: usize,
        max_seqs: usize,
        max_batches: usize,
    ) -> Result<Self> {
        let num_colors = container.num_colors() as usize;
        Ok(Self {
            stream_id,
            indexes_input,
            colors_ring: SharedBatches::with_batches(max_batches, || {
                ColorsBatch::with_capacity(max_seqs, num_colors)
            }),
            gpu_stream: GpuStream::new(stream_id)?,
            d_indexes: DeviceBuffer::alloc(max_indexes)?,
            d_results: DeviceBuffer::alloc(max_seqs.saturating_mul(num_colors))?,
            container,
        })
    }

    /// Ring consumed by the color results printer.
    #[must_use]
    pub fn colors_batches(&self) -> Arc<SharedBatches<ColorsBatch>> {
        Arc::clone(&self.colors_ring)
    }

    fn search(&mut self, indexes: &IndexesBatch, results: &mut Vec<u64>) -> Result<()> {
        let num_seqs = indexes.warps_intervals.len().saturating_sub(1);
        self.d_indexes.copy_to(&self.gpu_stream, &indexes.warped_indexes)?;
        self.container.launch_color(
            &self.gpu_stream,
            &self.d_indexes,
            &indexes.warps_intervals,
            &mut self.d_results,
            num_seqs,
        )?;
        self.d_results.copy_from(
            &self.gpu_stream,
            results,
            num_seqs * self.container.num_colors() as usize,
        )?;
        self.gpu_stream.sync()
    }

    /// The stage worker.
    pub fn run(&mut self) -> Result<()> {
        let mut batch_id = 0_u64;
        while let Some(indexes) = self.indexes_input.next() {
            let mut out = self.colors_ring.acquire();
            out.reset();
            let outcome = {
                let _event = TimedEvent::start(&format!("Searcher_{}", self.stream_id), batch_id);
                self.search(&indexes, &mut out.results)
            };
            self.indexes_input.recycle(indexes);
            if let Err(e) = outcome {
                self.colors_ring.finish();
                self.indexes_input.drain();
                return Err(e);
            }
            self.colors_ring.publish(out);
            batch_id += 1;
        }
        self.colors_ring.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_color_search_stage_end_to_end() {
        let container =
            Arc::new(ColorIndexContainer::from_sets(2, &[vec![0], vec![0, 1]]));
        let indexes_ring: Arc<SharedBatches<IndexesBatch>> =
            SharedBatches::with_batches(2, || IndexesBatch::with_capacity(64, 4));
        let mut searcher = ColorSearcher::new(
            0,
            container,
            Arc::clone(&indexes_ring),
            128,
            4,
            2,
        )
        .unwrap();
        let colors_ring = searcher.colors_batches();
        thread::scope(|scope| {
            scope.spawn(move || searcher.run().unwrap());
            let mut batch = indexes_ring.acquire();
            batch.reset();
            // seq 0 hits columns 0 and 1, seq 1 hits column 1 twice
            batch.warped_indexes.extend_from_slice(&[0, 1]);
            batch.end_seq();
            batch.warped_indexes.extend_from_slice(&[1, 1]);
            batch.end_seq();
            indexes_ring.publish(batch);
            indexes_ring.finish();

            let colors = colors_ring.next().unwrap();
            assert_eq!(colors.results, vec![2, 1, 2, 2]);
            colors_ring.recycle(colors);
            assert!(colors_ring.next().is_none());
        });
    }
}
