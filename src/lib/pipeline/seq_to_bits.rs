//! Stage 2 of index mode: characters into the 2-bit packed representation.
//!
//! Fans one input stream out to two rings: the packed bits and the
//! invalid-character flags. A new pair is produced only once slots are free
//! on both rings, which is what carries back-pressure across the fan-out.
//! Conversion itself is data-parallel over 32-base word boundaries.

use rayon::prelude::*;
use std::sync::Arc;

use crate::errors::{Result, SbwtqError};
use crate::logging::TimedEvent;
use crate::pipeline::batches::{BitsBatch, InvalidCharsBatch, StringSequenceBatch};
use crate::pipeline::channel::SharedBatches;

/// Case-insensitive 2-bit encoding; `None` marks a non-ACGT character.
#[inline]
fn base_bits(character: u8) -> Option<u64> {
    match character {
        b'A' | b'a' => Some(0b00),
        b'C' | b'c' => Some(0b01),
        b'G' | b'g' => Some(0b10),
        b'T' | b't' => Some(0b11),
        _ => None,
    }
}

/// Pack one chunk of up to 32 characters into a word, flagging invalids.
fn pack_word(chars: &[u8], invalid: &mut [u8]) -> u64 {
    let mut word = 0_u64;
    for (i, (&character, flag)) in chars.iter().zip(invalid.iter_mut()).enumerate() {
        let bits = match base_bits(character) {
            Some(bits) => bits,
            None => {
                *flag = 1;
                0b00
            }
        };
        word |= bits << (62 - 2 * i);
    }
    word
}

/// The seq-to-bits converter stage and its two output rings.
pub struct SeqToBitsConverter {
    stream_id: u64,
    input: Arc<SharedBatches<StringSequenceBatch>>,
    bits_ring: Arc<SharedBatches<BitsBatch>>,
    invalid_ring: Arc<SharedBatches<InvalidCharsBatch>>,
    pool: Option<rayon::ThreadPool>,
}

impl SeqToBitsConverter {
    pub fn new(
        stream_id: u64,
        input: Arc<SharedBatches<StringSequenceBatch>>,
        threads: usize,
        max_chars: usize,
        max_batches: usize,
    ) -> Result<Self> {
        let pool = if threads > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| SbwtqError::InvalidParameter {
                        parameter: "threads".to_string(),
                        reason: e.to_string(),
                    })?,
            )
        } else {
            None
        };
        Ok(Self {
            stream_id,
            input,
            bits_ring: SharedBatches::with_batches(max_batches, || {
                BitsBatch::with_capacity(max_chars)
            }),
            invalid_ring: SharedBatches::with_batches(max_batches, || {
                InvalidCharsBatch::with_capacity(max_chars)
            }),
            pool,
        })
    }

    /// Ring consumed by the index searcher.
    #[must_use]
    pub fn bits_batches(&self) -> Arc<SharedBatches<BitsBatch>> {
        Arc::clone(&self.bits_ring)
    }

    /// Ring consumed by the results printer.
    #[must_use]
    pub fn invalid_chars_batches(&self) -> Arc<SharedBatches<InvalidCharsBatch>> {
        Arc::clone(&self.invalid_ring)
    }

    fn convert(&self, buffer: &[u8], bits: &mut BitsBatch, invalid: &mut InvalidCharsBatch) {
        bits.bits.clear();
        bits.bits.resize(buffer.len().div_ceil(32), 0);
        invalid.invalid_chars.clear();
        invalid.invalid_chars.resize(buffer.len(), 0);
        let words = &mut bits.bits;
        let flags = &mut invalid.invalid_chars;
        if let Some(pool) = &self.pool {
            pool.install(|| {
                words
                    .par_iter_mut()
                    .zip(buffer.par_chunks(32).zip(flags.par_chunks_mut(32)))
                    .for_each(|(word, (chars, flags))| {
                        *word = pack_word(chars, flags);
                    });
            });
        } else {
            for ((word, chars), flags) in
                words.iter_mut().zip(buffer.chunks(32)).zip(flags.chunks_mut(32))
            {
                *word = pack_word(chars, flags);
            }
        }
    }

    /// The stage worker.
    pub fn run(&self) -> Result<()> {
        let mut batch_id = 0_u64;
        while let Some(strings) = self.input.next() {
            let mut bits = self.bits_ring.acquire();
            let mut invalid = self.invalid_ring.acquire();
            {
                let _event =
                    TimedEvent::start(&format!("SeqToBitsConverter_{}", self.stream_id), batch_id);
                self.convert(&strings.buffer, &mut bits, &mut invalid);
            }
            self.input.recycle(strings);
            self.bits_ring.publish(bits);
            self.invalid_ring.publish(invalid);
            batch_id += 1;
        }
        self.bits_ring.finish();
        self.invalid_ring.finish();
        Ok(())
    }
}
