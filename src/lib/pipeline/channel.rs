//! Bounded single-producer/single-consumer rings of recycled batches.
//!
//! Every stage hands its output downstream through a [`SharedBatches`] ring:
//! a fixed set of pre-allocated batch values circulating between a `free`
//! queue (empty batches owned by the producer side) and a `ready` queue
//! (filled batches awaiting the consumer). Two counting semaphores provide
//! the only blocking in the pipeline, which is what gives it back-pressure:
//! a producer with no free slot sleeps until the consumer recycles one, a
//! consumer with no ready batch sleeps until the producer publishes one.
//!
//! Handoff moves the batch value, so exclusive access is enforced by
//! ownership rather than locking; no mutex is held while a batch is in use.

use crossbeam_queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A counting semaphore built from a mutex and condvar.
pub struct Semaphore {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    /// Create a semaphore with `permits` initial permits.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self { count: Mutex::new(permits), condvar: Condvar::new() }
    }

    /// Block until a permit is available, then take it.
    pub fn acquire(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.condvar.wait(&mut count);
        }
        *count -= 1;
    }

    /// Release one permit and wake a waiter.
    pub fn release(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.condvar.notify_one();
    }
}

/// A bounded SPSC ring of recycled batch values.
///
/// Created with [`SharedBatches::new`] from the pre-allocated pool; the pool
/// size is the ring capacity (`max_batches_in_flight`). Batches flow
/// producer → consumer through `ready` and back through `free`, always in
/// FIFO order, so the consumer observes batches in emission order.
pub struct SharedBatches<T> {
    free: ArrayQueue<T>,
    ready: ArrayQueue<T>,
    free_permits: Semaphore,
    ready_permits: Semaphore,
    finished: AtomicBool,
}

impl<T> SharedBatches<T> {
    /// Build a ring whose pool is `batches`; capacity equals the pool size.
    #[must_use]
    pub fn new(batches: Vec<T>) -> Arc<Self> {
        assert!(!batches.is_empty(), "a batch ring needs at least one slot");
        let capacity = batches.len();
        let free = ArrayQueue::new(capacity);
        let free_count = batches.len();
        for batch in batches {
            let pushed = free.push(batch);
            assert!(pushed.is_ok());
        }
        Arc::new(Self {
            free,
            ready: ArrayQueue::new(capacity),
            free_permits: Semaphore::new(free_count),
            ready_permits: Semaphore::new(0),
            finished: AtomicBool::new(false),
        })
    }

    /// Convenience constructor: `count` slots built by `make`.
    #[must_use]
    pub fn with_batches(count: usize, mut make: impl FnMut() -> T) -> Arc<Self> {
        Self::new((0..count).map(|_| make()).collect())
    }

    /// Producer side: block until a free slot is available and take it.
    pub fn acquire(&self) -> T {
        self.free_permits.acquire();
        self.free.pop().expect("free permit held but free queue empty")
    }

    /// Producer side: publish a filled batch to the consumer.
    pub fn publish(&self, batch: T) {
        let pushed = self.ready.push(batch);
        assert!(pushed.is_ok(), "ready queue full despite slot accounting");
        self.ready_permits.release();
    }

    /// Producer side: signal end-of-stream. Must be called exactly once,
    /// after the last `publish`.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
        self.ready_permits.release();
    }

    /// Consumer side: block for the next batch; `None` once the producer
    /// has finished and everything published has been consumed.
    pub fn next(&self) -> Option<T> {
        self.ready_permits.acquire();
        match self.ready.pop() {
            Some(batch) => Some(batch),
            None => {
                debug_assert!(self.finished.load(Ordering::Acquire));
                // keep the termination token available for spurious re-reads
                self.ready_permits.release();
                None
            }
        }
    }

    /// Consumer side: return a drained batch to the pool.
    pub fn recycle(&self, batch: T) {
        let pushed = self.free.push(batch);
        assert!(pushed.is_ok(), "free queue full despite slot accounting");
        self.free_permits.release();
    }

    /// Number of filled batches currently waiting for the consumer.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Consumer side: consume and recycle everything until end-of-stream.
    ///
    /// Called on a stage's error path so upstream producers can run to
    /// completion instead of blocking on a full ring.
    pub fn drain(&self) {
        while let Some(batch) = self.next() {
            self.recycle(batch);
        }
    }
}
