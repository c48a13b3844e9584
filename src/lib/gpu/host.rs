//! Host reference backend: device buffers are plain vectors and streams are
//! synchronous, so every kernel "launch" completes before the call returns.

use crate::errors::{Result, SbwtqError};
use crate::memory;

/// An ordered queue of device operations.
///
/// One stream per pipeline instance; operations issued on different streams
/// may overlap on a real device. The host backend executes synchronously.
#[derive(Debug, Default)]
pub struct GpuStream {
    stream_id: u64,
}

impl GpuStream {
    pub fn new(stream_id: u64) -> Result<Self> {
        Ok(Self { stream_id })
    }

    /// Block until every operation issued on this stream has completed.
    pub fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// A fixed-size device allocation.
#[derive(Debug)]
pub struct DeviceBuffer<T> {
    data: Vec<T>,
}

impl<T: Copy + Default> DeviceBuffer<T> {
    /// Allocate room for `len` elements.
    pub fn alloc(len: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| SbwtqError::Gpu(format!("device allocation of {len} elements failed: {e}")))?;
        data.resize(len, T::default());
        Ok(Self { data })
    }

    /// Number of elements the buffer holds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy `src` into the start of the buffer on `stream`.
    pub fn copy_to(&mut self, _stream: &GpuStream, src: &[T]) -> Result<()> {
        if src.len() > self.data.len() {
            return Err(SbwtqError::Gpu(format!(
                "host to device copy of {} elements into a buffer of {}",
                src.len(),
                self.data.len()
            )));
        }
        self.data[..src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Copy the first `len` elements into `dst` on `stream`.
    pub fn copy_from(&self, _stream: &GpuStream, dst: &mut Vec<T>, len: usize) -> Result<()> {
        if len > self.data.len() {
            return Err(SbwtqError::Gpu(format!(
                "device to host copy of {len} elements from a buffer of {}",
                self.data.len()
            )));
        }
        dst.clear();
        dst.extend_from_slice(&self.data[..len]);
        Ok(())
    }

    /// Device-side view for kernels.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable device-side view for kernels.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Free device memory in bits. The host backend reports currently available
/// system memory, which is what its "device" allocations actually consume.
#[must_use]
pub fn free_device_memory_bits() -> u64 {
    memory::available_memory_bits()
}
