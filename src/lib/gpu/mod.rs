//! Accelerator stream/buffer layer.
//!
//! The pipeline talks to the device exclusively through [`GpuStream`] and
//! [`DeviceBuffer`]: allocate fixed-size buffers up front, copy a batch in,
//! launch an opaque kernel (owned by the index containers), copy the batch
//! out, synchronize. Swapping the accelerator means swapping the [`host`]
//! module; nothing in the pipeline changes.
//!
//! The bundled backend is a host reference implementation: buffers are
//! ordinary allocations and kernels run on the CPU, which keeps the full
//! pipeline executable and testable on machines without a device.

mod host;

pub use host::{free_device_memory_bits, DeviceBuffer, GpuStream};

/// SIMD lane count of one accelerator warp.
pub const WARP_SIZE: u64 = 32;

/// Launch granularity; batch sizes are rounded down to this.
pub const THREADS_PER_BLOCK: u64 = 1024;
