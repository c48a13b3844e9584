//! Up-front batch sizing.
//!
//! Before any stage starts, the planner turns the host and device memory
//! budgets into `max_chars_per_batch`: the sum of every pool's
//! bits-per-element cost (times its batches in flight) plus the per-sequence
//! costs amortized over the expected characters per sequence gives a
//! bits-per-character price, and the budget divided by that price, split
//! across streams and rounded down to the launch granularity, is the batch
//! size. Planning failure is a configuration error, not a runtime one.

use crate::errors::{Result, SbwtqError};
use crate::gpu::THREADS_PER_BLOCK;
use crate::logging::bits_to_gb;
use crate::pipeline::printers::PrintMode;
use crate::pipeline::MAX_BATCHES_IN_FLIGHT;

const MAX_BATCHES: u64 = MAX_BATCHES_IN_FLIGHT as u64;

/// Memory flags shared by both subcommands.
#[derive(Debug, Clone, Copy)]
pub struct MemoryArgs {
    /// Cap on usable host memory, in bits.
    pub max_cpu_memory: u64,
    /// Host memory to treat as spoken for, in bits.
    pub unavailable_ram: u64,
    /// Fraction of the remaining host budget to actually use.
    pub cpu_memory_percentage: f64,
    /// Fraction of free device memory to actually use.
    pub gpu_memory_percentage: f64,
}

/// Per-character and per-sequence bit prices of one side (host or device).
#[derive(Debug, Clone, Copy)]
pub struct BitCosts {
    pub bits_per_element: f64,
    pub bits_per_seq: f64,
}

impl BitCosts {
    /// Collapse to a single bits-per-element price, amortizing the
    /// per-sequence cost over `elements_per_seq` elements.
    #[must_use]
    pub fn per_element(&self, elements_per_seq: u64) -> f64 {
        self.bits_per_element + self.bits_per_seq / elements_per_seq.max(1) as f64
    }
}

/// Usable host bits given the total system memory and the memory flags.
pub fn cpu_budget_bits(total_ram_bits: u64, args: &MemoryArgs) -> Result<u64> {
    if args.unavailable_ram > total_ram_bits {
        return Err(SbwtqError::InvalidParameter {
            parameter: "unavailable-ram".to_string(),
            reason: "exceeds total system memory".to_string(),
        });
    }
    let available = total_ram_bits.min(args.max_cpu_memory);
    let free = available.saturating_sub(args.unavailable_ram);
    Ok((free as f64 * args.cpu_memory_percentage) as u64)
}

/// Usable device bits given the backend's free memory report.
#[must_use]
pub fn gpu_budget_bits(free_gpu_bits: u64, args: &MemoryArgs) -> u64 {
    (free_gpu_bits as f64 * args.gpu_memory_percentage) as u64
}

/// Elements per batch affordable on one side.
fn side_max_elements(free_bits: u64, bits_per_element: f64, streams: u64) -> u64 {
    ((free_bits as f64 / bits_per_element / streams as f64).floor()) as u64
}

/// Combine both sides into the final per-batch element count.
///
/// The result is the smaller of the host and device answers, rounded down
/// to [`THREADS_PER_BLOCK`]. Zero means the run cannot start.
pub fn max_elements_per_batch(
    cpu_free_bits: u64,
    cpu_bits_per_element: f64,
    gpu_free_bits: u64,
    gpu_bits_per_element: f64,
    streams: u64,
) -> Result<u64> {
    let cpu_elements = side_max_elements(cpu_free_bits, cpu_bits_per_element, streams);
    let gpu_elements = side_max_elements(gpu_free_bits, gpu_bits_per_element, streams);
    log::debug!(
        "Free main memory: {cpu_free_bits} bits ({:.2}GB). This allows for {cpu_elements} characters per batch",
        bits_to_gb(cpu_free_bits)
    );
    log::debug!(
        "Free gpu memory: {gpu_free_bits} bits ({:.2}GB). This allows for {gpu_elements} characters per batch",
        bits_to_gb(gpu_free_bits)
    );
    let elements = cpu_elements.min(gpu_elements) / THREADS_PER_BLOCK * THREADS_PER_BLOCK;
    if elements == 0 {
        return Err(SbwtqError::NotEnoughMemory);
    }
    Ok(elements)
}

/// Host-side bit costs of the index-mode pipeline.
pub fn index_mode_cpu_costs(print_mode: PrintMode, max_index: u64) -> Result<BitCosts> {
    let string_sequence_bits = 8 * MAX_BATCHES;
    let invalid_chars_bits = 8 * MAX_BATCHES;
    let packed_bits = 2 * MAX_BATCHES;
    let positions_bits = 64 * MAX_BATCHES;
    let results_bits = 64 * MAX_BATCHES;
    let printer_bits = print_mode.index_bits_per_element(max_index)?;
    let string_break_bits = 64 * MAX_BATCHES;
    let interval_bits = 128 * MAX_BATCHES;
    let printer_seq_bits = print_mode.index_bits_per_seq()?;
    Ok(BitCosts {
        bits_per_element: (string_sequence_bits
            + invalid_chars_bits
            + packed_bits
            + positions_bits
            + results_bits
            + printer_bits) as f64,
        bits_per_seq: (string_break_bits + interval_bits + printer_seq_bits) as f64,
    })
}

/// Device-side bit costs of the index-mode pipeline: the packed character,
/// its k-mer position, and its result all live on the device at once.
#[must_use]
pub fn index_mode_gpu_costs() -> BitCosts {
    BitCosts { bits_per_element: (2 + 64 + 64) as f64, bits_per_seq: 0.0 }
}

/// Host-side bit costs of the color-mode pipeline, per index element.
pub fn color_mode_cpu_costs(print_mode: PrintMode, num_colors: u64) -> Result<BitCosts> {
    let warped_indexes_bits = 64 * MAX_BATCHES;
    let warps_intervals_bits = 64 * MAX_BATCHES;
    let statistics_bits = 5 * 64 * MAX_BATCHES;
    let color_results_bits = num_colors * 64 * MAX_BATCHES;
    let printer_seq_bits = print_mode.color_bits_per_seq(num_colors)?;
    Ok(BitCosts {
        bits_per_element: warped_indexes_bits as f64,
        bits_per_seq: (warps_intervals_bits + statistics_bits + color_results_bits
            + printer_seq_bits) as f64,
    })
}

/// Device-side bit costs of the color-mode pipeline: one index per element
/// plus the kernel's per-warp working set amortized over the warp.
#[must_use]
pub fn color_mode_gpu_costs(num_colors: u64) -> BitCosts {
    let per_warp = num_colors as f64 * (64.0 + 8.0);
    BitCosts {
        bits_per_element: 64.0 + per_warp / crate::gpu::WARP_SIZE as f64,
        bits_per_seq: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GB: u64 = 8 * 1024 * 1024 * 1024;

    fn default_args() -> MemoryArgs {
        MemoryArgs {
            max_cpu_memory: u64::MAX,
            unavailable_ram: 0,
            cpu_memory_percentage: 0.5,
            gpu_memory_percentage: 0.95,
        }
    }

    #[test]
    fn test_cpu_budget_applies_cap_and_percentage() {
        let args = MemoryArgs { max_cpu_memory: 4 * GB, ..default_args() };
        assert_eq!(cpu_budget_bits(16 * GB, &args).unwrap(), 2 * GB);
        assert_eq!(cpu_budget_bits(2 * GB, &args).unwrap(), GB);
    }

    #[test]
    fn test_cpu_budget_rejects_oversized_unavailable_ram() {
        let args = MemoryArgs { unavailable_ram: 2 * GB, ..default_args() };
        assert!(cpu_budget_bits(GB, &args).is_err());
    }

    #[test]
    fn test_plan_rounds_down_to_threads_per_block() {
        let costs = index_mode_cpu_costs(PrintMode::Binary, 1000).unwrap();
        let per_element = costs.per_element(100);
        let elements =
            max_elements_per_batch(GB, per_element, GB, 130.0, 1).unwrap();
        assert_eq!(elements % THREADS_PER_BLOCK, 0);
        assert!(elements > 0);
    }

    #[test]
    fn test_plan_fails_when_budget_too_small() {
        let err = max_elements_per_batch(100, 300.0, GB, 130.0, 1).unwrap_err();
        assert_eq!(format!("{err}"), "Not enough memory");
    }

    #[test]
    fn test_plan_is_monotone_in_budgets() {
        let mut previous = 0;
        for budget in [GB, 2 * GB, 4 * GB, 8 * GB] {
            let elements =
                max_elements_per_batch(budget, 500.0, budget, 130.0, 2).unwrap();
            assert!(elements >= previous);
            previous = elements;
        }
    }

    #[test]
    fn test_more_streams_never_increase_batch_size() {
        let one = max_elements_per_batch(GB, 500.0, GB, 130.0, 1).unwrap();
        let four = max_elements_per_batch(GB, 500.0, GB, 130.0, 4).unwrap();
        assert!(four <= one);
    }

    #[test]
    fn test_per_element_amortizes_seq_costs() {
        let costs = BitCosts { bits_per_element: 100.0, bits_per_seq: 1000.0 };
        assert!((costs.per_element(100) - 110.0).abs() < 1e-9);
        assert!(costs.per_element(1000) < costs.per_element(10));
    }
}
