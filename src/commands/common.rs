//! Shared flags and helpers for the query subcommands.

use clap::{ArgAction, Parser, ValueEnum};

use sbwtq_lib::pipeline::printers::PrintMode;
use sbwtq_lib::planner::MemoryArgs;

/// CLI surface of the result-stream encodings.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PrintModeArg {
    /// Decimal integers, `-1` not-found, `-2` invalid
    Ascii,
    /// Little-endian u64 stream
    Binary,
    /// `0` found / `1` not-found / `2` invalid, index value lost
    Bool,
    /// Variable-length quantity encoding
    Packedint,
    /// Per-color score rows (color mode only)
    Csv,
}

impl From<PrintModeArg> for PrintMode {
    fn from(arg: PrintModeArg) -> Self {
        match arg {
            PrintModeArg::Ascii => PrintMode::Ascii,
            PrintModeArg::Binary => PrintMode::Binary,
            PrintModeArg::Bool => PrintMode::Bool,
            PrintModeArg::Packedint => PrintMode::PackedInt,
            PrintModeArg::Csv => PrintMode::Csv,
        }
    }
}

/// Flags shared by `index` and `colors`.
#[derive(Debug, Parser)]
pub struct SharedQueryOptions {
    /// Independent pipeline instances sharing the accelerator.
    ///
    /// Capped at the number of input files.
    #[arg(short = 's', long = "streams", default_value = "4")]
    pub streams: u64,

    /// Fraction of free accelerator memory the planner may budget.
    #[arg(long = "gpu-memory-percentage", default_value = "0.95")]
    pub gpu_memory_percentage: f64,

    /// Fraction of the remaining host budget the planner may use.
    #[arg(long = "cpu-memory-percentage", default_value = "0.5")]
    pub cpu_memory_percentage: f64,

    /// Cap on usable host memory, in bits.
    #[arg(long = "max-cpu-memory", default_value_t = u64::MAX)]
    pub max_cpu_memory: u64,

    /// Host memory to treat as already spoken for, in bits.
    #[arg(long = "unavailable-ram", default_value = "0")]
    pub unavailable_ram: u64,

    /// Result-stream encoding for the output files.
    #[arg(short = 'p', long = "print-mode", value_enum, default_value = "ascii")]
    pub print_mode: PrintModeArg,

    /// Whether output files start with the format/version header.
    #[arg(long = "write-headers", default_value = "true", action = ArgAction::Set)]
    pub write_headers: bool,

    /// Worker threads for the character conversion inner pool.
    #[arg(short = 't', long = "threads", default_value_t = default_threads())]
    pub threads: u64,
}

impl SharedQueryOptions {
    /// Collect the planner-facing memory flags.
    #[must_use]
    pub fn memory_args(&self) -> MemoryArgs {
        MemoryArgs {
            max_cpu_memory: self.max_cpu_memory,
            unavailable_ram: self.unavailable_ram,
            cpu_memory_percentage: self.cpu_memory_percentage,
            gpu_memory_percentage: self.gpu_memory_percentage,
        }
    }
}

fn default_threads() -> u64 {
    std::thread::available_parallelism().map_or(1, |n| n.get() as u64)
}
