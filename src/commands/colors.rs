//! Color lookup over previously written index result files.
//!
//! Runs the three-stage color pipeline (index file parse, color search,
//! print) once per stream.

use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use sbwtq_lib::errors::SbwtqError;
use sbwtq_lib::filenames;
use sbwtq_lib::gpu::free_device_memory_bits;
use sbwtq_lib::index::ColorIndexContainer;
use sbwtq_lib::load_balancer;
use sbwtq_lib::logging::OperationTimer;
use sbwtq_lib::memory::total_system_memory_bits;
use sbwtq_lib::pipeline::color_searcher::ColorSearcher;
use sbwtq_lib::pipeline::index_file_parser::IndexFileParser;
use sbwtq_lib::pipeline::printers::color::{color_formatter, ColorResultsPrinter};
use sbwtq_lib::pipeline::printers::PrintMode;
use sbwtq_lib::pipeline::MAX_BATCHES_IN_FLIGHT;
use sbwtq_lib::planner;
use sbwtq_lib::validation::{validate_file_exists, validate_fraction, validate_nonzero};

use crate::commands::command::Command;
use crate::commands::common::SharedQueryOptions;

/// Look up colors for previously computed SBWT indexes.
///
/// Reads result streams in any of the four encodings and writes, per read,
/// the colors whose hit fraction clears the threshold.
#[derive(Debug, Parser)]
#[command(name = "colors", about = "Look up colors for SBWT query results")]
pub struct Colors {
    /// Input index-results file, or a .list file naming one per line.
    #[arg(short = 'q', long = "query-file")]
    pub query_file: PathBuf,

    /// Output file (extension appended), or a .list file of outputs.
    #[arg(short = 'o', long = "output-file")]
    pub output_file: PathBuf,

    /// The color index to query.
    #[arg(short = 'c', long = "colors-file")]
    pub colors_file: PathBuf,

    /// Minimum fraction of a read's k-mers that must carry a color.
    #[arg(short = 'T', long = "threshold", default_value = "1.0")]
    pub threshold: f64,

    /// Count not-found k-mers toward the threshold divisor.
    #[arg(long = "include-not-found", default_value = "false", action = clap::ArgAction::Set)]
    pub include_not_found: bool,

    /// Count invalid k-mers toward the threshold divisor.
    #[arg(long = "include-invalid", default_value = "false", action = clap::ArgAction::Set)]
    pub include_invalid: bool,

    /// Expected indexes per read, used to amortize per-read costs.
    #[arg(long = "indexes-per-seq", default_value = "70")]
    pub indexes_per_seq: u64,

    #[command(flatten)]
    pub common: SharedQueryOptions,
}

impl Command for Colors {
    fn execute(&self) -> Result<()> {
        validate_file_exists(&self.colors_file, "colors-file")?;
        validate_fraction(self.threshold, "threshold")?;
        validate_fraction(self.common.cpu_memory_percentage, "cpu-memory-percentage")?;
        validate_fraction(self.common.gpu_memory_percentage, "gpu-memory-percentage")?;
        validate_nonzero(self.common.streams, "streams")?;
        validate_nonzero(self.indexes_per_seq, "indexes-per-seq")?;
        let print_mode = PrintMode::from(self.common.print_mode);
        log::debug!("Printing results in {} format", print_mode.name());

        info!("Loading components into memory");
        let container = Arc::new(ColorIndexContainer::load(&self.colors_file)?);
        let num_colors = container.num_colors();
        info!("Found {num_colors} total colors");

        let (inputs, outputs) =
            filenames::expand_pairs(&self.query_file, &self.output_file)?;
        let groups = load_balancer::partition(inputs, outputs, self.common.streams);
        let streams = groups.len() as u64;
        log::debug!("Using {streams} streams");

        let memory_args = self.common.memory_args();
        let cpu_free = planner::cpu_budget_bits(total_system_memory_bits(), &memory_args)?;
        let gpu_free = planner::gpu_budget_bits(free_device_memory_bits(), &memory_args);
        let cpu_costs = planner::color_mode_cpu_costs(print_mode, num_colors)?;
        let gpu_costs = planner::color_mode_gpu_costs(num_colors);
        let max_indexes = planner::max_elements_per_batch(
            cpu_free,
            cpu_costs.per_element(self.indexes_per_seq),
            gpu_free,
            gpu_costs.per_element(self.indexes_per_seq),
            streams,
        )? as usize;
        let max_seqs = (max_indexes / self.indexes_per_seq as usize).max(1);
        info!("Using {max_indexes} max indexes per batch and {max_seqs} max seqs per batch");

        let mut parsers = Vec::new();
        let mut searchers = Vec::new();
        let mut printers = Vec::new();
        for (stream_id, group) in groups.into_iter().enumerate() {
            let parser = IndexFileParser::new(
                stream_id as u64,
                group.inputs,
                max_indexes,
                max_seqs,
                MAX_BATCHES_IN_FLIGHT,
            );
            let searcher = ColorSearcher::new(
                stream_id as u64,
                Arc::clone(&container),
                parser.indexes_batches(),
                max_indexes,
                max_seqs,
                MAX_BATCHES_IN_FLIGHT,
            )?;
            let printer = ColorResultsPrinter::new(
                stream_id as u64,
                parser.seq_statistics_batches(),
                searcher.colors_batches(),
                group.outputs,
                num_colors,
                self.threshold,
                self.include_not_found,
                self.include_invalid,
                self.common.write_headers,
                color_formatter(print_mode)?,
            );
            parsers.push(parser);
            searchers.push(searcher);
            printers.push(printer);
        }

        info!("Running queries");
        let timer = OperationTimer::new("Querying");
        run_pipelines(parsers, searchers, printers)?;
        timer.log_completion(streams);
        info!("Finished");
        Ok(())
    }
}

fn run_pipelines(
    parsers: Vec<IndexFileParser>,
    searchers: Vec<ColorSearcher>,
    printers: Vec<ColorResultsPrinter>,
) -> std::result::Result<(), SbwtqError> {
    thread::scope(|scope| {
        let mut handles = Vec::new();
        for parser in parsers {
            handles.push(scope.spawn(move || parser.run()));
        }
        for mut searcher in searchers {
            handles.push(scope.spawn(move || searcher.run()));
        }
        for mut printer in printers {
            handles.push(scope.spawn(move || printer.run()));
        }
        let mut first_error = None;
        for handle in handles {
            if let Err(e) = handle.join().expect("pipeline worker panicked") {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    })
}
