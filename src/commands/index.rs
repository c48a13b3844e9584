//! Query reads against an SBWT index, one result stream per input file.
//!
//! Runs the five-stage pipeline (parse, pack, positions, search, print)
//! once per stream, with every stage on its own thread and streams fully
//! independent.

use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use sbwtq_lib::errors::SbwtqError;
use sbwtq_lib::filenames;
use sbwtq_lib::gpu::free_device_memory_bits;
use sbwtq_lib::index::{ColorIndexContainer, SbwtContainer};
use sbwtq_lib::load_balancer;
use sbwtq_lib::logging::OperationTimer;
use sbwtq_lib::memory::total_system_memory_bits;
use sbwtq_lib::pipeline::index_searcher::IndexSearcher;
use sbwtq_lib::pipeline::positions_builder::PositionsBuilder;
use sbwtq_lib::pipeline::printers::{index_formatter, PrintMode, ResultsPrinter};
use sbwtq_lib::pipeline::seq_to_bits::SeqToBitsConverter;
use sbwtq_lib::pipeline::sequence_file_parser::SequenceFileParser;
use sbwtq_lib::pipeline::MAX_BATCHES_IN_FLIGHT;
use sbwtq_lib::planner;
use sbwtq_lib::validation::{validate_file_exists, validate_fraction, validate_nonzero};

use crate::commands::command::Command;
use crate::commands::common::SharedQueryOptions;

/// Query k-mers against an SBWT index.
///
/// Streams FASTA/FASTQ reads through the accelerator-backed search and
/// writes one result file per input file in the selected encoding.
#[derive(Debug, Parser)]
#[command(name = "index", about = "Query k-mers against an SBWT index")]
pub struct Index {
    /// Input FASTA/FASTQ file, or a .list file naming one per line.
    #[arg(short = 'q', long = "query-file")]
    pub query_file: PathBuf,

    /// Output file (extension appended), or a .list file of outputs.
    #[arg(short = 'o', long = "output-file")]
    pub output_file: PathBuf,

    /// The SBWT index to query.
    #[arg(short = 'i', long = "index-file")]
    pub index_file: PathBuf,

    /// Optional color index; when given, buffer sizing takes its max index.
    #[arg(short = 'c', long = "colors-file")]
    pub colors_file: Option<PathBuf>,

    /// Expected characters per read, used to amortize per-read costs.
    #[arg(short = 'b', long = "base-pairs-per-seq", default_value = "100")]
    pub base_pairs_per_seq: u64,

    #[command(flatten)]
    pub common: SharedQueryOptions,
}

impl Command for Index {
    fn execute(&self) -> Result<()> {
        validate_file_exists(&self.index_file, "index-file")?;
        validate_fraction(self.common.cpu_memory_percentage, "cpu-memory-percentage")?;
        validate_fraction(self.common.gpu_memory_percentage, "gpu-memory-percentage")?;
        validate_nonzero(self.common.streams, "streams")?;
        validate_nonzero(self.base_pairs_per_seq, "base-pairs-per-seq")?;
        let print_mode = PrintMode::from(self.common.print_mode);
        log::debug!("Printing results in {} format", print_mode.name());

        info!("Loading components into memory");
        let load_timer = OperationTimer::new("Loading the SBWT index");
        let container = Arc::new(SbwtContainer::load(&self.index_file)?);
        load_timer.log_completion(container.max_index() + 1);
        let kmer_size = container.kmer_size();
        let max_index = match &self.colors_file {
            Some(colors_file) => ColorIndexContainer::load(colors_file)?.max_index(),
            None => container.max_index(),
        };

        let (inputs, outputs) =
            filenames::expand_pairs(&self.query_file, &self.output_file)?;
        let groups = load_balancer::partition(inputs, outputs, self.common.streams);
        let streams = groups.len() as u64;
        log::debug!("Using {streams} streams");

        let memory_args = self.common.memory_args();
        let cpu_free = planner::cpu_budget_bits(total_system_memory_bits(), &memory_args)?;
        let gpu_free = planner::gpu_budget_bits(free_device_memory_bits(), &memory_args);
        let cpu_costs = planner::index_mode_cpu_costs(print_mode, max_index)?;
        let gpu_costs = planner::index_mode_gpu_costs();
        let max_chars = planner::max_elements_per_batch(
            cpu_free,
            cpu_costs.per_element(self.base_pairs_per_seq),
            gpu_free,
            gpu_costs.per_element(self.base_pairs_per_seq),
            streams,
        )? as usize;
        let max_seqs = (max_chars / self.base_pairs_per_seq as usize).max(1);
        info!("Using {max_chars} max characters per batch and {max_seqs} max seqs per batch");

        let mut parsers = Vec::new();
        let mut converters = Vec::new();
        let mut builders = Vec::new();
        let mut searchers = Vec::new();
        let mut printers = Vec::new();
        for (stream_id, group) in groups.into_iter().enumerate() {
            let parser = SequenceFileParser::new(
                stream_id as u64,
                group.inputs,
                max_chars,
                max_seqs,
                MAX_BATCHES_IN_FLIGHT,
            );
            let converter = SeqToBitsConverter::new(
                stream_id as u64,
                parser.string_sequence_batches(),
                self.common.threads as usize,
                max_chars,
                MAX_BATCHES_IN_FLIGHT,
            )?;
            let builder = PositionsBuilder::new(
                stream_id as u64,
                parser.string_break_batches(),
                kmer_size,
                max_chars,
                MAX_BATCHES_IN_FLIGHT,
            );
            let searcher = IndexSearcher::new(
                stream_id as u64,
                Arc::clone(&container),
                converter.bits_batches(),
                builder.positions_batches(),
                max_chars,
                MAX_BATCHES_IN_FLIGHT,
            )?;
            let printer = ResultsPrinter::new(
                stream_id as u64,
                searcher.results_batches(),
                parser.interval_batches(),
                converter.invalid_chars_batches(),
                group.outputs,
                kmer_size,
                max_chars,
                self.common.write_headers,
                index_formatter(print_mode)?,
            );
            parsers.push(parser);
            converters.push(converter);
            builders.push(builder);
            searchers.push(searcher);
            printers.push(printer);
        }

        info!("Running queries");
        let timer = OperationTimer::new("Querying");
        run_pipelines(parsers, converters, builders, searchers, printers)?;
        timer.log_completion(streams);
        info!("Finished");
        Ok(())
    }
}

/// One thread per (stage, stream); the first stage error aborts the run.
fn run_pipelines(
    parsers: Vec<SequenceFileParser>,
    converters: Vec<SeqToBitsConverter>,
    builders: Vec<PositionsBuilder>,
    searchers: Vec<IndexSearcher>,
    printers: Vec<ResultsPrinter>,
) -> std::result::Result<(), SbwtqError> {
    thread::scope(|scope| {
        let mut handles = Vec::new();
        for parser in parsers {
            handles.push(scope.spawn(move || parser.run()));
        }
        for converter in converters {
            handles.push(scope.spawn(move || converter.run()));
        }
        for builder in builders {
            handles.push(scope.spawn(move || builder.run()));
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
