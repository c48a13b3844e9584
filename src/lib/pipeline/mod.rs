//! The staged streaming query pipeline.
//!
//! Stages are free-running workers connected by the bounded rings in
//! [`channel`]; each stage blocks only on its rings (and, for the searcher
//! stages, on accelerator stream synchronization), which yields automatic
//! back-pressure and a hard bound on live memory.
//!
//! ```text
//! index mode
//!   SequenceFileParser ─┬─ StringSequenceBatch → SeqToBitsConverter ─┬─ BitsBatch ─┐
//!                       ├─ StringBreakBatch → PositionsBuilder ─ PositionsBatch ──┤
//!                       └─ IntervalBatch ──────────────────────────────┐          │
//!                                                InvalidCharsBatch ────┤   IndexSearcher
//!                                                                      │          │
//!                                                                ResultsPrinter ◄─┘
//!
//! color mode
//!   IndexFileParser ─┬─ IndexesBatch → ColorSearcher ─ ColorsBatch ─┐
//!                    └─ SeqStatisticsBatch ────────────► ColorResultsPrinter
//! ```
//!
//! One full pipeline instance runs per stream; instances never synchronize
//! with each other and share the accelerator through per-stream queues.

pub mod batches;
pub mod channel;
pub mod color_searcher;
pub mod index_file_parser;
pub mod index_searcher;
pub mod positions_builder;
pub mod printers;
pub mod seq_to_bits;
pub mod sequence_file_parser;

/// Batch slots pre-allocated per ring; two is enough for every stage to
/// overlap its work with its consumer's.
pub const MAX_BATCHES_IN_FLIGHT: usize = 2;
