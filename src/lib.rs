// src/lib.rs

//! Scores the basic blocks of a compiled unit by the git history of their
//! source lines, for fuzzers that favor recently and frequently changed code.

pub mod aggregate;
pub mod config;
pub mod distribution;
pub mod error;
pub mod history;
pub mod layout;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod pass;

pub use aggregate::{BlockAggregator, BlockScore, MetricSelection, Recency, Reduction};
pub use config::Config;
pub use error::{ConfigError, HistoryError, HistoryResult};
pub use history::{open_repository, Backend, HistoryAccessor};
pub use layout::{CoverageMap, ScoringLayout, MAP_SIZE};
pub use metrics::{load_profile, LineMetrics};
pub use pass::{
    compute_block_scores, instrument_unit, BasicBlock, BlockScoreTable, CompilationUnit,
    PassDiagnostics,
};
