// src/cli.rs

use clap::{Parser, Subcommand};
use git_fitness::distribution::DEFAULT_PERCENT;
use git_fitness::metrics::DEFAULT_CHURN_LIMIT;
use git_fitness::Backend;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sample line metrics over a whole repository and derive inclusion thresholds
    Distribution {
        /// Path inside the git repository to sample
        #[arg(short, long)]
        repo: PathBuf,

        /// Share of lines, in percent, that should pass each threshold
        #[arg(short, long, default_value_t = DEFAULT_PERCENT,
              value_parser = clap::value_parser!(u8).range(1..=100))]
        percent: u8,

        /// Directory for the distribution records (defaults to the repository root)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// How history is queried
        #[arg(long, value_enum, default_value_t = BackendArg::Libgit2)]
        backend: BackendArg,

        /// Resample even if records for the current HEAD exist
        #[arg(long)]
        force: bool,

        /// Maximum commits walked per file for churn
        #[arg(long, default_value_t = DEFAULT_CHURN_LIMIT)]
        churn_limit: usize,
    },

    /// Print age, churn and rank of every line of a file at HEAD
    Lines {
        /// Path inside the git repository
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// File path relative to the repository root
        file: String,

        /// How history is queried
        #[arg(long, value_enum, default_value_t = BackendArg::Libgit2)]
        backend: BackendArg,

        /// Maximum commits walked for churn
        #[arg(long, default_value_t = DEFAULT_CHURN_LIMIT)]
        churn_limit: usize,
    },
}

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum BackendArg {
    /// In-process libgit2
    Libgit2,
    /// The `git` executable
    Command,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Libgit2 => Backend::Libgit2,
            BackendArg::Command => Backend::Command,
        }
    }
}
