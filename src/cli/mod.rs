//! Command-line surface for running suites in CI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::testing::Summary;

mod run;

pub use run::{history, run};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more tests failed.
    TestsFailed = 10,

    /// Unreadable suite file, unknown suite or environment, bad flags.
    InvalidInput = 30,

    /// Transport setup, storage or output failures.
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_summary(summary: &Summary) -> Self {
        if summary.all_passed() {
            Self::Success
        } else {
            Self::TestsFailed
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0:#}")]
    InvalidInput(anyhow::Error),
    #[error("{0:#}")]
    Runtime(anyhow::Error),
}

impl CliError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::Runtime(_) => ExitCode::RuntimeError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// One line per test plus a summary.
    #[default]
    Text,
    /// The full report as JSON.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "apisuite",
    author,
    version,
    about = "Run API test suites against HTTP services",
    after_help = "Examples:\n  apisuite run suite.json --suite smoke\n  apisuite run suite.json --suite smoke --env staging --parallel --output json\n  apisuite history --db apisuite.db --limit 20"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every test of a suite
    Run(RunArgs),

    /// Print the persisted request history
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Suite definition file (JSON with `config`, `services` and `tests`)
    pub file: PathBuf,

    /// Suite id to run
    #[arg(long)]
    pub suite: String,

    /// Environment to resolve services and variables in
    #[arg(long = "env", value_name = "NAME")]
    pub env: Option<String>,

    /// Run the suite's tests concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Per-request timeout in milliseconds, overriding tests and services
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// SQLite database to load and save history, services, tests and results
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// SQLite database written by `apisuite run --db`
    #[arg(long, value_name = "PATH")]
    pub db: PathBuf,

    /// Maximum number of entries to print, most recent first
    #[arg(long)]
    pub limit: Option<usize>,
}
