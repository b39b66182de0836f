//! Command-line argument parsing
//!
//! clap derive CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Multi-hop question answering over a schema-aware document corpus
#[derive(Parser, Debug)]
#[command(name = "multihop")]
#[command(version)]
#[command(about = "Answer multi-hop questions over your documents with local models", long_about = None)]
pub struct Args {
    /// Configuration file path (~/.multihop/config.toml by default)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only print results)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Answer a question against the ingested corpus
    Ask {
        question: String,

        /// Override the reasoning iteration limit
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Print the final reasoning state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve schemas, chunk, embed and store documents
    Ingest {
        #[arg(required = true, value_name = "FILES")]
        files: Vec<PathBuf>,
    },

    /// Resolve and print the schema of one document
    Resolve { file: PathBuf },

    /// List schema patterns
    Patterns {
        /// Additional directory of `*.json` patterns to load
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Write every registered pattern to this directory
        #[arg(long, value_name = "DIR")]
        export: Option<PathBuf>,
    },
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Level passed to `telemetry::init_tracing`
    pub fn tracing_level(&self) -> u8 {
        match self {
            Verbosity::Quiet | Verbosity::Normal => 0,
            Verbosity::Verbose => 1,
            Verbosity::VeryVerbose => 2,
        }
    }

    /// Check if should show per-step details
    pub fn show_steps(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
