//! CLI type definitions
//!
//! Clap command structures for the `demand-corpus` binary.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "demand-corpus")]
#[command(about = "Grow, validate and certify keyword demand corpora", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Config file (defaults to .demand-corpus/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Draft a new snapshot from the category dictionary
    Draft {
        /// Category id
        category: String,
        /// Make the draft the active snapshot even if one exists
        #[arg(long)]
        activate: bool,
    },

    /// Grow a corpus toward its valid-keyword target
    Grow {
        /// Categories to act on
        #[command(flatten)]
        target: TargetArgs,
        /// Valid-keyword target (defaults to growth.default_target_valid)
        #[arg(short, long)]
        valid: Option<u64>,
        /// Maximum growth passes
        #[arg(short, long)]
        max_attempts: Option<u32>,
    },

    /// Look up volumes for every unverified keyword
    Validate {
        /// Categories to act on
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Evaluate certification gates and promote on a pass
    Certify {
        /// Categories to act on
        #[command(flatten)]
        target: TargetArgs,
        /// Tier to certify (full, lite)
        #[arg(short, long, default_value = "full")]
        tier: String,
        /// Gate profile (standard, lean-rebuild)
        #[arg(short, long, default_value = "standard")]
        policy: String,
        /// Evaluate without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Reset, regrow and recertify a snapshot with the lean policy
    Rebuild {
        /// Categories to act on
        #[command(flatten)]
        target: TargetArgs,
        /// Tier to rebuild toward (full, lite)
        #[arg(short, long, default_value = "full")]
        tier: String,
    },

    /// Downgrade a snapshot's lifecycle so it can be grown again
    Reset {
        /// Category id
        category: String,
        /// Snapshot id (defaults to the active snapshot)
        #[arg(short, long)]
        snapshot: Option<String>,
    },

    /// Show snapshot counts, lifecycle and health
    Status {
        /// Category id
        category: String,
        /// Snapshot id (defaults to the active snapshot)
        #[arg(short, long)]
        snapshot: Option<String>,
        /// List every snapshot of the category instead
        #[arg(long)]
        all: bool,
    },

    /// Job register commands
    #[command(subcommand)]
    Job(JobCommands),
}

/// Which corpora an operation runs on.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Category ids
    pub categories: Vec<String>,
    /// Run on every configured category
    #[arg(long, conflicts_with = "categories")]
    pub all: bool,
    /// Snapshot id (single category only; defaults to the active snapshot)
    #[arg(short, long)]
    pub snapshot: Option<String>,
}

/// Job register commands
#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// List jobs, reaping zombies on the way
    List {
        /// Filter by category
        #[arg(long)]
        category: Option<String>,
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,
        /// Filter by kind (grow, validate, certify, rebuild)
        #[arg(short, long)]
        kind: Option<String>,
        /// Maximum number of jobs to display
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show details for a job
    Show {
        /// Job ID
        id: String,
    },

    /// Ask a running job to stop at its next checkpoint
    Stop {
        /// Job ID
        id: String,
    },
}
