//! CLI argument definitions using clap
//!
//! Commands:
//! - rewind preview <target> <checktime>
//! - rewind restore <target> <checktime>
//! - rewind ingest [payload]
//! - rewind seed [-p prefix]...

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// rewind - point-in-time recovery for hierarchical parameter stores
#[derive(Parser, Debug)]
#[command(name = "rewind")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Configuration file (.toml, .json or .yaml); REWIND_* variables otherwise
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Versioned store namespace, overriding the configuration
    #[arg(short, long, global = true)]
    pub bucket: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print rows as JSON lines instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    /// Print SecureString values in tables instead of masking them
    #[arg(long, global = true)]
    pub show_secrets: bool,
}

#[derive(Args, Debug)]
pub struct PointInTime {
    /// Key, or path ending in '/'
    pub target: String,

    /// Point in time (UTC), e.g. 2022-08-03T21:10:00
    #[arg(value_parser = parse_checktime)]
    pub checktime: DateTime<Utc>,

    /// Include every descendant of a path, not only its children
    #[arg(short = 'R', long)]
    pub recursive: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show what the target looked like at a point in time
    Preview(PointInTime),

    /// Write the target's state at a point in time back to the live store
    Restore(PointInTime),

    /// Record a queue batch of change notifications
    Ingest {
        /// File holding the batch; stdin when omitted
        payload: Option<PathBuf>,
    },

    /// Record the current value of every live parameter
    Seed {
        /// Only parameters under these paths (repeatable)
        #[arg(short, long = "prefix")]
        prefixes: Vec<String>,

        /// Actually write; otherwise only list what would be recorded
        #[arg(long)]
        do_it: bool,
    },
}

fn parse_checktime(raw: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM:SS: {}", e))
}
