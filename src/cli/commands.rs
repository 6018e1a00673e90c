//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - dbt run: trigger a dbt Cloud job
//! - fivetran sync/pause/resume: drive a Fivetran connector
//! - check: verify credentials against a vendor API

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Jobwait - trigger data-pipeline jobs and wait for them to finish
#[derive(Parser, Debug)]
#[command(name = "jobwait")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the run report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    pub log_stderr: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// dbt Cloud jobs
    Dbt {
        #[command(subcommand)]
        command: DbtCommands,
    },

    /// Fivetran connectors
    Fivetran {
        #[command(subcommand)]
        command: FivetranCommands,
    },

    /// Check that credentials work for a vendor
    Check {
        /// Vendor to check
        #[arg(value_enum)]
        vendor: Vendor,
    },
}

/// dbt Cloud subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum DbtCommands {
    /// Trigger a job run
    Run {
        /// dbt Cloud job id
        job_id: String,

        /// Cause recorded on the run
        #[arg(long, default_value = "Triggered by jobwait")]
        cause: String,

        /// Wait for the run to finish
        #[arg(short, long)]
        wait: bool,

        /// Seconds between polls (overrides config)
        #[arg(short, long)]
        poke_interval: Option<u64>,

        /// Re-trigger a failed or cancelled run up to this many runs in total
        #[arg(short, long)]
        max_attempts: Option<u32>,

        /// Stop waiting after this many seconds
        #[arg(short, long)]
        deadline: Option<u64>,
    },
}

/// Fivetran subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum FivetranCommands {
    /// Start a connector sync
    Sync {
        /// Fivetran connector id
        connector_id: String,

        /// Don't interrupt a sync that is already running
        #[arg(long)]
        no_force: bool,

        /// Wait for the sync to finish
        #[arg(short, long)]
        wait: bool,

        /// Seconds between polls (overrides config)
        #[arg(short, long)]
        poke_interval: Option<u64>,

        /// Stop waiting after this many seconds
        #[arg(short, long)]
        deadline: Option<u64>,
    },

    /// Pause a connector
    Pause {
        /// Fivetran connector id
        connector_id: String,
    },

    /// Resume a paused connector
    Resume {
        /// Fivetran connector id
        connector_id: String,
    },
}

/// Supported vendors
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Dbt,
    Fivetran,
}
