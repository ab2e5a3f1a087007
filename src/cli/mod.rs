use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use xdf2bids::bids::ConflictPolicy;
use xdf2bids::clock::ReferenceSelector;
use xdf2bids::config::TimeOrigin;
use xdf2bids::segment::RunBoundarySource;

mod config;
mod convert;
mod inspect;

/// xdf2bids - XDF recordings to BIDS
#[derive(Parser)]
#[command(name = "xdf2bids")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Existing-file policy.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ConflictArg {
    /// Replace existing files
    Overwrite,
    /// Leave existing files and report the segment as partial
    Fail,
    /// Write alongside with a `_v<N>` suffix
    VersionSuffix,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(arg: ConflictArg) -> Self {
        match arg {
            ConflictArg::Overwrite => ConflictPolicy::Overwrite,
            ConflictArg::Fail => ConflictPolicy::Fail,
            ConflictArg::VersionSuffix => ConflictPolicy::VersionSuffix,
        }
    }
}

/// Origin of written times.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TimeOriginArg {
    /// Seconds since the run started
    RunStart,
    /// Seconds since the reference stream started
    SessionStart,
    /// Reference-clock seconds
    Absolute,
}

impl From<TimeOriginArg> for TimeOrigin {
    fn from(arg: TimeOriginArg) -> Self {
        match arg {
            TimeOriginArg::RunStart => TimeOrigin::RunStart,
            TimeOriginArg::SessionStart => TimeOrigin::SessionStart,
            TimeOriginArg::Absolute => TimeOrigin::Absolute,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a decoded XDF session into a BIDS tree
    Convert {
        /// Decoded session (JSON)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// BIDS dataset root
        #[arg(value_name = "OUTPUT_DIR")]
        output: PathBuf,

        /// Load settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Participant label
        #[arg(short = 'p', long)]
        participant: Option<String>,

        /// Session label
        #[arg(short = 's', long)]
        session: Option<String>,

        /// Task label for runs whose markers name none
        #[arg(short = 't', long)]
        task: Option<String>,

        /// Reference clock ("highest-rate" or "named:<id>")
        #[arg(long, value_name = "SELECTOR")]
        reference: Option<ReferenceSelector>,

        /// Run boundaries ("single-run" or "marker-stream:<name>")
        #[arg(long, value_name = "SOURCE")]
        boundaries: Option<RunBoundarySource>,

        /// Only markers containing this text start or define runs
        #[arg(long, value_name = "TEXT")]
        boundary_pattern: Option<String>,

        /// What to do with files that already exist
        #[arg(long, value_enum)]
        conflict: Option<ConflictArg>,

        /// Origin of time columns and event onsets
        #[arg(long, value_enum)]
        time_origin: Option<TimeOriginArg>,

        /// Abort when any stream is unsupported
        #[arg(long)]
        strict: bool,

        /// Do not write runs that contain no samples of a stream
        #[arg(long)]
        skip_empty: bool,

        /// Omit the leading time column from data files
        #[arg(long)]
        no_time_column: bool,

        /// Write the manifest here instead of stdout
        #[arg(long, value_name = "FILE")]
        manifest: Option<PathBuf>,
    },

    /// Show classification, reference clock and runs without writing
    Inspect {
        /// Decoded session (JSON)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Load settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Reference clock ("highest-rate" or "named:<id>")
        #[arg(long, value_name = "SELECTOR")]
        reference: Option<ReferenceSelector>,

        /// Run boundaries ("single-run" or "marker-stream:<name>")
        #[arg(long, value_name = "SOURCE")]
        boundaries: Option<RunBoundarySource>,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Convert {
            input,
            output,
            config,
            participant,
            session,
            task,
            reference,
            boundaries,
            boundary_pattern,
            conflict,
            time_origin,
            strict,
            skip_empty,
            no_time_column,
            manifest,
        } => {
            let resolved = config::Overrides {
                participant,
                session,
                task,
                reference,
                boundaries,
                conflict: conflict.map(ConflictPolicy::from),
                time_origin: time_origin.map(TimeOrigin::from),
                boundary_pattern,
                strict,
                skip_empty,
                no_time_column,
            }
            .resolve(config.as_ref())?;
            convert::run(input, output, resolved, manifest)
        }
        Commands::Inspect {
            input,
            config,
            reference,
            boundaries,
        } => {
            let resolved = config::Overrides {
                reference,
                boundaries,
                ..Default::default()
            }
            .resolve(config.as_ref())?;
            inspect::run(input, resolved)
        }
    }
}
