//! # xdf2bids
//!
//! Command-line front-end for converting decoded XDF recordings into BIDS.
//!
//! ## Usage
//!
//! ```bash
//! # Convert one session
//! xdf2bids convert session.json bids/ -p 01 -s 01 -t balance \
//!     --boundaries marker-stream:Markers --manifest manifest.json
//!
//! # Preview classification, reference clock and runs
//! xdf2bids inspect session.json --boundaries marker-stream:Markers
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli::init_logging(cli.verbosity());
    cli::dispatch(cli)
}
