//! bookcorpus CLI: turn unpacked e-book packages into a text corpus.
//!
//! Extracts the reading-order text of each package and keeps it in a keyed
//! Arrow store, resuming across runs from a progress ledger.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
