//! trapscan CLI: scan an image set, then classify or annotate it.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use trapscan::engine::arg_parser::Cli;
use trapscan::engine::handle_run;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
