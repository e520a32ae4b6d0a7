//! imgflow CLI: run the pipeline, enqueue keywords, show status.

use anyhow::Result;
use clap::Parser;
use imgflow::engine::{Cli, handle_cli};
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_cli(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
