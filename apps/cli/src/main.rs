//! beacon CLI: resolve a genomic job and run its pipeline stages.
//!
//! Turns a VCF file plus BFF metadata into Beacon Friendly Format documents,
//! an HTML browser and a MongoDB load, depending on the mode.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);

    let result = commands::run(cli);
    if let Err(e) = &result {
        eprintln!(
            "[{}] beacon exited with error: {e}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
    }
    result
}
