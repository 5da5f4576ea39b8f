use anyhow::Result;
use clap::Parser;

use cinder::cli::args::CliArgs;
use cinder::cli::driver;

fn main() -> Result<()> {
    // Initialize tracing if CINDER_LOG or RUST_LOG is set (zero cost otherwise).
    // Supports CINDER_LOG_FORMAT=tree|json|text (see src/tracing_config.rs).
    cinder::tracing_config::init_tracing();

    let args = CliArgs::parse();
    let output = driver::execute(&args)?;
    print!("{output}");
    Ok(())
}
