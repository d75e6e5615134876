//! SuperLink - command-line entry point

use anyhow::Result;
use clap::Parser;
use superlink::{cli, logging, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    // A broken config file is reported by the command itself
    let level = Config::load(args.config.clone())
        .map(|config| config.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    logging::init(args.verbosity(), &level)?;

    cli::run(args).await
}
