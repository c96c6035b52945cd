use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use textreuse::cli::Cli;
use textreuse::pipeline;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let (config, corpus) = cli.resolve()?;
    pipeline::run(&corpus, &config)?;
    Ok(())
}
