use anyhow::Context;
use clap::Parser;
use historical_call::{config::Cli, replay, report::report};
use tracing_subscriber::{fmt, EnvFilter};

fn setup_tracing() -> anyhow::Result<()> {
    // Logs go to stderr, stdout only carries the result line.
    let subscriber = fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to install logger")
}

fn main() -> anyhow::Result<()> {
    setup_tracing()?;
    let config = Cli::parse().into_config();

    let result = replay::run(&config)?;
    println!("{}", report(&result));
    Ok(())
}
