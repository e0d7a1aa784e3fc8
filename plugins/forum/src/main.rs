use anyhow::Result;
use clap::Parser;
use forum::{bridge, config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::Cli::parse();
    let cfg = config::Config::load(&cli)?;
    let level = if cfg.logging_enabled { "info" } else { "warn" };
    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
    bridge::run_stdio(cfg, cli.stdio).await
}
