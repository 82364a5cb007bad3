//! Switchboard CLI
//!
//! Operator tooling around the connection manager: validate a configuration,
//! inspect service catalogs and health, invoke single operations and
//! diagnose failing services.
//!
//! Logs go to stderr so `--json` output on stdout stays parseable.
//! `RUST_LOG` overrides the level from the configuration's `[logging]` table.

mod args;
mod commands;

use args::Cli;
use clap::Parser;
use switchboard_core::LoggingConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(&cli.config)?;
    init_logging(&config.logging, cli.verbose);
    debug!(
        files = ?cli.config,
        services = config.services.len(),
        "configuration loaded"
    );

    commands::route(cli, config).await
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format.to_ascii_lowercase().as_str() {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        _ => builder.init(),
    }
}
