//! CLI commands

mod catalog;
mod conflicts;
mod diagnose;
mod health;
mod invoke;
mod validate;

use crate::args::{Cli, Commands};
use anyhow::Context;
use colored::*;
use std::path::PathBuf;
use std::time::Duration;
use switchboard_core::{ConfigLoader, ConnectReport, ConnectionManager, ManagerConfig};

/// Load and merge every configuration file given on the command line
pub fn load_config(files: &[PathBuf]) -> anyhow::Result<ManagerConfig> {
    let loader = files
        .iter()
        .fold(ConfigLoader::new(), |loader, path| loader.with_file(path));
    loader.load().with_context(|| {
        let names: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
        format!("failed to load configuration from {}", names.join(", "))
    })
}

/// Route the parsed command to its handler
pub async fn route(cli: Cli, config: ManagerConfig) -> anyhow::Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Validate => validate::execute(&config, json),
        Commands::Catalog { service, category } => {
            catalog::execute(config, service.as_deref(), category.as_deref(), json).await
        }
        Commands::Health { service } => health::execute(config, service.as_deref(), json).await,
        Commands::Invoke {
            service,
            operation,
            args,
            timeout_ms,
        } => {
            let timeout = timeout_ms.map(Duration::from_millis);
            invoke::execute(config, &service, &operation, &args, timeout, json).await
        }
        Commands::Diagnose { service } => diagnose::execute(config, &service, json).await,
        Commands::Conflicts => conflicts::execute(config, json).await,
    }
}

fn build_manager(config: ManagerConfig) -> anyhow::Result<ConnectionManager> {
    ConnectionManager::new(config).context("failed to build connection manager")
}

/// Print services that could not be connected
fn print_connect_failures(report: &ConnectReport) {
    for (service, error) in &report.failed {
        eprintln!("{} {}: {}", "✗".red(), service.bold(), error.red());
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
