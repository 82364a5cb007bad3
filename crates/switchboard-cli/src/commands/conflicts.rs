//! Cross-service operation name conflicts

use super::{build_manager, print_connect_failures, print_json};
use colored::*;
use switchboard_core::ManagerConfig;

pub async fn execute(config: ManagerConfig, json: bool) -> anyhow::Result<()> {
    let manager = build_manager(config)?;
    let report = manager.connect_all().await;
    let conflicts = manager.conflicts();
    manager.shutdown().await;

    if json {
        return print_json(&conflicts);
    }

    print_connect_failures(&report);
    if conflicts.is_empty() {
        println!("{}", "No conflicting operation names.".green());
        return Ok(());
    }

    println!("{}", "Operations exposed by several services:".yellow().bold());
    for conflict in &conflicts {
        println!(
            "  {} -> {}",
            conflict.operation.cyan(),
            conflict.services.join(", ")
        );
    }
    println!();
    println!(
        "{}",
        "Invoke these with an explicit service name to pick the backend.".dimmed()
    );
    Ok(())
}
