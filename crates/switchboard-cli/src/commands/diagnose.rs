//! Service diagnosis

use super::{build_manager, print_json};
use colored::*;
use switchboard_core::ManagerConfig;

pub async fn execute(config: ManagerConfig, service: &str, json: bool) -> anyhow::Result<()> {
    let manager = build_manager(config)?;

    // The connect error, if any, lands in the report
    let _ = manager.get_or_create(service).await;
    let report = manager.diagnose(service)?;
    manager.shutdown().await;

    if json {
        return print_json(&report);
    }

    println!();
    let heading = format!("Diagnosis: {}", service);
    if report.is_healthy() {
        println!("{}", heading.green().bold());
    } else {
        println!("{}", heading.red().bold());
    }
    println!("{}", "=".repeat(50).dimmed());
    println!("{}", report.format_display());
    Ok(())
}
