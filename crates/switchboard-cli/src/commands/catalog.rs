//! Operation catalog listing

use super::{build_manager, print_connect_failures, print_json};
use colored::*;
use std::collections::BTreeMap;
use switchboard_core::{ManagerConfig, OperationDescriptor};

pub async fn execute(
    config: ManagerConfig,
    service: Option<&str>,
    category: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let manager = build_manager(config)?;
    let report = manager.connect_all().await;

    let mut catalog: BTreeMap<String, Vec<OperationDescriptor>> = manager.discover();
    if let Some(service) = service {
        catalog.retain(|name, _| name == service);
    }
    if let Some(category) = category {
        let members = manager.services_for_category(category);
        catalog.retain(|name, _| members.contains(name));
    }
    manager.shutdown().await;

    if json {
        return print_json(&serde_json::json!({
            "catalog": catalog,
            "failed": report.failed,
        }));
    }

    print_connect_failures(&report);
    if catalog.is_empty() {
        println!("No operations discovered.");
        return Ok(());
    }

    for (service, operations) in &catalog {
        println!();
        println!(
            "{} ({} operations)",
            service.bold().underline(),
            operations.len()
        );
        for op in operations {
            let mut flags = Vec::new();
            if op.requires_auth {
                flags.push("auth".to_string());
            }
            if let Some(limit) = &op.rate_limit {
                flags.push(format!("{}/min", limit.per_minute));
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            println!("  {}{}", op.name.cyan(), flags.yellow());
            if !op.description.is_empty() {
                println!("      {}", op.description.dimmed());
            }
            for (param, spec) in &op.parameters {
                let marker = if spec.required { "*" } else { "" };
                println!("      {}{}: {}", param, marker.red(), spec.param_type);
            }
        }
    }
    Ok(())
}
