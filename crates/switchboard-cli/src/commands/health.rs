//! Service health reporting

use super::{build_manager, print_json};
use colored::*;
use switchboard_core::{ManagerConfig, ServiceHealth, ServiceStatus};

pub async fn execute(config: ManagerConfig, service: Option<&str>, json: bool) -> anyhow::Result<()> {
    let manager = build_manager(config)?;

    let report = match service {
        Some(name) => {
            // A failed connect still leaves a health record worth showing
            let _ = manager.get_or_create(name).await;
            vec![manager.health_status(name)?]
        }
        None => {
            manager.connect_all().await;
            manager.health_report()
        }
    };
    manager.shutdown().await;

    if json {
        return print_json(&report);
    }

    println!("{}", "Service Health".bold().underline());
    println!("{}", "=".repeat(50).dimmed());
    for health in &report {
        print_health(health);
    }
    Ok(())
}

fn print_health(health: &ServiceHealth) {
    let status = match health.status {
        ServiceStatus::Healthy => health.status.to_string().green(),
        ServiceStatus::Connecting | ServiceStatus::Degraded => health.status.to_string().yellow(),
        ServiceStatus::Disconnected => health.status.to_string().dimmed(),
        ServiceStatus::Unhealthy | ServiceStatus::Unavailable => health.status.to_string().red(),
    };
    println!("  {:<20} {}", health.service.bold(), status);

    if let Some(record) = &health.record {
        if let Some(avg) = record.avg_response_ms {
            println!("      avg response: {:.1}ms", avg);
        }
        if record.consecutive_failures > 0 {
            println!(
                "      consecutive failures: {}",
                record.consecutive_failures.to_string().red()
            );
        }
        if let Some(error) = &record.last_error {
            println!("      last error: {}", error.dimmed());
        }
    }
    if let Some(reconnect) = &health.reconnection {
        if reconnect.attempt > 0 {
            println!(
                "      reconnect attempt {}/{}",
                reconnect.attempt, reconnect.max_attempts
            );
        }
    }
}
