//! Configuration validation

use super::print_json;
use colored::*;
use serde_json::json;
use switchboard_core::ManagerConfig;

/// Print the effective settings of every configured service.
///
/// Loading already validated the document, so reaching this point means the
/// configuration is usable.
pub fn execute(config: &ManagerConfig, json: bool) -> anyhow::Result<()> {
    if json {
        let services: Vec<_> = config
            .services
            .iter()
            .map(|(name, service)| {
                let settings = service.settings(&config.defaults);
                json!({
                    "service": name,
                    "transport": service.transport,
                    "target": service.target(),
                    "enabled": service.enabled,
                    "category": service.category,
                    "timeout_ms": settings.timeout.as_millis() as u64,
                    "max_attempts": settings.max_attempts,
                    "failure_threshold": settings.failure_threshold,
                })
            })
            .collect();
        return print_json(&json!({ "valid": true, "services": services }));
    }

    if config.services.is_empty() {
        println!("{}", "Configuration is valid but defines no services.".yellow());
        return Ok(());
    }

    println!("{}", "Configuration is valid".green().bold());
    println!();
    for (name, service) in &config.services {
        let settings = service.settings(&config.defaults);
        let status = if service.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!(
            "  {} ({}) - {} [{}]",
            name.bold(),
            service.transport,
            service.target(),
            status
        );
        if let Some(category) = &service.category {
            println!("      category: {}", category.cyan());
        }
        println!(
            "      timeout: {:?}, retries: {}, backoff: {:?}..{:?}, failure threshold: {}",
            settings.timeout,
            settings.max_attempts,
            settings.base_delay,
            settings.max_delay,
            settings.failure_threshold
        );
    }
    Ok(())
}
