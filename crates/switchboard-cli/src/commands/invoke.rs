//! Single operation invocation

use super::{build_manager, print_json};
use anyhow::{Context, bail};
use colored::*;
use serde_json::Value;
use std::time::Duration;
use switchboard_core::{ManagerConfig, diagnose_error};
use tracing::debug;

pub async fn execute(
    config: ManagerConfig,
    service: &str,
    operation: &str,
    args: &str,
    timeout: Option<Duration>,
    json: bool,
) -> anyhow::Result<()> {
    let arguments = parse_arguments(args)?;
    let manager = build_manager(config)?;
    debug!(service, operation, ?timeout, "invoking operation");

    let result = manager
        .invoke_with_timeout(service, operation, arguments, timeout)
        .await;
    manager.shutdown().await;

    match result {
        Ok(value) => {
            if json {
                print_json(&value)
            } else {
                println!("{}", serde_json::to_string_pretty(&value)?);
                Ok(())
            }
        }
        Err(err) => {
            let diagnosis = diagnose_error(&err);
            if json {
                print_json(&diagnosis)?;
            } else {
                eprintln!("{}", diagnosis.format_display().red());
            }
            Err(err).with_context(|| format!("{}.{} failed", service, operation))
        }
    }
}

fn parse_arguments(args: &str) -> anyhow::Result<Value> {
    let value: Value =
        serde_json::from_str(args).with_context(|| format!("--args is not valid JSON: {}", args))?;
    if !value.is_object() {
        bail!("--args must be a JSON object, got {}", args);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let value = parse_arguments(r#"{"status": "open"}"#).unwrap();
        assert_eq!(value["status"], "open");

        assert!(parse_arguments("[1, 2]").is_err());
        assert!(parse_arguments("{not json").is_err());
    }
}
