//! CLI argument definitions using clap
//!
//! - switchboard validate                         # Check the configuration
//! - switchboard catalog [--service S]            # Connect and list operations
//! - switchboard health [service]                 # Connect and report health
//! - switchboard invoke <service> <op> --args '{}'
//! - switchboard diagnose <service>
//! - switchboard conflicts

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file name used across all commands.
pub const DEFAULT_CONFIG_FILE: &str = "switchboard.toml";

#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(about = "Switchboard - pooled, self-healing connections to tool servers")]
#[command(version)]
pub struct Cli {
    /// Configuration files (TOML or JSON); later files override earlier ones
    #[arg(
        short,
        long = "config",
        env = "SWITCHBOARD_CONFIG",
        default_value = DEFAULT_CONFIG_FILE,
        value_delimiter = ','
    )]
    pub config: Vec<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging (overrides the configured level)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Load and validate the configuration without connecting
    Validate,

    /// Connect to every enabled service and list its operations
    Catalog {
        /// Only show this service
        #[arg(long)]
        service: Option<String>,
        /// Only show services in this category
        #[arg(long)]
        category: Option<String>,
    },

    /// Connect and report health for one or all services
    Health {
        /// Service name (all services if omitted)
        service: Option<String>,
    },

    /// Invoke one operation
    Invoke {
        /// Service name
        service: String,
        /// Operation name
        operation: String,
        /// Arguments as a JSON object
        #[arg(long, short, default_value = "{}")]
        args: String,
        /// Timeout in milliseconds (operation or service default if omitted)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Connect to a service and explain what is wrong with it
    Diagnose {
        /// Service name
        service: String,
    },

    /// List operation names exposed by more than one service
    Conflicts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_invoke() {
        let cli = Cli::parse_from([
            "switchboard",
            "--config",
            "a.toml,b.json",
            "invoke",
            "zoho",
            "get_invoices",
            "--args",
            r#"{"status":"open"}"#,
            "--json",
        ]);
        assert_eq!(cli.config.len(), 2);
        assert!(cli.json);
        match cli.command {
            Commands::Invoke {
                service,
                operation,
                args,
                timeout_ms,
            } => {
                assert_eq!(service, "zoho");
                assert_eq!(operation, "get_invoices");
                assert_eq!(args, r#"{"status":"open"}"#);
                assert_eq!(timeout_ms, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_default_config_file() {
        let cli = Cli::parse_from(["switchboard", "validate"]);
        assert_eq!(cli.config, vec![PathBuf::from(DEFAULT_CONFIG_FILE)]);
    }
}
