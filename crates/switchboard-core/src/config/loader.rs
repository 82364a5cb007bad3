//! Configuration loading from TOML or JSON files

use super::service::{ConfigLayer, ManagerConfig, ServiceConfig};
use crate::error::{ConnectorError, ConnectorResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File format of a configuration source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> ConnectorResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            other => Err(ConnectorError::configuration(format!(
                "unsupported config extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// Loads and merges configuration files, later files winning per service
#[derive(Debug)]
pub struct ConfigLoader {
    files: Vec<PathBuf>,
    expand: bool,
}

impl ConfigLoader {
    /// Create a loader with environment expansion enabled
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            expand: true,
        }
    }

    /// Add a file source
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files.push(path.as_ref().to_path_buf());
        self
    }

    /// Toggle `${VAR}` and `~` expansion in command, args, env, url and headers
    pub fn with_expansion(mut self, enabled: bool) -> Self {
        self.expand = enabled;
        self
    }

    /// Load, merge, expand and validate all sources
    pub fn load(self) -> ConnectorResult<ManagerConfig> {
        let mut config = ManagerConfig::default();

        for path in &self.files {
            debug!(path = %path.display(), "loading service configuration");
            let content = fs::read_to_string(path).map_err(|e| {
                ConnectorError::configuration(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let layer = match ConfigFormat::from_path(path)? {
                ConfigFormat::Toml => toml_layer(&content)?,
                ConfigFormat::Json => json_layer(&content)?,
            };
            config.merge(layer);
        }

        if self.expand {
            for (name, service) in config.services.iter_mut() {
                expand_service(service).map_err(|e| e.with_service(name.clone()))?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without validating it
    pub fn parse_toml(content: &str) -> ConnectorResult<ManagerConfig> {
        let mut config = ManagerConfig::default();
        config.merge(toml_layer(content)?);
        Ok(config)
    }

    /// Parse a JSON document without validating it
    pub fn parse_json(content: &str) -> ConnectorResult<ManagerConfig> {
        let mut config = ManagerConfig::default();
        config.merge(json_layer(content)?);
        Ok(config)
    }
}

fn toml_layer(content: &str) -> ConnectorResult<ConfigLayer> {
    toml::from_str(content).map_err(|e| ConnectorError::configuration(format!("invalid TOML: {}", e)))
}

fn json_layer(content: &str) -> ConnectorResult<ConfigLayer> {
    serde_json::from_str(content)
        .map_err(|e| ConnectorError::configuration(format!("invalid JSON: {}", e)))
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn expand_value(value: &str) -> ConnectorResult<String> {
    shellexpand::full(value)
        .map(|expanded| expanded.into_owned())
        .map_err(|e| ConnectorError::configuration(format!("cannot expand '{}': {}", value, e)))
}

fn expand_service(service: &mut ServiceConfig) -> ConnectorResult<()> {
    if let Some(command) = &service.command {
        service.command = Some(expand_value(command)?);
    }
    if let Some(url) = &service.url {
        service.url = Some(expand_value(url)?);
    }
    for arg in service.args.iter_mut() {
        *arg = expand_value(arg)?;
    }
    for value in service.env.values_mut() {
        *value = expand_value(value)?;
    }
    for value in service.headers.values_mut() {
        *value = expand_value(value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use crate::error::ErrorKind;
    use std::io::Write;
    use std::time::Duration;

    const SAMPLE_TOML: &str = r#"
[defaults]
timeout = "20s"
max_attempts = 4

[services.zoho]
command = "zoho-mcp"
args = ["--stdio"]
category = "accounts_payable"
max_attempts = 3
base_delay = "1s"

[services.salesforce]
transport = "http"
url = "https://sf.example.com/mcp"
category = "crm"
headers = { Authorization = "Bearer abc" }
"#;

    #[test]
    fn test_parse_toml() {
        let config = ConfigLoader::parse_toml(SAMPLE_TOML).unwrap();
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.defaults.timeout, Duration::from_secs(20));

        let zoho = &config.services["zoho"];
        assert_eq!(zoho.transport, TransportKind::Stdio);
        assert_eq!(zoho.max_attempts, Some(3));
        assert_eq!(zoho.base_delay, Some(Duration::from_secs(1)));

        let settings = zoho.settings(&config.defaults);
        assert_eq!(settings.timeout, Duration::from_secs(20));
        assert_eq!(settings.max_attempts, 3);

        let sf = &config.services["salesforce"];
        assert_eq!(sf.transport, TransportKind::Http);
        assert_eq!(sf.headers["Authorization"], "Bearer abc");
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "services": {
                "gmail": {"command": "gmail-mcp", "timeout": "5s", "category": "email"}
            }
        }"#;
        let config = ConfigLoader::parse_json(json).unwrap();
        assert_eq!(
            config.services["gmail"].timeout,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = ConfigLoader::parse_toml("[services.x]\ncommand = \"a\"\nretries = 3\n")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_load_merges_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("base.toml");
        let second = dir.path().join("override.json");

        fs::File::create(&first)
            .unwrap()
            .write_all(SAMPLE_TOML.as_bytes())
            .unwrap();
        fs::File::create(&second)
            .unwrap()
            .write_all(br#"{"services": {"zoho": {"command": "zoho-v2", "max_attempts": 2}}}"#)
            .unwrap();

        let config = ConfigLoader::new()
            .with_file(&first)
            .with_file(&second)
            .load()
            .unwrap();

        assert_eq!(config.services["zoho"].command.as_deref(), Some("zoho-v2"));
        assert_eq!(config.services["zoho"].max_attempts, Some(2));
        assert!(config.services.contains_key("salesforce"));
    }

    #[test]
    fn test_later_files_keep_unset_defaults_and_logging() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.toml");
        let second = dir.path().join("b.toml");
        fs::write(
            &first,
            "[logging]\nlevel = \"debug\"\n\n[defaults]\nmax_attempts = 9\n",
        )
        .unwrap();
        fs::write(&second, "[defaults]\ntimeout = \"5s\"\n").unwrap();

        let config = ConfigLoader::new()
            .with_file(&first)
            .with_file(&second)
            .load()
            .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.defaults.max_attempts, 9);
        assert_eq!(config.defaults.timeout, Duration::from_secs(5));
        assert_eq!(config.defaults.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_load_fails_fast_on_invalid_service() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[services.broken]\ntransport = \"http\"\n").unwrap();

        let err = ConfigLoader::new().with_file(&path).load().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.context().service.as_deref(), Some("broken"));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.yaml");
        fs::write(&path, "services: {}").unwrap();
        assert!(ConfigLoader::new().with_file(&path).load().is_err());
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let mut service = ServiceConfig::http("${SWITCHBOARD_TEST_SURELY_UNSET_VAR}/mcp");
        let err = expand_service(&mut service).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
