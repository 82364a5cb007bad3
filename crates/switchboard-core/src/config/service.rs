//! Per-service configuration and validation

use super::logging::{LoggingConfig, LoggingOverrides};
use crate::error::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

fn default_true() -> bool {
    true
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_jitter() -> f64 {
    0.1
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_failure_threshold() -> u32 {
    3
}

/// How the backend is reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Spawned subprocess speaking newline-delimited JSON-RPC
    #[default]
    Stdio,
    /// Remote endpoint speaking JSON-RPC over HTTP POST
    Http,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => f.write_str("stdio"),
            Self::Http => f.write_str("http"),
        }
    }
}

/// Startup parameters for one external service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Transport used to reach the backend
    #[serde(default)]
    pub transport: TransportKind,
    /// Command to execute (stdio)
    #[serde(default)]
    pub command: Option<String>,
    /// Command arguments (stdio)
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables for the spawned process (stdio)
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Endpoint URL (http)
    #[serde(default)]
    pub url: Option<String>,
    /// Extra request headers (http)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Functional category applied to operations that do not declare one
    #[serde(default)]
    pub category: Option<String>,
    /// Whether the service is started by `connect_all`
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether every operation of this service needs pre-established credentials
    #[serde(default)]
    pub requires_auth: bool,
    /// Default per-call timeout
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Automatic reconnection attempts before the service is declared unavailable
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// First reconnection delay
    #[serde(default, with = "humantime_serde")]
    pub base_delay: Option<Duration>,
    /// Upper bound for reconnection delays
    #[serde(default, with = "humantime_serde")]
    pub max_delay: Option<Duration>,
    /// Jitter ratio applied to reconnection delays (0.0 - 1.0)
    #[serde(default)]
    pub jitter: Option<f64>,
    /// Interval between liveness probes
    #[serde(default, with = "humantime_serde")]
    pub health_check_interval: Option<Duration>,
    /// Consecutive failures before the service is flagged unhealthy
    #[serde(default)]
    pub failure_threshold: Option<u32>,
}

impl ServiceConfig {
    fn empty(transport: TransportKind) -> Self {
        Self {
            transport,
            command: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            url: None,
            headers: BTreeMap::new(),
            category: None,
            enabled: true,
            requires_auth: false,
            timeout: None,
            max_attempts: None,
            base_delay: None,
            max_delay: None,
            jitter: None,
            health_check_interval: None,
            failure_threshold: None,
        }
    }

    /// Create a stdio service config
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
            ..Self::empty(TransportKind::Stdio)
        }
    }

    /// Create an HTTP service config
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::empty(TransportKind::Http)
        }
    }

    /// Add environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add HTTP header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the default category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the reconnection attempt ceiling
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set the reconnection delay bounds
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = Some(base_delay);
        self.max_delay = Some(max_delay);
        self
    }

    /// Set the jitter ratio
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Set the probe interval
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = Some(interval);
        self
    }

    /// Set the unhealthy threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    /// Short description of where the backend lives
    pub fn target(&self) -> String {
        match self.transport {
            TransportKind::Stdio => {
                let command = self.command.as_deref().unwrap_or("<missing command>");
                if self.args.is_empty() {
                    command.to_string()
                } else {
                    format!("{} {}", command, self.args.join(" "))
                }
            }
            TransportKind::Http => self.url.clone().unwrap_or_else(|| "<missing url>".into()),
        }
    }

    /// Merge explicit values with the manager defaults
    pub fn settings(&self, defaults: &ServiceDefaults) -> ServiceSettings {
        ServiceSettings {
            timeout: self.timeout.unwrap_or(defaults.timeout),
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay: self.base_delay.unwrap_or(defaults.base_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            jitter: self.jitter.unwrap_or(defaults.jitter),
            health_check_interval: self
                .health_check_interval
                .unwrap_or(defaults.health_check_interval),
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
        }
    }

    /// Validate the config and return the effective settings
    pub fn validate(&self, defaults: &ServiceDefaults) -> ConnectorResult<ServiceSettings> {
        match self.transport {
            TransportKind::Stdio => {
                let command = self.command.as_deref().unwrap_or("").trim();
                if command.is_empty() {
                    return Err(ConnectorError::configuration(
                        "stdio transport requires a non-empty command",
                    ));
                }
            }
            TransportKind::Http => {
                let url = self.url.as_deref().ok_or_else(|| {
                    ConnectorError::configuration("http transport requires url")
                })?;
                let parsed = reqwest::Url::parse(url).map_err(|e| {
                    ConnectorError::configuration(format!("invalid url '{}': {}", url, e))
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(ConnectorError::configuration(format!(
                        "unsupported url scheme '{}'",
                        parsed.scheme()
                    )));
                }
            }
        }

        if let Some(category) = &self.category {
            if category.trim().is_empty() {
                return Err(ConnectorError::configuration("category must not be empty"));
            }
        }

        let settings = self.settings(defaults);
        settings.validate()?;
        Ok(settings)
    }
}

/// Manager-wide fallbacks for unset service tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefaults {
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default = "default_health_check_interval", with = "humantime_serde")]
    pub health_check_interval: Duration,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for ServiceDefaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: default_jitter(),
            health_check_interval: default_health_check_interval(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// Defaults as written in one file; unset fields keep earlier values
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DefaultsOverrides {
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    #[serde(default)]
    max_attempts: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    base_delay: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    max_delay: Option<Duration>,
    #[serde(default)]
    jitter: Option<f64>,
    #[serde(default, with = "humantime_serde")]
    health_check_interval: Option<Duration>,
    #[serde(default)]
    failure_threshold: Option<u32>,
}

impl ServiceDefaults {
    /// Apply the fields another file sets explicitly
    pub(crate) fn merge(&mut self, other: DefaultsOverrides) {
        if let Some(timeout) = other.timeout {
            self.timeout = timeout;
        }
        if let Some(max_attempts) = other.max_attempts {
            self.max_attempts = max_attempts;
        }
        if let Some(base_delay) = other.base_delay {
            self.base_delay = base_delay;
        }
        if let Some(max_delay) = other.max_delay {
            self.max_delay = max_delay;
        }
        if let Some(jitter) = other.jitter {
            self.jitter = jitter;
        }
        if let Some(interval) = other.health_check_interval {
            self.health_check_interval = interval;
        }
        if let Some(threshold) = other.failure_threshold {
            self.failure_threshold = threshold;
        }
    }
}

/// Effective, validated tunables for one service
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceSettings {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
    pub health_check_interval: Duration,
    pub failure_threshold: u32,
}

impl ServiceSettings {
    fn validate(&self) -> ConnectorResult<()> {
        if self.timeout.is_zero() {
            return Err(ConnectorError::configuration("timeout must be greater than zero"));
        }
        if self.max_attempts == 0 {
            return Err(ConnectorError::configuration(
                "max_attempts must be at least 1",
            ));
        }
        if self.base_delay.is_zero() {
            return Err(ConnectorError::configuration(
                "base_delay must be greater than zero",
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(ConnectorError::configuration(format!(
                "base_delay ({:?}) exceeds max_delay ({:?})",
                self.base_delay, self.max_delay
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConnectorError::configuration(format!(
                "jitter must be within 0.0..=1.0, got {}",
                self.jitter
            )));
        }
        if self.health_check_interval.is_zero() {
            return Err(ConnectorError::configuration(
                "health_check_interval must be greater than zero",
            ));
        }
        if self.failure_threshold == 0 {
            return Err(ConnectorError::configuration(
                "failure_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Full configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// Services keyed by their unique name
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    /// Fallback tunables
    #[serde(default)]
    pub defaults: ServiceDefaults,
    /// Logging setup
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One configuration file as written
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigLayer {
    #[serde(default)]
    services: BTreeMap<String, ServiceConfig>,
    #[serde(default)]
    defaults: DefaultsOverrides,
    #[serde(default)]
    logging: LoggingOverrides,
}

impl ManagerConfig {
    /// Add or replace a service
    pub fn with_service(mut self, name: impl Into<String>, config: ServiceConfig) -> Self {
        self.services.insert(name.into(), config);
        self
    }

    /// Layer one file on top: its services replace same-named ones whole,
    /// its defaults and logging override only the fields it sets
    pub(crate) fn merge(&mut self, layer: ConfigLayer) {
        self.services.extend(layer.services);
        self.defaults.merge(layer.defaults);
        self.logging.merge(layer.logging);
    }

    /// Services with `enabled = true`
    pub fn enabled_services(&self) -> impl Iterator<Item = (&String, &ServiceConfig)> {
        self.services.iter().filter(|(_, config)| config.enabled)
    }

    /// Validate every service, failing on the first problem
    pub fn validate(&self) -> ConnectorResult<()> {
        ServiceSettings {
            timeout: self.defaults.timeout,
            max_attempts: self.defaults.max_attempts,
            base_delay: self.defaults.base_delay,
            max_delay: self.defaults.max_delay,
            jitter: self.defaults.jitter,
            health_check_interval: self.defaults.health_check_interval,
            failure_threshold: self.defaults.failure_threshold,
        }
        .validate()
        .map_err(|e| e.with_service("defaults"))?;

        for (name, config) in &self.services {
            validate_service_name(name)?;
            config
                .validate(&self.defaults)
                .map_err(|e| e.with_service(name.clone()))?;
        }
        Ok(())
    }
}

/// Service names key the pool and prefix backend operation names
pub(crate) fn validate_service_name(name: &str) -> ConnectorResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConnectorError::configuration(format!(
            "invalid service name '{}': use letters, digits, '_' or '-'",
            name
        ))
        .with_service(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_stdio_requires_command() {
        let mut config = ServiceConfig::stdio("npx", vec!["zoho-mcp".into()]);
        assert!(config.validate(&ServiceDefaults::default()).is_ok());

        config.command = Some("  ".into());
        let err = config.validate(&ServiceDefaults::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_http_requires_valid_url() {
        let defaults = ServiceDefaults::default();
        assert!(ServiceConfig::http("https://crm.example.com/mcp")
            .validate(&defaults)
            .is_ok());
        assert!(ServiceConfig::http("not a url").validate(&defaults).is_err());
        assert!(ServiceConfig::http("ftp://files.example.com")
            .validate(&defaults)
            .is_err());

        let mut missing = ServiceConfig::http("http://localhost");
        missing.url = None;
        assert!(missing.validate(&defaults).is_err());
    }

    #[test]
    fn test_settings_fall_back_to_defaults() {
        let defaults = ServiceDefaults::default();
        let config = ServiceConfig::stdio("zoho", vec![])
            .with_max_attempts(3)
            .with_backoff(Duration::from_secs(1), Duration::from_secs(8));

        let settings = config.validate(&defaults).unwrap();
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.base_delay, Duration::from_secs(1));
        assert_eq!(settings.max_delay, Duration::from_secs(8));
        assert_eq!(settings.timeout, defaults.timeout);
        assert_eq!(settings.failure_threshold, defaults.failure_threshold);
    }

    #[test]
    fn test_malformed_tunables_fail_fast() {
        let defaults = ServiceDefaults::default();
        let base = ServiceConfig::stdio("svc", vec![]);

        assert!(base.clone().with_max_attempts(0).validate(&defaults).is_err());
        assert!(base.clone().with_jitter(1.5).validate(&defaults).is_err());
        assert!(base
            .clone()
            .with_timeout(Duration::ZERO)
            .validate(&defaults)
            .is_err());
        assert!(base
            .clone()
            .with_backoff(Duration::from_secs(10), Duration::from_secs(1))
            .validate(&defaults)
            .is_err());
        assert!(base.with_failure_threshold(0).validate(&defaults).is_err());
    }

    #[test]
    fn test_manager_config_rejects_bad_service_name() {
        let config = ManagerConfig::default()
            .with_service("gmail", ServiceConfig::stdio("gmail-mcp", vec![]))
            .with_service("bad name", ServiceConfig::stdio("x", vec![]));

        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.context().service.as_deref(), Some("bad name"));
    }

    #[test]
    fn test_enabled_services() {
        let mut disabled = ServiceConfig::stdio("b", vec![]);
        disabled.enabled = false;
        let config = ManagerConfig::default()
            .with_service("a", ServiceConfig::stdio("a", vec![]))
            .with_service("b", disabled);

        let enabled: Vec<_> = config.enabled_services().map(|(n, _)| n.as_str()).collect();
        assert_eq!(enabled, vec!["a"]);
    }

    #[test]
    fn test_target_description() {
        let config = ServiceConfig::stdio("npx", vec!["-y".into(), "gmail-mcp".into()]);
        assert_eq!(config.target(), "npx -y gmail-mcp");
        assert_eq!(
            ServiceConfig::http("http://localhost:9000").target(),
            "http://localhost:9000"
        );
    }
}
