//! Logging configuration

use serde::{Deserialize, Serialize};

/// Logging configuration consumed by the CLI subscriber setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, compact, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Logging fields as written in one file; unset fields keep earlier values
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct LoggingOverrides {
    pub(crate) level: Option<String>,
    pub(crate) format: Option<String>,
}

impl LoggingConfig {
    /// Apply the fields another file sets explicitly
    pub(crate) fn merge(&mut self, other: LoggingOverrides) {
        if let Some(level) = other.level.filter(|l| !l.is_empty()) {
            self.level = level;
        }
        if let Some(format) = other.format.filter(|f| !f.is_empty()) {
            self.format = format;
        }
    }

    /// Whether structured JSON output was requested
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
        assert!(!config.is_json());
    }

    #[test]
    fn test_logging_config_merge() {
        let mut config = LoggingConfig::default();
        config.merge(LoggingOverrides {
            level: Some("debug".to_string()),
            format: Some("JSON".to_string()),
        });
        assert_eq!(config.level, "debug");
        assert!(config.is_json());

        config.merge(LoggingOverrides::default());
        assert_eq!(config.level, "debug");
        assert!(config.is_json());
    }
}
