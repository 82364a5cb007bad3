//! Operation metadata exposed by a service

use crate::error::{ConnectorError, ConnectorResult};
use crate::protocol::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// JSON type accepted for a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// Any JSON value
    Any,
}

impl ParameterType {
    /// Map a JSON Schema `type` keyword
    pub fn from_schema(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => Self::Any,
        }
    }

    /// Whether a JSON value is acceptable for this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// Type and required flag of one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ParameterSpec {
    pub fn required(param_type: ParameterType) -> Self {
        Self {
            param_type,
            required: true,
            description: String::new(),
        }
    }

    pub fn optional(param_type: ParameterType) -> Self {
        Self {
            param_type,
            required: false,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Declared call-rate ceiling of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub per_minute: u32,
}

/// A callable operation of one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub service: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl OperationDescriptor {
    /// Create a descriptor with no parameters
    pub fn new(service: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
            description: String::new(),
            parameters: BTreeMap::new(),
            category: None,
            requires_auth: false,
            rate_limit: None,
            timeout: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_requires_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }

    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit = Some(RateLimit { per_minute });
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Service-scoped name, `service.operation`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.service, self.name)
    }

    /// Build a descriptor from a backend tool listing.
    ///
    /// Annotations override the service-level category and auth flag.
    pub fn from_tool(
        service: &str,
        tool: &ToolDefinition,
        default_category: Option<&str>,
        default_requires_auth: bool,
    ) -> Self {
        let category = tool
            .annotation("category")
            .and_then(|v| v.as_str())
            .or(default_category)
            .map(str::to_string);
        let requires_auth = tool
            .annotation("requiresAuth")
            .and_then(|v| v.as_bool())
            .unwrap_or(default_requires_auth);
        let rate_limit = tool
            .annotation("rateLimitPerMinute")
            .and_then(|v| v.as_u64())
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .map(|per_minute| RateLimit { per_minute });
        let timeout = tool
            .annotation("timeoutMs")
            .and_then(|v| v.as_u64())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Self {
            service: service.to_string(),
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            parameters: parameters_from_schema(&tool.input_schema),
            category,
            requires_auth,
            rate_limit,
            timeout,
        }
    }

    /// Check arguments against the parameter schema.
    ///
    /// Unknown keys are passed through; backends own their full schema.
    pub fn validate_arguments(&self, arguments: &Value) -> ConnectorResult<()> {
        let object = match arguments {
            Value::Object(map) => map,
            Value::Null if self.parameters.values().all(|p| !p.required) => return Ok(()),
            other => {
                return Err(self.invalid(format!(
                    "arguments must be a JSON object, got {}",
                    json_type_name(other)
                )));
            }
        };

        for (name, spec) in &self.parameters {
            match object.get(name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(self.invalid(format!("missing required parameter '{}'", name)));
                }
                Some(value) if !value.is_null() && !spec.param_type.accepts(value) => {
                    return Err(self.invalid(format!(
                        "parameter '{}' expects {}, got {}",
                        name,
                        spec.param_type,
                        json_type_name(value)
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn invalid(&self, message: String) -> ConnectorError {
        ConnectorError::invalid_arguments(message)
            .with_service(&self.service)
            .with_operation(&self.name)
    }
}

fn parameters_from_schema(schema: &Value) -> BTreeMap<String, ParameterSpec> {
    let mut parameters = BTreeMap::new();

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return parameters;
    };

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for (name, property) in properties {
        let param_type = property
            .get("type")
            .and_then(|t| t.as_str())
            .map(ParameterType::from_schema)
            .unwrap_or(ParameterType::Any);
        let description = property
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("");

        parameters.insert(
            name.clone(),
            ParameterSpec {
                param_type,
                required: required.contains(&name.as_str()),
                description: description.to_string(),
            },
        );
    }

    parameters
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn invoices_tool() -> ToolDefinition {
        ToolDefinition::new("get_invoices")
            .with_description("List invoices")
            .with_input_schema(json!({
                "type": "object",
                "properties": {
                    "status": {"type": "string", "description": "Invoice status"},
                    "limit": {"type": "integer"},
                    "filters": {}
                },
                "required": ["status"]
            }))
            .with_annotations(json!({
                "category": "accounts_payable",
                "rateLimitPerMinute": 60,
                "timeoutMs": 5000
            }))
    }

    #[test]
    fn test_from_tool_maps_schema_and_annotations() {
        let desc = OperationDescriptor::from_tool("zoho", &invoices_tool(), Some("erp"), true);

        assert_eq!(desc.qualified_name(), "zoho.get_invoices");
        assert_eq!(desc.description, "List invoices");
        assert_eq!(desc.category.as_deref(), Some("accounts_payable"));
        assert!(desc.requires_auth);
        assert_eq!(desc.rate_limit, Some(RateLimit { per_minute: 60 }));
        assert_eq!(desc.timeout, Some(Duration::from_secs(5)));

        let status = &desc.parameters["status"];
        assert!(status.required);
        assert_eq!(status.param_type, ParameterType::String);
        assert_eq!(status.description, "Invoice status");
        assert_eq!(desc.parameters["limit"].param_type, ParameterType::Integer);
        assert!(!desc.parameters["limit"].required);
        assert_eq!(desc.parameters["filters"].param_type, ParameterType::Any);
    }

    #[test]
    fn test_from_tool_falls_back_to_service_defaults() {
        let tool = ToolDefinition::new("send_email");
        let desc = OperationDescriptor::from_tool("gmail", &tool, Some("email"), false);

        assert_eq!(desc.category.as_deref(), Some("email"));
        assert!(!desc.requires_auth);
        assert!(desc.parameters.is_empty());
        assert!(desc.rate_limit.is_none());
        assert!(desc.timeout.is_none());
    }

    #[test]
    fn test_validate_arguments() {
        let desc = OperationDescriptor::from_tool("zoho", &invoices_tool(), None, false);

        assert!(desc.validate_arguments(&json!({"status": "open"})).is_ok());
        assert!(
            desc.validate_arguments(&json!({"status": "open", "limit": 10, "extra": true}))
                .is_ok()
        );

        let missing = desc.validate_arguments(&json!({"limit": 10})).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::InvalidArguments);
        assert_eq!(missing.context().label(), "zoho/get_invoices");

        let wrong_type = desc
            .validate_arguments(&json!({"status": "open", "limit": "ten"}))
            .unwrap_err();
        assert!(wrong_type.to_string().contains("expects integer"));

        assert!(desc.validate_arguments(&json!(["open"])).is_err());
    }

    #[test]
    fn test_null_arguments_allowed_without_required_params() {
        let desc = OperationDescriptor::new("gmail", "list_labels");
        assert!(desc.validate_arguments(&Value::Null).is_ok());
    }
}
