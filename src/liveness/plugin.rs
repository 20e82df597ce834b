//! String-keyed plugin settings and typed accessors over them.
//!
//! Detector and locator entries arrive as loose maps (TOML tables or JSON
//! objects). The accessors here turn them into typed values and report
//! missing or malformed keys as [`ConfigError`]. Unknown keys are ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

pub const PORT_KEY: &str = "Port";
pub const HOST_KEY: &str = "Host";
pub const TIMEOUT_KEY: &str = "TimeoutInSeconds";
pub const URL_KEY: &str = "url";
pub const RESPONSE_CODES_KEY: &str = "responseCodes";
pub const REGEX_KEY: &str = "regularExpression";
pub const FILE_PATH_KEY: &str = "FilePath";
pub const COMMAND_KEY: &str = "Command";
pub const WORKING_DIRECTORY_KEY: &str = "WorkingDirectory";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginConfig(HashMap<String, Value>);

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for programmatic configuration.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn required_string(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional_string(key)?
            .ok_or(ConfigError::MissingField { field: key })
    }

    pub fn optional_string(&self, key: &'static str) -> Result<Option<String>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(invalid(key, format!("expected a string, got {other}"))),
        }
    }

    pub fn optional_u64(&self, key: &'static str) -> Result<Option<u64>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => scalar_u64(key, value).map(Some),
        }
    }

    /// A list of integers from an array, a single number, or a
    /// comma-separated string.
    pub fn u64_list(&self, key: &'static str) -> Result<Option<Vec<u64>>, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let list = match value {
            Value::Array(items) => items
                .iter()
                .map(|item| scalar_u64(key, item))
                .collect::<Result<Vec<_>, _>>()?,
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| parse_u64(key, part))
                .collect::<Result<Vec<_>, _>>()?,
            other => vec![scalar_u64(key, other)?],
        };
        Ok(Some(list))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for PluginConfig {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

fn scalar_u64(key: &'static str, value: &Value) -> Result<u64, ConfigError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| invalid(key, format!("{n} is not a non-negative integer"))),
        Value::String(s) => parse_u64(key, s.trim()),
        other => Err(invalid(key, format!("expected an integer, got {other}"))),
    }
}

fn parse_u64(key: &'static str, text: &str) -> Result<u64, ConfigError> {
    text.parse()
        .map_err(|_| invalid(key, format!("`{text}` is not a non-negative integer")))
}

pub(crate) fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidValue { field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lists_accept_several_shapes() {
        let config = PluginConfig::new()
            .with("a", json!([80, "81"]))
            .with("b", "80, 81")
            .with("c", 80);

        assert_eq!(config.u64_list("a").unwrap(), Some(vec![80, 81]));
        assert_eq!(config.u64_list("b").unwrap(), Some(vec![80, 81]));
        assert_eq!(config.u64_list("c").unwrap(), Some(vec![80]));
        assert_eq!(config.u64_list("missing").unwrap(), None);
    }

    #[test]
    fn missing_required_key_names_the_key() {
        let err = PluginConfig::new().required_string(URL_KEY).unwrap_err();
        assert_eq!(err.to_string(), "missing required field: url");
    }

    #[test]
    fn malformed_values_are_rejected() {
        let config = PluginConfig::new().with(TIMEOUT_KEY, "soon");
        assert!(matches!(
            config.optional_u64(TIMEOUT_KEY),
            Err(ConfigError::InvalidValue { field: "TimeoutInSeconds", .. })
        ));
    }

    #[test]
    fn deserializes_from_toml_table() {
        let config: PluginConfig = toml::from_str("Port = [8080]\nHost = \"10.0.0.1\"").unwrap();
        assert_eq!(config.u64_list(PORT_KEY).unwrap(), Some(vec![8080]));
        assert_eq!(config.optional_string(HOST_KEY).unwrap().as_deref(), Some("10.0.0.1"));
    }
}
