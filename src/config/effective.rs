//! Merged configuration and where it came from
//!
//! Each layer is recorded as a `ConfigSource` (file layers with the SHA-256
//! of the raw bytes), secret-looking keys are masked, and the result must
//! deserialize into a valid `PublisherConfig` before it is handed out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use super::settings::PublisherConfig;

pub const SCHEMA_ID: &str = "docanchor/effective_config@1";

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "docanchor.toml";

const REDACTED: &str = "[REDACTED]";

/// Key fragments that mark a value as secret
const SECRET_KEYS: &[&str] = &["token", "secret", "api_key", "password", "jwt", "credential"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// One layer that contributed to the merged configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Hex SHA-256 of the file as read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ConfigSource {
    fn builtin() -> Self {
        Self {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }
    }

    fn cli() -> Self {
        Self {
            origin: ConfigOrigin::Cli,
            path: None,
            digest: None,
        }
    }

    fn file(path: &Path, raw: &[u8]) -> Self {
        Self {
            origin: ConfigOrigin::File,
            path: Some(path.display().to_string()),
            digest: Some(hex::encode(Sha256::digest(raw))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_id: String,
    pub computed_at: DateTime<Utc>,
    pub config: Value,
    /// Lowest precedence first
    pub sources: Vec<ConfigSource>,
    /// Dotted paths whose values were masked
    pub redactions: Vec<String>,
}

impl EffectiveConfig {
    /// Merge builtin defaults, the TOML file at `config_path` (skipped when
    /// it does not exist) and CLI overrides, in that order of precedence
    pub fn build(
        config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![(ConfigSource::builtin(), BuiltinDefaults::default().to_value())];

        if let Some(path) = config_path.filter(|p| p.exists()) {
            layers.push(read_toml_layer(path)?);
        }
        if let Some(overrides) = cli_overrides {
            layers.push((ConfigSource::cli(), overrides));
        }

        let (sources, values): (Vec<_>, Vec<_>) = layers.into_iter().unzip();
        let mut config = merge_layers(values);
        let redactions = redact(&mut config);

        let effective = Self {
            schema_id: SCHEMA_ID.to_string(),
            computed_at: Utc::now(),
            config,
            sources,
            redactions,
        };
        effective.publisher_config()?;
        Ok(effective)
    }

    /// Typed, validated configuration for `Publisher` and `Verifier`
    pub fn publisher_config(&self) -> Result<PublisherConfig, ConfigError> {
        let typed: PublisherConfig = serde_json::from_value(self.config.clone())
            .map_err(|e| ConfigError::ParseError(format!("Invalid configuration: {}", e)))?;
        typed.validate()?;
        Ok(typed)
    }

    /// Look up a merged value by dotted path, e.g. `batch.spacing_ms`
    pub fn value_at(&self, dotted: &str) -> Option<&Value> {
        self.config.pointer(&format!("/{}", dotted.replace('.', "/")))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn read_toml_layer(path: &Path) -> Result<(ConfigSource, Value), ConfigError> {
    let raw = fs::read(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
    let text = std::str::from_utf8(&raw)
        .map_err(|e| ConfigError::ParseError(format!("{}: not UTF-8: {}", path.display(), e)))?;
    let table: toml::Table = toml::from_str(text)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
    let value = serde_json::to_value(table)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
    Ok((ConfigSource::file(path, &raw), value))
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_KEYS.iter().any(|fragment| key.contains(fragment))
}

/// Mask scalar values under secret-looking keys; returns the masked paths
fn redact(config: &mut Value) -> Vec<String> {
    let mut masked = Vec::new();
    let mut pending: Vec<(String, &mut Value)> = vec![(String::new(), config)];

    while let Some((prefix, value)) = pending.pop() {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    let scalar = !(child.is_object() || child.is_array());
                    if scalar && is_secret_key(key) {
                        *child = Value::String(REDACTED.to_string());
                        masked.push(path);
                    } else {
                        pending.push((path, child));
                    }
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter_mut().enumerate() {
                    pending.push((format!("{}[{}]", prefix, i), child));
                }
            }
            _ => {}
        }
    }

    masked.sort();
    masked
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_layer_alone() {
        let effective = EffectiveConfig::build(None, None).unwrap();

        assert_eq!(effective.sources, vec![ConfigSource::builtin()]);
        assert_eq!(effective.value_at("batch.spacing_ms"), Some(&json!(1000)));
        assert_eq!(effective.value_at("framework.name"), Some(&json!("docanchor")));
        assert_eq!(effective.value_at("verify.concurrent"), Some(&json!(true)));
        assert!(effective.redactions.is_empty());
    }

    #[test]
    fn test_cli_overrides_builtin() {
        let effective =
            EffectiveConfig::build(None, Some(json!({"batch": {"spacing_ms": 0}}))).unwrap();

        assert_eq!(effective.publisher_config().unwrap().batch.spacing_ms, 0);
        assert_eq!(effective.sources.last().map(|s| s.origin), Some(ConfigOrigin::Cli));
    }

    #[test]
    fn test_out_of_range_spacing_rejected() {
        let err = EffectiveConfig::build(None, Some(json!({"batch": {"spacing_ms": 120000}})))
            .unwrap_err();
        assert!(err.to_string().contains("spacing_ms"));
    }

    #[test]
    fn test_gateway_without_placeholder_rejected() {
        let result = EffectiveConfig::build(None, Some(json!({"gateways": ["https://ipfs.io/ipfs/"]})));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_mistyped_value_is_parse_error() {
        let result = EffectiveConfig::build(None, Some(json!({"verify": {"concurrent": "yes"}})));
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_secrets_masked_at_any_depth() {
        let overrides = json!({
            "pinning": {
                "api_key": "secret123",
                "JWT": "eyJhbGciOi",
                "endpoint": "https://pins.example",
                "fallbacks": [{"auth_token": "t0"}]
            }
        });

        let effective = EffectiveConfig::build(None, Some(overrides)).unwrap();

        assert_eq!(effective.value_at("pinning.api_key"), Some(&json!(REDACTED)));
        assert_eq!(effective.value_at("pinning.endpoint"), Some(&json!("https://pins.example")));
        assert_eq!(
            effective.redactions,
            vec!["pinning.JWT", "pinning.api_key", "pinning.fallbacks[0].auth_token"]
        );
    }

    #[test]
    fn test_file_sits_between_builtin_and_cli() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "state_dir = \"/var/lib/docanchor\"").unwrap();
        writeln!(file, "[batch]\nspacing_ms = 250").unwrap();
        writeln!(file, "[verify]\nconcurrent = false").unwrap();

        let effective =
            EffectiveConfig::build(Some(file.path()), Some(json!({"batch": {"spacing_ms": 10}})))
                .unwrap();

        let typed = effective.publisher_config().unwrap();
        assert_eq!(typed.state_dir, Path::new("/var/lib/docanchor"));
        assert_eq!(typed.batch.spacing_ms, 10);
        assert!(!typed.verify.concurrent);

        let origins: Vec<_> = effective.sources.iter().map(|s| s.origin).collect();
        assert_eq!(origins, vec![ConfigOrigin::Builtin, ConfigOrigin::File, ConfigOrigin::Cli]);
        assert_eq!(effective.sources[1].digest.as_ref().map(String::len), Some(64));
    }

    #[test]
    fn test_missing_file_skipped() {
        let effective =
            EffectiveConfig::build(Some(Path::new("/nonexistent/docanchor.toml")), None).unwrap();
        assert_eq!(effective.sources.len(), 1);
    }

    #[test]
    fn test_malformed_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[batch").unwrap();

        let result = EffectiveConfig::build(Some(file.path()), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
