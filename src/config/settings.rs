//! Typed configuration handed to `Publisher::new` and `Verifier::new`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::BuiltinDefaults;
use super::effective::ConfigError;

/// Upper bound for `batch.spacing_ms`
pub const MAX_SPACING_MS: u64 = 60_000;

/// Placeholder substituted with the CID in gateway templates
pub const CID_PLACEHOLDER: &str = "{cid}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkInfo {
    pub name: String,
    pub version: String,
}

impl Default for FrameworkInfo {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            name: defaults.framework_name,
            version: defaults.framework_version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Minimum delay between successive artifacts; 0 disables it
    pub spacing_ms: u64,
}

impl BatchConfig {
    pub fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            spacing_ms: BuiltinDefaults::default().batch_spacing_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub concurrent: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            concurrent: BuiltinDefaults::default().verify_concurrent,
        }
    }
}

/// Explicit configuration for one publishing or verifying session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub framework: FrameworkInfo,
    pub gateways: Vec<String>,
    pub batch: BatchConfig,
    pub verify: VerifyConfig,
    pub state_dir: PathBuf,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            framework: FrameworkInfo::default(),
            gateways: defaults.gateways,
            batch: BatchConfig::default(),
            verify: VerifyConfig::default(),
            state_dir: PathBuf::from(defaults.state_dir),
        }
    }
}

impl PublisherConfig {
    /// Same configuration with batch spacing disabled
    pub fn without_spacing(mut self) -> Self {
        self.batch.spacing_ms = 0;
        self
    }

    pub fn with_gateways<I, S>(mut self, gateways: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gateways = gateways.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.framework.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "framework.name must not be empty".to_string(),
            ));
        }

        validate_gateways(&self.gateways)?;

        if self.batch.spacing_ms > MAX_SPACING_MS {
            return Err(ConfigError::ValidationError(format!(
                "batch.spacing_ms must be in [0, {}]",
                MAX_SPACING_MS
            )));
        }

        Ok(())
    }
}

/// At least one template, each carrying the `{cid}` placeholder
pub fn validate_gateways(templates: &[String]) -> Result<(), ConfigError> {
    if templates.is_empty() {
        return Err(ConfigError::ValidationError(
            "gateways must list at least one template".to_string(),
        ));
    }
    match templates.iter().find(|t| !t.contains(CID_PLACEHOLDER)) {
        Some(bad) => Err(ConfigError::ValidationError(format!(
            "gateway template '{}' is missing the {} placeholder",
            bad, CID_PLACEHOLDER
        ))),
        None => Ok(()),
    }
}
