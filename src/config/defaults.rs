//! Built-in defaults (layer 1)
//!
//! Hardcoded defaults for all configuration values.

use serde::{Deserialize, Serialize};

/// Default retrieval-endpoint templates
pub const DEFAULT_GATEWAYS: &[&str] = &[
    "https://ipfs.io/ipfs/{cid}",
    "https://dweb.link/ipfs/{cid}",
    "https://cloudflare-ipfs.com/ipfs/{cid}",
];

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Framework identifier tagged onto pins (default: "docanchor")
    pub framework_name: String,

    /// Framework version recorded in manifests (default: crate version)
    pub framework_version: String,

    /// Gateway URL templates, each containing `{cid}`
    pub gateways: Vec<String>,

    /// Minimum delay between batch artifacts in ms (default: 1000)
    pub batch_spacing_ms: u64,

    /// Run verifier checks on scoped threads (default: true)
    pub verify_concurrent: bool,

    /// Directory for the local backends (default: ".docanchor")
    pub state_dir: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            framework_name: "docanchor".to_string(),
            framework_version: env!("CARGO_PKG_VERSION").to_string(),
            gateways: DEFAULT_GATEWAYS.iter().map(|g| g.to_string()).collect(),
            batch_spacing_ms: 1000,
            verify_concurrent: true,
            state_dir: ".docanchor".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "framework": {
                "name": self.framework_name,
                "version": self.framework_version
            },
            "gateways": self.gateways,
            "batch": {
                "spacing_ms": self.batch_spacing_ms
            },
            "verify": {
                "concurrent": self.verify_concurrent
            },
            "state_dir": self.state_dir
        })
    }
}
