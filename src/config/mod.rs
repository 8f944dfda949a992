//! Layered configuration
//!
//! Implements the 3-layer configuration merge:
//! 1. Built-in defaults
//! 2. Config file (docanchor.toml or --config)
//! 3. CLI flags
//!
//! The merged value is validated and handed to the library as an explicit
//! `PublisherConfig`; nothing is kept in process-wide state.

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::{BuiltinDefaults, DEFAULT_GATEWAYS};
pub use effective::{
    ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, DEFAULT_CONFIG_FILE,
};
pub use merge::{deep_merge, merge_layers};
pub use settings::{
    validate_gateways, BatchConfig, FrameworkInfo, PublisherConfig, VerifyConfig, CID_PLACEHOLDER,
    MAX_SPACING_MS,
};
