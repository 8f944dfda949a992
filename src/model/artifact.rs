//! Artifacts submitted for publication

use std::collections::BTreeMap;

/// Key-value annotations carried with an artifact (e.g. `type`, `critical`)
pub type Metadata = BTreeMap<String, String>;

/// A logical document to publish.
///
/// The publisher takes an `Artifact` by value and drops its bytes when the
/// publish call returns; nothing retains the payload afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Human label, not unique
    pub name: String,

    /// Immutable payload
    pub bytes: Vec<u8>,

    /// Annotations forwarded to the pinning service
    pub metadata: Metadata,
}

impl Artifact {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            metadata: Metadata::new(),
        }
    }

    /// Add a metadata annotation
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
