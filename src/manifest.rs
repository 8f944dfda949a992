//! Session manifest and gateway URL derivation
//!
//! One manifest per publishing session: an ordered, append-only list of
//! publication summaries, written once when the session finishes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::config::{validate_gateways, ConfigError, FrameworkInfo, CID_PLACEHOLDER};
use crate::model::{Cid, ContentDigest, DocumentId};
use crate::pipeline::Publication;

/// Schema version for manifest files
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "docanchor/manifest@1";

/// Retrieval-endpoint templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySet {
    templates: Vec<String>,
}

impl GatewaySet {
    pub fn new<I, S>(templates: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let templates: Vec<String> = templates.into_iter().map(Into::into).collect();
        validate_gateways(&templates)?;
        Ok(Self { templates })
    }

    /// Retrieval URLs for a CID, in template order
    pub fn urls(&self, cid: &Cid) -> Vec<String> {
        self.templates
            .iter()
            .map(|t| t.replace(CID_PLACEHOLDER, cid.as_str()))
            .collect()
    }

    pub fn templates(&self) -> &[String] {
        &self.templates
    }
}

/// Summary of one publication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub cid: Cid,

    /// Local digest taken before upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<ContentDigest>,

    pub gateway_urls: Vec<String>,
    pub document_id: DocumentId,
    pub transaction_ref: String,
    pub verified: bool,
    pub pinned: bool,
}

impl From<&Publication> for ManifestEntry {
    fn from(publication: &Publication) -> Self {
        Self {
            name: publication.name.clone(),
            cid: publication.cid().clone(),
            digest: Some(publication.upload.local_digest.clone()),
            gateway_urls: publication.gateway_urls.clone(),
            document_id: publication.anchor.document_id,
            transaction_ref: publication.anchor.transaction_ref.clone(),
            verified: publication.verified,
            pinned: publication.pinned,
        }
    }
}

/// Manifest for one publishing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub schema_id: String,
    pub framework: String,
    pub version: String,
    pub session_id: Uuid,
    pub published_at: DateTime<Utc>,
    pub total_artifacts: usize,
    publications: Vec<ManifestEntry>,
}

/// Errors for manifest operations
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Manifest {
    /// Empty manifest for a new session
    pub fn new(framework: &FrameworkInfo) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            framework: framework.name.clone(),
            version: framework.version.clone(),
            session_id: Uuid::new_v4(),
            published_at: Utc::now(),
            total_artifacts: 0,
            publications: Vec::new(),
        }
    }

    pub(crate) fn append(&mut self, publication: &Publication) {
        self.publications.push(ManifestEntry::from(publication));
        self.total_artifacts = self.publications.len();
    }

    /// Stamp the publish time when the session closes
    pub(crate) fn seal(&mut self) {
        self.published_at = Utc::now();
        self.total_artifacts = self.publications.len();
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.publications
    }

    pub fn len(&self) -> usize {
        self.publications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publications.is_empty()
    }

    pub fn find(&self, cid: &Cid) -> Option<&ManifestEntry> {
        self.publications.iter().find(|e| &e.cid == cid)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), ManifestError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
