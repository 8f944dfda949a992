//! Publication records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ErrorKind, Warning};
use crate::model::{AnchorRecord, Cid, DocumentId, Metadata, PinRecord, UploadResult};

/// What the pin stage produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinOutcome {
    /// Record returned by the pinning service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<PinRecord>,

    /// Error reported by the pinning service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PinOutcome {
    /// True only if the service confirmed status `pinned`
    pub fn pinned(&self) -> bool {
        self.record.as_ref().map_or(false, PinRecord::is_pinned)
    }
}

/// A fully published artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub name: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub upload: UploadResult,

    pub pin: PinOutcome,

    /// Whether the pin stage confirmed durable retention
    pub pinned: bool,

    pub anchor: AnchorRecord,

    /// Whether the anchor was visible on the ledger right after submission
    pub verified: bool,

    /// Retrieval URLs derived from the CID
    pub gateway_urls: Vec<String>,

    /// Non-fatal conditions hit along the way
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,

    pub published_at: DateTime<Utc>,
}

impl Publication {
    pub fn cid(&self) -> &Cid {
        &self.upload.cid
    }

    pub fn document_id(&self) -> DocumentId {
        self.anchor.document_id
    }

    pub fn has_warning(&self, kind: ErrorKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PinStatus;

    #[test]
    fn test_pin_outcome_pinned() {
        let cid = Cid::for_bytes(b"doc");
        let mut outcome = PinOutcome {
            record: Some(PinRecord {
                cid,
                pinned_at: Utc::now(),
                status: PinStatus::Pinned,
                metadata: Metadata::new(),
            }),
            error: None,
        };
        assert!(outcome.pinned());

        if let Some(record) = outcome.record.as_mut() {
            record.status = PinStatus::Pending;
        }
        assert!(!outcome.pinned());

        let failed = PinOutcome {
            record: None,
            error: Some("quota exceeded".to_string()),
        };
        assert!(!failed.pinned());
    }
}
