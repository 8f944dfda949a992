//! Records produced by the content store, pinning service and ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifact::Metadata;
use super::cid::{Cid, ContentDigest};

/// Ledger-assigned document identifier
pub type DocumentId = u64;

/// Result of the upload stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Identifier returned by the content store
    pub cid: Cid,

    /// Payload size in bytes
    pub size: u64,

    /// Digest computed before the bytes were transmitted
    pub local_digest: ContentDigest,
}

/// Pin state as reported by the pinning service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinStatus {
    Pinned,
    Pending,
    Unpinned,
}

impl PinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinStatus::Pinned => "pinned",
            PinStatus::Pending => "pending",
            PinStatus::Unpinned => "unpinned",
        }
    }
}

/// Pin record (read-only to the pipeline)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    pub cid: Cid,
    pub pinned_at: DateTime<Utc>,
    pub status: PinStatus,

    /// Metadata the pin was tagged with
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl PinRecord {
    pub fn is_pinned(&self) -> bool {
        self.status == PinStatus::Pinned
    }
}

/// Receipt returned by a successful anchor submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub document_id: DocumentId,
    pub transaction_ref: String,
    pub confirmed_at_block: u64,
}

/// An append-only ledger entry binding a name and CID to a timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub document_id: DocumentId,
    pub cid: Cid,
    pub name: String,

    /// Seconds since the Unix epoch, supplied by the submitter
    pub timestamp: i64,

    pub transaction_ref: String,
    pub confirmed_at_block: u64,
}

impl AnchorRecord {
    /// Build the record implied by a receipt, before the ledger confirms it
    pub fn from_receipt(receipt: &AnchorReceipt, name: &str, cid: &Cid, timestamp: i64) -> Self {
        Self {
            document_id: receipt.document_id,
            cid: cid.clone(),
            name: name.to_string(),
            timestamp,
            transaction_ref: receipt.transaction_ref.clone(),
            confirmed_at_block: receipt.confirmed_at_block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_status_serialization() {
        assert_eq!(serde_json::to_string(&PinStatus::Pinned).unwrap(), "\"pinned\"");
        let status: PinStatus = serde_json::from_str("\"unpinned\"").unwrap();
        assert_eq!(status, PinStatus::Unpinned);
    }

    #[test]
    fn test_anchor_record_from_receipt() {
        let receipt = AnchorReceipt {
            document_id: 7,
            transaction_ref: "0xabc".to_string(),
            confirmed_at_block: 42,
        };
        let cid = Cid::for_bytes(b"doc");
        let record = AnchorRecord::from_receipt(&receipt, "doc.txt", &cid, 1_700_000_000);

        assert_eq!(record.document_id, 7);
        assert_eq!(record.cid, cid);
        assert_eq!(record.name, "doc.txt");
        assert_eq!(record.confirmed_at_block, 42);
    }
}
