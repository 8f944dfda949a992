//! Data model shared by the publisher, verifier and backends

mod artifact;
mod cid;
mod records;

pub use artifact::{Artifact, Metadata};
pub use cid::{compute_sha256, Cid, ContentDigest};
pub use records::{AnchorReceipt, AnchorRecord, DocumentId, PinRecord, PinStatus, UploadResult};
