//! Error taxonomy for the publication pipeline
//!
//! Fatal failures become a `PipelineError` carrying the stage, the cause and
//! everything obtained before the failure. Non-fatal failures are recorded
//! as `Warning`s on the publication instead.

use serde::{Deserialize, Serialize};

use super::publication::PinOutcome;
use super::stage::{Stage, StateError};
use crate::backend::BackendError;
use crate::model::{Cid, ContentDigest, UploadResult};

/// Error classes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A service was unreachable or timed out; safe to retry later
    TransientNetworkError,
    /// Retrieved content does not match the digest taken before upload
    IntegrityMismatch,
    /// The ledger rejected or reverted the anchor submission
    LedgerRejection,
    /// Anchor submitted but not yet visible on the ledger
    NotYetConfirmed,
    /// Published without a durability guarantee
    PinningDegraded,
}

impl ErrorKind {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::TransientNetworkError
                | ErrorKind::IntegrityMismatch
                | ErrorKind::LedgerRejection
        )
    }
}

/// Underlying cause of a fatal stage failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureCause {
    #[error("{0}")]
    Backend(#[from] BackendError),

    #[error("integrity mismatch: expected digest {expected}, retrieved {actual}")]
    IntegrityMismatch {
        expected: ContentDigest,
        actual: ContentDigest,
    },

    #[error("ledger rejected anchor: {0}")]
    LedgerRejection(String),

    #[error("no upload result to resume from")]
    MissingUpload,

    #[error("stage entered out of order: {0}")]
    OutOfOrder(StateError),
}

impl FailureCause {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FailureCause::Backend(_)
            | FailureCause::MissingUpload
            | FailureCause::OutOfOrder(_) => ErrorKind::TransientNetworkError,
            FailureCause::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            FailureCause::LedgerRejection(_) => ErrorKind::LedgerRejection,
        }
    }
}

/// Results captured before a pipeline stopped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Present once the upload stage succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadResult>,

    /// Present once the pin stage ran, whether or not it succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<PinOutcome>,

    /// Whether the retrieved content matched the local digest
    pub integrity_verified: bool,
}

impl Progress {
    pub fn cid(&self) -> Option<&Cid> {
        self.upload.as_ref().map(|u| &u.cid)
    }

    pub fn is_pinned(&self) -> bool {
        self.pin.as_ref().map_or(false, PinOutcome::pinned)
    }
}

/// Fatal failure of a single-artifact pipeline
#[derive(Debug, Clone, thiserror::Error)]
#[error("{stage} stage failed for '{artifact}': {cause}")]
pub struct PipelineError {
    pub artifact: String,
    pub stage: Stage,
    #[source]
    pub cause: FailureCause,
    pub progress: Progress,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }

    /// The CID obtained before the failure, if the upload succeeded
    pub fn cid(&self) -> Option<&Cid> {
        self.progress.cid()
    }

    /// Whether `Publisher::resume` can continue without re-uploading
    pub fn is_resumable(&self) -> bool {
        self.progress.upload.is_some()
    }

    /// Stable exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self.cause {
            FailureCause::Backend(_) => 20,
            FailureCause::LedgerRejection(_) => 50,
            FailureCause::IntegrityMismatch { .. } => 70,
            FailureCause::MissingUpload | FailureCause::OutOfOrder(_) => 1,
        }
    }
}

/// Non-fatal condition recorded on a publication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
}
