//! External capabilities consumed by the pipeline
//!
//! The publisher and verifier only ever talk to these three traits:
//! - `ContentStore`: put bytes, get bytes by CID
//! - `PinningService`: pin a CID, report pin status
//! - `Ledger`: anchor (name, cid, timestamp), look records up by CID or id
//!
//! Two implementations ship with the crate. The memory backends carry a
//! `FaultInjector` for exercising error paths in tests; the local backends
//! persist under a state directory and back the CLI.

mod failure;
mod local;
mod memory;

use std::sync::Arc;
use std::time::Duration;

use crate::model::{AnchorReceipt, AnchorRecord, Cid, DocumentId, Metadata, PinRecord};

pub use failure::{Fault, FaultConfig, FaultInjector, Operation};
pub use local::{LocalBackendError, LocalContentStore, LocalLedger, LocalPinningService};
pub use memory::{MemoryContentStore, MemoryLedger, MemoryPinningService};

/// Errors reported by any capability adapter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl BackendError {
    /// Whether a later attempt could succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable(_) | BackendError::Timeout(_))
    }
}

/// Content-addressed byte store
pub trait ContentStore: Send + Sync {
    /// Store bytes, returning the CID derived from them and the stored size
    fn put(&self, bytes: &[u8]) -> Result<(Cid, u64), BackendError>;

    /// Retrieve the bytes stored under a CID
    fn get(&self, cid: &Cid) -> Result<Vec<u8>, BackendError>;
}

/// Durable retention of CIDs beyond the store's garbage-collection horizon
pub trait PinningService: Send + Sync {
    /// Request that a CID be retained, tagging it with metadata
    fn pin(&self, cid: &Cid, metadata: &Metadata) -> Result<PinRecord, BackendError>;

    /// Current pin record for a CID, `None` if the service has never seen it
    fn status(&self, cid: &Cid) -> Result<Option<PinRecord>, BackendError>;
}

/// Append-only ledger of anchor records
pub trait Ledger: Send + Sync {
    /// Submit an anchor. Never retried by callers; a submission may have
    /// mutated ledger state even when it reports failure.
    fn anchor(&self, name: &str, cid: &Cid, timestamp: i64) -> Result<AnchorReceipt, BackendError>;

    /// The record anchoring a CID, `None` if the ledger has no such entry
    fn lookup_by_cid(&self, cid: &Cid) -> Result<Option<AnchorRecord>, BackendError>;

    /// The record with a given document id
    fn lookup_by_id(&self, id: DocumentId) -> Result<AnchorRecord, BackendError>;
}

/// The three capabilities a publisher or verifier is built from
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn ContentStore>,
    pub pins: Arc<dyn PinningService>,
    pub ledger: Arc<dyn Ledger>,
}

impl Backends {
    pub fn new(
        store: Arc<dyn ContentStore>,
        pins: Arc<dyn PinningService>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self { store, pins, ledger }
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}
