//! docanchor - publish, pin, anchor and re-verify documents
//!
//! This crate publishes immutable documents to a content-addressed store,
//! pins them for durability and records proof of their existence on an
//! append-only ledger. The proof can later be re-verified independently of
//! the publisher.

pub mod backend;
pub mod config;
pub mod events;
pub mod manifest;
pub mod model;
pub mod pipeline;
pub mod verify;

pub use backend::{BackendError, Backends, ContentStore, Ledger, PinningService};
pub use config::{ConfigError, EffectiveConfig, PublisherConfig};
pub use events::{EventSink, PipelineEvent, RecordingSink, TracingSink};
pub use manifest::{GatewaySet, Manifest, ManifestEntry, ManifestError};
pub use model::{Artifact, Cid, ContentDigest, Metadata};
pub use pipeline::{
    ArtifactError, BatchSummary, ErrorKind, PipelineError, Progress, Publication, Publisher, Stage,
};
pub use verify::{CheckStatus, OverallStatus, VerificationReport, Verifier};
