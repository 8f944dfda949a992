//! Publication pipeline
//!
//! Stages run strictly in order for each artifact:
//! Upload → Pin → IntegrityCheck → Anchor → Confirm.

mod batch;
mod error;
mod publication;
mod publisher;
mod stage;

pub use batch::{ArtifactError, ArtifactOutcome, BatchSummary};
pub use error::{ErrorKind, FailureCause, PipelineError, Progress, Warning};
pub use publication::{PinOutcome, Publication};
pub use publisher::Publisher;
pub use stage::{PipelineMachine, PipelineState, Stage, StateError};
