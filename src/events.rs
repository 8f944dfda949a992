//! Pipeline and verifier events
//!
//! The publisher and verifier never log directly. They emit `PipelineEvent`s
//! to an `EventSink`; logging is one subscriber (`TracingSink`), tests use
//! another (`RecordingSink`).

use std::sync::Mutex;

use serde::Serialize;

use crate::model::{Cid, DocumentId};
use crate::pipeline::Stage;
use crate::verify::CheckStatus;

/// Structured progress event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted {
        artifact: String,
        stage: Stage,
    },
    StageSucceeded {
        artifact: String,
        stage: Stage,
        detail: String,
    },
    /// Non-fatal stage failure; the pipeline continues
    StageDegraded {
        artifact: String,
        stage: Stage,
        message: String,
    },
    /// Fatal stage failure; the pipeline stops
    StageFailed {
        artifact: String,
        stage: Stage,
        error: String,
    },
    ArtifactPublished {
        artifact: String,
        cid: Cid,
        document_id: DocumentId,
        verified: bool,
        pinned: bool,
    },
    CheckCompleted {
        cid: Cid,
        check: String,
        status: CheckStatus,
        message: String,
    },
}

/// Subscriber for pipeline events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageStarted { artifact, stage } => {
                tracing::debug!(artifact = %artifact, stage = %stage, "stage started");
            }
            PipelineEvent::StageSucceeded {
                artifact,
                stage,
                detail,
            } => {
                tracing::info!(artifact = %artifact, stage = %stage, "{}", detail);
            }
            PipelineEvent::StageDegraded {
                artifact,
                stage,
                message,
            } => {
                tracing::warn!(artifact = %artifact, stage = %stage, "{}", message);
            }
            PipelineEvent::StageFailed {
                artifact,
                stage,
                error,
            } => {
                tracing::error!(artifact = %artifact, stage = %stage, error = %error, "stage failed");
            }
            PipelineEvent::ArtifactPublished {
                artifact,
                cid,
                document_id,
                verified,
                pinned,
            } => {
                tracing::info!(
                    artifact = %artifact,
                    cid = %cid,
                    document_id = *document_id,
                    verified = *verified,
                    pinned = *pinned,
                    "artifact published"
                );
            }
            PipelineEvent::CheckCompleted {
                cid,
                check,
                status,
                message,
            } => match status {
                CheckStatus::Pass => {
                    tracing::info!(cid = %cid, check = %check, status = %status, "{}", message)
                }
                CheckStatus::Warning => {
                    tracing::warn!(cid = %cid, check = %check, status = %status, "{}", message)
                }
                CheckStatus::Fail | CheckStatus::Error => {
                    tracing::error!(cid = %cid, check = %check, status = %status, "{}", message)
                }
            },
        }
    }
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Stages that reached `StageFailed`, in order
    pub fn failed_stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::StageFailed { stage, .. } => Some(stage),
                _ => None,
            })
            .collect()
    }

    /// Stages that reached `StageSucceeded`, in order
    pub fn succeeded_stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::StageSucceeded { stage, .. } => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
