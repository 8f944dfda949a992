//! Pipeline stages and the per-artifact state machine
//!
//! States: UPLOADING → PINNING → VERIFYING → ANCHORING → CONFIRMING → DONE,
//! with FAILED reachable from every non-terminal state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the publication pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Upload,
    Pin,
    IntegrityCheck,
    Anchor,
    Confirm,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 5] = [
        Stage::Upload,
        Stage::Pin,
        Stage::IntegrityCheck,
        Stage::Anchor,
        Stage::Confirm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "Upload",
            Stage::Pin => "Pin",
            Stage::IntegrityCheck => "IntegrityCheck",
            Stage::Anchor => "Anchor",
            Stage::Confirm => "Confirm",
        }
    }

    /// The machine state while this stage runs
    pub fn state(&self) -> PipelineState {
        match self {
            Stage::Upload => PipelineState::Uploading,
            Stage::Pin => PipelineState::Pinning,
            Stage::IntegrityCheck => PipelineState::Verifying,
            Stage::Anchor => PipelineState::Anchoring,
            Stage::Confirm => PipelineState::Confirming,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-artifact pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Uploading,
    Pinning,
    Verifying,
    Anchoring,
    Confirming,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// The stage running in this state, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Uploading => Some(Stage::Upload),
            PipelineState::Pinning => Some(Stage::Pin),
            PipelineState::Verifying => Some(Stage::IntegrityCheck),
            PipelineState::Anchoring => Some(Stage::Anchor),
            PipelineState::Confirming => Some(Stage::Confirm),
            PipelineState::Done | PipelineState::Failed => None,
        }
    }

    /// The state a successful stage hands over to
    fn successor(&self) -> Option<PipelineState> {
        match self {
            PipelineState::Uploading => Some(PipelineState::Pinning),
            PipelineState::Pinning => Some(PipelineState::Verifying),
            PipelineState::Verifying => Some(PipelineState::Anchoring),
            PipelineState::Anchoring => Some(PipelineState::Confirming),
            PipelineState::Confirming => Some(PipelineState::Done),
            PipelineState::Done | PipelineState::Failed => None,
        }
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == PipelineState::Failed || self.successor() == Some(target)
    }
}

/// Errors for state machine operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("Invalid pipeline transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: PipelineState,
        to: PipelineState,
    },
}

/// State machine driving one artifact through the pipeline.
///
/// Stages are entered in order through `transition`; any other hand-over is
/// rejected.
#[derive(Debug, Clone)]
pub struct PipelineMachine {
    state: PipelineState,
}

impl PipelineMachine {
    /// Start a fresh pipeline in UPLOADING
    pub fn new() -> Self {
        Self::resume_at(Stage::Upload)
    }

    /// Start a resumed pipeline at the given stage
    pub fn resume_at(stage: Stage) -> Self {
        Self {
            state: stage.state(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn transition(&mut self, target: PipelineState) -> Result<(), StateError> {
        if !self.state.can_transition_to(target) {
            return Err(StateError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        Ok(())
    }

    /// Make `stage` the running stage: a no-op if it already is, otherwise
    /// it must be the successor of the current one
    pub fn enter(&mut self, stage: Stage) -> Result<(), StateError> {
        if self.state == stage.state() {
            return Ok(());
        }
        self.transition(stage.state())
    }

    /// Enter FAILED; no-op once terminal
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = PipelineState::Failed;
        }
    }
}

impl Default for PipelineMachine {
    fn default() -> Self {
        Self::new()
    }
}
