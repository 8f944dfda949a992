//! Batch outcomes and their aggregate summary

use serde::Serialize;

use super::error::{ErrorKind, PipelineError};
use super::publication::Publication;
use super::stage::Stage;

/// Failure of one artifact inside a batch
#[derive(Debug, Clone, thiserror::Error)]
#[error("artifact #{index} '{name}': {error}")]
pub struct ArtifactError {
    /// Position of the artifact in the input
    pub index: usize,
    pub name: String,
    #[source]
    pub error: PipelineError,
}

impl ArtifactError {
    pub fn stage(&self) -> Stage {
        self.error.stage
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Result of publishing one artifact of a batch
pub type ArtifactOutcome = Result<Publication, ArtifactError>;

/// Aggregate counts over a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub attempted: usize,
    pub published: usize,
    pub failed: usize,

    /// Published without a confirmed pin
    pub unpinned: usize,

    /// Published before the anchor was visible on the ledger
    pub unconfirmed: usize,

    /// Input positions of failed artifacts
    pub failed_indices: Vec<usize>,

    /// 0 when everything published, else the first failure's exit code
    pub exit_code: i32,

    pub human_summary: String,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[ArtifactOutcome]) -> Self {
        let mut published = 0;
        let mut unpinned = 0;
        let mut unconfirmed = 0;
        let mut failed_indices = Vec::new();
        let mut exit_code = 0;

        for outcome in outcomes {
            match outcome {
                Ok(publication) => {
                    published += 1;
                    if !publication.pinned {
                        unpinned += 1;
                    }
                    if !publication.verified {
                        unconfirmed += 1;
                    }
                }
                Err(err) => {
                    if failed_indices.is_empty() {
                        exit_code = err.error.exit_code();
                    }
                    failed_indices.push(err.index);
                }
            }
        }

        let attempted = outcomes.len();
        let failed = failed_indices.len();
        let human_summary =
            Self::generate_human_summary(attempted, published, failed, unpinned, unconfirmed);

        Self {
            attempted,
            published,
            failed,
            unpinned,
            unconfirmed,
            failed_indices,
            exit_code,
            human_summary,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn generate_human_summary(
        attempted: usize,
        published: usize,
        failed: usize,
        unpinned: usize,
        unconfirmed: usize,
    ) -> String {
        if attempted == 0 {
            return "No artifacts published".to_string();
        }

        let mut summary = if failed == 0 {
            format!("Published {}/{} artifacts", published, attempted)
        } else {
            format!(
                "Batch incomplete: {} published, {} failed",
                published, failed
            )
        };

        let mut notes = Vec::new();
        if unpinned > 0 {
            notes.push(format!("{} unpinned", unpinned));
        }
        if unconfirmed > 0 {
            notes.push(format!("{} awaiting ledger confirmation", unconfirmed));
        }
        if !notes.is_empty() {
            summary.push_str(&format!(" ({})", notes.join(", ")));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::pipeline::{FailureCause, Progress};

    fn failure(index: usize, cause: FailureCause) -> ArtifactOutcome {
        Err(ArtifactError {
            index,
            name: format!("doc-{}", index),
            error: PipelineError {
                artifact: format!("doc-{}", index),
                stage: Stage::Upload,
                cause,
                progress: Progress::default(),
            },
        })
    }

    #[test]
    fn test_empty_batch() {
        let summary = BatchSummary::from_outcomes(&[]);
        assert!(summary.is_success());
        assert_eq!(summary.exit_code, 0);
        assert_eq!(summary.human_summary, "No artifacts published");
    }

    #[test]
    fn test_first_failure_sets_exit_code() {
        let outcomes = vec![
            failure(0, FailureCause::Backend(BackendError::Unavailable("down".into()))),
            failure(1, FailureCause::LedgerRejection("reverted".into())),
        ];
        let summary = BatchSummary::from_outcomes(&outcomes);

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.failed_indices, vec![0, 1]);
        assert_eq!(summary.exit_code, 20);
        assert_eq!(summary.human_summary, "Batch incomplete: 0 published, 2 failed");
    }

    #[test]
    fn test_artifact_error_display() {
        let outcome = failure(3, FailureCause::Backend(BackendError::Unavailable("down".into())));
        let err = outcome.unwrap_err();
        assert_eq!(err.stage(), Stage::Upload);
        assert_eq!(err.kind(), ErrorKind::TransientNetworkError);
        assert!(err.to_string().starts_with("artifact #3 'doc-3':"));
    }
}
