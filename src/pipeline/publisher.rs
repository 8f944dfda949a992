//! Publication pipeline orchestration
//!
//! Drives each artifact through upload, pin, integrity check, anchor and
//! anchor confirmation:
//! - Upload and integrity check are fatal on failure
//! - Pin failure degrades the publication but the pipeline continues
//! - Anchor failure is fatal and never retried
//! - Confirmation lag yields `verified: false` instead of an error
//!
//! Every fatal failure carries the `Progress` reached so far so that
//! `Publisher::resume` can continue from the CID instead of re-uploading.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use chrono::Utc;

use super::batch::{ArtifactError, ArtifactOutcome};
use super::error::{ErrorKind, FailureCause, PipelineError, Progress, Warning};
use super::publication::{PinOutcome, Publication};
use super::stage::{PipelineMachine, PipelineState, Stage};
use crate::backend::{BackendError, Backends};
use crate::config::{ConfigError, PublisherConfig};
use crate::events::{EventSink, PipelineEvent, TracingSink};
use crate::manifest::{GatewaySet, Manifest, ManifestError};
use crate::model::{AnchorRecord, Artifact, Cid, ContentDigest, Metadata, UploadResult};

/// One publishing session: configuration, backends and the session manifest
pub struct Publisher {
    config: PublisherConfig,
    backends: Backends,
    gateways: GatewaySet,
    sink: Arc<dyn EventSink>,
    manifest: Mutex<Manifest>,
}

impl Publisher {
    /// Create a publisher; events go to `TracingSink` until `with_sink`
    pub fn new(config: PublisherConfig, backends: Backends) -> Result<Self, ConfigError> {
        config.validate()?;
        let gateways = GatewaySet::new(config.gateways.iter().cloned())?;
        let manifest = Mutex::new(Manifest::new(&config.framework));

        Ok(Self {
            config,
            backends,
            gateways,
            sink: Arc::new(TracingSink),
            manifest,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Publish one artifact through all five stages
    pub fn publish(&self, artifact: Artifact) -> Result<Publication, PipelineError> {
        let Artifact {
            name,
            bytes,
            metadata,
        } = artifact;
        let mut run = Run::new(self, name, metadata, PipelineMachine::new(), Progress::default());

        let upload = run.upload(&bytes)?;
        drop(bytes);

        run.pin(&upload)?;
        run.check_integrity(&upload)?;
        let submitted = run.anchor(&upload)?;
        let (anchor, verified) = run.confirm(&upload.cid, submitted)?;

        run.complete(upload, anchor, verified)
    }

    /// Continue a pipeline from the progress captured in a `PipelineError`.
    ///
    /// The upload is never repeated. An earlier anchor that landed despite
    /// a reported failure is adopted rather than submitted again.
    pub fn resume(
        &self,
        name: impl Into<String>,
        metadata: Metadata,
        progress: Progress,
    ) -> Result<Publication, PipelineError> {
        let name = name.into();
        let Some(upload) = progress.upload.clone() else {
            let mut run = Run::new(self, name, metadata, PipelineMachine::new(), progress);
            return Err(run.failed(Stage::Upload, FailureCause::MissingUpload));
        };

        let start = if progress.is_pinned() {
            Stage::IntegrityCheck
        } else {
            Stage::Pin
        };
        let mut run = Run::new(self, name, metadata, PipelineMachine::resume_at(start), progress);

        if start == Stage::Pin {
            run.pin(&upload)?;
        }
        run.progress.integrity_verified = false;
        run.check_integrity(&upload)?;
        let submitted = run.adopt_or_anchor(&upload)?;
        let (anchor, verified) = run.confirm(&upload.cid, submitted)?;

        run.complete(upload, anchor, verified)
    }

    /// Publish artifacts one at a time in input order.
    ///
    /// A failed artifact never aborts the batch. The configured spacing is
    /// observed between artifacts, not after the last one.
    pub fn publish_all(&self, artifacts: Vec<Artifact>) -> Vec<ArtifactOutcome> {
        let spacing = self.config.batch.spacing();

        artifacts
            .into_iter()
            .enumerate()
            .map(|(index, artifact)| {
                if index > 0 && !spacing.is_zero() {
                    thread::sleep(spacing);
                }
                let name = artifact.name.clone();
                self.publish(artifact)
                    .map_err(|error| ArtifactError { index, name, error })
            })
            .collect()
    }

    /// Snapshot of the session manifest so far
    pub fn manifest(&self) -> Manifest {
        self.lock_manifest().clone()
    }

    /// Close the session and return its manifest
    pub fn finish(self) -> Manifest {
        let mut manifest = self
            .manifest
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());
        manifest.seal();
        manifest
    }

    /// Close the session and persist its manifest
    pub fn write_manifest(self, path: &Path) -> Result<Manifest, ManifestError> {
        let manifest = self.finish();
        manifest.write_to_file(path)?;
        Ok(manifest)
    }

    fn lock_manifest(&self) -> MutexGuard<'_, Manifest> {
        self.manifest.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Tags attached to a pin request
    fn pin_tags(&self, name: &str, metadata: &Metadata) -> Metadata {
        let mut tags = metadata.clone();
        tags.insert("framework".to_string(), self.config.framework.name.clone());
        tags.insert("name".to_string(), name.to_string());
        tags.insert("pinned_at".to_string(), Utc::now().to_rfc3339());
        tags
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("config", &self.config)
            .field("backends", &self.backends)
            .finish_non_exhaustive()
    }
}

/// One artifact's trip through the pipeline
struct Run<'a> {
    publisher: &'a Publisher,
    name: String,
    metadata: Metadata,
    machine: PipelineMachine,
    progress: Progress,
    warnings: Vec<Warning>,
}

impl<'a> Run<'a> {
    fn new(
        publisher: &'a Publisher,
        name: String,
        metadata: Metadata,
        machine: PipelineMachine,
        progress: Progress,
    ) -> Self {
        Self {
            publisher,
            name,
            metadata,
            machine,
            progress,
            warnings: Vec::new(),
        }
    }

    fn emit(&self, event: PipelineEvent) {
        self.publisher.sink.emit(&event);
    }

    /// Enter `stage`; entering anything but the next stage fails the run
    fn started(&mut self, stage: Stage) -> Result<(), PipelineError> {
        if let Err(e) = self.machine.enter(stage) {
            return Err(self.failed(stage, FailureCause::OutOfOrder(e)));
        }
        self.emit(PipelineEvent::StageStarted {
            artifact: self.name.clone(),
            stage,
        });
        Ok(())
    }

    fn succeeded(&mut self, stage: Stage, detail: String) {
        self.emit(PipelineEvent::StageSucceeded {
            artifact: self.name.clone(),
            stage,
            detail,
        });
    }

    /// Record a non-fatal failure and move on
    fn degraded(&mut self, kind: ErrorKind, stage: Stage, message: String) {
        self.emit(PipelineEvent::StageDegraded {
            artifact: self.name.clone(),
            stage,
            message: message.clone(),
        });
        self.warnings.push(Warning {
            kind,
            stage,
            message,
        });
    }

    fn failed(&mut self, stage: Stage, cause: FailureCause) -> PipelineError {
        self.emit(PipelineEvent::StageFailed {
            artifact: self.name.clone(),
            stage,
            error: cause.to_string(),
        });
        self.machine.fail();
        PipelineError {
            artifact: self.name.clone(),
            stage,
            cause,
            progress: self.progress.clone(),
        }
    }

    fn upload(&mut self, bytes: &[u8]) -> Result<UploadResult, PipelineError> {
        let publisher = self.publisher;
        self.started(Stage::Upload)?;

        // Digest is taken before the bytes leave the process
        let local_digest = ContentDigest::of(bytes);
        let (cid, size) = match publisher.backends.store.put(bytes) {
            Ok(stored) => stored,
            Err(e) => return Err(self.failed(Stage::Upload, e.into())),
        };

        let upload = UploadResult {
            cid,
            size,
            local_digest,
        };
        self.progress.upload = Some(upload.clone());
        self.succeeded(
            Stage::Upload,
            format!("uploaded {} bytes as {}", upload.size, upload.cid),
        );
        Ok(upload)
    }

    fn pin(&mut self, upload: &UploadResult) -> Result<(), PipelineError> {
        let publisher = self.publisher;
        self.started(Stage::Pin)?;

        let tags = publisher.pin_tags(&self.name, &self.metadata);
        let outcome = match publisher.backends.pins.pin(&upload.cid, &tags) {
            Ok(record) => PinOutcome {
                record: Some(record),
                error: None,
            },
            Err(e) => PinOutcome {
                record: None,
                error: Some(e.to_string()),
            },
        };

        if outcome.pinned() {
            self.succeeded(Stage::Pin, format!("pinned {}", upload.cid));
        } else {
            let message = match (&outcome.error, &outcome.record) {
                (Some(err), _) => format!("pin failed: {}", err),
                (None, Some(record)) => format!("pin status is {}", record.status.as_str()),
                (None, None) => "pin not recorded".to_string(),
            };
            self.degraded(ErrorKind::PinningDegraded, Stage::Pin, message);
        }
        self.progress.pin = Some(outcome);
        Ok(())
    }

    fn check_integrity(&mut self, upload: &UploadResult) -> Result<(), PipelineError> {
        let publisher = self.publisher;
        self.started(Stage::IntegrityCheck)?;

        let retrieved = match publisher.backends.store.get(&upload.cid) {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.failed(Stage::IntegrityCheck, e.into())),
        };

        let actual = ContentDigest::of(&retrieved);
        if actual != upload.local_digest {
            return Err(self.failed(
                Stage::IntegrityCheck,
                FailureCause::IntegrityMismatch {
                    expected: upload.local_digest.clone(),
                    actual,
                },
            ));
        }

        self.progress.integrity_verified = true;
        self.succeeded(
            Stage::IntegrityCheck,
            format!("retrieved digest {} matches", actual.short()),
        );
        Ok(())
    }

    fn anchor(&mut self, upload: &UploadResult) -> Result<AnchorRecord, PipelineError> {
        self.started(Stage::Anchor)?;
        self.submit_anchor(upload)
    }

    /// Anchor unless the ledger already holds this artifact's record.
    ///
    /// A record for the same CID under another name belongs to a different
    /// artifact with identical content and is not adopted.
    fn adopt_or_anchor(&mut self, upload: &UploadResult) -> Result<AnchorRecord, PipelineError> {
        let publisher = self.publisher;
        self.started(Stage::Anchor)?;

        match publisher.backends.ledger.lookup_by_cid(&upload.cid) {
            Ok(Some(existing)) if existing.name == self.name => {
                self.succeeded(
                    Stage::Anchor,
                    format!("adopted existing anchor as document {}", existing.document_id),
                );
                Ok(existing)
            }
            Ok(_) => self.submit_anchor(upload),
            // Submitting blind could double-anchor
            Err(e) => Err(self.failed(Stage::Anchor, e.into())),
        }
    }

    fn submit_anchor(&mut self, upload: &UploadResult) -> Result<AnchorRecord, PipelineError> {
        let publisher = self.publisher;
        let timestamp = Utc::now().timestamp();

        match publisher.backends.ledger.anchor(&self.name, &upload.cid, timestamp) {
            Ok(receipt) => {
                let record =
                    AnchorRecord::from_receipt(&receipt, &self.name, &upload.cid, timestamp);
                self.succeeded(
                    Stage::Anchor,
                    format!(
                        "anchored as document {} ({})",
                        record.document_id, record.transaction_ref
                    ),
                );
                Ok(record)
            }
            Err(BackendError::Rejected(reason)) => {
                Err(self.failed(Stage::Anchor, FailureCause::LedgerRejection(reason)))
            }
            Err(e) => Err(self.failed(Stage::Anchor, e.into())),
        }
    }

    /// Re-query the ledger for the record just submitted.
    ///
    /// The CID lookup returns the earliest anchor of that content, so when it
    /// names another document the submitted id is checked directly.
    fn confirm(
        &mut self,
        cid: &Cid,
        submitted: AnchorRecord,
    ) -> Result<(AnchorRecord, bool), PipelineError> {
        let publisher = self.publisher;
        let ledger = &publisher.backends.ledger;
        self.started(Stage::Confirm)?;

        let visible = match ledger.lookup_by_cid(cid) {
            Ok(Some(record)) if record.document_id == submitted.document_id => Ok(Some(record)),
            Ok(Some(_)) => match ledger.lookup_by_id(submitted.document_id) {
                Ok(record) if &record.cid == cid => Ok(Some(record)),
                Ok(_) | Err(BackendError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
            other => other,
        };

        match visible {
            Ok(Some(record)) => {
                self.succeeded(
                    Stage::Confirm,
                    format!(
                        "document {} visible at block {}",
                        record.document_id, record.confirmed_at_block
                    ),
                );
                Ok((record, true))
            }
            Ok(None) => {
                self.degraded(
                    ErrorKind::NotYetConfirmed,
                    Stage::Confirm,
                    format!("document {} not yet visible on the ledger", submitted.document_id),
                );
                Ok((submitted, false))
            }
            Err(e) => {
                self.degraded(
                    ErrorKind::NotYetConfirmed,
                    Stage::Confirm,
                    format!("confirmation lookup failed: {}", e),
                );
                Ok((submitted, false))
            }
        }
    }

    fn complete(
        mut self,
        upload: UploadResult,
        anchor: AnchorRecord,
        verified: bool,
    ) -> Result<Publication, PipelineError> {
        if let Err(e) = self.machine.transition(PipelineState::Done) {
            return Err(self.failed(Stage::Confirm, FailureCause::OutOfOrder(e)));
        }

        let publisher = self.publisher;
        let pin = self.progress.pin.unwrap_or_default();
        let publication = Publication {
            gateway_urls: publisher.gateways.urls(&upload.cid),
            pinned: pin.pinned(),
            name: self.name,
            metadata: self.metadata,
            upload,
            pin,
            anchor,
            verified,
            warnings: self.warnings,
            published_at: Utc::now(),
        };

        publisher.lock_manifest().append(&publication);
        publisher.sink.emit(&PipelineEvent::ArtifactPublished {
            artifact: publication.name.clone(),
            cid: publication.cid().clone(),
            document_id: publication.document_id(),
            verified: publication.verified,
            pinned: publication.pinned,
        });

        Ok(publication)
    }
}
