//! Independent re-verification of a published CID
//!
//! Each check asks one trust source and never looks at another check's
//! result. FAIL means the source answered and the answer is negative;
//! ERROR means the source could not be asked, or its check panicked.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use serde_json::json;

use super::report::{Check, VerificationReport, ANCHORING, AVAILABILITY, DURABILITY};
use crate::backend::{BackendError, Backends, ContentStore, Ledger, PinningService};
use crate::config::PublisherConfig;
use crate::events::{EventSink, PipelineEvent, TracingSink};
use crate::manifest::{Manifest, ManifestEntry};
use crate::model::{Cid, ContentDigest, DocumentId, PinStatus};

/// Claims a caller wants checked in addition to the CID itself
#[derive(Debug, Clone, Default)]
struct Expectations {
    digest: Option<ContentDigest>,
    document_id: Option<DocumentId>,
}

/// Re-derives trust in a CID from the store, the pinning service and the ledger
pub struct Verifier {
    backends: Backends,
    concurrent: bool,
    sink: Arc<dyn EventSink>,
}

impl Verifier {
    pub fn new(config: &PublisherConfig, backends: Backends) -> Self {
        Self {
            backends,
            concurrent: config.verify.concurrent,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn verify(&self, cid: &Cid) -> VerificationReport {
        self.run(cid, &Expectations::default())
    }

    /// Verify and also require the served bytes to hash to `expected`
    pub fn verify_with_digest(&self, cid: &Cid, expected: &ContentDigest) -> VerificationReport {
        self.run(
            cid,
            &Expectations {
                digest: Some(expected.clone()),
                document_id: None,
            },
        )
    }

    /// Verify one manifest entry against its recorded digest and document id
    pub fn verify_entry(&self, entry: &ManifestEntry) -> VerificationReport {
        self.run(
            &entry.cid,
            &Expectations {
                digest: entry.digest.clone(),
                document_id: Some(entry.document_id),
            },
        )
    }

    /// Verify every manifest entry, in manifest order
    pub fn verify_manifest(&self, manifest: &Manifest) -> Vec<VerificationReport> {
        manifest
            .entries()
            .iter()
            .map(|entry| self.verify_entry(entry))
            .collect()
    }

    fn run(&self, cid: &Cid, expect: &Expectations) -> VerificationReport {
        let store = self.backends.store.as_ref();
        let pins = self.backends.pins.as_ref();
        let ledger = self.backends.ledger.as_ref();

        let (availability, durability, anchoring) = if self.concurrent {
            thread::scope(|s| {
                let availability =
                    s.spawn(|| check_availability(store, cid, expect.digest.as_ref()));
                let durability = s.spawn(|| check_durability(pins, cid));
                let anchoring = s.spawn(|| check_anchoring(ledger, cid, expect.document_id));

                (
                    availability
                        .join()
                        .unwrap_or_else(|_| Check::error(AVAILABILITY, PANICKED)),
                    durability
                        .join()
                        .unwrap_or_else(|_| Check::error(DURABILITY, PANICKED)),
                    anchoring
                        .join()
                        .unwrap_or_else(|_| Check::error(ANCHORING, PANICKED)),
                )
            })
        } else {
            (
                isolated(AVAILABILITY, || {
                    check_availability(store, cid, expect.digest.as_ref())
                }),
                isolated(DURABILITY, || check_durability(pins, cid)),
                isolated(ANCHORING, || check_anchoring(ledger, cid, expect.document_id)),
            )
        };

        let report = VerificationReport::from_checks(cid.clone(), availability, durability, anchoring);

        for check in &report.checks {
            self.sink.emit(&PipelineEvent::CheckCompleted {
                cid: cid.clone(),
                check: check.name.clone(),
                status: check.status,
                message: check.message.clone(),
            });
        }
        report
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("concurrent", &self.concurrent)
            .finish_non_exhaustive()
    }
}

const PANICKED: &str = "check panicked";

/// Run a check on the current thread, turning a panic into an ERROR entry
fn isolated(name: &str, check: impl FnOnce() -> Check) -> Check {
    panic::catch_unwind(AssertUnwindSafe(check)).unwrap_or_else(|_| Check::error(name, PANICKED))
}

fn check_availability(
    store: &dyn ContentStore,
    cid: &Cid,
    expected: Option<&ContentDigest>,
) -> Check {
    match store.get(cid) {
        Ok(bytes) => {
            let digest = ContentDigest::of(&bytes);
            let details = json!({ "size": bytes.len(), "digest": digest });
            match expected {
                Some(expected) if expected != &digest => Check::fail(
                    AVAILABILITY,
                    format!(
                        "content served but digest {} does not match expected {}",
                        digest.short(),
                        expected.short()
                    ),
                )
                .with_details(details),
                _ => Check::pass(
                    AVAILABILITY,
                    format!("content retrievable ({} bytes)", bytes.len()),
                )
                .with_details(details),
            }
        }
        Err(BackendError::NotFound(_)) => {
            Check::fail(AVAILABILITY, "content store has no object for this CID")
        }
        Err(e) => Check::error(AVAILABILITY, format!("content store unreachable: {}", e)),
    }
}

fn check_durability(pins: &dyn PinningService, cid: &Cid) -> Check {
    match pins.status(cid) {
        Ok(Some(record)) => {
            let details = serde_json::to_value(&record).ok();
            let check = match record.status {
                PinStatus::Pinned => Check::pass(DURABILITY, "pinned"),
                status => Check::warning(DURABILITY, format!("pin status is {}", status.as_str())),
            };
            match details {
                Some(details) => check.with_details(details),
                None => check,
            }
        }
        // No pin does not prove the content is unreachable
        Ok(None) => Check::warning(DURABILITY, "pinning service has no record of this CID"),
        Err(e) => Check::error(DURABILITY, format!("pinning service unreachable: {}", e)),
    }
}

fn check_anchoring(ledger: &dyn Ledger, cid: &Cid, expected_id: Option<DocumentId>) -> Check {
    let by_cid = match ledger.lookup_by_cid(cid) {
        Ok(Some(record)) => record,
        Ok(None) => return Check::fail(ANCHORING, "ledger has no anchor for this CID"),
        Err(e) => return Check::error(ANCHORING, format!("ledger unreachable: {}", e)),
    };

    let document_id = expected_id.unwrap_or(by_cid.document_id);
    match ledger.lookup_by_id(document_id) {
        Ok(record) if record.cid == *cid => {
            let details = serde_json::to_value(&record).ok();
            let check = Check::pass(
                ANCHORING,
                format!(
                    "anchored as document {} at block {}",
                    record.document_id, record.confirmed_at_block
                ),
            );
            match details {
                Some(details) => check.with_details(details),
                None => check,
            }
        }
        Ok(record) => Check::fail(
            ANCHORING,
            format!("document {} anchors {}, not this CID", document_id, record.cid),
        ),
        Err(BackendError::NotFound(_)) => Check::fail(
            ANCHORING,
            format!("ledger has no document {}", document_id),
        ),
        // A recorded document id that cannot be fetched is unverified
        Err(e) if expected_id.is_some() => Check::error(
            ANCHORING,
            format!("ledger unreachable for document {}: {}", document_id, e),
        ),
        // The CID is anchored; only the full-record fetch failed
        Err(e) => {
            let check = Check::pass(
                ANCHORING,
                format!("anchored as document {}", by_cid.document_id),
            );
            match serde_json::to_value(&by_cid) {
                Ok(mut details) => {
                    details["id_lookup_error"] = json!(e.to_string());
                    check.with_details(details)
                }
                Err(_) => check,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        FaultConfig, MemoryContentStore, MemoryLedger, MemoryPinningService, Operation,
    };
    use crate::model::{AnchorReceipt, AnchorRecord, Metadata};
    use crate::verify::CheckStatus;

    struct Fixture {
        store: Arc<MemoryContentStore>,
        pins: Arc<MemoryPinningService>,
        ledger: Arc<MemoryLedger>,
    }

    impl Fixture {
        fn published(content: &[u8]) -> (Self, Cid) {
            let fixture = Self {
                store: Arc::new(MemoryContentStore::new()),
                pins: Arc::new(MemoryPinningService::new()),
                ledger: Arc::new(MemoryLedger::new()),
            };
            let (cid, _) = fixture.store.put(content).unwrap();
            fixture.pins.pin(&cid, &Metadata::new()).unwrap();
            fixture.ledger.anchor("doc", &cid, 1_700_000_000).unwrap();
            (fixture, cid)
        }

        fn verifier(&self, concurrent: bool) -> Verifier {
            let mut config = PublisherConfig::default();
            config.verify.concurrent = concurrent;
            let backends = Backends::new(self.store.clone(), self.pins.clone(), self.ledger.clone());
            Verifier::new(&config, backends)
        }
    }

    #[test]
    fn test_all_checks_pass() {
        let (f, cid) = Fixture::published(b"hello");
        let report = f.verifier(true).verify(&cid);

        assert!(report.is_verified());
        assert_eq!(report.summary.passed, 3);
        let details = report.check(AVAILABILITY).unwrap().details.as_ref().unwrap();
        assert_eq!(details["size"], 5);
    }

    #[test]
    fn test_sequential_matches_concurrent() {
        let (f, cid) = Fixture::published(b"hello");
        assert_eq!(f.verifier(true).verify(&cid), f.verifier(false).verify(&cid));
    }

    #[test]
    fn test_digest_mismatch_fails_availability() {
        let (f, cid) = Fixture::published(b"hello");
        let report = f
            .verifier(false)
            .verify_with_digest(&cid, &ContentDigest::of(b"other"));

        assert_eq!(report.status_of(AVAILABILITY), Some(CheckStatus::Fail));
        assert!(!report.is_verified());
    }

    #[test]
    fn test_unknown_document_id_fails_anchoring() {
        let (f, cid) = Fixture::published(b"hello");
        let check = check_anchoring(f.ledger.as_ref(), &cid, Some(99));
        assert_eq!(check.status, CheckStatus::Fail);
    }

    #[test]
    fn test_document_id_for_other_cid_fails_anchoring() {
        let (f, cid) = Fixture::published(b"hello");
        let other = Cid::for_bytes(b"other");
        f.ledger.anchor("other", &other, 1_700_000_001).unwrap();

        let check = check_anchoring(f.ledger.as_ref(), &cid, Some(2));
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.message.contains("document 2"));
    }

    #[test]
    fn test_id_lookup_error_still_passes() {
        let (f, cid) = Fixture::published(b"hello");
        f.ledger
            .inject(Operation::LookupById, FaultConfig::unavailable("rpc down"));

        let check = check_anchoring(f.ledger.as_ref(), &cid, None);
        assert_eq!(check.status, CheckStatus::Pass);
        assert!(check.details.unwrap().get("id_lookup_error").is_some());
    }

    #[test]
    fn test_id_lookup_error_with_recorded_id_is_error() {
        let (f, cid) = Fixture::published(b"hello");
        f.ledger
            .inject(Operation::LookupById, FaultConfig::unavailable("rpc down"));

        let check = check_anchoring(f.ledger.as_ref(), &cid, Some(1));
        assert_eq!(check.status, CheckStatus::Error);
        assert!(check.message.contains("document 1"));
    }

    struct PanickingLedger;

    impl Ledger for PanickingLedger {
        fn anchor(&self, _: &str, _: &Cid, _: i64) -> Result<AnchorReceipt, BackendError> {
            panic!("ledger client bug")
        }

        fn lookup_by_cid(&self, _: &Cid) -> Result<Option<AnchorRecord>, BackendError> {
            panic!("ledger client bug")
        }

        fn lookup_by_id(&self, _: DocumentId) -> Result<AnchorRecord, BackendError> {
            panic!("ledger client bug")
        }
    }

    #[test]
    fn test_panicking_check_becomes_error_in_both_modes() {
        let (f, cid) = Fixture::published(b"hello");
        for concurrent in [true, false] {
            let mut config = PublisherConfig::default();
            config.verify.concurrent = concurrent;
            let backends =
                Backends::new(f.store.clone(), f.pins.clone(), Arc::new(PanickingLedger));
            let report = Verifier::new(&config, backends).verify(&cid);

            assert_eq!(report.status_of(ANCHORING), Some(CheckStatus::Error));
            assert_eq!(report.check(ANCHORING).unwrap().message, PANICKED);
            assert_eq!(report.status_of(AVAILABILITY), Some(CheckStatus::Pass));
            assert_eq!(report.status_of(DURABILITY), Some(CheckStatus::Pass));
        }
    }

    #[test]
    fn test_timeout_is_error() {
        let (f, cid) = Fixture::published(b"hello");
        f.store.inject(
            Operation::Get,
            FaultConfig::timeout(std::time::Duration::from_secs(30)),
        );

        let report = f.verifier(true).verify(&cid);
        assert_eq!(report.status_of(AVAILABILITY), Some(CheckStatus::Error));
        assert!(report.is_verified());
    }
}
