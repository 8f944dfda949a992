//! In-process backends
//!
//! Thread-safe implementations of the three capabilities, each with its own
//! `FaultInjector`. Used by the test suite and by embedders that want a
//! dry run of the pipeline without network services.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;

use super::failure::{Fault, FaultConfig, FaultInjector, Operation};
use super::{BackendError, ContentStore, Ledger, PinningService};
use crate::model::{
    compute_sha256, AnchorReceipt, AnchorRecord, Cid, DocumentId, Metadata, PinRecord, PinStatus,
};

/// Transaction reference for an anchor: SHA-256 of the JCS-canonical submission
pub(crate) fn compute_transaction_ref(
    document_id: DocumentId,
    name: &str,
    cid: &Cid,
    timestamp: i64,
) -> Result<String, BackendError> {
    let submission = serde_json::json!({
        "document_id": document_id,
        "name": name,
        "cid": cid,
        "timestamp": timestamp,
    });
    let bytes = serde_json_canonicalizer::to_vec(&submission)
        .map_err(|e| BackendError::Rejected(format!("cannot canonicalize anchor: {}", e)))?;
    Ok(format!("0x{}", compute_sha256(&bytes)))
}

/// Content store holding objects in a map keyed by CID
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    objects: Mutex<HashMap<Cid, Vec<u8>>>,
    faults: Mutex<FaultInjector>,
    put_calls: AtomicU64,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a fault for `Put` or `Get`
    pub fn inject(&self, op: Operation, config: FaultConfig) {
        self.faults.lock().unwrap().inject(op, config);
    }

    /// Drop an object, as the store's garbage collector would
    pub fn evict(&self, cid: &Cid) -> bool {
        self.objects.lock().unwrap().remove(cid).is_some()
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.objects.lock().unwrap().contains_key(cid)
    }

    /// Number of `put` calls received, including failed ones
    pub fn put_calls(&self) -> u64 {
        self.put_calls.load(Ordering::SeqCst)
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&self, bytes: &[u8]) -> Result<(Cid, u64), BackendError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.faults.lock().unwrap().check(Operation::Put) {
            if let Some(err) = fault.to_error("put") {
                return Err(err);
            }
        }

        let cid = Cid::for_bytes(bytes);
        self.objects
            .lock()
            .unwrap()
            .entry(cid.clone())
            .or_insert_with(|| bytes.to_vec());
        Ok((cid, bytes.len() as u64))
    }

    fn get(&self, cid: &Cid) -> Result<Vec<u8>, BackendError> {
        let fault = self.faults.lock().unwrap().check(Operation::Get);
        if let Some(err) = fault.as_ref().and_then(|f| f.to_error(cid.as_str())) {
            return Err(err);
        }

        let mut bytes = self
            .objects
            .lock()
            .unwrap()
            .get(cid)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(cid.to_string()))?;

        if fault == Some(Fault::CorruptRead) {
            match bytes.first_mut() {
                Some(first) => *first ^= 0xff,
                None => bytes.push(0),
            }
        }
        Ok(bytes)
    }
}

/// Pinning service tracking pin records in a map
#[derive(Debug)]
pub struct MemoryPinningService {
    pins: Mutex<HashMap<Cid, PinRecord>>,
    faults: Mutex<FaultInjector>,
    pin_status: PinStatus,
}

impl Default for MemoryPinningService {
    fn default() -> Self {
        Self {
            pins: Mutex::new(HashMap::new()),
            faults: Mutex::new(FaultInjector::new()),
            pin_status: PinStatus::Pinned,
        }
    }
}

impl MemoryPinningService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status newly created pins report (e.g. `Pending` for a slow service)
    pub fn with_pin_status(mut self, status: PinStatus) -> Self {
        self.pin_status = status;
        self
    }

    pub fn inject(&self, op: Operation, config: FaultConfig) {
        self.faults.lock().unwrap().inject(op, config);
    }

    /// Mark a pin as released; returns false if the CID was never pinned
    pub fn unpin(&self, cid: &Cid) -> bool {
        match self.pins.lock().unwrap().get_mut(cid) {
            Some(record) => {
                record.status = PinStatus::Unpinned;
                true
            }
            None => false,
        }
    }
}

impl PinningService for MemoryPinningService {
    fn pin(&self, cid: &Cid, metadata: &Metadata) -> Result<PinRecord, BackendError> {
        if let Some(fault) = self.faults.lock().unwrap().check(Operation::Pin) {
            if let Some(err) = fault.to_error(cid.as_str()) {
                return Err(err);
            }
        }

        let record = PinRecord {
            cid: cid.clone(),
            pinned_at: Utc::now(),
            status: self.pin_status,
            metadata: metadata.clone(),
        };
        self.pins.lock().unwrap().insert(cid.clone(), record.clone());
        Ok(record)
    }

    fn status(&self, cid: &Cid) -> Result<Option<PinRecord>, BackendError> {
        match self.faults.lock().unwrap().check(Operation::PinStatus) {
            Some(Fault::Absent) => return Ok(None),
            Some(fault) => {
                if let Some(err) = fault.to_error(cid.as_str()) {
                    return Err(err);
                }
            }
            None => {}
        }
        Ok(self.pins.lock().unwrap().get(cid).cloned())
    }
}

/// Append-only ledger held in memory. Document ids and block heights start at 1.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<AnchorRecord>>,
    faults: Mutex<FaultInjector>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, op: Operation, config: FaultConfig) {
        self.faults.lock().unwrap().inject(op, config);
    }

    /// Every CID anchored so far, in ledger order
    pub fn anchored_cids(&self) -> Vec<Cid> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.cid.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append(&self, name: &str, cid: &Cid, timestamp: i64) -> Result<AnchorRecord, BackendError> {
        let mut records = self.records.lock().unwrap();
        let document_id = records.len() as DocumentId + 1;
        let record = AnchorRecord {
            document_id,
            cid: cid.clone(),
            name: name.to_string(),
            timestamp,
            transaction_ref: compute_transaction_ref(document_id, name, cid, timestamp)?,
            confirmed_at_block: document_id,
        };
        records.push(record.clone());
        Ok(record)
    }
}

impl Ledger for MemoryLedger {
    fn anchor(&self, name: &str, cid: &Cid, timestamp: i64) -> Result<AnchorReceipt, BackendError> {
        let fault = self.faults.lock().unwrap().check(Operation::Anchor);
        match fault {
            Some(Fault::AppliedButFailed(msg)) => {
                self.append(name, cid, timestamp)?;
                return Err(BackendError::Unavailable(msg));
            }
            Some(fault) => {
                if let Some(err) = fault.to_error(cid.as_str()) {
                    return Err(err);
                }
            }
            None => {}
        }

        let record = self.append(name, cid, timestamp)?;
        Ok(AnchorReceipt {
            document_id: record.document_id,
            transaction_ref: record.transaction_ref,
            confirmed_at_block: record.confirmed_at_block,
        })
    }

    fn lookup_by_cid(&self, cid: &Cid) -> Result<Option<AnchorRecord>, BackendError> {
        match self.faults.lock().unwrap().check(Operation::LookupByCid) {
            Some(Fault::Absent) => return Ok(None),
            Some(fault) => {
                if let Some(err) = fault.to_error(cid.as_str()) {
                    return Err(err);
                }
            }
            None => {}
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.cid == cid)
            .cloned())
    }

    fn lookup_by_id(&self, id: DocumentId) -> Result<AnchorRecord, BackendError> {
        let fault = self.faults.lock().unwrap().check(Operation::LookupById);
        if let Some(fault) = fault {
            let subject = format!("document {}", id);
            return Err(fault
                .to_error(&subject)
                .unwrap_or(BackendError::NotFound(subject)));
        }

        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.document_id == id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("document {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentDigest;

    #[test]
    fn test_store_round_trip() {
        let store = MemoryContentStore::new();
        let (cid, size) = store.put(b"hello").unwrap();

        assert_eq!(size, 5);
        assert_eq!(cid, Cid::for_bytes(b"hello"));
        assert_eq!(store.get(&cid).unwrap(), b"hello");
        assert_eq!(store.put_calls(), 1);
    }

    #[test]
    fn test_store_missing_object() {
        let store = MemoryContentStore::new();
        let err = store.get(&Cid::for_bytes(b"nope")).unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[test]
    fn test_store_corrupt_read() {
        let store = MemoryContentStore::new();
        let (cid, _) = store.put(b"hello").unwrap();
        store.inject(Operation::Get, FaultConfig::corrupt_read().with_fail_count(1));

        let corrupted = store.get(&cid).unwrap();
        assert_ne!(ContentDigest::of(&corrupted), ContentDigest::of(b"hello"));
        // Fault exhausted
        assert_eq!(store.get(&cid).unwrap(), b"hello");
    }

    #[test]
    fn test_store_evict() {
        let store = MemoryContentStore::new();
        let (cid, _) = store.put(b"hello").unwrap();
        assert!(store.evict(&cid));
        assert!(!store.contains(&cid));
    }

    #[test]
    fn test_pin_and_status() {
        let pins = MemoryPinningService::new();
        let cid = Cid::for_bytes(b"doc");
        let mut metadata = Metadata::new();
        metadata.insert("framework".to_string(), "docanchor".to_string());

        let record = pins.pin(&cid, &metadata).unwrap();
        assert!(record.is_pinned());
        assert_eq!(pins.status(&cid).unwrap().unwrap().metadata, metadata);

        assert!(pins.unpin(&cid));
        assert_eq!(pins.status(&cid).unwrap().unwrap().status, PinStatus::Unpinned);
    }

    #[test]
    fn test_pin_pending_status() {
        let pins = MemoryPinningService::new().with_pin_status(PinStatus::Pending);
        let record = pins.pin(&Cid::for_bytes(b"doc"), &Metadata::new()).unwrap();
        assert_eq!(record.status, PinStatus::Pending);
    }

    #[test]
    fn test_ledger_ids_are_monotonic() {
        let ledger = MemoryLedger::new();
        let a = ledger.anchor("a", &Cid::for_bytes(b"a"), 100).unwrap();
        let b = ledger.anchor("b", &Cid::for_bytes(b"b"), 101).unwrap();

        assert_eq!(a.document_id, 1);
        assert_eq!(b.document_id, 2);
        assert_ne!(a.transaction_ref, b.transaction_ref);
        assert!(a.transaction_ref.starts_with("0x"));
    }

    #[test]
    fn test_ledger_lookups() {
        let ledger = MemoryLedger::new();
        let cid = Cid::for_bytes(b"a");
        let receipt = ledger.anchor("a", &cid, 100).unwrap();

        let by_cid = ledger.lookup_by_cid(&cid).unwrap().unwrap();
        let by_id = ledger.lookup_by_id(receipt.document_id).unwrap();
        assert_eq!(by_cid, by_id);
        assert_eq!(by_cid.timestamp, 100);

        assert!(ledger.lookup_by_cid(&Cid::for_bytes(b"b")).unwrap().is_none());
        assert!(matches!(ledger.lookup_by_id(99), Err(BackendError::NotFound(_))));
    }

    #[test]
    fn test_ledger_rejection_records_nothing() {
        let ledger = MemoryLedger::new();
        ledger.inject(Operation::Anchor, FaultConfig::rejected("reverted"));

        let err = ledger.anchor("a", &Cid::for_bytes(b"a"), 100).unwrap_err();
        assert_eq!(err, BackendError::Rejected("reverted".to_string()));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_ledger_applied_but_failed() {
        let ledger = MemoryLedger::new();
        ledger.inject(Operation::Anchor, FaultConfig::applied_but_failed("rpc dropped"));
        let cid = Cid::for_bytes(b"a");

        assert!(ledger.anchor("a", &cid, 100).is_err());
        assert_eq!(ledger.anchored_cids(), vec![cid]);
    }

    #[test]
    fn test_ledger_lookup_lag() {
        let ledger = MemoryLedger::new();
        let cid = Cid::for_bytes(b"a");
        ledger.anchor("a", &cid, 100).unwrap();
        ledger.inject(Operation::LookupByCid, FaultConfig::absent().with_fail_count(1));

        assert!(ledger.lookup_by_cid(&cid).unwrap().is_none());
        assert!(ledger.lookup_by_cid(&cid).unwrap().is_some());
    }
}
