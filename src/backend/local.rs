//! File-backed backends rooted in a state directory
//!
//! Layout:
//! - `<root>/objects/<digest[0:2]>/<cid>`: stored objects, fanned out on the
//!   content digest
//! - `<root>/pins.json`: pin records keyed by CID
//! - `<root>/ledger.json`: append-only vector of anchor records
//!
//! Object writes go to `<root>/.tmp` first and are renamed into place, so a
//! reader never observes a partially written object.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::memory::compute_transaction_ref;
use super::{BackendError, ContentStore, Ledger, PinningService};
use crate::model::{
    AnchorReceipt, AnchorRecord, Cid, DocumentId, Metadata, PinRecord, PinStatus,
};

/// Errors from the local backends' filesystem layer
#[derive(Debug, thiserror::Error)]
pub enum LocalBackendError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt state file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid CID for local store: {0}")]
    InvalidCid(String),
}

impl From<LocalBackendError> for BackendError {
    fn from(err: LocalBackendError) -> Self {
        BackendError::Unavailable(err.to_string())
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> LocalBackendError + '_ {
    move |source| LocalBackendError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write bytes via temp file + rename
fn write_atomic(tmp_dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), LocalBackendError> {
    fs::create_dir_all(tmp_dir).map_err(io_err(tmp_dir))?;
    let temp_path = tmp_dir.join(format!(".{}.tmp", Uuid::new_v4()));
    fs::write(&temp_path, bytes).map_err(io_err(&temp_path))?;

    if let Some(parent) = target.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            let _ = fs::remove_file(&temp_path);
            return Err(io_err(parent)(e));
        }
    }
    if let Err(e) = fs::rename(&temp_path, target) {
        let _ = fs::remove_file(&temp_path);
        return Err(io_err(target)(e));
    }
    Ok(())
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, LocalBackendError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = fs::read(path).map_err(io_err(path))?;
    serde_json::from_slice(&bytes).map_err(|source| LocalBackendError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn store_json<T: Serialize>(tmp_dir: &Path, path: &Path, value: &T) -> Result<(), LocalBackendError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| LocalBackendError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(tmp_dir, path, &json)
}

/// Content store persisting objects under `<root>/objects`
#[derive(Debug)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    /// Open (and create if needed) a store rooted at the state directory
    pub fn open(root: impl AsRef<Path>) -> Result<Self, LocalBackendError> {
        let root = root.as_ref().to_path_buf();
        let objects = root.join("objects");
        fs::create_dir_all(&objects).map_err(io_err(&objects))?;
        Ok(Self { root })
    }

    fn object_path(&self, cid: &Cid) -> Result<PathBuf, LocalBackendError> {
        let s = cid.as_str();
        let digest = match cid.embedded_digest() {
            Some(digest) if s.chars().all(|c| c.is_ascii_alphanumeric()) => digest,
            _ => return Err(LocalBackendError::InvalidCid(s.to_string())),
        };
        Ok(self
            .root
            .join("objects")
            .join(&digest.as_str()[..2])
            .join(s))
    }
}

impl ContentStore for LocalContentStore {
    fn put(&self, bytes: &[u8]) -> Result<(Cid, u64), BackendError> {
        let cid = Cid::for_bytes(bytes);
        let path = self.object_path(&cid)?;
        if !path.exists() {
            write_atomic(&self.root.join(".tmp"), &path, bytes)?;
        }
        Ok((cid, bytes.len() as u64))
    }

    fn get(&self, cid: &Cid) -> Result<Vec<u8>, BackendError> {
        let path = match self.object_path(cid) {
            Ok(path) => path,
            Err(_) => return Err(BackendError::NotFound(cid.to_string())),
        };
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BackendError::NotFound(cid.to_string()))
            }
            Err(e) => Err(io_err(&path)(e).into()),
        }
    }
}

/// Pinning service persisting records to `<root>/pins.json`
#[derive(Debug)]
pub struct LocalPinningService {
    root: PathBuf,
    lock: Mutex<()>,
}

impl LocalPinningService {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, LocalBackendError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(io_err(&root))?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    fn pins_path(&self) -> PathBuf {
        self.root.join("pins.json")
    }

    /// Release a pin; returns false if the CID was never pinned
    pub fn unpin(&self, cid: &Cid) -> Result<bool, LocalBackendError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.pins_path();
        let mut pins: BTreeMap<Cid, PinRecord> = load_json(&path)?;
        let found = match pins.get_mut(cid) {
            Some(record) => {
                record.status = PinStatus::Unpinned;
                true
            }
            None => false,
        };
        if found {
            store_json(&self.root.join(".tmp"), &path, &pins)?;
        }
        Ok(found)
    }
}

impl PinningService for LocalPinningService {
    fn pin(&self, cid: &Cid, metadata: &Metadata) -> Result<PinRecord, BackendError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.pins_path();
        let mut pins: BTreeMap<Cid, PinRecord> = load_json(&path)?;

        let record = PinRecord {
            cid: cid.clone(),
            pinned_at: Utc::now(),
            status: PinStatus::Pinned,
            metadata: metadata.clone(),
        };
        pins.insert(cid.clone(), record.clone());
        store_json(&self.root.join(".tmp"), &path, &pins)?;
        Ok(record)
    }

    fn status(&self, cid: &Cid) -> Result<Option<PinRecord>, BackendError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let pins: BTreeMap<Cid, PinRecord> = load_json(&self.pins_path())?;
        Ok(pins.get(cid).cloned())
    }
}

/// Append-only ledger persisted to `<root>/ledger.json`
#[derive(Debug)]
pub struct LocalLedger {
    root: PathBuf,
    lock: Mutex<()>,
}

impl LocalLedger {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, LocalBackendError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(io_err(&root))?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    fn ledger_path(&self) -> PathBuf {
        self.root.join("ledger.json")
    }

    fn records(&self) -> Result<Vec<AnchorRecord>, LocalBackendError> {
        load_json(&self.ledger_path())
    }
}

impl Ledger for LocalLedger {
    fn anchor(&self, name: &str, cid: &Cid, timestamp: i64) -> Result<AnchorReceipt, BackendError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = self.records()?;

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
        store_json(&self.root.join(".tmp"), &self.ledger_path(), &records)?;

        Ok(AnchorReceipt {
            document_id: record.document_id,
            transaction_ref: record.transaction_ref,
            confirmed_at_block: record.confirmed_at_block,
        })
    }

    fn lookup_by_cid(&self, cid: &Cid) -> Result<Option<AnchorRecord>, BackendError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.records()?.into_iter().find(|r| &r.cid == cid))
    }

    fn lookup_by_id(&self, id: DocumentId) -> Result<AnchorRecord, BackendError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.records()?
            .into_iter()
            .find(|r| r.document_id == id)
            .ok_or_else(|| BackendError::NotFound(format!("document {}", id)))
    }
}
