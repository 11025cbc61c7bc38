//! `KeyStore` and `LogStore`: the typed interfaces standing in for real database drivers.
//!
//! Database drivers are treated as external collaborators accessed through typed interfaces;
//! this module defines those interfaces plus in-process reference implementations used by the
//! CLI and by tests. A real deployment swaps in a SQL-backed implementation honoring the same
//! field names as the `signing_keys`/`scitt_entries` tables.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CorsairError, CorsairResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Retired,
}

/// Row shape mirroring `signing_keys(key_id, status, algorithm, public_key, private_key_encrypted, created_at)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key_id: String,
    pub status: KeyStatus,
    pub algorithm: String,
    pub public_key_pem: String,
    pub private_key_encrypted: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Storage contract for signing keys. Enforces "at most one active key" at the storage layer.
pub trait KeyStore: Send + Sync {
    fn insert(&self, record: KeyRecord) -> CorsairResult<()>;
    fn active(&self) -> CorsairResult<Option<KeyRecord>>;
    fn retired(&self) -> CorsairResult<Vec<KeyRecord>>;
    fn retire_active(&self) -> CorsairResult<Option<KeyRecord>>;
    fn get(&self, key_id: &str) -> CorsairResult<Option<KeyRecord>>;
}

#[derive(Default)]
pub struct MemoryKeyStore {
    records: Mutex<Vec<KeyRecord>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn insert(&self, record: KeyRecord) -> CorsairResult<()> {
        let mut records = self.records.lock().unwrap();
        if record.status == KeyStatus::Active
            && records.iter().any(|r| r.status == KeyStatus::Active)
        {
            return Err(CorsairError::constraint_violation(
                "another active key already exists",
            ));
        }
        records.push(record);
        Ok(())
    }

    fn active(&self) -> CorsairResult<Option<KeyRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.status == KeyStatus::Active)
            .cloned())
    }

    fn retired(&self) -> CorsairResult<Vec<KeyRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == KeyStatus::Retired)
            .cloned()
            .collect())
    }

    fn retire_active(&self) -> CorsairResult<Option<KeyRecord>> {
        let mut records = self.records.lock().unwrap();
        if let Some(active) = records.iter_mut().find(|r| r.status == KeyStatus::Active) {
            active.status = KeyStatus::Retired;
            return Ok(Some(active.clone()));
        }
        Ok(None)
    }

    fn get(&self, key_id: &str) -> CorsairResult<Option<KeyRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.key_id == key_id)
            .cloned())
    }
}

/// Row shape mirroring `scitt_entries(entry_id, leaf_index, payload_hash, tree_size_at_append, root, receipt_cose, created_at)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScittRow {
    pub entry_id: String,
    pub leaf_index: u64,
    pub payload_hash: String,
    pub tree_size_at_append: u64,
    pub root: String,
    pub receipt_cose: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Storage contract for the SCITT transparency log. Append is expected to be serialized by the
/// caller (see `scitt.rs`'s `Mutex`-guarded append path) — this trait only describes durable
/// storage, not the single-writer protocol itself.
pub trait LogStore: Send + Sync {
    fn append(&self, row: ScittRow) -> CorsairResult<()>;
    fn get(&self, entry_id: &str) -> CorsairResult<Option<ScittRow>>;
    fn all_payload_hashes(&self) -> CorsairResult<Vec<String>>;
    fn len(&self) -> CorsairResult<u64>;
}

#[derive(Default)]
pub struct MemoryLogStore {
    rows: Mutex<Vec<ScittRow>>,
    by_id: Mutex<HashMap<String, usize>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryLogStore {
    fn append(&self, row: ScittRow) -> CorsairResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let mut by_id = self.by_id.lock().unwrap();
        by_id.insert(row.entry_id.clone(), rows.len());
        rows.push(row);
        Ok(())
    }

    fn get(&self, entry_id: &str) -> CorsairResult<Option<ScittRow>> {
        let by_id = self.by_id.lock().unwrap();
        let rows = self.rows.lock().unwrap();
        Ok(by_id.get(entry_id).map(|&i| rows[i].clone()))
    }

    fn all_payload_hashes(&self) -> CorsairResult<Vec<String>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.payload_hash.clone())
            .collect())
    }

    fn len(&self) -> CorsairResult<u64> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }
}

/// A `KeyStore` that persists the whole table as one JSON file, read on construction and
/// rewritten on every mutation. The CLI binary runs single commands per process, so a
/// read-modify-write-whole-file strategy is sufficient — there is no concurrent writer within
/// one invocation beyond what [`crate::keymanager::KeyManager`] and
/// [`crate::scitt::SCITTRegistry`] already serialize internally.
pub struct FileKeyStore {
    path: PathBuf,
    records: Mutex<Vec<KeyRecord>>,
}

impl FileKeyStore {
    pub fn open(path: impl Into<PathBuf>) -> CorsairResult<Self> {
        let path = path.into();
        let records = load_json_or_default(&path)?;
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    fn flush(&self, records: &[KeyRecord]) -> CorsairResult<()> {
        save_json(&self.path, records)
    }
}

impl KeyStore for FileKeyStore {
    fn insert(&self, record: KeyRecord) -> CorsairResult<()> {
        let mut records = self.records.lock().unwrap();
        if record.status == KeyStatus::Active
            && records.iter().any(|r| r.status == KeyStatus::Active)
        {
            return Err(CorsairError::constraint_violation(
                "another active key already exists",
            ));
        }
        records.push(record);
        self.flush(&records)
    }

    fn active(&self) -> CorsairResult<Option<KeyRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.status == KeyStatus::Active)
            .cloned())
    }

    fn retired(&self) -> CorsairResult<Vec<KeyRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == KeyStatus::Retired)
            .cloned()
            .collect())
    }

    fn retire_active(&self) -> CorsairResult<Option<KeyRecord>> {
        let mut records = self.records.lock().unwrap();
        let retired = if let Some(active) = records.iter_mut().find(|r| r.status == KeyStatus::Active) {
            active.status = KeyStatus::Retired;
            Some(active.clone())
        } else {
            None
        };
        self.flush(&records)?;
        Ok(retired)
    }

    fn get(&self, key_id: &str) -> CorsairResult<Option<KeyRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.key_id == key_id)
            .cloned())
    }
}

/// A `LogStore` that persists the whole table as one JSON file, the same read-modify-write
/// strategy as [`FileKeyStore`] and for the same reason: one CLI command runs to completion per
/// process, so there is no cross-process append contention to arbitrate here.
pub struct FileLogStore {
    path: PathBuf,
    rows: Mutex<Vec<ScittRow>>,
}

impl FileLogStore {
    pub fn open(path: impl Into<PathBuf>) -> CorsairResult<Self> {
        let path = path.into();
        let rows = load_json_or_default(&path)?;
        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    fn flush(&self, rows: &[ScittRow]) -> CorsairResult<()> {
        save_json(&self.path, rows)
    }
}

impl LogStore for FileLogStore {
    fn append(&self, row: ScittRow) -> CorsairResult<()> {
        let mut rows = self.rows.lock().unwrap();
        rows.push(row);
        self.flush(&rows)
    }

    fn get(&self, entry_id: &str) -> CorsairResult<Option<ScittRow>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.entry_id == entry_id)
            .cloned())
    }

    fn all_payload_hashes(&self) -> CorsairResult<Vec<String>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.payload_hash.clone())
            .collect())
    }

    fn len(&self) -> CorsairResult<u64> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }
}

fn load_json_or_default<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> CorsairResult<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| CorsairError::validation(format!("failed to read {}: {e}", path.display())))?;
    if contents.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&contents)
        .map_err(|e| CorsairError::validation(format!("malformed store file {}: {e}", path.display())))
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> CorsairResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| CorsairError::validation(format!("failed to create {}: {e}", parent.display())))?;
        }
    }
    let contents = serde_json::to_string_pretty(value)
        .map_err(|e| CorsairError::validation(format!("failed to encode store file: {e}")))?;
    fs::write(path, contents)
        .map_err(|e| CorsairError::validation(format!("failed to write {}: {e}", path.display())))
}
