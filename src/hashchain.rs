//! Append-only, hash-linked evidence log (`PlunderRecord`).
//!
//! Each record is one JSON object per line (JSONL).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::error::CorsairResult;

/// One entry in the hash chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlunderRecord {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub data: Value,
    #[serde(rename = "previousHash")]
    pub previous_hash: Option<String>,
    pub hash: String,
}

/// Fixed-field-order structure hashed to produce a record's `hash`. Field order is part of the
/// wire contract: this struct's `Serialize` derive emits fields in declaration order, and
/// `serde_json::to_vec` emits no extraneous whitespace, together giving a canonical encoding.
#[derive(Serialize)]
struct HashInput<'a> {
    sequence: u64,
    timestamp: DateTime<Utc>,
    operation: &'a str,
    data: &'a Value,
    #[serde(rename = "previousHash")]
    previous_hash: &'a Option<String>,
}

fn compute_hash(
    sequence: u64,
    timestamp: DateTime<Utc>,
    operation: &str,
    data: &Value,
    previous_hash: &Option<String>,
) -> CorsairResult<String> {
    let input = HashInput {
        sequence,
        timestamp,
        operation,
        data,
        previous_hash,
    };
    let bytes = serde_json::to_vec(&input)
        .map_err(|e| crate::error::CorsairError::validation(format!("failed to encode hash-chain record: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// An in-process append-only chain. A real deployment persists each [`PlunderRecord`] as one
/// JSONL line as it is appended (see [`HashChain::to_jsonl`]/[`HashChain::from_jsonl`]); this
/// struct only holds the records already known to be durable.
#[derive(Debug, Default)]
pub struct HashChain {
    records: Vec<PlunderRecord>,
}

impl HashChain {
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    pub fn records(&self) -> &[PlunderRecord] {
        &self.records
    }

    /// Append one record, linked to the previous record's hash (or `None` for the first).
    pub fn append(&mut self, operation: impl Into<String>, data: Value) -> CorsairResult<&PlunderRecord> {
        self.append_at(Utc::now(), operation, data)
    }

    /// Append with an explicit timestamp (used by tests and by callers with an injected clock).
    pub fn append_at(
        &mut self,
        timestamp: DateTime<Utc>,
        operation: impl Into<String>,
        data: Value,
    ) -> CorsairResult<&PlunderRecord> {
        let sequence = self.records.len() as u64;
        let previous_hash = self.records.last().map(|r| r.hash.clone());
        let operation = operation.into();
        let hash = compute_hash(sequence, timestamp, &operation, &data, &previous_hash)?;

        self.records.push(PlunderRecord {
            sequence,
            timestamp,
            operation,
            data,
            previous_hash,
            hash,
        });
        Ok(self.records.last().unwrap())
    }

    /// Serialize to JSONL (one record per line), for persistence.
    pub fn to_jsonl(&self) -> CorsairResult<String> {
        let mut out = String::new();
        for record in &self.records {
            let line = serde_json::to_string(record)
                .map_err(|e| crate::error::CorsairError::validation(format!("failed to serialize record: {e}")))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    /// Parse a JSONL stream (does not verify linkage; call [`verify_chain`] separately).
    pub fn from_jsonl(contents: &str) -> CorsairResult<Self> {
        let mut records = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: PlunderRecord = serde_json::from_str(line)
                .map_err(|e| crate::error::CorsairError::validation(format!("malformed hash-chain record: {e}")))?;
            records.push(record);
        }
        Ok(Self { records })
    }
}

/// Result of verifying a chain: whether it is intact, and if not, the 1-indexed position of the
/// first broken record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub valid: bool,
    pub broken_at: Option<u64>,
    pub record_count: u64,
}

/// Verify hash linkage and per-record digests over an ordered record stream.
///
/// An empty stream is valid with `record_count=0`.
pub fn verify_chain(records: &[PlunderRecord]) -> ChainVerification {
    let record_count = records.len() as u64;

    for (i, record) in records.iter().enumerate() {
        let recomputed = match compute_hash(
            record.sequence,
            record.timestamp,
            &record.operation,
            &record.data,
            &record.previous_hash,
        ) {
            Ok(h) => h,
            Err(_) => {
                return ChainVerification {
                    valid: false,
                    broken_at: Some((i + 1) as u64),
                    record_count,
                }
            }
        };

        if recomputed != record.hash {
            return ChainVerification {
                valid: false,
                broken_at: Some((i + 1) as u64),
                record_count,
            };
        }

        if i == 0 {
            if record.previous_hash.is_some() {
                return ChainVerification {
                    valid: false,
                    broken_at: Some(1),
                    record_count,
                };
            }
        } else {
            let expected_prev = &records[i - 1].hash;
            if record.previous_hash.as_deref() != Some(expected_prev.as_str()) {
                return ChainVerification {
                    valid: false,
                    broken_at: Some((i + 1) as u64),
                    record_count,
                };
            }
        }
    }

    ChainVerification {
        valid: true,
        broken_at: None,
        record_count,
    }
}

/// Convenience wrapper: verify a chain serialized as JSONL.
pub fn verify_hash_chain(jsonl: &str) -> CorsairResult<bool> {
    let chain = HashChain::from_jsonl(jsonl)?;
    Ok(verify_chain(chain.records()).valid)
}
