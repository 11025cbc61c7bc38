//! `SCITTRegistry`: appends CPOEs to a transparency log and issues COSE_Sign1 receipts carrying
//! a Merkle inclusion proof.
//!
//! Uses [`crate::merkle`] for the tree half and `coset` (`CoseSign1Builder`,
//! `HeaderBuilder::algorithm(iana::Algorithm::EdDSA)`) for the receipt, signing a directly
//! supplied `signature_data` rather than building `coset`'s full `Sig_structure` — a simplified
//! COSE_Sign1 construction. Single-writer append is serialized with a `Mutex` guarding only the
//! append path; the store handle itself is owned externally.

use std::sync::Mutex;

use coset::{iana, CborSerializable, CoseSign1Builder, HeaderBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{CorsairError, CorsairResult};
use crate::keymanager::KeyManager;
use crate::merkle::{self, Digest, InclusionProof};
use crate::store::{LogStore, ScittRow};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SerializableProof {
    pub hashes: Vec<String>,
    pub directions: Vec<String>,
}

impl From<&InclusionProof> for SerializableProof {
    fn from(proof: &InclusionProof) -> Self {
        Self {
            hashes: proof.hashes.iter().map(hex::encode).collect(),
            directions: proof
                .directions
                .iter()
                .map(|d| match d {
                    merkle::Direction::Left => "left".to_string(),
                    merkle::Direction::Right => "right".to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SCITTEntry {
    pub entry_id: String,
    pub payload_hash: String,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
    pub tree_size: u64,
    pub leaf_index: u64,
    pub inclusion_proof: InclusionProof,
    pub receipt: Vec<u8>,
}

/// Single-writer-serialized append path over a [`LogStore`]. Only the append path is guarded —
/// reads (`get`/`get_receipt`) are lock-free, since the store itself is the durable source of
/// truth once an append completes.
pub struct SCITTRegistry<'a> {
    store: &'a dyn LogStore,
    clock: &'a dyn Clock,
    append_lock: Mutex<()>,
}

impl<'a> SCITTRegistry<'a> {
    pub fn new(store: &'a dyn LogStore, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            clock,
            append_lock: Mutex::new(()),
        }
    }

    fn leaves(&self) -> CorsairResult<Vec<Digest>> {
        self.store
            .all_payload_hashes()?
            .into_iter()
            .map(|h| {
                let bytes = hex::decode(&h)
                    .map_err(|e| CorsairError::validation(format!("corrupt payload hash in log store: {e}")))?;
                bytes
                    .try_into()
                    .map_err(|_| CorsairError::validation("corrupt payload hash length in log store"))
            })
            .collect()
    }

    /// Append `cpoe_bytes` to the log, producing a COSE_Sign1 receipt signed with the active key.
    pub fn append(&self, cpoe_bytes: &[u8], key_manager: &KeyManager, secret: &[u8; 32]) -> CorsairResult<SCITTEntry> {
        let _guard = self.append_lock.lock().unwrap();

        let leaf = merkle::leaf_hash(cpoe_bytes);
        let payload_hash = hex::encode(leaf);

        let mut leaves = self.leaves()?;
        let leaf_index = leaves.len() as u64;
        leaves.push(leaf);

        let root = merkle::root_hash(&leaves)?;
        let inclusion_proof = merkle::inclusion_proof(leaf_index as usize, &leaves)?;
        let tree_size = leaves.len() as u64;

        let entry_id = Uuid::new_v4().to_string();
        let submitted_at = self.clock.now();

        let receipt = build_receipt(
            key_manager,
            secret,
            leaf_index,
            tree_size,
            &hex::encode(root),
            &inclusion_proof,
        )?;

        self.store.append(ScittRow {
            entry_id: entry_id.clone(),
            leaf_index,
            payload_hash: payload_hash.clone(),
            tree_size_at_append: tree_size,
            root: hex::encode(root),
            receipt_cose: receipt.clone(),
            created_at: submitted_at,
        })?;

        tracing::info!(entry_id = %entry_id, leaf_index, tree_size, "appended CPOE to transparency log");

        Ok(SCITTEntry {
            entry_id,
            payload_hash,
            submitted_at,
            tree_size,
            leaf_index,
            inclusion_proof,
            receipt,
        })
    }

    pub fn get(&self, entry_id: &str) -> CorsairResult<Option<SCITTEntry>> {
        let Some(row) = self.store.get(entry_id)? else {
            return Ok(None);
        };

        // Recompute the proof against only the leaves known at append time, since the tree may
        // have grown since (invariant 3: "once an entry is written, its leaf is immutable").
        let all_leaves = self.leaves()?;
        let leaves_at_append = &all_leaves[..row.tree_size_at_append as usize];
        let inclusion_proof = merkle::inclusion_proof(row.leaf_index as usize, leaves_at_append)?;

        Ok(Some(SCITTEntry {
            entry_id: row.entry_id,
            payload_hash: row.payload_hash,
            submitted_at: row.created_at,
            tree_size: row.tree_size_at_append,
            leaf_index: row.leaf_index,
            inclusion_proof,
            receipt: row.receipt_cose,
        }))
    }

    pub fn get_receipt(&self, entry_id: &str) -> CorsairResult<Option<Vec<u8>>> {
        Ok(self.store.get(entry_id)?.map(|row| row.receipt_cose))
    }
}

fn build_receipt(
    key_manager: &KeyManager,
    secret: &[u8; 32],
    leaf_index: u64,
    tree_size: u64,
    root_hex: &str,
    inclusion_proof: &InclusionProof,
) -> CorsairResult<Vec<u8>> {
    let payload = serde_json::to_vec(&json!({
        "leafIndex": leaf_index,
        "treeSize": tree_size,
        "root": root_hex,
        "inclusionProof": SerializableProof::from(inclusion_proof),
    }))
    .map_err(|e| CorsairError::validation(format!("failed to encode receipt payload: {e}")))?;

    let (key_id, signature) = key_manager.sign(secret, &payload)?;

    let protected = HeaderBuilder::new()
        .algorithm(iana::Algorithm::EdDSA)
        .key_id(key_id.into_bytes())
        .build();

    let cose_sign1 = CoseSign1Builder::new()
        .protected(protected)
        .payload(payload)
        .signature(signature.to_bytes().to_vec())
        .build();

    cose_sign1
        .to_vec()
        .map_err(|e| CorsairError::crypto(format!("failed to encode COSE_Sign1 receipt: {e:?}")))
}
