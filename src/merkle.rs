//! RFC 6962-style Merkle tree: leaf/node hashing, inclusion-proof generation and verification.
//!
//! Domain-separated SHA-256 hashing with duplicate-last-node padding on odd levels. Inclusion
//! proofs use an explicit `{hashes, directions}` shape rather than an implicit index/tree-size
//! walk.

use sha2::{Digest as _, Sha256};

use crate::error::{CorsairError, CorsairResult};

pub type Digest = [u8; 32];

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Which side a sibling hash sits on when combining with the running hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

/// A Merkle inclusion proof: ordered siblings from leaf to root, each tagged with the side it
/// combines on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    pub hashes: Vec<Digest>,
    pub directions: Vec<Direction>,
}

/// `SHA256(0x00 || data)`.
pub fn leaf_hash(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    hasher.finalize().into()
}

/// `SHA256(0x01 || left || right)`. Non-commutative: order matters.
pub fn node_hash(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// One level of the tree, reduced from `level` by pairing adjacent nodes. An odd node out is
/// paired with itself (`H(x,x)`) rather than promoted unchanged.
fn reduce_level(level: &[Digest]) -> Vec<Digest> {
    let mut next = Vec::with_capacity(level.len().div_ceil(2));
    let mut i = 0;
    while i < level.len() {
        if i + 1 < level.len() {
            next.push(node_hash(&level[i], &level[i + 1]));
        } else {
            next.push(node_hash(&level[i], &level[i]));
        }
        i += 2;
    }
    next
}

/// Root hash over an ordered list of leaf hashes.
///
/// A single leaf's root is the leaf hash itself. An empty leaf set is an error.
pub fn root_hash(leaf_hashes: &[Digest]) -> CorsairResult<Digest> {
    if leaf_hashes.is_empty() {
        return Err(CorsairError::validation("cannot compute root of an empty leaf set"));
    }
    let mut level = leaf_hashes.to_vec();
    while level.len() > 1 {
        level = reduce_level(&level);
    }
    Ok(level[0])
}

/// Build an inclusion proof for the leaf at `index` within `leaf_hashes`.
pub fn inclusion_proof(index: usize, leaf_hashes: &[Digest]) -> CorsairResult<InclusionProof> {
    if leaf_hashes.is_empty() {
        return Err(CorsairError::validation("cannot build a proof over an empty leaf set"));
    }
    if index >= leaf_hashes.len() {
        return Err(CorsairError::validation(format!(
            "index {index} out of range for {} leaves",
            leaf_hashes.len()
        )));
    }

    let mut hashes = Vec::new();
    let mut directions = Vec::new();

    let mut level = leaf_hashes.to_vec();
    let mut idx = index;

    while level.len() > 1 {
        let sibling_idx = if idx % 2 == 0 {
            // Right sibling; if we're the odd one out, we pair with ourselves.
            if idx + 1 < level.len() {
                idx + 1
            } else {
                idx
            }
        } else {
            idx - 1
        };

        let direction = if idx % 2 == 0 {
            Direction::Right
        } else {
            Direction::Left
        };

        hashes.push(level[sibling_idx]);
        directions.push(direction);

        level = reduce_level(&level);
        idx /= 2;
    }

    Ok(InclusionProof { hashes, directions })
}

/// Verify that `leaf_hash` is included at the position implied by `proof`, under `root`.
pub fn verify_inclusion_proof(leaf_hash: &Digest, proof: &InclusionProof, root: &Digest) -> bool {
    if proof.hashes.len() != proof.directions.len() {
        return false;
    }

    let mut computed = *leaf_hash;
    for (sibling, direction) in proof.hashes.iter().zip(proof.directions.iter()) {
        computed = match direction {
            Direction::Left => node_hash(sibling, &computed),
            Direction::Right => node_hash(&computed, sibling),
        };
    }
    &computed == root
}
