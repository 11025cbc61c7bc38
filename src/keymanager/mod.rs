//! Ed25519 signing-key lifecycle: generation, at-rest encryption, rotation, JWK/DID export.
//!
//! Keys are generated with `Ed25519SigningKey::generate(&mut OsRng)` and PKCS8 PEM encoded via
//! the `pkcs8` crate, narrowed to EdDSA only, with the at-rest encryption layer in [`crypto`] and
//! persistence through [`crate::store::KeyStore`]. Takes its collaborators — a [`KeyStore`] and a
//! [`Clock`] — as constructor parameters rather than reaching for global state.

pub mod crypto;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{CorsairError, CorsairResult};
use crate::store::{KeyRecord, KeyStatus, KeyStore};

pub const ALGORITHM: &str = "Ed25519";

/// A JSON Web Key for an Ed25519 (OKP) public key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
}

/// A minimal `did:web` document exposing the active signing key as a verification method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "verificationMethod")]
    pub verification_method: Vec<VerificationMethod>,
    pub authentication: Vec<String>,
    #[serde(rename = "assertionMethod")]
    pub assertion_method: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub controller: String,
    #[serde(rename = "publicKeyJwk")]
    pub public_key_jwk: Jwk,
}

/// Manages the signing-key lifecycle against a [`KeyStore`], encrypting private key material
/// under a caller-supplied AES-256 secret before it ever reaches the store.
pub struct KeyManager<'a> {
    store: &'a dyn KeyStore,
    clock: &'a dyn Clock,
}

impl<'a> KeyManager<'a> {
    pub fn new(store: &'a dyn KeyStore, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Generate a new Ed25519 keypair, encrypt the private key under `secret`, and insert it as
    /// the active key. Fails via the store's unique-active-key constraint if one already exists;
    /// callers that mean to rotate should call [`KeyManager::rotate`] instead.
    pub fn generate(&self, secret: &[u8; 32]) -> CorsairResult<KeyRecord> {
        let record = self.build_record(secret, KeyStatus::Active)?;
        self.store.insert(record.clone())?;
        tracing::info!(key_id = %record.key_id, algorithm = %record.algorithm, "generated active signing key");
        Ok(record)
    }

    /// Retire the current active key (if any) and generate a fresh one in its place.
    pub fn rotate(&self, secret: &[u8; 32]) -> CorsairResult<KeyRecord> {
        if let Some(retired) = self.store.retire_active()? {
            tracing::info!(key_id = %retired.key_id, "retired active signing key ahead of rotation");
        }
        self.generate(secret)
    }

    fn build_record(&self, secret: &[u8; 32], status: KeyStatus) -> CorsairResult<KeyRecord> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        let private_pem = signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CorsairError::crypto(format!("failed to encode private key: {e}")))?
            .to_string();
        let public_key_pem = verifying_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CorsairError::crypto(format!("failed to encode public key: {e}")))?;

        let private_key_encrypted = crypto::encrypt(private_pem.as_bytes(), secret)?;

        Ok(KeyRecord {
            key_id: Uuid::new_v4().to_string(),
            status,
            algorithm: ALGORITHM.to_string(),
            public_key_pem,
            private_key_encrypted,
            created_at: self.clock.now(),
        })
    }

    /// Decrypt and parse the active signing key.
    fn active_signing_key(&self, secret: &[u8; 32]) -> CorsairResult<(KeyRecord, SigningKey)> {
        let record = self
            .store
            .active()?
            .ok_or_else(|| CorsairError::not_found("no active signing key"))?;
        let private_pem = crypto::decrypt(&record.private_key_encrypted, secret)?;
        let private_pem = String::from_utf8(private_pem)
            .map_err(|e| CorsairError::crypto(format!("decrypted key material is not UTF-8: {e}")))?;
        let signing_key = SigningKey::from_pkcs8_pem(&private_pem)
            .map_err(|e| CorsairError::crypto(format!("failed to parse decrypted private key: {e}")))?;
        Ok((record, signing_key))
    }

    /// Sign `message` with the active key, returning the detached signature and the key's id.
    pub fn sign(&self, secret: &[u8; 32], message: &[u8]) -> CorsairResult<(String, Signature)> {
        let (record, signing_key) = self.active_signing_key(secret)?;
        Ok((record.key_id, signing_key.sign(message)))
    }

    /// The active key's id and PEM-encoded public key, without touching private material.
    pub fn active_public(&self) -> CorsairResult<(String, VerifyingKey)> {
        let record = self
            .store
            .active()?
            .ok_or_else(|| CorsairError::not_found("no active signing key"))?;
        let verifying_key = VerifyingKey::from_public_key_pem(&record.public_key_pem)
            .map_err(|e| CorsairError::crypto(format!("stored public key is malformed: {e}")))?;
        Ok((record.key_id, verifying_key))
    }

    /// Export the active key as a JWK, suitable for embedding in a `did:web` document.
    pub fn export_active_jwk(&self) -> CorsairResult<Jwk> {
        let (key_id, verifying_key) = self.active_public()?;
        Ok(jwk_from_verifying_key(&key_id, &verifying_key))
    }

    /// Build a `did:web` document for `domain`, exposing the active key as its sole verification
    /// method and assertion method.
    pub fn did_document(&self, domain: &str) -> CorsairResult<DidDocument> {
        let jwk = self.export_active_jwk()?;
        let did = format!("did:web:{}", encode_did_web_domain(domain));
        let vm_id = format!("{did}#{}", jwk.kid);
        Ok(DidDocument {
            context: vec![
                "https://www.w3.org/ns/did/v1".to_string(),
                "https://w3id.org/security/suites/jws-2020/v1".to_string(),
            ],
            id: did.clone(),
            verification_method: vec![VerificationMethod {
                id: vm_id.clone(),
                type_: "JsonWebKey2020".to_string(),
                controller: did,
                public_key_jwk: jwk,
            }],
            authentication: vec![vm_id.clone()],
            assertion_method: vec![vm_id],
        })
    }

    /// Public keys of every retired key, oldest first.
    pub fn retired_public_keys(&self) -> CorsairResult<Vec<String>> {
        Ok(self.store.retired()?.into_iter().map(|r| r.public_key_pem).collect())
    }

    /// Import a JWK, returning the equivalent PEM-SPKI public key. Inverse of
    /// [`KeyManager::export_active_jwk`].
    pub fn import_jwk(jwk: &Jwk) -> CorsairResult<String> {
        if jwk.kty != "OKP" || jwk.crv != "Ed25519" {
            return Err(CorsairError::validation("only OKP/Ed25519 JWKs are supported"));
        }
        let raw = URL_SAFE_NO_PAD
            .decode(&jwk.x)
            .map_err(|e| CorsairError::validation(format!("malformed JWK x value: {e}")))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| CorsairError::validation("JWK x value must be 32 bytes"))?;
        let verifying_key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| CorsairError::crypto(format!("invalid Ed25519 public key: {e}")))?;
        verifying_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CorsairError::crypto(format!("failed to encode public key: {e}")))
    }

    /// Look up a (possibly retired) key by id and return its verifying key, for verifying
    /// signatures produced before a rotation.
    pub fn verifying_key_for(&self, key_id: &str) -> CorsairResult<VerifyingKey> {
        let record = self
            .store
            .get(key_id)?
            .ok_or_else(|| CorsairError::not_found(format!("no key with id {key_id}")))?;
        VerifyingKey::from_public_key_pem(&record.public_key_pem)
            .map_err(|e| CorsairError::crypto(format!("stored public key is malformed: {e}")))
    }
}

/// Pure Ed25519 verification, never erroring: any malformed input or signature mismatch is `false`.
pub fn verify_signature(data: &[u8], signature: &Signature, verifying_key: &VerifyingKey) -> bool {
    use ed25519_dalek::Verifier as _;
    verifying_key.verify(data, signature).is_ok()
}

/// Percent-encode a `did:web` domain per W3C did:web §3.1, so a port's `:` (or other reserved
/// character) cannot collide with did:web's own colon-separated method-specific-id syntax.
fn encode_did_web_domain(domain: &str) -> std::borrow::Cow<'_, str> {
    use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
    const DID_WEB_RESERVED: &AsciiSet = &CONTROLS.add(b':');
    utf8_percent_encode(domain, DID_WEB_RESERVED).into()
}

fn jwk_from_verifying_key(key_id: &str, verifying_key: &VerifyingKey) -> Jwk {
    Jwk {
        kty: "OKP".to_string(),
        crv: "Ed25519".to_string(),
        x: URL_SAFE_NO_PAD.encode(verifying_key.to_bytes()),
        kid: key_id.to_string(),
        use_: "sig".to_string(),
        alg: "EdDSA".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryKeyStore;
    use chrono::Utc;
    use ed25519_dalek::Verifier as _;

    fn manager<'a>(store: &'a MemoryKeyStore, clock: &'a FixedClock) -> KeyManager<'a> {
        KeyManager::new(store, clock)
    }

    #[test]
    fn generate_then_sign_then_verify_round_trips() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = manager(&store, &clock);
        let secret = [9u8; 32];

        mgr.generate(&secret).unwrap();
        let (key_id, signature) = mgr.sign(&secret, b"hello").unwrap();
        let (active_id, verifying_key) = mgr.active_public().unwrap();
        assert_eq!(key_id, active_id);
        assert!(verifying_key.verify(b"hello", &signature).is_ok());
    }

    #[test]
    fn rotate_retires_previous_active_and_keeps_it_verifiable() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = manager(&store, &clock);
        let secret = [1u8; 32];

        mgr.generate(&secret).unwrap();
        let (old_id, _) = mgr.sign(&secret, b"before rotation").unwrap();

        mgr.rotate(&secret).unwrap();
        let (new_id, _) = mgr.active_public().unwrap();
        assert_ne!(old_id, new_id);

        // The retired key's public material is still resolvable for verifying old signatures.
        assert!(mgr.verifying_key_for(&old_id).is_ok());
    }

    #[test]
    fn export_jwk_round_trips_the_public_key_bytes() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = manager(&store, &clock);
        mgr.generate(&[3u8; 32]).unwrap();

        let jwk = mgr.export_active_jwk().unwrap();
        let (_, verifying_key) = mgr.active_public().unwrap();
        let decoded = URL_SAFE_NO_PAD.decode(&jwk.x).unwrap();
        assert_eq!(decoded, verifying_key.to_bytes());
        assert_eq!(jwk.kty, "OKP");
        assert_eq!(jwk.crv, "Ed25519");
    }

    #[test]
    fn import_jwk_recovers_the_same_public_key() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = manager(&store, &clock);
        mgr.generate(&[8u8; 32]).unwrap();

        let jwk = mgr.export_active_jwk().unwrap();
        let pem = KeyManager::import_jwk(&jwk).unwrap();
        let (_, active) = mgr.active_public().unwrap();
        assert_eq!(pem.trim(), active.to_public_key_pem(LineEnding::LF).unwrap().trim());
    }

    #[test]
    fn retired_public_keys_lists_oldest_first() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = manager(&store, &clock);
        mgr.generate(&[2u8; 32]).unwrap();
        let (_, first_pub) = mgr.active_public().unwrap();
        mgr.rotate(&[2u8; 32]).unwrap();

        let retired = mgr.retired_public_keys().unwrap();
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].trim(), first_pub.to_public_key_pem(LineEnding::LF).unwrap().trim());
    }

    #[test]
    fn verify_signature_never_errors_on_bad_input() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = manager(&store, &clock);
        mgr.generate(&[4u8; 32]).unwrap();
        let (_, signature) = mgr.sign(&[4u8; 32], b"payload").unwrap();
        let (_, verifying_key) = mgr.active_public().unwrap();

        assert!(verify_signature(b"payload", &signature, &verifying_key));
        assert!(!verify_signature(b"tampered", &signature, &verifying_key));
    }

    #[test]
    fn did_document_embeds_active_key_as_assertion_method() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = manager(&store, &clock);
        mgr.generate(&[5u8; 32]).unwrap();

        let doc = mgr.did_document("issuer.example").unwrap();
        assert_eq!(doc.id, "did:web:issuer.example");
        assert_eq!(doc.verification_method.len(), 1);
        assert_eq!(doc.assertion_method[0], doc.verification_method[0].id);
    }

    #[test]
    fn did_document_percent_encodes_a_port_in_the_domain() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = manager(&store, &clock);
        mgr.generate(&[6u8; 32]).unwrap();

        let doc = mgr.did_document("localhost:8443").unwrap();
        assert_eq!(doc.id, "did:web:localhost%3A8443");
    }

    #[test]
    fn signing_without_any_key_fails_not_found() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = manager(&store, &clock);
        let err = mgr.sign(&[0u8; 32], b"x").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn decrypting_with_wrong_secret_fails_crypto() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = manager(&store, &clock);
        mgr.generate(&[6u8; 32]).unwrap();
        let err = mgr.sign(&[7u8; 32], b"x").unwrap_err();
        assert_eq!(err.kind(), "crypto");
    }
}
