//! `Verifier`: parses a CPOE, resolves its issuer, and renders a verification decision.
//!
//! Decodes the JWT, checks the alg, resolves the issuer's `did:web` document over
//! `reqwest::blocking`, and renders a structured verification result.

use std::collections::HashMap;
use std::time::Duration;

use pkcs8::DecodePublicKey;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::envelope::{self, Payload};
use crate::error::{CorsairError, CorsairResult};
use crate::keymanager::{DidDocument, KeyManager};

const DID_RESOLUTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Classification of how much trust a verifier places in a CPOE's issuer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IssuerTier {
    CorsairVerified,
    SelfSigned,
    Unverifiable,
}

/// Typed interface replacing a live network dependency for `did:web` resolution (mirrors
/// `Clock`/`KeyStore`).
pub trait DidResolver: Send + Sync {
    fn resolve(&self, did: &str) -> CorsairResult<DidDocument>;
}

/// Production resolver: fetches `https://<domain>/.well-known/did.json` over `reqwest::blocking`
/// with a 10s deadline.
pub struct HttpDidResolver {
    client: reqwest::blocking::Client,
}

impl Default for HttpDidResolver {
    fn default() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(DID_RESOLUTION_TIMEOUT)
            .build()
            .expect("reqwest client with a fixed timeout should always build");
        Self { client }
    }
}

impl HttpDidResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DidResolver for HttpDidResolver {
    fn resolve(&self, did: &str) -> CorsairResult<DidDocument> {
        let domain = domain_from_did(did)?;
        let url = format!("https://{domain}/.well-known/did.json");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| CorsairError::network(format!("failed to reach {url}: {e}")))?;

        if response.status().is_server_error() {
            return Err(CorsairError::server_error(format!(
                "DID resolution returned {} for {url}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(CorsairError::network(format!(
                "DID resolution returned {} for {url}",
                response.status()
            )));
        }

        response
            .json::<DidDocument>()
            .map_err(|e| CorsairError::validation(format!("malformed DID document at {url}: {e}")))
    }
}

/// Deterministic test double: an in-memory map from `did` string to document.
#[derive(Default)]
pub struct StaticDidResolver {
    documents: HashMap<String, DidDocument>,
}

impl StaticDidResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, did: impl Into<String>, document: DidDocument) -> Self {
        self.documents.insert(did.into(), document);
        self
    }
}

impl DidResolver for StaticDidResolver {
    fn resolve(&self, did: &str) -> CorsairResult<DidDocument> {
        self.documents
            .get(did)
            .cloned()
            .ok_or_else(|| CorsairError::not_found(format!("no DID document registered for {did}")))
    }
}

/// Recover the (percent-decoded) domain a `did:web` identifier was built from, the inverse of
/// `KeyManager::did_document`'s percent-encoding of the domain per W3C did:web §3.1.
fn domain_from_did(did: &str) -> CorsairResult<String> {
    let encoded = did
        .strip_prefix("did:web:")
        .ok_or_else(|| CorsairError::validation(format!("unsupported DID method: {did}")))?;
    percent_encoding::percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| CorsairError::validation(format!("malformed did:web domain in {did}: {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub valid: bool,
    pub reason: String,
    pub issuer_tier: IssuerTier,
    pub expired: bool,
    pub payload: Option<Payload>,
}

pub struct Verifier<'a> {
    resolver: &'a dyn DidResolver,
    clock: &'a dyn Clock,
    trusted_domains: Vec<String>,
}

impl<'a> Verifier<'a> {
    pub fn new(resolver: &'a dyn DidResolver, clock: &'a dyn Clock, trusted_domains: Vec<String>) -> Self {
        Self {
            resolver,
            clock,
            trusted_domains,
        }
    }

    fn classify_issuer_tier(&self, did: &str) -> IssuerTier {
        match domain_from_did(did) {
            Ok(domain) if self.trusted_domains.iter().any(|d| *d == domain) => IssuerTier::CorsairVerified,
            Ok(_) => IssuerTier::SelfSigned,
            Err(_) => IssuerTier::Unverifiable,
        }
    }

    /// Primary verification path: JWT-VC only. Returns `Err` for inputs that are not shaped like
    /// a JWT-VC at all (use [`Verifier::verify_legacy_envelope`] for the legacy JSON form);
    /// returns `Ok(VerificationResult{valid: false, ..})` for cryptographic/expiry failures,
    /// since those are normal verification outcomes, not errors.
    pub fn verify(&self, cpoe: &str) -> CorsairResult<VerificationResult> {
        let (jwt, _disclosures) = envelope::split_disclosures(cpoe);

        if !looks_like_jwt(jwt) {
            return Err(CorsairError::validation(
                "input is not a JWT-VC envelope; use verify_legacy_envelope for legacy JSON input",
            ));
        }

        let decoded = envelope::decode(jwt)?;

        if decoded.header.alg != envelope::ALG_EDDSA {
            return Ok(VerificationResult {
                valid: false,
                reason: format!("Unsupported algorithm: {}", decoded.header.alg),
                issuer_tier: IssuerTier::Unverifiable,
                expired: false,
                payload: Some(decoded.payload),
            });
        }

        let did_document = self.resolver.resolve(&decoded.payload.iss)?;
        let Some(verification_method) = did_document.verification_method.first() else {
            return Err(CorsairError::validation(format!(
                "DID document for {} has no verification methods",
                decoded.payload.iss
            )));
        };
        let public_key_pem = KeyManager::import_jwk(&verification_method.public_key_jwk)?;
        let verifying_key = ed25519_dalek::VerifyingKey::from_public_key_pem(&public_key_pem)
            .map_err(|e| CorsairError::crypto(format!("malformed resolved public key: {e}")))?;

        let issuer_tier = self.classify_issuer_tier(&decoded.payload.iss);

        if !envelope::verify(jwt, &verifying_key)? {
            tracing::warn!(issuer = %decoded.payload.iss, "CPOE signature verification failed");
            return Ok(VerificationResult {
                valid: false,
                reason: "JWT-VC signature invalid".to_string(),
                issuer_tier,
                expired: false,
                payload: Some(decoded.payload),
            });
        }

        let now = self.clock.now().timestamp();
        if now > decoded.payload.exp {
            tracing::warn!(issuer = %decoded.payload.iss, exp = decoded.payload.exp, "CPOE expired");
            return Ok(VerificationResult {
                valid: false,
                reason: format!("CPOE expired at {}", decoded.payload.exp),
                issuer_tier,
                expired: true,
                payload: Some(decoded.payload),
            });
        }

        tracing::info!(issuer = %decoded.payload.iss, issuer_tier = ?issuer_tier, "CPOE verified");
        Ok(VerificationResult {
            valid: true,
            reason: "JWT-VC signature valid".to_string(),
            issuer_tier,
            expired: false,
            payload: Some(decoded.payload),
        })
    }

    /// Explicit, opt-in compatibility path for the legacy JSON envelope format. Never invoked by
    /// [`Verifier::verify`].
    pub fn verify_legacy_envelope(&self, legacy_json: &str) -> CorsairResult<VerificationResult> {
        #[derive(Deserialize)]
        struct LegacyEnvelope {
            iss: String,
            payload: serde_json::Value,
            signature: String,
        }

        let envelope: LegacyEnvelope = serde_json::from_str(legacy_json)
            .map_err(|e| CorsairError::validation(format!("malformed legacy envelope: {e}")))?;

        let did_document = self.resolver.resolve(&envelope.iss)?;
        let Some(verification_method) = did_document.verification_method.first() else {
            return Err(CorsairError::validation(format!(
                "DID document for {} has no verification methods",
                envelope.iss
            )));
        };
        let public_key_pem = KeyManager::import_jwk(&verification_method.public_key_jwk)?;
        let verifying_key = ed25519_dalek::VerifyingKey::from_public_key_pem(&public_key_pem)
            .map_err(|e| CorsairError::crypto(format!("malformed resolved public key: {e}")))?;

        let signed_bytes = serde_json::to_vec(&envelope.payload)
            .map_err(|e| CorsairError::validation(format!("failed to re-encode legacy payload: {e}")))?;
        let sig_bytes = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, &envelope.signature)
            .map_err(|e| CorsairError::validation(format!("malformed legacy signature: {e}")))?;
        let Ok(signature) = ed25519_dalek::Signature::try_from(sig_bytes.as_slice()) else {
            return Ok(VerificationResult {
                valid: false,
                reason: "legacy signature is malformed".to_string(),
                issuer_tier: self.classify_issuer_tier(&envelope.iss),
                expired: false,
                payload: None,
            });
        };

        let valid = crate::keymanager::verify_signature(&signed_bytes, &signature, &verifying_key);
        Ok(VerificationResult {
            valid,
            reason: if valid {
                "legacy envelope signature valid".to_string()
            } else {
                "legacy envelope signature invalid".to_string()
            },
            issuer_tier: self.classify_issuer_tier(&envelope.iss),
            expired: false,
            payload: None,
        })
    }
}

fn looks_like_jwt(value: &str) -> bool {
    let segments: Vec<&str> = value.split('.').collect();
    segments.len() == 3 && envelope::decode(value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::envelope::{Payload, VerifiableCredential};
    use crate::keymanager::{DidDocument, VerificationMethod};
    use crate::store::MemoryKeyStore;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;

    fn setup(iss: &str) -> (MemoryKeyStore, FixedClock, String) {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = KeyManager::new(&store, &clock);
        mgr.generate(&[11u8; 32]).unwrap();

        let now = clock.now();
        let payload = Payload {
            iss: iss.to_string(),
            sub: "urn:uuid:subject".to_string(),
            iat: now.timestamp(),
            exp: (now + ChronoDuration::days(90)).timestamp(),
            jti: "urn:uuid:jti".to_string(),
            parley: "1.0".to_string(),
            vc: VerifiableCredential {
                context: vec!["https://www.w3.org/2018/credentials/v1".to_string()],
                type_: vec!["VerifiableCredential".to_string()],
                issuer: iss.to_string(),
                valid_from: now,
                valid_until: now + ChronoDuration::days(90),
                credential_subject: json!({"scope": "example.org"}),
            },
        };
        let jwt = envelope::sign(&mgr, &[11u8; 32], &payload).unwrap();
        (store, clock, jwt)
    }

    fn resolver_for(store: &MemoryKeyStore, clock: &FixedClock, did: &str) -> StaticDidResolver {
        let mgr = KeyManager::new(store, clock);
        let domain = domain_from_did(did).unwrap();
        let doc = mgr.did_document(&domain).unwrap();
        StaticDidResolver::new().with(did.to_string(), doc)
    }

    #[test]
    fn domain_from_did_decodes_a_percent_encoded_port() {
        assert_eq!(domain_from_did("did:web:localhost%3A8443").unwrap(), "localhost:8443");
        assert_eq!(domain_from_did("did:web:issuer.example").unwrap(), "issuer.example");
    }

    #[test]
    fn trusted_domain_with_a_port_still_classifies_as_corsair_verified() {
        let (store, clock, jwt) = setup("did:web:localhost%3A8443");
        let resolver = resolver_for(&store, &clock, "did:web:localhost%3A8443");
        let verifier = Verifier::new(&resolver, &clock, vec!["localhost:8443".to_string()]);

        let result = verifier.verify(&jwt).unwrap();
        assert!(result.valid);
        assert_eq!(result.issuer_tier, IssuerTier::CorsairVerified);
    }

    #[test]
    fn valid_jwt_vc_verifies() {
        let (store, clock, jwt) = setup("did:web:issuer.example");
        let resolver = resolver_for(&store, &clock, "did:web:issuer.example");
        let verifier = Verifier::new(&resolver, &clock, vec!["trusted.example".to_string()]);

        let result = verifier.verify(&jwt).unwrap();
        assert!(result.valid);
        assert_eq!(result.reason, "JWT-VC signature valid");
        assert_eq!(result.issuer_tier, IssuerTier::SelfSigned);
    }

    #[test]
    fn trusted_domain_classifies_as_corsair_verified() {
        let (store, clock, jwt) = setup("did:web:trusted.example");
        let resolver = resolver_for(&store, &clock, "did:web:trusted.example");
        let verifier = Verifier::new(&resolver, &clock, vec!["trusted.example".to_string()]);

        let result = verifier.verify(&jwt).unwrap();
        assert_eq!(result.issuer_tier, IssuerTier::CorsairVerified);
    }

    #[test]
    fn expired_cpoe_is_invalid_but_still_decodable() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = KeyManager::new(&store, &clock);
        mgr.generate(&[9u8; 32]).unwrap();

        let now = clock.now();
        let payload = Payload {
            iss: "did:web:issuer.example".to_string(),
            sub: "urn:uuid:s".to_string(),
            iat: (now - ChronoDuration::days(10)).timestamp(),
            exp: (now - ChronoDuration::days(1)).timestamp(),
            jti: "urn:uuid:j".to_string(),
            parley: "1.0".to_string(),
            vc: VerifiableCredential {
                context: vec![],
                type_: vec![],
                issuer: "did:web:issuer.example".to_string(),
                valid_from: now - ChronoDuration::days(10),
                valid_until: now - ChronoDuration::days(1),
                credential_subject: json!({}),
            },
        };
        let jwt = envelope::sign(&mgr, &[9u8; 32], &payload).unwrap();

        let resolver = resolver_for(&store, &clock, "did:web:issuer.example");
        let verifier = Verifier::new(&resolver, &clock, vec![]);
        let result = verifier.verify(&jwt).unwrap();

        assert!(!result.valid);
        assert!(result.expired);
        assert!(result.payload.is_some());
    }

    #[test]
    fn alg_mismatch_is_unsupported_algorithm() {
        let header = json!({"alg": "HS256", "typ": "vc+jwt", "kid": "did:web:x#key-1"});
        let header_b64 = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            serde_json::to_vec(&header).unwrap(),
        );
        let payload = json!({
            "iss": "did:web:x", "sub": "s", "iat": 0, "exp": 0, "jti": "j", "parley": "1.0",
            "vc": {"@context": [], "type": [], "issuer": "did:web:x", "validFrom": "2026-01-01T00:00:00Z", "validUntil": "2026-01-01T00:00:00Z", "credentialSubject": {}}
        });
        let payload_b64 = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            serde_json::to_vec(&payload).unwrap(),
        );
        let jwt = format!("{header_b64}.{payload_b64}.c2ln");

        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let resolver = StaticDidResolver::new();
        let verifier = Verifier::new(&resolver, &clock, vec![]);
        let result = verifier.verify(&jwt).unwrap();

        assert!(!result.valid);
        assert!(result.reason.contains("Unsupported algorithm"));
    }

    #[test]
    fn non_jwt_input_is_rejected_as_not_a_jwt_vc() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let resolver = StaticDidResolver::new();
        let verifier = Verifier::new(&resolver, &clock, vec![]);

        let err = verifier.verify("{\"not\": \"a jwt\"}").unwrap_err();
        assert_eq!(err.kind(), "validation");
        let _ = store;
    }

    #[test]
    fn unknown_issuer_surfaces_as_not_found() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let (_, _, jwt) = setup("did:web:issuer.example");
        let resolver = StaticDidResolver::new(); // empty: no documents registered
        let verifier = Verifier::new(&resolver, &clock, vec![]);

        let err = verifier.verify(&jwt).unwrap_err();
        assert_eq!(err.kind(), "not_found");
        let _ = store;
    }
}
