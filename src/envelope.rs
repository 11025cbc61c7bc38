//! JWT-VC envelope (`sign`/`decode`/`verify`) plus SD-JWT selective-disclosure helpers.
//!
//! EdDSA-only: the signing/verification step is built directly on `ed25519-dalek` over
//! [`crate::keymanager::KeyManager`], since the envelope's exact byte-level construction
//! (`base64url(header) . base64url(payload) . base64url(signature)`) is part of its contract and
//! the signing material never needs to leave [`KeyManager`] as a PEM string. SD-JWT is a plain
//! digest-substitution format here, built on `sha2`/`base64`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::error::{CorsairError, CorsairResult};
use crate::keymanager::KeyManager;

pub const ALG_EDDSA: &str = "EdDSA";
pub const TYP_VC_JWT: &str = "vc+jwt";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub type_: Vec<String>,
    pub issuer: String,
    #[serde(rename = "validFrom")]
    pub valid_from: DateTime<Utc>,
    #[serde(rename = "validUntil")]
    pub valid_until: DateTime<Utc>,
    #[serde(rename = "credentialSubject")]
    pub credential_subject: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payload {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub parley: String,
    pub vc: VerifiableCredential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub header: Header,
    pub payload: Payload,
}

fn b64_json<T: Serialize>(value: &T) -> CorsairResult<String> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| CorsairError::validation(format!("failed to encode envelope segment: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn b64_decode_json<T: for<'de> Deserialize<'de>>(segment: &str) -> CorsairResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| CorsairError::validation(format!("malformed base64url segment: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CorsairError::validation(format!("malformed envelope segment JSON: {e}")))
}

/// Sign `payload` with the active key in `key_manager`, producing `header.payload.signature`.
/// `kid` is always `"<iss>#key-1"`.
pub fn sign(key_manager: &KeyManager, secret: &[u8; 32], payload: &Payload) -> CorsairResult<String> {
    let header = Header {
        alg: ALG_EDDSA.to_string(),
        typ: TYP_VC_JWT.to_string(),
        kid: format!("{}#key-1", payload.iss),
    };

    let header_b64 = b64_json(&header)?;
    let payload_b64 = b64_json(payload)?;
    let signing_input = format!("{header_b64}.{payload_b64}");

    let (_key_id, signature) = key_manager.sign(secret, signing_input.as_bytes())?;
    let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());

    Ok(format!("{signing_input}.{sig_b64}"))
}

/// Split `header.payload.signature` into its three base64url segments.
fn split_jwt(jwt: &str) -> CorsairResult<(&str, &str, &str)> {
    let mut parts = jwt.split('.');
    let (Some(h), Some(p), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CorsairError::validation("envelope is not a three-segment JWT"));
    };
    Ok((h, p, s))
}

/// Decode `header` and `payload` without verifying the signature.
pub fn decode(jwt: &str) -> CorsairResult<Decoded> {
    let (header_b64, payload_b64, _sig_b64) = split_jwt(jwt)?;
    let header: Header = b64_decode_json(header_b64)?;
    let payload: Payload = b64_decode_json(payload_b64)?;
    Ok(Decoded { header, payload })
}

/// Verify `jwt` against `verifying_key`. Rejects any `alg` other than `"EdDSA"` and any malformed
/// signature encoding by returning `Ok(false)` rather than propagating an error — only structurally
/// malformed envelopes (bad base64url, bad JSON, wrong segment count) are errors.
pub fn verify(jwt: &str, verifying_key: &VerifyingKey) -> CorsairResult<bool> {
    let (header_b64, payload_b64, sig_b64) = split_jwt(jwt)?;
    let header: Header = b64_decode_json(header_b64)?;

    if header.alg != ALG_EDDSA {
        return Ok(false);
    }

    let Ok(sig_bytes) = URL_SAFE_NO_PAD.decode(sig_b64) else {
        return Ok(false);
    };
    let Ok(signature) = Signature::try_from(sig_bytes.as_slice()) else {
        return Ok(false);
    };

    let signing_input = format!("{header_b64}.{payload_b64}");
    Ok(verifying_key.verify(signing_input.as_bytes(), &signature).is_ok())
}

/// One selective-disclosure claim: its plaintext name, the base64url disclosure blob, and the
/// digest substituted into the payload in its place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisclosureRecord {
    pub claim: String,
    pub disclosure: String,
    pub digest: String,
}

fn random_salt() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn digest_of(disclosure_b64: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(disclosure_b64.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Redact the named top-level claims of `subject` (typically a `credentialSubject` object),
/// replacing each value with a sha-256 digest and returning the corresponding disclosures.
/// Claims not present in `subject` are silently skipped.
pub fn create_disclosures(subject: &mut Value, claim_names: &[&str]) -> CorsairResult<Vec<DisclosureRecord>> {
    let obj = subject
        .as_object_mut()
        .ok_or_else(|| CorsairError::validation("selective disclosure requires a JSON object"))?;

    let mut records = Vec::new();
    for name in claim_names {
        let Some(value) = obj.get(*name).cloned() else {
            continue;
        };
        let salt = random_salt();
        let triple = Value::Array(vec![Value::String(salt), Value::String((*name).to_string()), value]);
        let disclosure_bytes = serde_json::to_vec(&triple)
            .map_err(|e| CorsairError::validation(format!("failed to encode disclosure: {e}")))?;
        let disclosure = URL_SAFE_NO_PAD.encode(disclosure_bytes);
        let digest = digest_of(&disclosure);

        obj.insert((*name).to_string(), Value::String(digest.clone()));
        records.push(DisclosureRecord {
            claim: (*name).to_string(),
            disclosure,
            digest,
        });
    }
    Ok(records)
}

/// Append `~disclosure1~disclosure2~...~` to a signed JWT. A no-op if `disclosures` is empty.
pub fn append_disclosures(jwt: &str, disclosures: &[DisclosureRecord]) -> String {
    if disclosures.is_empty() {
        return jwt.to_string();
    }
    let mut out = String::from(jwt);
    for record in disclosures {
        out.push('~');
        out.push_str(&record.disclosure);
    }
    out.push('~');
    out
}

/// Split a CPOE wire string into its bare JWT and any trailing disclosure blobs.
pub fn split_disclosures(cpoe: &str) -> (&str, Vec<&str>) {
    let mut parts = cpoe.split('~');
    let jwt = parts.next().unwrap_or(cpoe);
    (jwt, parts.filter(|s| !s.is_empty()).collect())
}

/// Recover `(claim name, value)` from a disclosure blob, and confirm it matches `expected_digest`.
pub fn open_disclosure(disclosure_b64: &str, expected_digest: &str) -> CorsairResult<(String, Value)> {
    if digest_of(disclosure_b64) != expected_digest {
        return Err(CorsairError::validation("disclosure does not match its digest"));
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(disclosure_b64)
        .map_err(|e| CorsairError::validation(format!("malformed disclosure: {e}")))?;
    let triple: Value = serde_json::from_slice(&bytes)
        .map_err(|e| CorsairError::validation(format!("malformed disclosure JSON: {e}")))?;
    let arr = triple
        .as_array()
        .filter(|a| a.len() == 3)
        .ok_or_else(|| CorsairError::validation("disclosure must be a [salt, name, value] triple"))?;
    let name = arr[1]
        .as_str()
        .ok_or_else(|| CorsairError::validation("disclosure claim name must be a string"))?
        .to_string();
    Ok((name, arr[2].clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryKeyStore;
    use serde_json::json;

    fn sample_payload(iss: &str) -> Payload {
        let now = Utc::now();
        Payload {
            iss: iss.to_string(),
            sub: "urn:uuid:subject".to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::days(90)).timestamp(),
            jti: "urn:uuid:jti".to_string(),
            parley: "1.0".to_string(),
            vc: VerifiableCredential {
                context: vec!["https://www.w3.org/2018/credentials/v1".to_string()],
                type_: vec!["VerifiableCredential".to_string(), "CPOE".to_string()],
                issuer: iss.to_string(),
                valid_from: now,
                valid_until: now + chrono::Duration::days(90),
                credential_subject: json!({"scope": "example.org", "summary": {"total": 3}}),
            },
        }
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = KeyManager::new(&store, &clock);
        let secret = [42u8; 32];
        mgr.generate(&secret).unwrap();

        let payload = sample_payload("did:web:issuer.example");
        let jwt = sign(&mgr, &secret, &payload).unwrap();

        let (_, verifying_key) = mgr.active_public().unwrap();
        assert!(verify(&jwt, &verifying_key).unwrap());

        let decoded = decode(&jwt).unwrap();
        assert_eq!(decoded.header.alg, "EdDSA");
        assert_eq!(decoded.header.typ, "vc+jwt");
        assert_eq!(decoded.header.kid, "did:web:issuer.example#key-1");
        assert_eq!(decoded.payload.iss, "did:web:issuer.example");
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = KeyManager::new(&store, &clock);
        let secret = [1u8; 32];
        mgr.generate(&secret).unwrap();

        let payload = sample_payload("did:web:issuer.example");
        let jwt = sign(&mgr, &secret, &payload).unwrap();
        let (header_b64, payload_b64, sig_b64) = split_jwt(&jwt).unwrap();
        let tampered = format!("{header_b64}.{payload_b64}x.{sig_b64}");

        assert!(!verify(&tampered, &mgr.active_public().unwrap().1).unwrap());
    }

    #[test]
    fn non_eddsa_alg_is_rejected_without_erroring() {
        let header = Header {
            alg: "HS256".to_string(),
            typ: TYP_VC_JWT.to_string(),
            kid: "did:web:x#key-1".to_string(),
        };
        let header_b64 = b64_json(&header).unwrap();
        let jwt = format!("{header_b64}.e30.c2ln");

        let store = MemoryKeyStore::new();
        let clock = FixedClock::new(Utc::now());
        let mgr = KeyManager::new(&store, &clock);
        mgr.generate(&[3u8; 32]).unwrap();
        let (_, verifying_key) = mgr.active_public().unwrap();

        assert!(!verify(&jwt, &verifying_key).unwrap());
    }

    #[test]
    fn malformed_segment_count_is_an_error() {
        assert!(decode("only.two").is_err());
    }

    #[test]
    fn selective_disclosure_round_trips_and_detects_tampering() {
        let mut subject = json!({"scope": "example.org", "ownerEmail": "ops@example.org"});
        let disclosures = create_disclosures(&mut subject, &["ownerEmail"]).unwrap();
        assert_eq!(disclosures.len(), 1);

        // The redacted field is now a digest, not the plaintext email.
        assert_ne!(subject["ownerEmail"], json!("ops@example.org"));

        let (name, value) = open_disclosure(&disclosures[0].disclosure, &disclosures[0].digest).unwrap();
        assert_eq!(name, "ownerEmail");
        assert_eq!(value, json!("ops@example.org"));

        let err = open_disclosure(&disclosures[0].disclosure, "wrong-digest").unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn append_and_split_disclosures_round_trip() {
        let jwt = "h.p.s";
        let disclosures = vec![
            DisclosureRecord {
                claim: "a".to_string(),
                disclosure: "disc1".to_string(),
                digest: "d1".to_string(),
            },
            DisclosureRecord {
                claim: "b".to_string(),
                disclosure: "disc2".to_string(),
                digest: "d2".to_string(),
            },
        ];
        let cpoe = append_disclosures(jwt, &disclosures);
        assert_eq!(cpoe, "h.p.s~disc1~disc2~");

        let (bare_jwt, blobs) = split_disclosures(&cpoe);
        assert_eq!(bare_jwt, jwt);
        assert_eq!(blobs, vec!["disc1", "disc2"]);
    }

    #[test]
    fn no_disclosures_leaves_jwt_untouched() {
        assert_eq!(append_disclosures("h.p.s", &[]), "h.p.s");
    }
}
