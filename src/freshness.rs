//! `FreshnessStaple`: a short-lived signed JWT attesting that a CPOE's underlying evidence stream
//! was checked recently.
//!
//! Reuses [`crate::envelope`]'s JWT construction (`base64url(header).base64url(payload).base64url(signature)`
//! over raw `ed25519-dalek`), with its own narrower `typ="freshness+jwt"` claim set rather than
//! the VC-shaped `Payload` there. `verify` never throws on a bad or absent staple — it always
//! returns a [`FreshnessResult`], since an absent staple is a normal outcome, not an error.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::{CorsairError, CorsairResult};
use crate::keymanager::KeyManager;

pub const ALG_EDDSA: &str = "EdDSA";
pub const TYP_FRESHNESS_JWT: &str = "freshness+jwt";
pub const DEFAULT_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payload {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "checkedAt")]
    pub checked_at: i64,
    #[serde(rename = "alertsActive")]
    pub alerts_active: bool,
    #[serde(rename = "streamId", skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Inputs to [`generate`]. `ttl` defaults to [`DEFAULT_TTL_DAYS`] when `None`.
#[derive(Debug, Clone, Default)]
pub struct StapleConfig {
    pub ttl: Option<Duration>,
    pub alerts_active: bool,
    pub stream_id: Option<String>,
    pub score: Option<f64>,
}

/// Build and sign a freshness staple for `issuer`, checked `now`.
pub fn generate(
    key_manager: &KeyManager,
    secret: &[u8; 32],
    issuer: &str,
    now: DateTime<Utc>,
    config: &StapleConfig,
) -> CorsairResult<String> {
    let ttl = config.ttl.unwrap_or_else(|| Duration::days(DEFAULT_TTL_DAYS));
    let payload = Payload {
        iss: issuer.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
        checked_at: now.timestamp(),
        alerts_active: config.alerts_active,
        stream_id: config.stream_id.clone(),
        score: config.score,
    };

    let header = Header {
        alg: ALG_EDDSA.to_string(),
        typ: TYP_FRESHNESS_JWT.to_string(),
        kid: format!("{issuer}#key-1"),
    };

    let header_b64 = b64_json(&header)?;
    let payload_b64 = b64_json(&payload)?;
    let signing_input = format!("{header_b64}.{payload_b64}");

    let (_key_id, signature) = key_manager.sign(secret, signing_input.as_bytes())?;
    let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());

    Ok(format!("{signing_input}.{sig_b64}"))
}

fn b64_json<T: Serialize>(value: &T) -> CorsairResult<String> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| CorsairError::validation(format!("failed to encode staple segment: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn b64_decode_json<T: for<'de> Deserialize<'de>>(segment: &str) -> CorsairResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| CorsairError::validation(format!("malformed base64url segment: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CorsairError::validation(format!("malformed staple segment JSON: {e}")))
}

/// The never-throwing result of verifying a freshness staple.
#[derive(Debug, Clone, PartialEq)]
pub struct FreshnessResult {
    pub valid: bool,
    pub fresh: bool,
    pub checked_at: Option<DateTime<Utc>>,
    pub stale_days: i64,
    pub alerts_active: bool,
    pub stream_id: Option<String>,
    pub score: Option<f64>,
    pub reason: Option<String>,
}

impl FreshnessResult {
    fn invalid(reason: &str) -> Self {
        Self {
            valid: false,
            fresh: false,
            checked_at: None,
            stale_days: 0,
            alerts_active: false,
            stream_id: None,
            score: None,
            reason: Some(reason.to_string()),
        }
    }
}

/// Verify `staple` (possibly `None`, since a missing staple is not an error) against
/// `verifying_key`, as of `now`.
pub fn verify(staple: Option<&str>, verifying_key: &VerifyingKey, now: DateTime<Utc>) -> FreshnessResult {
    let Some(staple) = staple else {
        return FreshnessResult::invalid("malformed");
    };

    let mut parts = staple.split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return FreshnessResult::invalid("malformed");
    };
    if header_b64.is_empty() || payload_b64.is_empty() || sig_b64.is_empty() {
        return FreshnessResult::invalid("malformed");
    }

    let Ok(header) = b64_decode_json::<Header>(header_b64) else {
        return FreshnessResult::invalid("malformed");
    };
    let Ok(payload) = b64_decode_json::<Payload>(payload_b64) else {
        return FreshnessResult::invalid("malformed");
    };

    if header.alg != ALG_EDDSA {
        return FreshnessResult::invalid("signature_invalid");
    }

    let Ok(sig_bytes) = URL_SAFE_NO_PAD.decode(sig_b64) else {
        return FreshnessResult::invalid("signature_invalid");
    };
    let Ok(signature) = Signature::try_from(sig_bytes.as_slice()) else {
        return FreshnessResult::invalid("signature_invalid");
    };

    let signing_input = format!("{header_b64}.{payload_b64}");
    if verifying_key.verify(signing_input.as_bytes(), &signature).is_err() {
        return FreshnessResult::invalid("signature_invalid");
    }

    let Some(checked_at) = DateTime::<Utc>::from_timestamp(payload.checked_at, 0) else {
        return FreshnessResult::invalid("malformed");
    };
    let stale_days = (now - checked_at).num_days().max(0);
    let expired = now.timestamp() > payload.exp;

    FreshnessResult {
        valid: true,
        fresh: !expired,
        checked_at: Some(checked_at),
        stale_days,
        alerts_active: payload.alerts_active,
        stream_id: payload.stream_id,
        score: payload.score,
        reason: if expired { Some("expired".to_string()) } else { None },
    }
}
