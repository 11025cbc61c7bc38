//! Request/response DTOs for the out-of-core HTTP surface.
//!
//! These are wire shapes only — no listener lives in this crate (see [`super::Router`]); a host
//! process wires a real `axum`/`tower-http` server onto that trait and (de)serializes these types
//! at its edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assembler::{Provenance, Summary};
use crate::keymanager::Jwk;

/// `POST /verify` request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyRequest {
    pub cpoe: String,
}

/// `POST /issue` request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueRequest {
    pub evidence: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(rename = "expiryDays", skip_serializing_if = "Option::is_none")]
    pub expiry_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrich: Option<bool>,
    #[serde(rename = "dryRun", skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

/// `POST /issue` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueResponse {
    pub cpoe: String,
    #[serde(rename = "marqueId")]
    pub marque_id: String,
    #[serde(rename = "detectedFormat")]
    pub detected_format: String,
    pub summary: Summary,
    pub provenance: Provenance,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// `GET /.well-known/jwks.json` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// `GET /.well-known/ssf-configuration` response body (Shared Signals Framework transmitter
/// metadata, RFC 9475 style naming).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SsfTransmitterMetadata {
    pub issuer: String,
    #[serde(rename = "jwks_uri")]
    pub jwks_uri: String,
    #[serde(rename = "delivery_methods_supported")]
    pub delivery_methods_supported: Vec<String>,
    #[serde(rename = "configuration_endpoint")]
    pub configuration_endpoint: String,
    #[serde(rename = "status_endpoint")]
    pub status_endpoint: String,
    #[serde(rename = "add_subject_endpoint", skip_serializing_if = "Option::is_none")]
    pub add_subject_endpoint: Option<String>,
    #[serde(rename = "remove_subject_endpoint", skip_serializing_if = "Option::is_none")]
    pub remove_subject_endpoint: Option<String>,
    #[serde(rename = "verification_endpoint", skip_serializing_if = "Option::is_none")]
    pub verification_endpoint: Option<String>,
}

/// `POST /scitt/entries` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScittSubmitResponse {
    #[serde(rename = "entryId")]
    pub entry_id: String,
}

/// `GET /scitt/entries/:id` response body (the CPOE's metadata; the COSE receipt bytes are served
/// separately by `GET /scitt/entries/:id/receipt`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScittEntryMetadata {
    #[serde(rename = "entryId")]
    pub entry_id: String,
    #[serde(rename = "payloadHash")]
    pub payload_hash: String,
    #[serde(rename = "treeSize")]
    pub tree_size: u64,
    #[serde(rename = "leafIndex")]
    pub leaf_index: u64,
    #[serde(rename = "submittedAt")]
    pub submitted_at: DateTime<Utc>,
}

/// How a subscriber wants SSF events delivered for one stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "UPPERCASE")]
pub enum SsfDeliveryMethod {
    Push {
        #[serde(rename = "endpointUrl")]
        endpoint_url: String,
    },
    Poll,
}

/// `POST|PATCH /ssf/streams[/:id]` request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SsfStreamRequest {
    pub delivery: SsfDeliveryMethod,
    #[serde(rename = "eventsRequested")]
    pub events_requested: Vec<String>,
}

/// `POST|PATCH|GET /ssf/streams[/:id]` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SsfStreamMetadata {
    #[serde(rename = "streamId")]
    pub stream_id: String,
    pub delivery: SsfDeliveryMethod,
    #[serde(rename = "eventsRequested")]
    pub events_requested: Vec<String>,
}

/// `GET /health` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(rename = "storeReachable")]
    pub store_reachable: bool,
}
