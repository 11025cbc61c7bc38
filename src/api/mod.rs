//! The out-of-core HTTP surface: typed request/response DTOs plus the `Router` trait they are
//! built for. Wiring an actual listener (`axum`, `tower-http`, or any other stack) onto `Router`
//! is left to the host process — HTTP routing itself is out of scope here, but the contract each
//! route must uphold against the engine modules is not.

pub mod types;

use crate::error::CorsairResult;
use crate::keymanager::DidDocument;
use crate::verification::VerificationResult;
use types::{
    HealthStatus, IssueRequest, IssueResponse, JwksDocument, ScittEntryMetadata,
    ScittSubmitResponse, SsfStreamMetadata, SsfStreamRequest, SsfTransmitterMetadata, VerifyRequest,
};

/// One request handler per §6 HTTP endpoint. A host process implements this over its own
/// `KeyManager`/`Verifier`/`SCITTRegistry`/`CertificationEngine` instances and dispatches each
/// inbound request to the matching method.
pub trait Router {
    /// `POST /verify` — public, CORS `*`.
    fn verify(&self, request: VerifyRequest) -> CorsairResult<VerificationResult>;

    /// `POST /issue` — auth required.
    fn issue(&self, request: IssueRequest) -> CorsairResult<IssueResponse>;

    /// `GET /.well-known/did.json` — public.
    fn did_document(&self) -> CorsairResult<DidDocument>;

    /// `GET /.well-known/jwks.json` — public.
    fn jwks(&self) -> CorsairResult<JwksDocument>;

    /// `GET /.well-known/ssf-configuration` — public.
    fn ssf_configuration(&self) -> CorsairResult<SsfTransmitterMetadata>;

    /// `POST /scitt/entries` — auth required; body is the raw CPOE bytes.
    fn scitt_submit(&self, cpoe: &[u8]) -> CorsairResult<ScittSubmitResponse>;

    /// `GET /scitt/entries/:id`.
    fn scitt_entry(&self, entry_id: &str) -> CorsairResult<ScittEntryMetadata>;

    /// `GET /scitt/entries/:id/receipt` — raw COSE_Sign1 bytes.
    fn scitt_receipt(&self, entry_id: &str) -> CorsairResult<Vec<u8>>;

    /// `POST /ssf/streams` — auth required.
    fn create_stream(&self, request: SsfStreamRequest) -> CorsairResult<SsfStreamMetadata>;

    /// `PATCH /ssf/streams/:id` — auth required.
    fn update_stream(&self, stream_id: &str, request: SsfStreamRequest) -> CorsairResult<SsfStreamMetadata>;

    /// `DELETE /ssf/streams/:id` — auth required.
    fn delete_stream(&self, stream_id: &str) -> CorsairResult<()>;

    /// `GET /health` — liveness plus a store ping.
    fn health(&self) -> CorsairResult<HealthStatus>;
}
