//! Error taxonomy shared by every library module.
//!
//! Pure verify/validation functions return `Result<T, CorsairError>` and never panic or throw;
//! the CLI binary is the only place these get wrapped into `anyhow::Error` with additional
//! context.

use serde::Serialize;
use serde_json::Value;

/// Error kinds. The kind (not the message) is what downstream code should match on; messages
/// are for humans.
#[derive(Debug, thiserror::Error)]
pub enum CorsairError {
    /// Bad flags, missing required inputs. Exit code 2.
    #[error("usage error: {message}")]
    Usage { message: String },

    /// No such certification/vendor/entry/key. Exit code 1.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Malformed input, schema mismatch, invalid date. Exit code 1.
    #[error("validation error: {message}")]
    Validation {
        message: String,
        detail: Option<Value>,
    },

    /// Signature invalid, bad key format, unsupported algorithm. Exit code 1.
    #[error("crypto error: {message}")]
    Crypto { message: String },

    /// CPOE expired, freshness staple expired. Exit code 1.
    #[error("expiry error: {message}")]
    Expiry { message: String },

    /// Unreachable host, timeout. Exit code 1.
    #[error("network error: {message}")]
    Network { message: String },

    /// Remote 5xx. Exit code 1.
    #[error("server error: {message}")]
    ServerError { message: String },

    /// Second active key, disallowed state transition. Exit code 1.
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },
}

impl CorsairError {
    pub fn usage(message: impl Into<String>) -> Self {
        CorsairError::Usage {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CorsairError::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CorsairError::Validation {
            message: message.into(),
            detail: None,
        }
    }

    pub fn validation_with_detail(message: impl Into<String>, detail: Value) -> Self {
        CorsairError::Validation {
            message: message.into(),
            detail: Some(detail),
        }
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        CorsairError::Crypto {
            message: message.into(),
        }
    }

    pub fn expiry(message: impl Into<String>) -> Self {
        CorsairError::Expiry {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        CorsairError::Network {
            message: message.into(),
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        CorsairError::ServerError {
            message: message.into(),
        }
    }

    pub fn constraint_violation(message: impl Into<String>) -> Self {
        CorsairError::ConstraintViolation {
            message: message.into(),
        }
    }

    /// The kind, as a stable lower-kebab-case tag (used in JSON error bodies).
    pub fn kind(&self) -> &'static str {
        match self {
            CorsairError::Usage { .. } => "usage",
            CorsairError::NotFound { .. } => "not_found",
            CorsairError::Validation { .. } => "validation",
            CorsairError::Crypto { .. } => "crypto",
            CorsairError::Expiry { .. } => "expiry",
            CorsairError::Network { .. } => "network",
            CorsairError::ServerError { .. } => "server_error",
            CorsairError::ConstraintViolation { .. } => "constraint_violation",
        }
    }

    /// Process exit code: 0 success, 1 operational failure, 2 usage error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CorsairError::Usage { .. } => 2,
            _ => 1,
        }
    }

    pub fn to_wire(&self) -> WireError {
        let detail = match self {
            CorsairError::Validation { detail, .. } => detail.clone(),
            _ => None,
        };
        WireError {
            kind: self.kind().to_string(),
            message: self.to_string(),
            detail,
        }
    }
}

/// JSON-serializable projection of a `CorsairError`: `{kind, message, detail?}`.
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// A tagged result, returned by every pure verify/validation function instead of a panic.
pub type CorsairResult<T> = Result<T, CorsairError>;
