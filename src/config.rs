//! Process configuration, sourced from environment variables.
//!
//! Sourced entirely from the process environment; there is no interactive login step and no
//! config file to round-trip, so this module only parses and validates.

use std::env;

use crate::error::{CorsairError, CorsairResult};

/// `KEY_ENCRYPTION_SECRET` must decode to exactly this many bytes (AES-256 key size).
const KEY_SECRET_BYTES: usize = 32;

/// Process-wide configuration. Constructed once at startup with [`CorsairConfig::from_env`];
/// fails fast on a malformed `KEY_ENCRYPTION_SECRET` rather than deferring the failure to first
/// use.
#[derive(Debug, Clone)]
pub struct CorsairConfig {
    pub database_url: Option<String>,
    pub key_encryption_secret: [u8; KEY_SECRET_BYTES],
    pub domain: String,
    pub allowed_origins: Vec<String>,
    pub api_keys: Vec<String>,
    pub mapping_dir: Option<String>,
    pub enable_delivery_worker: bool,
    pub delivery_worker_interval_secs: u64,
    pub production: bool,
}

impl CorsairConfig {
    /// Parse and validate configuration from the process environment.
    ///
    /// `KEY_ENCRYPTION_SECRET` is required and must be exactly 64 lowercase hex characters (32
    /// bytes). `CORSAIR_API_KEYS` is required whenever `production=true` (i.e. when
    /// `CORSAIR_ENV=production`).
    pub fn from_env() -> CorsairResult<Self> {
        let production = env::var("CORSAIR_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let secret_hex = env::var("KEY_ENCRYPTION_SECRET").map_err(|_| {
            CorsairError::usage("KEY_ENCRYPTION_SECRET is required (64 hex chars = 32 bytes)")
        })?;
        let key_encryption_secret = parse_key_secret(&secret_hex)?;

        let domain = env::var("CORSAIR_DOMAIN").unwrap_or_else(|_| "localhost".to_string());

        let allowed_origins = env::var("CORSAIR_ALLOWED_ORIGINS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let api_keys: Vec<String> = env::var("CORSAIR_API_KEYS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if production && api_keys.is_empty() {
            return Err(CorsairError::usage(
                "CORSAIR_API_KEYS is required when CORSAIR_ENV=production",
            ));
        }

        let mapping_dir = env::var("CORSAIR_MAPPING_DIR").ok();

        let enable_delivery_worker = env::var("ENABLE_DELIVERY_WORKER")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let delivery_worker_interval_secs = env::var("DELIVERY_WORKER_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok(),
            key_encryption_secret,
            domain,
            allowed_origins,
            api_keys,
            mapping_dir,
            enable_delivery_worker,
            delivery_worker_interval_secs,
            production,
        })
    }
}

fn parse_key_secret(hex_str: &str) -> CorsairResult<[u8; KEY_SECRET_BYTES]> {
    let trimmed = hex_str.trim();
    if trimmed.len() != KEY_SECRET_BYTES * 2 {
        return Err(CorsairError::usage(format!(
            "KEY_ENCRYPTION_SECRET must be exactly {} hex characters, got {}",
            KEY_SECRET_BYTES * 2,
            trimmed.len()
        )));
    }

    let mut bytes = [0u8; KEY_SECRET_BYTES];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let hi = hex_digit(trimmed.as_bytes()[i * 2])?;
        let lo = hex_digit(trimmed.as_bytes()[i * 2 + 1])?;
        *byte = (hi << 4) | lo;
    }
    Ok(bytes)
}

fn hex_digit(c: u8) -> CorsairResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        _ => Err(CorsairError::usage(
            "KEY_ENCRYPTION_SECRET must be lowercase hex",
        )),
    }
}
