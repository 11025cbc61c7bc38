//! `corsair keygen`: generate the active signing key, or rotate it, under `.corsair/keys.json`.
//!
//! EdDSA-only (no algorithm choice), routed through `KeyManager`/`FileKeyStore` rather than
//! writing PEM files directly, since key material here is encrypted-at-rest and store-backed,
//! not a bare file on disk.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::clock::SystemClock;
use crate::commands::{self, success};
use crate::config::CorsairConfig;
use crate::keymanager::KeyManager;

#[derive(Args)]
pub struct KeygenArgs {
    /// Retire the current active key and generate a fresh one, instead of requiring that none
    /// exist yet.
    #[arg(long)]
    pub rotate: bool,
}

#[derive(Debug, Serialize)]
struct KeygenOutput {
    #[serde(rename = "keyId")]
    key_id: String,
    algorithm: String,
    #[serde(rename = "publicKeyPem")]
    public_key_pem: String,
    rotated: bool,
}

pub fn run(args: KeygenArgs, json: bool) -> Result<()> {
    let config = CorsairConfig::from_env()?;
    let store = commands::open_key_store()?;
    let clock = SystemClock;
    let manager = KeyManager::new(&store, &clock);

    let record = if args.rotate {
        manager.rotate(&config.key_encryption_secret)?
    } else {
        manager.generate(&config.key_encryption_secret)?
    };
    tracing::info!(key_id = %record.key_id, rotated = args.rotate, "keygen command completed");

    let output = KeygenOutput {
        key_id: record.key_id,
        algorithm: record.algorithm,
        public_key_pem: record.public_key_pem,
        rotated: args.rotate,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        success(if args.rotate { "Key rotated" } else { "Key generated" });
        commands::label("key id", &output.key_id);
        commands::label("algorithm", &output.algorithm);
        println!();
        println!("{}", output.public_key_pem);
    }
    Ok(())
}
