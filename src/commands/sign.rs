//! `corsair sign`: normalize an evidence document, assemble it into a CPOE credential subject,
//! and sign the result as a JWT-VC (optionally with SD-JWT disclosures).
//!
//! `--payload`-style file in, `--out` file out; runs the
//! `EvidenceNormalizer -> CPOEAssembler -> envelope::sign` pipeline and optionally wires
//! `--disclose` into the SD-JWT path.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::assembler::{AssembleOverrides, CPOEAssembler};
use crate::clock::{Clock, SystemClock};
use crate::commands::{self, read_json_file, success, write_text_file};
use crate::config::CorsairConfig;
use crate::envelope::{self, Payload, VerifiableCredential};
use crate::evidence::{EvidenceNormalizer, MappingPackAdapter};
use crate::keymanager::KeyManager;

#[derive(Args)]
pub struct SignArgs {
    /// Evidence or assessment document to sign (JSON)
    #[arg(long)]
    pub evidence: PathBuf,

    /// Output path for the signed CPOE
    #[arg(long)]
    pub out: PathBuf,

    /// Mapping-pack JSON file describing how to interpret raw scanner evidence, tried before the
    /// built-in generic `{metadata, controls}` adapter
    #[arg(long)]
    pub mapping: Option<PathBuf>,

    /// Override the issuer DID (defaults to `did:web:<CORSAIR_DOMAIN>`)
    #[arg(long)]
    pub did: Option<String>,

    /// Override the assessment's scope
    #[arg(long)]
    pub scope: Option<String>,

    /// Override the CPOE's validity window, in days
    #[arg(long = "expiry-days")]
    pub expiry_days: Option<u32>,

    /// Override the provenance source (`self`, `tool`, or `auditor`)
    #[arg(long)]
    pub source: Option<String>,

    /// `credentialSubject` claim names to redact behind SD-JWT disclosures
    #[arg(long = "disclose")]
    pub disclose: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SignOutput {
    #[serde(rename = "marqueId")]
    marque_id: String,
    issuer: String,
    scope: String,
    format: String,
    #[serde(rename = "expiresAt")]
    expires_at: chrono::DateTime<chrono::Utc>,
    warnings: Vec<String>,
    out: String,
}

pub fn run(args: SignArgs, json: bool) -> Result<()> {
    let config = CorsairConfig::from_env()?;

    let input: Value = read_json_file(&args.evidence)?;
    let normalizer = match &args.mapping {
        Some(path) => {
            let mapping: Value = read_json_file(path)?;
            EvidenceNormalizer::with_mapping_adapter(MappingPackAdapter::from_mapping(&mapping)?)
        }
        None => EvidenceNormalizer::new(),
    };
    let normalized = normalizer.normalize(&input)?;

    let assembler = CPOEAssembler::new();
    let overrides = AssembleOverrides {
        did: args.did.clone(),
        scope: args.scope.clone(),
        expiry_days: args.expiry_days,
        source: args.source.clone(),
    };
    let assembled = assembler.assemble(&normalized.document, &overrides);

    let issuer = args
        .did
        .clone()
        .unwrap_or_else(|| format!("did:web:{}", config.domain));

    let key_store = commands::open_key_store()?;
    let clock = SystemClock;
    let manager = KeyManager::new(&key_store, &clock);

    let now = clock.now();
    let valid_until = now + Duration::days(assembled.expiry_days as i64);
    let mut credential_subject = serde_json::to_value(&assembled.subject)
        .context("failed to encode credential subject")?;

    let disclosure_names: Vec<&str> = args.disclose.iter().map(String::as_str).collect();
    let disclosures = if disclosure_names.is_empty() {
        Vec::new()
    } else {
        envelope::create_disclosures(&mut credential_subject, &disclosure_names)?
    };

    let payload = Payload {
        iss: issuer.clone(),
        sub: format!("urn:corsair:marque:{}", assembled.marque_id),
        iat: now.timestamp(),
        exp: valid_until.timestamp(),
        jti: format!("urn:uuid:{}", Uuid::new_v4()),
        parley: "1.0".to_string(),
        vc: VerifiableCredential {
            context: vec![
                "https://www.w3.org/2018/credentials/v1".to_string(),
                "https://corsair.example/contexts/cpoe/v1".to_string(),
            ],
            type_: vec!["VerifiableCredential".to_string(), "CPOE".to_string()],
            issuer: issuer.clone(),
            valid_from: now,
            valid_until,
            credential_subject,
        },
    };

    let jwt = envelope::sign(&manager, &config.key_encryption_secret, &payload)?;
    let cpoe = if disclosures.is_empty() {
        jwt
    } else {
        envelope::append_disclosures(&jwt, &disclosures)
    };

    write_text_file(&args.out, &cpoe)?;
    tracing::info!(marque_id = %assembled.marque_id, issuer = %issuer, out = %args.out.display(), "signed CPOE");

    let mut warnings = normalized.warnings;
    warnings.extend(assembled.warnings);
    for warning in &warnings {
        tracing::warn!(marque_id = %assembled.marque_id, "{warning}");
    }

    let output = SignOutput {
        marque_id: assembled.marque_id,
        issuer,
        scope: assembled.subject.scope,
        format: normalized.format,
        expires_at: valid_until,
        warnings,
        out: args.out.display().to_string(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        success(format!("Signed CPOE -> {}", output.out));
        commands::label("marque id", &output.marque_id);
        commands::label("issuer", &output.issuer);
        commands::label("scope", &output.scope);
        commands::label("expires at", output.expires_at);
        for warning in &output.warnings {
            println!("  warning: {warning}");
        }
    }

    Ok(())
}
