//! `corsair verify`: check a CPOE's signature, issuer DID, and expiry.
//!
//! Reads a token from a file, prints valid or invalid, and exits non-zero on failure. Delegates
//! to `Verifier::verify`, which resolves the issuer's `did:web` document over HTTP and
//! classifies the issuer tier.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::clock::SystemClock;
use crate::commands::{failure, success};
use crate::config::CorsairConfig;
use crate::error::CorsairError;
use crate::verification::{HttpDidResolver, IssuerTier, Verifier};

#[derive(Args)]
pub struct VerifyArgs {
    /// Path to the CPOE to verify (a signed JWT-VC, optionally with `~`-joined SD-JWT
    /// disclosures)
    pub cpoe: PathBuf,

    /// Additional trusted issuer domain, beyond CORSAIR_ALLOWED_ORIGINS (repeatable)
    #[arg(long = "trust")]
    pub trust: Vec<String>,

    /// Verify a legacy (pre-VC) envelope instead of a JWT-VC CPOE
    #[arg(long)]
    pub legacy: bool,
}

#[derive(Debug, Serialize)]
struct VerifyOutput {
    valid: bool,
    #[serde(rename = "issuerTier")]
    issuer_tier: IssuerTier,
    expired: bool,
    reason: String,
}

pub fn run(args: VerifyArgs, json: bool) -> Result<()> {
    let config = CorsairConfig::from_env()?;
    let contents = fs::read_to_string(&args.cpoe)
        .with_context(|| format!("failed to read {}", args.cpoe.display()))?;
    let cpoe = contents.trim();

    let mut trusted_domains = config.allowed_origins.clone();
    trusted_domains.extend(args.trust.iter().cloned());

    let resolver = HttpDidResolver::new();
    let clock = SystemClock;
    let verifier = Verifier::new(&resolver, &clock, trusted_domains);

    let result = if args.legacy {
        verifier.verify_legacy_envelope(cpoe)?
    } else {
        verifier.verify(cpoe)?
    };
    tracing::info!(path = %args.cpoe.display(), valid = result.valid, "verify command completed");

    let output = VerifyOutput {
        valid: result.valid,
        issuer_tier: result.issuer_tier,
        expired: result.expired,
        reason: result.reason,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if output.valid {
        success("CPOE is valid");
        println!("  issuer tier: {:?}", output.issuer_tier);
        if output.expired {
            println!("  note: within grace window but past its original expiry");
        }
    } else {
        failure("CPOE is invalid");
        println!("  reason: {}", output.reason);
    }

    if !output.valid {
        return Err(CorsairError::validation(output.reason).into());
    }
    Ok(())
}
