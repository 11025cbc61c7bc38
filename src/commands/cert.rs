//! `corsair cert`: create, check, renew, and transition certifications via `CertificationEngine`.
//!
//! A subcommand-enum CLI over `CertificationEngine`; persistence follows the same whole-file
//! JSON read-modify-write pattern as `store::FileKeyStore`, since `CertificationEngine` itself
//! holds state only in memory for the lifetime of one process.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};

use crate::certification::{AuditResult, Certification, CertificationEngine, CertificationPolicy};
use crate::clock::SystemClock;
use crate::commands::{self, certifications_path, read_json_file, success};

#[derive(Args)]
pub struct CertArgs {
    #[command(subcommand)]
    pub command: CertCommand,
}

#[derive(Subcommand)]
pub enum CertCommand {
    /// Create a new certification for an organization against a policy and an initial audit
    Create {
        #[arg(long)]
        org: String,
        #[arg(long)]
        policy: PathBuf,
        #[arg(long)]
        audit: PathBuf,
    },
    /// Check a certification's current status and grace-period state
    Check {
        cert_id: String,
        #[arg(long)]
        policy: PathBuf,
    },
    /// List certifications, optionally filtered by organization
    List {
        #[arg(long)]
        org: Option<String>,
    },
    /// Re-assess a certification against a fresh audit, running drift detection
    Renew {
        cert_id: String,
        #[arg(long)]
        policy: PathBuf,
        #[arg(long)]
        audit: PathBuf,
    },
    /// Suspend a certification
    Suspend {
        cert_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Revoke a certification permanently
    Revoke {
        cert_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Print a certification's full status history
    History { cert_id: String },
    /// List certifications expiring within N days
    Expiring {
        #[arg(long = "within-days", default_value_t = 30)]
        within_days: i64,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CertStoreFile {
    certifications: Vec<Certification>,
}

fn load_store() -> Result<CertStoreFile> {
    let path = certifications_path();
    if !path.exists() {
        return Ok(CertStoreFile::default());
    }
    Ok(read_json_file(&path)?)
}

fn save_store(store: &CertStoreFile) -> Result<()> {
    let contents =
        serde_json::to_string_pretty(store).context("failed to encode certification store")?;
    commands::write_text_file(&certifications_path(), &contents)
}

pub fn run(args: CertArgs, json: bool) -> Result<()> {
    let clock = SystemClock;
    let store = load_store()?;
    let engine = CertificationEngine::with_certifications(&clock, store.certifications);

    match args.command {
        CertCommand::Create { org, policy, audit } => {
            let policy: CertificationPolicy = read_json_file(&policy)?;
            let audit: AuditResult = read_json_file(&audit)?;
            let certification = engine.create(org, &policy, audit);
            tracing::info!(
                cert_id = %certification.id,
                org_id = %certification.org_id,
                status = ?certification.status,
                "certification created"
            );
            persist_and_report(&engine, &certification, json, "certification created")?;
        }
        CertCommand::Check { cert_id, policy } => {
            let policy: CertificationPolicy = read_json_file(&policy)?;
            let check = engine.check_certification(&cert_id, &policy)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&check)?);
            } else {
                success(format!("{}: {:?}", check.certification.id, check.certification.status));
                commands::label("score", check.certification.current_score);
                commands::label("grace period expired", check.grace_period_expired);
            }
        }
        CertCommand::List { org } => {
            let certifications = engine.list_certifications(org.as_deref());
            print_certifications(&certifications, json)?;
        }
        CertCommand::Renew { cert_id, policy, audit } => {
            let policy: CertificationPolicy = read_json_file(&policy)?;
            let audit: AuditResult = read_json_file(&audit)?;
            let (certification, drift) = engine.renew_certification(&cert_id, &policy, audit)?;
            tracing::info!(
                cert_id = %certification.id,
                status = ?certification.status,
                score_delta = drift.score_delta,
                "certification renewed"
            );
            if json {
                let payload = serde_json::json!({"certification": certification, "drift": drift});
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                success(format!("renewed {}: now {:?}", certification.id, certification.status));
                commands::label("score delta", drift.score_delta);
                commands::label("recommendation", format!("{:?}", drift.recommendation));
            }
        }
        CertCommand::Suspend { cert_id, reason } => {
            transition(&engine, &cert_id, |e| e.suspend(&cert_id, reason.clone()), json)?;
        }
        CertCommand::Revoke { cert_id, reason } => {
            transition(&engine, &cert_id, |e| e.revoke(&cert_id, reason.clone()), json)?;
        }
        CertCommand::History { cert_id } => {
            let certification = engine.get(&cert_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&certification.status_history)?);
            } else {
                for entry in &certification.status_history {
                    println!("  {} {:?} — {}", entry.at.to_rfc3339(), entry.status, entry.reason);
                }
            }
        }
        CertCommand::Expiring { within_days } => {
            let certifications = engine.get_expiring_certifications(within_days);
            print_certifications(&certifications, json)?;
        }
    }

    save_store(&CertStoreFile {
        certifications: engine.snapshot(),
    })?;
    Ok(())
}

fn transition(
    engine: &CertificationEngine,
    cert_id: &str,
    f: impl FnOnce(&CertificationEngine) -> crate::error::CorsairResult<Option<Certification>>,
    json: bool,
) -> Result<()> {
    match f(engine)? {
        Some(certification) => {
            tracing::info!(cert_id = %certification.id, status = ?certification.status, "certification transitioned");
            if json {
                println!("{}", serde_json::to_string_pretty(&certification)?);
            } else {
                success(format!("{} is now {:?}", certification.id, certification.status));
            }
            Ok(())
        }
        None => {
            let current = engine.get(cert_id)?;
            Err(crate::error::CorsairError::constraint_violation(format!(
                "cannot transition {} out of {:?}",
                cert_id, current.status
            ))
            .into())
        }
    }
}

fn persist_and_report(
    _engine: &CertificationEngine,
    certification: &Certification,
    json: bool,
    banner: &str,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(certification)?);
    } else {
        success(banner);
        commands::label("id", &certification.id);
        commands::label("status", format!("{:?}", certification.status));
        commands::label("score", certification.current_score);
    }
    Ok(())
}

fn print_certifications(certifications: &[Certification], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(certifications)?);
    } else {
        for certification in certifications {
            println!(
                "  {} [{}] {:?} score={}",
                certification.id, certification.org_id, certification.status, certification.current_score
            );
        }
        if certifications.is_empty() {
            println!("  (none)");
        }
    }
    Ok(())
}
