//! `corsair tprm`: third-party risk management, a thin layer over `Verifier` and
//! `CertificationEngine` for tracking vendor CPOEs.
//!
//! No new cryptographic or state-machine surface: a vendor is an org tracked the same way an
//! internal certification subject is, `assess` runs a CPOE verification plus a
//! `CertificationEngine::renew_certification` (or an initial `create`) against the vendor's
//! policy, and `dashboard` is a read-only projection over `get_expiring_certifications`/
//! `get_suspended_certifications`. Persistence follows the same whole-file JSON pattern as
//! `commands::cert`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};

use crate::certification::{AuditResult, CertificationEngine, CertificationPolicy, Finding};
use crate::clock::SystemClock;
use crate::commands::{self, certifications_path, read_json_file, success, vendors_path};
use crate::config::CorsairConfig;
use crate::error::CorsairError;
use crate::verification::{HttpDidResolver, Verifier};

#[derive(Args)]
pub struct TprmArgs {
    #[command(subcommand)]
    pub command: TprmCommand,
}

#[derive(Subcommand)]
pub enum TprmCommand {
    /// Register a new vendor under a certification policy
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        policy: PathBuf,
        /// Trusted issuer domain for this vendor's CPOEs (optional)
        #[arg(long)]
        domain: Option<String>,
    },
    /// Verify a vendor's CPOE and update (or create) their certification
    Assess {
        vendor_id: String,
        #[arg(long)]
        cpoe: PathBuf,
    },
    /// List registered vendors
    Vendors {
        #[arg(long)]
        org: Option<String>,
    },
    /// Show a vendor's current certification
    Assessment { vendor_id: String },
    /// Read-only summary of at-risk vendors across the portfolio
    Dashboard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Vendor {
    id: String,
    name: String,
    #[serde(rename = "orgId")]
    org_id: String,
    policy: CertificationPolicy,
    domain: Option<String>,
    #[serde(rename = "certId")]
    cert_id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VendorRegistryFile {
    vendors: Vec<Vendor>,
}

fn load_vendors() -> Result<VendorRegistryFile> {
    let path = vendors_path();
    if !path.exists() {
        return Ok(VendorRegistryFile::default());
    }
    Ok(read_json_file(&path)?)
}

fn save_vendors(registry: &VendorRegistryFile) -> Result<()> {
    let contents = serde_json::to_string_pretty(registry).context("failed to encode vendor registry")?;
    commands::write_text_file(&vendors_path(), &contents)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CertStoreFile {
    certifications: Vec<crate::certification::Certification>,
}

fn load_certifications() -> Result<CertStoreFile> {
    let path = certifications_path();
    if !path.exists() {
        return Ok(CertStoreFile::default());
    }
    Ok(read_json_file(&path)?)
}

fn save_certifications(store: &CertStoreFile) -> Result<()> {
    let contents = serde_json::to_string_pretty(store).context("failed to encode certification store")?;
    commands::write_text_file(&certifications_path(), &contents)
}

fn grade_for(score: u32) -> String {
    match score {
        90..=100 => "A".to_string(),
        80..=89 => "B".to_string(),
        70..=79 => "C".to_string(),
        60..=69 => "D".to_string(),
        _ => "F".to_string(),
    }
}

pub fn run(args: TprmArgs, json: bool) -> Result<()> {
    match args.command {
        TprmCommand::Register { name, org, policy, domain } => {
            let policy: CertificationPolicy = read_json_file(&policy)?;
            let mut registry = load_vendors()?;
            let vendor = Vendor {
                id: format!("vendor-{}", uuid::Uuid::new_v4()),
                name,
                org_id: org,
                policy,
                domain,
                cert_id: None,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&vendor)?);
            } else {
                success(format!("registered vendor {}", vendor.id));
            }
            tracing::info!(vendor_id = %vendor.id, org_id = %vendor.org_id, "registered vendor");
            registry.vendors.push(vendor);
            save_vendors(&registry)?;
        }
        TprmCommand::Assess { vendor_id, cpoe } => {
            let config = CorsairConfig::from_env()?;
            let mut registry = load_vendors()?;
            let vendor = registry
                .vendors
                .iter()
                .find(|v| v.id == vendor_id)
                .cloned()
                .ok_or_else(|| CorsairError::not_found(format!("no vendor '{vendor_id}'")))?;

            let contents = fs::read_to_string(&cpoe)
                .with_context(|| format!("failed to read {}", cpoe.display()))?;

            let mut trusted_domains = config.allowed_origins.clone();
            trusted_domains.extend(vendor.domain.iter().cloned());
            let resolver = HttpDidResolver::new();
            let clock = SystemClock;
            let verifier = Verifier::new(&resolver, &clock, trusted_domains);
            let verification = verifier.verify(contents.trim())?;

            if !verification.valid {
                return Err(CorsairError::validation(format!(
                    "vendor CPOE failed verification: {}",
                    verification.reason
                ))
                .into());
            }

            let payload = verification
                .payload
                .ok_or_else(|| CorsairError::validation("verified CPOE carried no payload"))?;
            let score = payload
                .vc
                .credential_subject
                .get("summary")
                .and_then(|s| s.get("overallScore"))
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0) as u32;
            let audit = AuditResult {
                score,
                grade: grade_for(score),
                findings: Vec::<Finding>::new(),
            };

            let cert_store = load_certifications()?;
            let engine = CertificationEngine::with_certifications(&clock, cert_store.certifications);

            let (certification, drift) = match &vendor.cert_id {
                Some(cert_id) => engine.renew_certification(cert_id, &vendor.policy, audit)?,
                None => {
                    let certification = engine.create(vendor.org_id.clone(), &vendor.policy, audit);
                    (
                        certification.clone(),
                        crate::certification::DriftResult {
                            score_delta: 0,
                            degraded_controls: Vec::new(),
                            recommendation: crate::certification::DriftRecommendation::Monitor,
                        },
                    )
                }
            };

            if let Some(v) = registry.vendors.iter_mut().find(|v| v.id == vendor_id) {
                v.cert_id = Some(certification.id.clone());
            }
            save_vendors(&registry)?;
            save_certifications(&CertStoreFile {
                certifications: engine.snapshot(),
            })?;
            tracing::info!(
                vendor_id = %vendor_id,
                cert_id = %certification.id,
                status = ?certification.status,
                score_delta = drift.score_delta,
                "assessed vendor CPOE"
            );

            if json {
                let payload = serde_json::json!({"certification": certification, "drift": drift});
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                success(format!("{}: now {:?} (score {})", vendor.name, certification.status, certification.current_score));
            }
        }
        TprmCommand::Vendors { org } => {
            let registry = load_vendors()?;
            let vendors: Vec<&Vendor> = registry
                .vendors
                .iter()
                .filter(|v| org.as_deref().map(|o| v.org_id == o).unwrap_or(true))
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&vendors)?);
            } else {
                for vendor in &vendors {
                    println!("  {} [{}] {}", vendor.id, vendor.org_id, vendor.name);
                }
                if vendors.is_empty() {
                    println!("  (none)");
                }
            }
        }
        TprmCommand::Assessment { vendor_id } => {
            let registry = load_vendors()?;
            let vendor = registry
                .vendors
                .iter()
                .find(|v| v.id == vendor_id)
                .ok_or_else(|| CorsairError::not_found(format!("no vendor '{vendor_id}'")))?;
            let cert_id = vendor
                .cert_id
                .as_ref()
                .ok_or_else(|| CorsairError::not_found(format!("vendor '{vendor_id}' has not been assessed yet")))?;

            let clock = SystemClock;
            let cert_store = load_certifications()?;
            let engine = CertificationEngine::with_certifications(&clock, cert_store.certifications);
            let certification = engine.get(cert_id)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&certification)?);
            } else {
                success(format!("{}: {:?}", vendor.name, certification.status));
                commands::label("score", certification.current_score);
                commands::label("grade", &certification.current_grade);
            }
        }
        TprmCommand::Dashboard => {
            let registry = load_vendors()?;
            let clock = SystemClock;
            let cert_store = load_certifications()?;
            let engine = CertificationEngine::with_certifications(&clock, cert_store.certifications);

            let expiring = engine.get_expiring_certifications(30);
            let suspended = engine.get_suspended_certifications();

            let name_for = |cert_id: &str| -> Option<&str> {
                registry
                    .vendors
                    .iter()
                    .find(|v| v.cert_id.as_deref() == Some(cert_id))
                    .map(|v| v.name.as_str())
            };

            if json {
                let payload = serde_json::json!({"expiring": expiring, "suspended": suspended});
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                success(format!("{} vendor(s) tracked", registry.vendors.len()));
                println!("  expiring within 30 days:");
                for cert in &expiring {
                    println!("    {} ({:?})", name_for(&cert.id).unwrap_or(&cert.id), cert.status);
                }
                println!("  suspended:");
                for cert in &suspended {
                    println!("    {} ({:?})", name_for(&cert.id).unwrap_or(&cert.id), cert.status);
                }
            }
        }
    }
    Ok(())
}
