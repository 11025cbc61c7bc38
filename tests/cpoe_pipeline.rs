//! End-to-end coverage of the issue/verify/log/certify pipeline: fixture-driven sign-then-verify
//! round trips run against the public library API rather than the CLI binary. Covers a clean
//! sign-and-verify round trip, an expired-but-decodable credential, an algorithm mismatch, and
//! certification drift triggering auto-suspend.

use anyhow::Result;
use chrono::Duration;
use serde_json::json;
use uuid::Uuid;

use corsair_core::assembler::{AssembleOverrides, CPOEAssembler};
use corsair_core::certification::{
    AuditResult, CertStatus, CertificationEngine, CertificationPolicy, DriftRecommendation,
};
use corsair_core::clock::{Clock, FixedClock, SystemClock};
use corsair_core::envelope::{self, Payload, VerifiableCredential};
use corsair_core::evidence::EvidenceNormalizer;
use corsair_core::keymanager::KeyManager;
use corsair_core::store::MemoryKeyStore;
use corsair_core::verification::{StaticDidResolver, Verifier};

const SECRET: [u8; 32] = [7u8; 32];
const DOMAIN: &str = "corsair.example";

fn issue(evidence: &serde_json::Value, expiry_days: u32) -> Result<(String, MemoryKeyStore)> {
    let store = MemoryKeyStore::new();
    let clock = SystemClock;
    let manager = KeyManager::new(&store, &clock);
    manager.generate(&SECRET)?;

    let normalized = EvidenceNormalizer::new().normalize(evidence)?;
    let assembled = CPOEAssembler::new().assemble(&normalized.document, &AssembleOverrides::default());

    let issuer = format!("did:web:{DOMAIN}");
    let now = clock.now();
    let valid_until = now + Duration::days(expiry_days as i64);

    let payload = Payload {
        iss: issuer.clone(),
        sub: format!("urn:corsair:marque:{}", assembled.marque_id),
        iat: now.timestamp(),
        exp: valid_until.timestamp(),
        jti: format!("urn:uuid:{}", Uuid::new_v4()),
        parley: "1.0".to_string(),
        vc: VerifiableCredential {
            context: vec!["https://www.w3.org/2018/credentials/v1".to_string()],
            type_: vec!["VerifiableCredential".to_string(), "CPOE".to_string()],
            issuer: issuer.clone(),
            valid_from: now,
            valid_until,
            credential_subject: serde_json::to_value(&assembled.subject)?,
        },
    };

    let cpoe = envelope::sign(&manager, &SECRET, &payload)?;
    Ok((cpoe, store))
}

fn resolver_for(store: &MemoryKeyStore, domain: &str) -> Result<StaticDidResolver> {
    let clock = SystemClock;
    let manager = KeyManager::new(store, &clock);
    let did = format!("did:web:{domain}");
    let document = manager.did_document(domain)?;
    Ok(StaticDidResolver::new().with(did, document))
}

#[test]
fn scenario_s1_sign_and_verify_round_trip() -> Result<()> {
    let evidence = json!({
        "metadata": {"title": "Q3 pen test", "issuer": "Acme Security", "scope": "prod-api", "date": "2026-07-01T00:00:00Z"},
        "controls": [
            {"id": "c1", "description": "TLS enforced", "status": "pass"},
            {"id": "c2", "description": "MFA enforced", "status": "pass"},
            {"id": "c3", "description": "Secrets rotated", "status": "fail", "severity": "HIGH"},
        ]
    });

    let (cpoe, store) = issue(&evidence, 90)?;
    let resolver = resolver_for(&store, DOMAIN)?;
    let clock = SystemClock;
    let verifier = Verifier::new(&resolver, &clock, vec![DOMAIN.to_string()]);

    let result = verifier.verify(&cpoe)?;
    assert!(result.valid);
    assert!(result.reason.contains("JWT-VC signature valid"));

    let payload = result.payload.expect("decoded payload");
    let subject = payload.vc.credential_subject;
    assert_eq!(subject["summary"]["controlsTested"], 3);
    assert_eq!(subject["summary"]["controlsPassed"], 2);
    assert_eq!(subject["summary"]["controlsFailed"], 1);
    assert_eq!(subject["summary"]["overallScore"], 67);
    Ok(())
}

#[test]
fn scenario_s2_expired_cpoe_is_invalid_but_still_decodable() -> Result<()> {
    let evidence = json!({
        "metadata": {"title": "stale scan", "issuer": "Acme", "scope": "prod", "date": "2026-01-01T00:00:00Z"},
        "controls": [{"id": "c1", "description": "check", "status": "pass"}],
    });

    let store = MemoryKeyStore::new();
    let issue_clock = FixedClock::new(chrono::Utc::now() - Duration::days(10));
    let manager = KeyManager::new(&store, &issue_clock);
    manager.generate(&SECRET)?;

    let normalized = EvidenceNormalizer::new().normalize(&evidence)?;
    let assembled = CPOEAssembler::new().assemble(&normalized.document, &AssembleOverrides::default());

    let issuer = format!("did:web:{DOMAIN}");
    let now = issue_clock.now();
    let valid_until = now + Duration::seconds(1);
    let payload = Payload {
        iss: issuer.clone(),
        sub: format!("urn:corsair:marque:{}", assembled.marque_id),
        iat: now.timestamp(),
        exp: valid_until.timestamp(),
        jti: format!("urn:uuid:{}", Uuid::new_v4()),
        parley: "1.0".to_string(),
        vc: VerifiableCredential {
            context: vec!["https://www.w3.org/2018/credentials/v1".to_string()],
            type_: vec!["VerifiableCredential".to_string(), "CPOE".to_string()],
            issuer: issuer.clone(),
            valid_from: now,
            valid_until,
            credential_subject: serde_json::to_value(&assembled.subject)?,
        },
    };
    let cpoe = envelope::sign(&manager, &SECRET, &payload)?;

    let resolver = resolver_for(&store, DOMAIN)?;
    let verify_clock = SystemClock;
    let verifier = Verifier::new(&resolver, &verify_clock, vec![DOMAIN.to_string()]);

    let result = verifier.verify(&cpoe)?;
    assert!(!result.valid);
    assert!(result.expired);
    assert!(result.reason.to_lowercase().contains("expired"));
    assert!(result.payload.is_some(), "subject stays visible even when expired");
    Ok(())
}

#[test]
fn scenario_s3_alg_mismatch_is_unsupported_algorithm() -> Result<()> {
    let evidence = json!({
        "metadata": {"title": "scan", "issuer": "Acme", "scope": "prod", "date": "2026-07-01T00:00:00Z"},
        "controls": [{"id": "c1", "description": "check", "status": "pass"}],
    });
    let (cpoe, store) = issue(&evidence, 30)?;

    let mut segments: Vec<&str> = cpoe.split('.').collect();
    let header = json!({"alg": "HS256", "typ": "vc+jwt", "kid": "x"});
    let header_b64 = base64::Engine::encode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        serde_json::to_vec(&header)?,
    );
    segments[0] = &header_b64;
    let forged = segments.join(".");

    let resolver = resolver_for(&store, DOMAIN)?;
    let clock = SystemClock;
    let verifier = Verifier::new(&resolver, &clock, vec![DOMAIN.to_string()]);

    let result = verifier.verify(&forged)?;
    assert!(!result.valid);
    assert!(result.reason.contains("Unsupported algorithm"));
    Ok(())
}

#[test]
fn scenario_s6_certification_drift_suspends_under_auto_suspend() -> Result<()> {
    let clock = FixedClock::new(chrono::Utc::now());
    let policy = CertificationPolicy {
        id: "policy-1".to_string(),
        name: "baseline".to_string(),
        scope: "prod".to_string(),
        minimum_score: 70,
        warning_threshold: 85,
        audit_interval_days: 90,
        freshness_max_days: 30,
        grace_period_days: 14,
        auto_renew: true,
        auto_suspend: true,
        notify_on_change: false,
    };

    let engine = CertificationEngine::new(&clock);
    let initial = AuditResult {
        score: 85,
        grade: "B".to_string(),
        findings: vec![],
    };
    let cert = engine.create("org-1", &policy, initial);
    assert_eq!(cert.status, CertStatus::Active);

    let (renewed, drift) = engine.renew_certification(
        &cert.id,
        &policy,
        AuditResult {
            score: 50,
            grade: "F".to_string(),
            findings: vec![],
        },
    )?;
    assert_eq!(drift.recommendation, DriftRecommendation::Suspend);
    assert_eq!(renewed.status, CertStatus::Suspended);
    Ok(())
}
