//! `CPOEAssembler`: turns a normalized [`AssessmentDocument`] into a `CredentialSubject`.
//!
//! Resolves overrides against document fields with an explicit fallback order, then fills in
//! the summary/provenance/assurance/process-provenance sub-objects.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::evidence::{AssessmentDocument, ControlStatus, Severity};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProvenanceSource {
    #[serde(rename = "self")]
    SelfAttested,
    Tool,
    Auditor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
    pub source: ProvenanceSource,
    #[serde(rename = "sourceIdentity", skip_serializing_if = "Option::is_none")]
    pub source_identity: Option<String>,
    #[serde(rename = "sourceDate", skip_serializing_if = "Option::is_none")]
    pub source_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityDistribution {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
    #[serde(rename = "controlsTested")]
    pub controls_tested: u32,
    #[serde(rename = "controlsPassed")]
    pub controls_passed: u32,
    #[serde(rename = "controlsFailed")]
    pub controls_failed: u32,
    #[serde(rename = "overallScore")]
    pub overall_score: u32,
    #[serde(rename = "severityDistribution", skip_serializing_if = "Option::is_none")]
    pub severity_distribution: Option<SeverityDistribution>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessProvenance {
    #[serde(rename = "chainDigest")]
    pub chain_digest: String,
    #[serde(rename = "receiptCount")]
    pub receipt_count: u32,
    #[serde(rename = "chainVerified")]
    pub chain_verified: bool,
    pub format: String,
    #[serde(rename = "reproducibleSteps")]
    pub reproducible_steps: u32,
    #[serde(rename = "attestedSteps")]
    pub attested_steps: u32,
    #[serde(rename = "scittEntryIds", default, skip_serializing_if = "Vec::is_empty")]
    pub scitt_entry_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialSubject {
    #[serde(rename = "type")]
    pub type_: String,
    pub scope: String,
    pub provenance: Provenance,
    pub summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frameworks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assurance: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Value>,
    #[serde(rename = "evidenceTypes", skip_serializing_if = "Option::is_none")]
    pub evidence_types: Option<Vec<String>>,
    #[serde(rename = "observationPeriod", skip_serializing_if = "Option::is_none")]
    pub observation_period: Option<String>,
    #[serde(rename = "processProvenance", skip_serializing_if = "Option::is_none")]
    pub process_provenance: Option<ProcessProvenance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Value>,
}

/// Caller-supplied overrides applied in preference to whatever the normalized document carries:
/// issuer `did`, `scope`, and the credential's `expiryDays`.
#[derive(Debug, Clone, Default)]
pub struct AssembleOverrides {
    pub did: Option<String>,
    pub scope: Option<String>,
    pub expiry_days: Option<u32>,
    pub source: Option<String>,
}

pub const DEFAULT_EXPIRY_DAYS: u32 = 90;

/// Output of assembling a CPOE: the subject plus expiry, marque id, and any new warnings
/// discovered while assembling (on top of whatever `EvidenceNormalizer` already collected).
#[derive(Debug, Clone)]
pub struct AssembleResult {
    pub marque_id: String,
    pub subject: CredentialSubject,
    pub expiry_days: u32,
    pub warnings: Vec<String>,
}

/// Generates a unique marque id: monotonic sequence number + a random suffix.
pub struct MarqueIdGenerator {
    next_sequence: std::sync::atomic::AtomicU64,
}

impl Default for MarqueIdGenerator {
    fn default() -> Self {
        Self {
            next_sequence: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

impl MarqueIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> String {
        let sequence = self.next_sequence.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("marque-{sequence:08x}-{}", Uuid::new_v4().simple())
    }
}

pub struct CPOEAssembler {
    marque_ids: MarqueIdGenerator,
}

impl Default for CPOEAssembler {
    fn default() -> Self {
        Self {
            marque_ids: MarqueIdGenerator::new(),
        }
    }
}

impl CPOEAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assemble(&self, document: &AssessmentDocument, overrides: &AssembleOverrides) -> AssembleResult {
        let mut warnings = Vec::new();

        let controls_passed = document
            .controls
            .iter()
            .filter(|c| c.status == ControlStatus::Pass)
            .count() as u32;
        let controls_failed = document
            .controls
            .iter()
            .filter(|c| c.status == ControlStatus::Fail)
            .count() as u32;
        let controls_skipped = document
            .controls
            .iter()
            .filter(|c| c.status == ControlStatus::Skip)
            .count() as u32;
        let controls_tested = controls_passed + controls_failed + controls_skipped;
        let overall_score = if controls_tested > 0 {
            ((controls_passed as f64 * 100.0) / controls_tested as f64).round() as u32
        } else {
            0
        };

        let severity_distribution = if document.controls.iter().any(|c| c.severity.is_some()) {
            let mut dist = SeverityDistribution::default();
            for control in &document.controls {
                match control.severity {
                    Some(Severity::Critical) => dist.critical += 1,
                    Some(Severity::High) => dist.high += 1,
                    Some(Severity::Medium) => dist.medium += 1,
                    Some(Severity::Low) => dist.low += 1,
                    None => {}
                }
            }
            Some(dist)
        } else {
            None
        };

        let summary = Summary {
            controls_tested,
            controls_passed,
            controls_failed,
            overall_score,
            severity_distribution,
        };

        let provenance = resolve_provenance(document, overrides);

        let scope = overrides
            .scope
            .clone()
            .or_else(|| document.metadata.scope.clone())
            .unwrap_or_else(|| {
                warnings.push("no scope provided; defaulting to 'unspecified'".to_string());
                "unspecified".to_string()
            });

        let frameworks: Vec<String> = document
            .controls
            .iter()
            .flat_map(|c| c.framework_mappings.iter().map(|m| m.framework.clone()))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let subject = CredentialSubject {
            type_: "CorsairCPOE".to_string(),
            scope,
            provenance,
            summary,
            frameworks: if frameworks.is_empty() { None } else { Some(frameworks) },
            assurance: None,
            dimensions: None,
            evidence_types: None,
            observation_period: None,
            process_provenance: None,
            freshness: None,
        };

        AssembleResult {
            marque_id: self.marque_ids.next(),
            subject,
            expiry_days: overrides.expiry_days.unwrap_or(DEFAULT_EXPIRY_DAYS),
            warnings,
        }
    }
}

fn resolve_provenance(document: &AssessmentDocument, overrides: &AssembleOverrides) -> Provenance {
    let source = match overrides.source.as_deref() {
        Some("manual") => ProvenanceSource::SelfAttested,
        Some("tool") => ProvenanceSource::Tool,
        Some("auditor") => ProvenanceSource::Auditor,
        Some("self") => ProvenanceSource::SelfAttested,
        _ => ProvenanceSource::SelfAttested,
    };

    Provenance {
        source,
        source_identity: document.metadata.issuer.clone(),
        source_date: document.metadata.date.clone().or_else(|| Some(Utc::now().to_rfc3339())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{AssessmentMetadata, Control, FrameworkMapping};

    fn control(id: &str, status: ControlStatus, severity: Option<Severity>) -> Control {
        Control {
            id: id.to_string(),
            description: "desc".to_string(),
            status,
            severity,
            evidence: None,
            framework_mappings: Vec::new(),
        }
    }

    #[test]
    fn summary_math_matches_invariant_4() {
        let document = AssessmentDocument {
            metadata: AssessmentMetadata {
                title: "t".to_string(),
                issuer: Some("Acme".to_string()),
                scope: Some("prod".to_string()),
                date: Some(Utc::now().to_rfc3339()),
                report_type: None,
            },
            controls: vec![
                control("c1", ControlStatus::Pass, None),
                control("c2", ControlStatus::Pass, None),
                control("c3", ControlStatus::Fail, Some(Severity::High)),
            ],
        };
        let assembler = CPOEAssembler::new();
        let result = assembler.assemble(&document, &AssembleOverrides::default());

        assert_eq!(result.subject.summary.controls_tested, 3);
        assert_eq!(result.subject.summary.controls_passed, 2);
        assert_eq!(result.subject.summary.controls_failed, 1);
        assert_eq!(result.subject.summary.overall_score, 67);
        assert_eq!(
            result.subject.summary.severity_distribution,
            Some(SeverityDistribution {
                high: 1,
                ..Default::default()
            })
        );
    }

    #[test]
    fn unknown_status_controls_are_excluded_from_controls_tested() {
        let document = AssessmentDocument {
            metadata: AssessmentMetadata {
                title: "t".to_string(),
                issuer: Some("Acme".to_string()),
                scope: Some("prod".to_string()),
                date: Some(Utc::now().to_rfc3339()),
                report_type: None,
            },
            controls: vec![
                control("c1", ControlStatus::Pass, None),
                control("c2", ControlStatus::Fail, None),
                control("c3", ControlStatus::Skip, None),
                control("c4", ControlStatus::Unknown, None),
            ],
        };
        let assembler = CPOEAssembler::new();
        let result = assembler.assemble(&document, &AssembleOverrides::default());

        assert_eq!(result.subject.summary.controls_tested, 3, "Unknown-status control must not count");
        assert_eq!(result.subject.summary.controls_passed, 1);
        assert_eq!(result.subject.summary.controls_failed, 1);
        assert_eq!(result.subject.summary.overall_score, 33);
    }

    #[test]
    fn zero_controls_score_zero_and_no_severity_distribution() {
        let document = AssessmentDocument {
            metadata: AssessmentMetadata::default(),
            controls: vec![],
        };
        let assembler = CPOEAssembler::new();
        let result = assembler.assemble(&document, &AssembleOverrides::default());
        assert_eq!(result.subject.summary.overall_score, 0);
        assert!(result.subject.summary.severity_distribution.is_none());
    }

    #[test]
    fn manual_source_maps_to_self() {
        let document = AssessmentDocument {
            metadata: AssessmentMetadata::default(),
            controls: vec![],
        };
        let overrides = AssembleOverrides {
            source: Some("manual".to_string()),
            ..Default::default()
        };
        let assembler = CPOEAssembler::new();
        let result = assembler.assemble(&document, &overrides);
        assert_eq!(result.subject.provenance.source, ProvenanceSource::SelfAttested);
    }

    #[test]
    fn missing_scope_defaults_and_warns() {
        let document = AssessmentDocument {
            metadata: AssessmentMetadata::default(),
            controls: vec![],
        };
        let assembler = CPOEAssembler::new();
        let result = assembler.assemble(&document, &AssembleOverrides::default());
        assert_eq!(result.subject.scope, "unspecified");
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn marque_ids_are_unique_and_monotonic_in_sequence_prefix() {
        let assembler = CPOEAssembler::new();
        let document = AssessmentDocument {
            metadata: AssessmentMetadata::default(),
            controls: vec![],
        };
        let a = assembler.assemble(&document, &AssembleOverrides::default());
        let b = assembler.assemble(&document, &AssembleOverrides::default());
        assert_ne!(a.marque_id, b.marque_id);
        assert!(a.marque_id.starts_with("marque-00000000-"));
        assert!(b.marque_id.starts_with("marque-00000001-"));
    }

    #[test]
    fn frameworks_are_deduplicated_and_sorted() {
        let document = AssessmentDocument {
            metadata: AssessmentMetadata::default(),
            controls: vec![
                Control {
                    framework_mappings: vec![
                        FrameworkMapping {
                            framework: "SOC2".to_string(),
                            control_id: "CC1".to_string(),
                        },
                        FrameworkMapping {
                            framework: "ISO27001".to_string(),
                            control_id: "A.5".to_string(),
                        },
                    ],
                    ..control("c1", ControlStatus::Pass, None)
                },
                Control {
                    framework_mappings: vec![FrameworkMapping {
                        framework: "SOC2".to_string(),
                        control_id: "CC2".to_string(),
                    }],
                    ..control("c2", ControlStatus::Pass, None)
                },
            ],
        };
        let assembler = CPOEAssembler::new();
        let result = assembler.assemble(&document, &AssembleOverrides::default());
        assert_eq!(result.subject.frameworks, Some(vec!["ISO27001".to_string(), "SOC2".to_string()]));
    }
}
