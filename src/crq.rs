//! `CRQMapper`: deterministic, side-effect-free mapping from assurance level, provenance, and
//! freshness into BetaPERT / FAIR-CAM risk-quantification outputs.
//!
//! Stays pure (`chrono` for date parsing, `serde` for the output shapes); no I/O, no `Clock`
//! injection needed since every function takes its "now" reference as an explicit
//! `issued_at`/`today` parameter rather than reading the system clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assembler::{Provenance, ProvenanceSource, Summary};

/// A BetaPERT three-point-distribution shape/width pair, keyed off a declared assurance level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BetaPert {
    pub shape: u32,
    pub width: &'static str,
}

/// `shape = {0:2,1:4,2:6,3:8,4:10}`, `width = {0:very-wide,...,4:very-narrow}`.
pub fn compute_beta_pert(level: u8) -> BetaPert {
    let shape = match level {
        0 => 2,
        1 => 4,
        2 => 6,
        3 => 8,
        _ => 10,
    };
    let width = match level {
        0 => "very-wide",
        1 => "wide",
        2 => "moderate",
        3 => "narrow",
        _ => "very-narrow",
    };
    BetaPert { shape, width }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ControlFunction {
    VarianceManagement,
    DecisionSupport,
    LossEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FairMapping {
    #[serde(rename = "resistanceStrength")]
    pub resistance_strength: &'static str,
    #[serde(rename = "controlEffectiveness")]
    pub control_effectiveness: f64,
    #[serde(rename = "controlFunction")]
    pub control_function: ControlFunction,
}

/// Declared assurance level (0..4) plus the attestation method that produced it, the only two
/// `Assurance` fields this module's formulas consume.
#[derive(Debug, Clone, Default)]
pub struct AssuranceInput {
    pub declared: u8,
    pub method: Option<String>,
}

/// `resistanceStrength` by declared level, `controlEffectiveness = clamp01(overallScore/100)`,
/// `controlFunction` keyed off attestation method.
pub fn compute_fair_mapping(assurance: &AssuranceInput, summary: &Summary) -> FairMapping {
    let resistance_strength = match assurance.declared {
        0 => "very-low",
        1 => "low",
        2 => "moderate",
        3 => "high",
        _ => "very-high",
    };
    let control_effectiveness = (summary.overall_score as f64 / 100.0).clamp(0.0, 1.0);
    let control_function = match assurance.method.as_deref() {
        Some("continuous-observation") => ControlFunction::VarianceManagement,
        Some("third-party-attested") => ControlFunction::DecisionSupport,
        _ => ControlFunction::LossEvent,
    };
    FairMapping {
        resistance_strength,
        control_effectiveness,
        control_function,
    }
}

/// `auditor -> 1.25, tool -> 1.0, self -> 0.75`.
pub fn compute_provenance_modifier(provenance: &Provenance) -> f64 {
    match provenance.source {
        ProvenanceSource::Auditor => 1.25,
        ProvenanceSource::Tool => 1.0,
        ProvenanceSource::SelfAttested => 0.75,
    }
}

/// Linear decay from `1.0` at 0 days old to `0.0` at >=365 days old. An unparseable
/// `issued_at` yields `0` rather than erroring.
pub fn compute_freshness_decay(issued_at: &str, today: DateTime<Utc>) -> f64 {
    let Ok(issued) = DateTime::parse_from_rfc3339(issued_at) else {
        return 0.0;
    };
    let age_days = (today - issued.with_timezone(&Utc)).num_seconds() as f64 / 86_400.0;
    if age_days <= 0.0 {
        return 1.0;
    }
    if age_days >= 365.0 {
        return 0.0;
    }
    round2(1.0 - age_days / 365.0)
}

/// Geometric mean over the 7 dimension scores (each shifted by +1 to avoid log-of-zero, then
/// shifted back), clamped to `[0,1]` and rounded to 2 decimals. Absent dimensions default to the
/// spec's neutral `0.5`.
pub fn compute_dimension_confidence(dimensions: Option<&[f64; 7]>) -> f64 {
    let Some(scores) = dimensions else {
        return 0.5;
    };
    let log_sum: f64 = scores.iter().map(|s| (s + 1.0).ln()).sum();
    let geo_mean_shifted = (log_sum / scores.len() as f64).exp();
    round2((geo_mean_shifted - 1.0).clamp(0.0, 1.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::SeverityDistribution;
    use chrono::TimeZone;

    fn summary(overall_score: u32) -> Summary {
        Summary {
            controls_tested: 10,
            controls_passed: overall_score / 10,
            controls_failed: 10 - overall_score / 10,
            overall_score,
            severity_distribution: None::<SeverityDistribution>,
        }
    }

    #[test]
    fn beta_pert_matches_spec_table() {
        assert_eq!(compute_beta_pert(0), BetaPert { shape: 2, width: "very-wide" });
        assert_eq!(compute_beta_pert(1), BetaPert { shape: 4, width: "wide" });
        assert_eq!(compute_beta_pert(4), BetaPert { shape: 10, width: "very-narrow" });
    }

    #[test]
    fn provenance_modifier_by_source() {
        let p = |source| Provenance { source, source_identity: None, source_date: None };
        assert_eq!(compute_provenance_modifier(&p(ProvenanceSource::Auditor)), 1.25);
        assert_eq!(compute_provenance_modifier(&p(ProvenanceSource::Tool)), 1.0);
        assert_eq!(compute_provenance_modifier(&p(ProvenanceSource::SelfAttested)), 0.75);
    }

    #[test]
    fn freshness_decay_is_monotonically_non_increasing_in_age() {
        let today = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let issued_0 = today.to_rfc3339();
        let issued_180 = (today - chrono::Duration::days(180)).to_rfc3339();
        let issued_400 = (today - chrono::Duration::days(400)).to_rfc3339();
        let d0 = compute_freshness_decay(&issued_0, today);
        let d180 = compute_freshness_decay(&issued_180, today);
        let d400 = compute_freshness_decay(&issued_400, today);
        assert_eq!(d0, 1.0);
        assert_eq!(d400, 0.0);
        assert!(d0 >= d180 && d180 >= d400);
    }

    #[test]
    fn freshness_decay_invalid_date_is_zero() {
        let today = Utc::now();
        assert_eq!(compute_freshness_decay("not-a-date", today), 0.0);
    }

    #[test]
    fn dimension_confidence_absent_is_half() {
        assert_eq!(compute_dimension_confidence(None), 0.5);
    }

    #[test]
    fn dimension_confidence_all_ones_is_one() {
        let dims = [1.0; 7];
        assert_eq!(compute_dimension_confidence(Some(&dims)), 1.0);
    }

    #[test]
    fn dimension_confidence_all_zero_is_zero() {
        let dims = [0.0; 7];
        assert_eq!(compute_dimension_confidence(Some(&dims)), 0.0);
    }

    #[test]
    fn scenario_s8_crq_mapping() {
        let today = Utc.with_ymd_and_hms(2026, 7, 27, 0, 0, 0).unwrap();
        let assurance = AssuranceInput { declared: 1, method: None };
        let summary = summary(91);
        let provenance = Provenance {
            source: ProvenanceSource::Auditor,
            source_identity: None,
            source_date: None,
        };

        let beta_pert = compute_beta_pert(assurance.declared);
        let fair = compute_fair_mapping(&assurance, &summary);
        let provenance_modifier = compute_provenance_modifier(&provenance);
        let freshness_decay = compute_freshness_decay(&today.to_rfc3339(), today);
        let dimension_confidence = compute_dimension_confidence(None);

        assert_eq!(beta_pert.shape, 4);
        assert_eq!(fair.resistance_strength, "low");
        assert_eq!(fair.control_effectiveness, 0.91);
        assert_eq!(fair.control_function, ControlFunction::LossEvent);
        assert_eq!(provenance_modifier, 1.25);
        assert_eq!(freshness_decay, 1.0);
        assert_eq!(dimension_confidence, 0.5);
    }

    #[test]
    fn determinism_identical_inputs_identical_outputs() {
        let assurance = AssuranceInput { declared: 2, method: Some("third-party-attested".into()) };
        let summary = summary(80);
        let a = compute_fair_mapping(&assurance, &summary);
        let b = compute_fair_mapping(&assurance, &summary);
        assert_eq!(a, b);
    }
}
