//! `CertificationEngine`: the state machine that tracks a certification's compliance status over
//! time, detects drift between audits, and enforces auto-suspension.
//!
//! Takes an explicit `&dyn Clock` collaborator and no global singleton; mutation happens only
//! through `&self` methods that hold a lock for the duration of one transition, the same pattern
//! `KeyManager` and `SCITTRegistry` use elsewhere in this crate.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{CorsairError, CorsairResult};
use crate::evidence::ControlStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertStatus {
    Active,
    Warning,
    Degraded,
    Suspended,
    Expired,
    Revoked,
}

impl CertStatus {
    /// The allowed destination states from this state. `Revoked` is absorbing (empty edge set).
    fn allowed_targets(self) -> &'static [CertStatus] {
        use CertStatus::*;
        match self {
            Active => &[Warning, Degraded, Suspended, Revoked],
            Warning => &[Active, Degraded, Suspended, Revoked],
            Degraded => &[Active, Suspended, Expired, Revoked],
            Suspended => &[Active, Revoked],
            Expired => &[Active, Revoked],
            Revoked => &[],
        }
    }

    fn can_transition_to(self, target: CertStatus) -> bool {
        self == target || self.allowed_targets().contains(&target)
    }
}

/// A single control finding from a `runAudit` pass, the unit `detectDrift` diffs between audits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Finding {
    pub id: String,
    pub status: ControlStatus,
}

/// The audit outcome a certification is created or renewed against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditResult {
    pub score: u32,
    pub grade: String,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificationPolicy {
    pub id: String,
    pub name: String,
    pub scope: String,
    #[serde(rename = "minimumScore")]
    pub minimum_score: u32,
    #[serde(rename = "warningThreshold")]
    pub warning_threshold: u32,
    #[serde(rename = "auditIntervalDays")]
    pub audit_interval_days: i64,
    #[serde(rename = "freshnessMaxDays")]
    pub freshness_max_days: i64,
    #[serde(rename = "gracePeriodDays")]
    pub grace_period_days: i64,
    #[serde(rename = "autoRenew")]
    pub auto_renew: bool,
    #[serde(rename = "autoSuspend")]
    pub auto_suspend: bool,
    #[serde(rename = "notifyOnChange")]
    pub notify_on_change: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusHistoryEntry {
    pub status: CertStatus,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Certification {
    pub id: String,
    #[serde(rename = "orgId")]
    pub org_id: String,
    #[serde(rename = "policyId")]
    pub policy_id: String,
    pub status: CertStatus,
    #[serde(rename = "currentScore")]
    pub current_score: u32,
    #[serde(rename = "currentGrade")]
    pub current_grade: String,
    #[serde(rename = "lastAuditResult")]
    pub last_audit_result: AuditResult,
    #[serde(rename = "certifiedSince", skip_serializing_if = "Option::is_none")]
    pub certified_since: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "nextAuditAt")]
    pub next_audit_at: DateTime<Utc>,
    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "suspendedAt", skip_serializing_if = "Option::is_none")]
    pub suspended_at: Option<DateTime<Utc>>,
    #[serde(rename = "statusHistory")]
    pub status_history: Vec<StatusHistoryEntry>,
}

impl Certification {
    /// The timestamp the certification most recently *entered* the given status, per the
    /// status history — used by grace-period expiry math.
    fn status_changed_at(&self, status: CertStatus) -> Option<DateTime<Utc>> {
        self.status_history
            .iter()
            .rev()
            .find(|e| e.status == status)
            .map(|e| e.at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftRecommendation {
    Monitor,
    Investigate,
    Suspend,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriftResult {
    #[serde(rename = "scoreDelta")]
    pub score_delta: i64,
    #[serde(rename = "degradedControls")]
    pub degraded_controls: Vec<Finding>,
    pub recommendation: DriftRecommendation,
}

/// Derives the initial/reassessed status from a score against a policy's thresholds.
fn status_from_score(score: u32, policy: &CertificationPolicy) -> CertStatus {
    if score < policy.minimum_score {
        CertStatus::Degraded
    } else if score < policy.warning_threshold {
        CertStatus::Warning
    } else {
        CertStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificationCheck {
    pub certification: Certification,
    #[serde(rename = "gracePeriodExpired")]
    pub grace_period_expired: bool,
}

/// Tracks certifications in-process, behind a single mutex: every mutating method holds the lock
/// only for the duration of one state transition, keeping updates to a given certification
/// linearizable.
pub struct CertificationEngine<'a> {
    clock: &'a dyn Clock,
    certifications: Mutex<HashMap<String, Certification>>,
}

impl<'a> CertificationEngine<'a> {
    pub fn new(clock: &'a dyn Clock) -> Self {
        Self {
            clock,
            certifications: Mutex::new(HashMap::new()),
        }
    }

    /// Rehydrate an engine from certifications persisted by a previous process, keyed by id.
    pub fn with_certifications(clock: &'a dyn Clock, certifications: Vec<Certification>) -> Self {
        let map = certifications.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self {
            clock,
            certifications: Mutex::new(map),
        }
    }

    /// Snapshot every tracked certification, for persistence between CLI invocations.
    pub fn snapshot(&self) -> Vec<Certification> {
        let mut certifications: Vec<Certification> =
            self.certifications.lock().unwrap().values().cloned().collect();
        certifications.sort_by(|a, b| a.id.cmp(&b.id));
        certifications
    }

    pub fn create(
        &self,
        org_id: impl Into<String>,
        policy: &CertificationPolicy,
        audit: AuditResult,
    ) -> Certification {
        let now = self.clock.now();
        let status = status_from_score(audit.score, policy);
        let certified_since = (status == CertStatus::Active).then_some(now);

        let certification = Certification {
            id: format!("cert-{}", Uuid::new_v4()),
            org_id: org_id.into(),
            policy_id: policy.id.clone(),
            status,
            current_score: audit.score,
            current_grade: audit.grade.clone(),
            last_audit_result: audit,
            certified_since,
            created_at: now,
            updated_at: now,
            next_audit_at: now + Duration::days(policy.audit_interval_days),
            expires_at: Some(now + Duration::days(policy.audit_interval_days + policy.grace_period_days)),
            suspended_at: None,
            status_history: vec![StatusHistoryEntry {
                status,
                reason: "certification created".to_string(),
                score: None,
                at: now,
            }],
        };

        self.certifications
            .lock()
            .unwrap()
            .insert(certification.id.clone(), certification.clone());
        certification
    }

    pub fn get(&self, cert_id: &str) -> CorsairResult<Certification> {
        self.certifications
            .lock()
            .unwrap()
            .get(cert_id)
            .cloned()
            .ok_or_else(|| CorsairError::not_found(format!("no certification '{cert_id}'")))
    }

    /// Compares `new_audit` against the certification's `lastAuditResult`. Takes the
    /// certification's policy explicitly (for `minimumScore`) rather than reconstructing it,
    /// since a certification does not itself carry policy thresholds — only its `policyId`.
    pub fn detect_drift(
        &self,
        cert_id: &str,
        policy: &CertificationPolicy,
        new_audit: &AuditResult,
    ) -> CorsairResult<DriftResult> {
        let certification = self.get(cert_id)?;
        Ok(Self::drift_against(&certification.last_audit_result, new_audit, policy.minimum_score))
    }

    fn drift_against(previous: &AuditResult, new_audit: &AuditResult, minimum_score: u32) -> DriftResult {
        let score_delta = new_audit.score as i64 - previous.score as i64;

        let previous_ids: std::collections::HashSet<&str> =
            previous.findings.iter().map(|f| f.id.as_str()).collect();
        let degraded_controls: Vec<Finding> = new_audit
            .findings
            .iter()
            .filter(|f| !previous_ids.contains(f.id.as_str()) && f.status == ControlStatus::Fail)
            .cloned()
            .collect();

        let recommendation = if new_audit.score < minimum_score {
            DriftRecommendation::Suspend
        } else if score_delta.unsigned_abs() >= 10 {
            DriftRecommendation::Investigate
        } else {
            DriftRecommendation::Monitor
        };

        DriftResult {
            score_delta,
            degraded_controls,
            recommendation,
        }
    }

    /// Updates score/grade/lastAuditResult, runs drift detection, transitions status per the
    /// policy's `autoSuspend` setting, and refreshes `nextAuditAt`/`expiresAt`.
    pub fn renew_certification(
        &self,
        cert_id: &str,
        policy: &CertificationPolicy,
        new_audit: AuditResult,
    ) -> CorsairResult<(Certification, DriftResult)> {
        let now = self.clock.now();
        let mut certifications = self.certifications.lock().unwrap();
        let certification = certifications
            .get_mut(cert_id)
            .ok_or_else(|| CorsairError::not_found(format!("no certification '{cert_id}'")))?;

        let drift = Self::drift_against(&certification.last_audit_result, &new_audit, policy.minimum_score);
        tracing::info!(
            cert_id = %cert_id,
            score_delta = drift.score_delta,
            recommendation = ?drift.recommendation,
            "drift detected on renewal"
        );

        certification.current_score = new_audit.score;
        certification.current_grade = new_audit.grade.clone();
        certification.last_audit_result = new_audit;
        certification.updated_at = now;

        let target_status = if drift.recommendation == DriftRecommendation::Suspend && policy.auto_suspend {
            CertStatus::Suspended
        } else {
            status_from_score(certification.current_score, policy)
        };

        if target_status != certification.status && certification.status.can_transition_to(target_status) {
            Self::apply_transition(certification, target_status, "renewal re-assessment", Some(certification.current_score), now);
        }

        certification.next_audit_at = now + Duration::days(policy.audit_interval_days);
        certification.expires_at =
            Some(now + Duration::days(policy.audit_interval_days + policy.grace_period_days));

        Ok((certification.clone(), drift))
    }

    /// Transitions a certification's status if the edge is allowed; returns `Ok(None)` (not an
    /// error) for a disallowed edge rather than failing the caller.
    pub fn update_status(
        &self,
        cert_id: &str,
        target: CertStatus,
        reason: impl Into<String>,
    ) -> CorsairResult<Option<Certification>> {
        let now = self.clock.now();
        let mut certifications = self.certifications.lock().unwrap();
        let certification = certifications
            .get_mut(cert_id)
            .ok_or_else(|| CorsairError::not_found(format!("no certification '{cert_id}'")))?;

        if !certification.status.can_transition_to(target) {
            return Ok(None);
        }

        let score = certification.current_score;
        Self::apply_transition(certification, target, reason, Some(score), now);
        Ok(Some(certification.clone()))
    }

    fn apply_transition(
        certification: &mut Certification,
        target: CertStatus,
        reason: impl Into<String>,
        score: Option<u32>,
        at: DateTime<Utc>,
    ) {
        if certification.status == target {
            return;
        }
        let reason = reason.into();
        tracing::info!(
            cert_id = %certification.id,
            from = ?certification.status,
            to = ?target,
            reason = %reason,
            "certification status transition"
        );
        certification.status = target;
        certification.updated_at = at;
        if target == CertStatus::Active && certification.certified_since.is_none() {
            certification.certified_since = Some(at);
        }
        certification.suspended_at = if target == CertStatus::Suspended { Some(at) } else { None };
        certification.status_history.push(StatusHistoryEntry {
            status: target,
            reason: reason.into(),
            score,
            at,
        });
    }

    pub fn suspend(&self, cert_id: &str, reason: impl Into<String>) -> CorsairResult<Option<Certification>> {
        self.update_status(cert_id, CertStatus::Suspended, reason)
    }

    pub fn revoke(&self, cert_id: &str, reason: impl Into<String>) -> CorsairResult<Option<Certification>> {
        self.update_status(cert_id, CertStatus::Revoked, reason)
    }

    /// `gracePeriodExpired = true` iff the certification is currently `degraded` and has been so
    /// for at least `policy.gracePeriodDays`.
    pub fn check_certification(&self, cert_id: &str, policy: &CertificationPolicy) -> CorsairResult<CertificationCheck> {
        let certification = self.get(cert_id)?;
        let now = self.clock.now();
        let grace_period_expired = certification.status == CertStatus::Degraded
            && certification
                .status_changed_at(CertStatus::Degraded)
                .map(|since| now - since >= Duration::days(policy.grace_period_days))
                .unwrap_or(false);
        Ok(CertificationCheck {
            certification,
            grace_period_expired,
        })
    }

    pub fn get_expiring_certifications(&self, within_days: i64) -> Vec<Certification> {
        let now = self.clock.now();
        self.certifications
            .lock()
            .unwrap()
            .values()
            .filter(|c| {
                c.expires_at
                    .map(|exp| exp - now <= Duration::days(within_days))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub fn get_suspended_certifications(&self) -> Vec<Certification> {
        self.certifications
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.status == CertStatus::Suspended)
            .cloned()
            .collect()
    }

    /// Filters by `orgId` when given; mutations to one certification never affect another's
    /// entry in the table.
    pub fn list_certifications(&self, org_id: Option<&str>) -> Vec<Certification> {
        self.certifications
            .lock()
            .unwrap()
            .values()
            .filter(|c| org_id.map(|id| c.org_id == id).unwrap_or(true))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;

    fn clock_at(y: i32, m: u32, d: u32) -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap())
    }

    fn policy(minimum_score: u32, warning_threshold: u32, auto_suspend: bool) -> CertificationPolicy {
        CertificationPolicy {
            id: "policy-1".to_string(),
            name: "Default".to_string(),
            scope: "prod".to_string(),
            minimum_score,
            warning_threshold,
            audit_interval_days: 90,
            freshness_max_days: 30,
            grace_period_days: 14,
            auto_renew: true,
            auto_suspend,
            notify_on_change: true,
        }
    }

    fn audit(score: u32) -> AuditResult {
        AuditResult {
            score,
            grade: "B".to_string(),
            findings: vec![],
        }
    }

    #[test]
    fn create_derives_status_from_score() {
        let clock = clock_at(2026, 1, 1);
        let engine = CertificationEngine::new(&clock);
        let p = policy(70, 85, true);

        let active = engine.create("org-1", &p, audit(90));
        assert_eq!(active.status, CertStatus::Active);
        assert!(active.certified_since.is_some());

        let warning = engine.create("org-1", &p, audit(80));
        assert_eq!(warning.status, CertStatus::Warning);
        assert!(warning.certified_since.is_none());

        let degraded = engine.create("org-1", &p, audit(50));
        assert_eq!(degraded.status, CertStatus::Degraded);
    }

    #[test]
    fn expires_at_and_next_audit_at_derived_from_policy() {
        let clock = clock_at(2026, 1, 1);
        let engine = CertificationEngine::new(&clock);
        let p = policy(70, 85, true);
        let cert = engine.create("org-1", &p, audit(90));
        assert_eq!(cert.next_audit_at, clock.now() + Duration::days(90));
        assert_eq!(cert.expires_at, Some(clock.now() + Duration::days(104)));
    }

    #[test]
    fn every_allowed_edge_succeeds_and_revoked_is_absorbing() {
        let clock = clock_at(2026, 1, 1);
        let engine = CertificationEngine::new(&clock);
        let p = policy(70, 85, true);
        let cert = engine.create("org-1", &p, audit(90));

        assert!(engine.update_status(&cert.id, CertStatus::Warning, "r").unwrap().is_some());
        assert!(engine.update_status(&cert.id, CertStatus::Degraded, "r").unwrap().is_some());
        assert!(engine.update_status(&cert.id, CertStatus::Suspended, "r").unwrap().is_some());
        assert!(engine.update_status(&cert.id, CertStatus::Active, "r").unwrap().is_some());
        assert!(engine.update_status(&cert.id, CertStatus::Revoked, "r").unwrap().is_some());

        // revoked is terminal: every further transition is rejected.
        for target in [CertStatus::Active, CertStatus::Warning, CertStatus::Degraded, CertStatus::Suspended, CertStatus::Expired] {
            assert!(engine.update_status(&cert.id, target, "r").unwrap().is_none());
        }
    }

    #[test]
    fn disallowed_edges_are_rejected() {
        let clock = clock_at(2026, 1, 1);
        let engine = CertificationEngine::new(&clock);
        let p = policy(70, 85, true);
        let cert = engine.create("org-1", &p, audit(90));

        // active -> expired is not an allowed edge.
        assert!(engine.update_status(&cert.id, CertStatus::Expired, "r").unwrap().is_none());
        // suspended -> warning/degraded/expired are not allowed.
        engine.update_status(&cert.id, CertStatus::Suspended, "r").unwrap();
        assert!(engine.update_status(&cert.id, CertStatus::Warning, "r").unwrap().is_none());
        assert!(engine.update_status(&cert.id, CertStatus::Degraded, "r").unwrap().is_none());
        assert!(engine.update_status(&cert.id, CertStatus::Expired, "r").unwrap().is_none());
    }

    #[test]
    fn scenario_s6_renew_with_drift_suspends_or_degrades() {
        let clock = clock_at(2026, 1, 1);
        let engine = CertificationEngine::new(&clock);

        let p_auto = policy(70, 85, true);
        let cert_auto = engine.create("org-1", &p_auto, audit(85));
        assert_eq!(cert_auto.status, CertStatus::Active);
        let (renewed, drift) = engine.renew_certification(&cert_auto.id, &p_auto, audit(50)).unwrap();
        assert_eq!(drift.recommendation, DriftRecommendation::Suspend);
        assert_eq!(renewed.status, CertStatus::Suspended);

        let p_manual = policy(70, 85, false);
        let cert_manual = engine.create("org-2", &p_manual, audit(85));
        let (renewed2, drift2) = engine.renew_certification(&cert_manual.id, &p_manual, audit(50)).unwrap();
        assert_eq!(drift2.recommendation, DriftRecommendation::Suspend);
        assert_eq!(renewed2.status, CertStatus::Degraded);
    }

    #[test]
    fn scenario_s7_multi_org_isolation() {
        let clock = clock_at(2026, 1, 1);
        let engine = CertificationEngine::new(&clock);
        let p = policy(70, 85, true);

        let cert_org1 = engine.create("org-1", &p, audit(90));
        let cert_org2 = engine.create("org-2", &p, audit(90));

        engine.suspend(&cert_org1.id, "manual suspend").unwrap();

        assert_eq!(engine.get(&cert_org1.id).unwrap().status, CertStatus::Suspended);
        assert_eq!(engine.get(&cert_org2.id).unwrap().status, CertStatus::Active);

        let org1_certs = engine.list_certifications(Some("org-1"));
        assert_eq!(org1_certs.len(), 1);
        assert_eq!(org1_certs[0].status, CertStatus::Suspended);
    }

    #[test]
    fn grace_period_expiry_flags_long_standing_degraded() {
        let clock = clock_at(2026, 1, 1);
        let engine = CertificationEngine::new(&clock);
        let p = policy(70, 85, true);
        let cert = engine.create("org-1", &p, audit(50));
        assert_eq!(cert.status, CertStatus::Degraded);

        let not_yet = engine.check_certification(&cert.id, &p).unwrap();
        assert!(!not_yet.grace_period_expired);
    }

    #[test]
    fn drift_identifies_new_failing_findings_not_in_previous_audit() {
        let clock = clock_at(2026, 1, 1);
        let engine = CertificationEngine::new(&clock);
        let p = policy(70, 85, true);
        let previous = AuditResult {
            score: 90,
            grade: "A".to_string(),
            findings: vec![Finding { id: "c1".to_string(), status: ControlStatus::Pass }],
        };
        let cert = engine.create("org-1", &p, previous);

        let new_audit = AuditResult {
            score: 88,
            grade: "A".to_string(),
            findings: vec![
                Finding { id: "c1".to_string(), status: ControlStatus::Pass },
                Finding { id: "c2".to_string(), status: ControlStatus::Fail },
            ],
        };
        let (_, drift) = engine.renew_certification(&cert.id, &p, new_audit).unwrap();
        assert_eq!(drift.degraded_controls.len(), 1);
        assert_eq!(drift.degraded_controls[0].id, "c2");
        assert_eq!(drift.recommendation, DriftRecommendation::Monitor);
    }

    #[test]
    fn expiring_and_suspended_queries() {
        let clock = clock_at(2026, 1, 1);
        let engine = CertificationEngine::new(&clock);
        let p = policy(70, 85, true);
        let soon = engine.create("org-1", &p, audit(90));
        engine.suspend(&soon.id, "manual").unwrap();

        let suspended = engine.get_suspended_certifications();
        assert_eq!(suspended.len(), 1);
        assert_eq!(suspended[0].id, soon.id);

        let expiring = engine.get_expiring_certifications(200);
        assert_eq!(expiring.len(), 1);
        let none_expiring = engine.get_expiring_certifications(1);
        assert!(none_expiring.is_empty());
    }
}
