//! `EvidenceNormalizer`: reduces adapter-detected input into a canonical [`AssessmentDocument`].
//!
//! `FormatAdapter` is the typed interface standing in for the out-of-scope per-tool ingestion
//! adapters; each recognizes a shape and normalizes it into an `AssessmentDocument`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CorsairError, CorsairResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlStatus {
    Pass,
    Fail,
    Skip,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameworkMapping {
    pub framework: String,
    #[serde(rename = "controlId")]
    pub control_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Control {
    pub id: String,
    pub description: String,
    pub status: ControlStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(rename = "frameworkMappings", default)]
    pub framework_mappings: Vec<FrameworkMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssessmentMetadata {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "reportType", skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssessmentDocument {
    pub metadata: AssessmentMetadata,
    pub controls: Vec<Control>,
}

/// Typed interface standing in for the per-tool evidence-ingestion adapters excluded from this
/// crate's scope. Implementations recognize a shape and normalize it to an
/// [`AssessmentDocument`].
pub trait FormatAdapter {
    fn format_name(&self) -> &'static str;
    fn detect(&self, input: &Value) -> bool;
    fn normalize(&self, input: &Value) -> CorsairResult<AssessmentDocument>;
}

/// Recognizes the canonical `{metadata, controls}` shape and deserializes it directly.
pub struct GenericJsonAdapter;

impl FormatAdapter for GenericJsonAdapter {
    fn format_name(&self) -> &'static str {
        "generic"
    }

    fn detect(&self, input: &Value) -> bool {
        input.get("controls").map(Value::is_array).unwrap_or(false)
    }

    fn normalize(&self, input: &Value) -> CorsairResult<AssessmentDocument> {
        let metadata: AssessmentMetadata = input
            .get("metadata")
            .map(|m| serde_json::from_value(m.clone()))
            .transpose()
            .map_err(|e| CorsairError::validation(format!("malformed metadata: {e}")))?
            .unwrap_or_default();

        let controls_value = input
            .get("controls")
            .cloned()
            .ok_or_else(|| CorsairError::validation("missing 'controls' array"))?;
        let controls: Vec<Control> = serde_json::from_value(controls_value)
            .map_err(|e| CorsairError::validation(format!("malformed controls: {e}")))?;

        Ok(AssessmentDocument { metadata, controls })
    }
}

/// A mapping-pack-driven adapter, parametrized by a small JSON mapping document (loaded from
/// `CORSAIR_MAPPING_DIR` by the CLI) describing where the findings array lives and how its field
/// names correspond to [`Control`]'s field names. This exercises `EvidenceNormalizer`'s dispatch
/// logic; it is not a general-purpose scanner adapter — those remain out of scope here.
pub struct MappingPackAdapter {
    name: String,
    findings_field: String,
    id_field: String,
    description_field: String,
    status_field: String,
    severity_field: Option<String>,
    pass_values: Vec<String>,
    fail_values: Vec<String>,
    skip_values: Vec<String>,
}

impl MappingPackAdapter {
    /// Parse a mapping-pack document of the shape:
    /// `{"name", "findingsField", "fields": {"id","description","status","severity"?},
    ///   "statusValues": {"pass": [...], "fail": [...], "skip": [...]}}`.
    pub fn from_mapping(mapping: &Value) -> CorsairResult<Self> {
        let name = mapping
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| CorsairError::validation("mapping pack missing 'name'"))?
            .to_string();
        let findings_field = mapping
            .get("findingsField")
            .and_then(Value::as_str)
            .ok_or_else(|| CorsairError::validation("mapping pack missing 'findingsField'"))?
            .to_string();
        let fields = mapping
            .get("fields")
            .ok_or_else(|| CorsairError::validation("mapping pack missing 'fields'"))?;
        let field = |key: &str| -> CorsairResult<String> {
            fields
                .get(key)
                .and_then(Value::as_str)
                .map(|s| s.to_string())
                .ok_or_else(|| CorsairError::validation(format!("mapping pack missing 'fields.{key}'")))
        };

        let status_values = mapping.get("statusValues");
        let value_list = |key: &str| -> Vec<String> {
            status_values
                .and_then(|v| v.get(key))
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default()
        };

        Ok(Self {
            name,
            findings_field,
            id_field: field("id")?,
            description_field: field("description")?,
            status_field: field("status")?,
            severity_field: fields.get("severity").and_then(Value::as_str).map(str::to_string),
            pass_values: value_list("pass"),
            fail_values: value_list("fail"),
            skip_values: value_list("skip"),
        })
    }

    fn map_status(&self, raw: &str) -> ControlStatus {
        let raw_lower = raw.to_ascii_lowercase();
        if self.pass_values.iter().any(|v| v.eq_ignore_ascii_case(&raw_lower)) {
            ControlStatus::Pass
        } else if self.fail_values.iter().any(|v| v.eq_ignore_ascii_case(&raw_lower)) {
            ControlStatus::Fail
        } else if self.skip_values.iter().any(|v| v.eq_ignore_ascii_case(&raw_lower)) {
            ControlStatus::Skip
        } else {
            ControlStatus::Unknown
        }
    }
}

impl FormatAdapter for MappingPackAdapter {
    fn format_name(&self) -> &'static str {
        // Leaked once per adapter instance; mapping packs are loaded a handful of times per
        // process, not per request, so this is not a meaningful leak.
        Box::leak(self.name.clone().into_boxed_str())
    }

    fn detect(&self, input: &Value) -> bool {
        input.get(&self.findings_field).map(Value::is_array).unwrap_or(false)
    }

    fn normalize(&self, input: &Value) -> CorsairResult<AssessmentDocument> {
        let findings = input
            .get(&self.findings_field)
            .and_then(Value::as_array)
            .ok_or_else(|| CorsairError::validation(format!("missing '{}' array", self.findings_field)))?;

        let mut controls = Vec::with_capacity(findings.len());
        for (i, finding) in findings.iter().enumerate() {
            let id = finding
                .get(&self.id_field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("finding-{i}"));
            let description = finding
                .get(&self.description_field)
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let status_raw = finding.get(&self.status_field).and_then(Value::as_str).unwrap_or("");
            let status = self.map_status(status_raw);
            let severity = self
                .severity_field
                .as_ref()
                .and_then(|f| finding.get(f))
                .and_then(Value::as_str)
                .and_then(parse_severity);

            controls.push(Control {
                id,
                description,
                status,
                severity,
                evidence: None,
                framework_mappings: Vec::new(),
            });
        }

        // No top-level `metadata` object: this is evidence-only input, synthesized from the
        // mapping pack's name alone.
        let metadata = AssessmentMetadata {
            title: format!("{} findings", self.name),
            ..Default::default()
        };

        Ok(AssessmentDocument { metadata, controls })
    }
}

fn parse_severity(raw: &str) -> Option<Severity> {
    match raw.to_ascii_uppercase().as_str() {
        "CRITICAL" => Some(Severity::Critical),
        "HIGH" => Some(Severity::High),
        "MEDIUM" => Some(Severity::Medium),
        "LOW" => Some(Severity::Low),
        _ => None,
    }
}

/// Result of [`EvidenceNormalizer::normalize`]: the canonical document, the format that matched,
/// and any non-fatal warnings collected along the way.
#[derive(Debug, Clone)]
pub struct NormalizeResult {
    pub document: AssessmentDocument,
    pub format: String,
    pub warnings: Vec<String>,
}

/// Dispatches raw evidence input to the first matching [`FormatAdapter`], then checks the result
/// for a set of non-fatal conditions worth surfacing as warnings.
pub struct EvidenceNormalizer {
    adapters: Vec<Box<dyn FormatAdapter>>,
}

impl Default for EvidenceNormalizer {
    fn default() -> Self {
        Self {
            adapters: vec![Box::new(GenericJsonAdapter)],
        }
    }
}

impl EvidenceNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a normalizer that additionally recognizes a mapping-pack format, tried before the
    /// built-in generic adapter.
    pub fn with_mapping_adapter(mapping_adapter: MappingPackAdapter) -> Self {
        Self {
            adapters: vec![Box::new(mapping_adapter), Box::new(GenericJsonAdapter)],
        }
    }

    pub fn normalize(&self, input: &Value) -> CorsairResult<NormalizeResult> {
        let adapter = self
            .adapters
            .iter()
            .find(|a| a.detect(input))
            .ok_or_else(|| CorsairError::validation("no format adapter recognized this evidence shape"))?;

        let document = adapter.normalize(input)?;
        let format = adapter.format_name().to_string();
        let is_evidence_only = !document.metadata.title.is_empty()
            && document.metadata.issuer.is_none()
            && document.metadata.scope.is_none()
            && format != "generic";

        let mut warnings = Vec::new();
        if document.controls.is_empty() {
            warnings.push("assessment contains zero controls".to_string());
        }
        if document.metadata.issuer.is_none() {
            warnings.push("assessment is missing an issuer".to_string());
        }
        if document.metadata.scope.is_none() {
            warnings.push("assessment is missing a scope".to_string());
        }
        match &document.metadata.date {
            None => warnings.push("assessment is missing a date".to_string()),
            Some(raw) => {
                if DateTime::parse_from_rfc3339(raw).is_err() {
                    warnings.push(format!("assessment date '{raw}' is not valid RFC3339"));
                }
            }
        }
        if is_evidence_only {
            warnings.push(format!("'{format}' adapter produced evidence-only mapping (no assessment metadata)"));
        }

        Ok(NormalizeResult {
            document,
            format,
            warnings,
        })
    }
}
