//! `corsair diff`: compare two evidence documents control-by-control.
//!
//! Takes two file paths in and produces a structured comparison; the comparison itself follows
//! `CPOEAssembler`'s own scoring math in `assembler.rs` so `diff`'s score delta always agrees
//! with what `sign` would compute for either side.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use crate::assembler::{AssembleOverrides, CPOEAssembler};
use crate::commands::{self, read_json_file, success};
use crate::evidence::{Control, ControlStatus, EvidenceNormalizer, MappingPackAdapter, Severity};

#[derive(Args)]
pub struct DiffArgs {
    /// Earlier evidence document (JSON)
    pub old: PathBuf,

    /// Later evidence document (JSON)
    pub new: PathBuf,

    /// Mapping-pack JSON file shared by both documents
    #[arg(long)]
    pub mapping: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ChangedControl {
    id: String,
    #[serde(rename = "oldStatus")]
    old_status: ControlStatus,
    #[serde(rename = "newStatus")]
    new_status: ControlStatus,
    #[serde(rename = "oldSeverity")]
    old_severity: Option<Severity>,
    #[serde(rename = "newSeverity")]
    new_severity: Option<Severity>,
}

#[derive(Debug, Serialize)]
struct DiffOutput {
    added: Vec<Control>,
    removed: Vec<Control>,
    changed: Vec<ChangedControl>,
    #[serde(rename = "oldScore")]
    old_score: u32,
    #[serde(rename = "newScore")]
    new_score: u32,
    #[serde(rename = "scoreDelta")]
    score_delta: i64,
}

fn build_normalizer(mapping: &Option<PathBuf>) -> Result<EvidenceNormalizer> {
    Ok(match mapping {
        Some(path) => {
            let mapping: Value = read_json_file(path)?;
            EvidenceNormalizer::with_mapping_adapter(MappingPackAdapter::from_mapping(&mapping)?)
        }
        None => EvidenceNormalizer::new(),
    })
}

pub fn run(args: DiffArgs, json: bool) -> Result<()> {
    let normalizer = build_normalizer(&args.mapping)?;

    let old_input: Value = read_json_file(&args.old)?;
    let new_input: Value = read_json_file(&args.new)?;
    let old_doc = normalizer.normalize(&old_input)?.document;
    let new_doc = normalizer.normalize(&new_input)?.document;

    let assembler = CPOEAssembler::new();
    let overrides = AssembleOverrides::default();
    let old_score = assembler.assemble(&old_doc, &overrides).subject.summary.overall_score;
    let new_score = assembler.assemble(&new_doc, &overrides).subject.summary.overall_score;

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed = Vec::new();

    for new_control in &new_doc.controls {
        match old_doc.controls.iter().find(|c| c.id == new_control.id) {
            None => added.push(new_control.clone()),
            Some(old_control) => {
                if old_control.status != new_control.status || old_control.severity != new_control.severity {
                    changed.push(ChangedControl {
                        id: new_control.id.clone(),
                        old_status: old_control.status,
                        new_status: new_control.status,
                        old_severity: old_control.severity,
                        new_severity: new_control.severity,
                    });
                }
            }
        }
    }
    for old_control in &old_doc.controls {
        if !new_doc.controls.iter().any(|c| c.id == old_control.id) {
            removed.push(old_control.clone());
        }
    }

    let output = DiffOutput {
        added,
        removed,
        changed,
        old_score,
        new_score,
        score_delta: new_score as i64 - old_score as i64,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        success(format!(
            "score {} -> {} ({:+})",
            output.old_score, output.new_score, output.score_delta
        ));
        for control in &output.added {
            println!("  + {} ({:?})", control.id, control.status);
        }
        for control in &output.removed {
            println!("  - {} ({:?})", control.id, control.status);
        }
        for change in &output.changed {
            println!(
                "  ~ {}: {:?} -> {:?}",
                change.id, change.old_status, change.new_status
            );
        }
        if output.added.is_empty() && output.removed.is_empty() && output.changed.is_empty() {
            commands::label("result", "no control changes");
        }
    }

    Ok(())
}
