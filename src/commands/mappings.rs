//! `corsair mappings`: list and validate mapping-pack files under `CORSAIR_MAPPING_DIR`.
//!
//! An embedded JSON Schema, compiled once with `jsonschema::JSONSchema::compile` and validated
//! against many documents; the schema itself describes the mapping-pack shape
//! `MappingPackAdapter::from_mapping` in `evidence.rs` expects.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use jsonschema::JSONSchema;
use serde::Serialize;
use serde_json::{json, Value};

use crate::commands::{failure, success};
use crate::config::CorsairConfig;
use crate::error::CorsairError;
use crate::evidence::MappingPackAdapter;

#[derive(Args)]
pub struct MappingsArgs {
    #[command(subcommand)]
    pub command: MappingsCommand,
}

#[derive(Subcommand)]
pub enum MappingsCommand {
    /// List the mapping packs found in CORSAIR_MAPPING_DIR
    List,
    /// Validate one mapping pack, or every `*.json` file in CORSAIR_MAPPING_DIR if none is given
    Validate { path: Option<PathBuf> },
}

fn mapping_pack_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["name", "findingsField", "fields"],
        "properties": {
            "name": { "type": "string", "minLength": 1 },
            "findingsField": { "type": "string", "minLength": 1 },
            "fields": {
                "type": "object",
                "required": ["id", "description", "status"],
                "properties": {
                    "id": { "type": "string" },
                    "description": { "type": "string" },
                    "status": { "type": "string" },
                    "severity": { "type": "string" }
                }
            },
            "statusValues": {
                "type": "object",
                "properties": {
                    "pass": { "type": "array", "items": { "type": "string" } },
                    "fail": { "type": "array", "items": { "type": "string" } },
                    "skip": { "type": "array", "items": { "type": "string" } }
                }
            }
        }
    })
}

fn mapping_dir(config: &CorsairConfig) -> Result<PathBuf> {
    config
        .mapping_dir
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| CorsairError::usage("CORSAIR_MAPPING_DIR is not set").into())
}

fn discover_mapping_files(dir: &PathBuf) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

#[derive(Debug, Serialize)]
struct ValidationOutcome {
    path: String,
    valid: bool,
    errors: Vec<String>,
}

fn validate_one(schema: &JSONSchema, path: &PathBuf) -> Result<ValidationOutcome> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let document: Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let mut errors = Vec::new();
    if let Err(validation_errors) = schema.validate(&document) {
        for error in validation_errors {
            errors.push(format!("{}: {}", error.instance_path, error));
        }
    }
    // Schema-valid does not imply `MappingPackAdapter` can actually build from it (e.g. a
    // `fields.severity` whose value is itself not a string key): exercise the real parser too.
    if errors.is_empty() {
        if let Err(e) = MappingPackAdapter::from_mapping(&document) {
            errors.push(e.to_string());
        }
    }

    Ok(ValidationOutcome {
        path: path.display().to_string(),
        valid: errors.is_empty(),
        errors,
    })
}

pub fn run(args: MappingsArgs, json: bool) -> Result<()> {
    let config = CorsairConfig::from_env()?;

    match args.command {
        MappingsCommand::List => {
            let dir = mapping_dir(&config)?;
            let files = discover_mapping_files(&dir)?;
            if json {
                let names: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                for file in &files {
                    println!("  {}", file.display());
                }
                if files.is_empty() {
                    println!("  (no mapping packs found in {})", dir.display());
                }
            }
        }
        MappingsCommand::Validate { path } => {
            let schema = JSONSchema::compile(&mapping_pack_schema())
                .expect("embedded mapping-pack schema is always valid");

            let targets = match path {
                Some(path) => vec![path],
                None => discover_mapping_files(&mapping_dir(&config)?)?,
            };

            let mut outcomes = Vec::with_capacity(targets.len());
            for target in &targets {
                outcomes.push(validate_one(&schema, target)?);
            }
            let all_valid = outcomes.iter().all(|o| o.valid);

            if json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else {
                for outcome in &outcomes {
                    if outcome.valid {
                        success(format!("{}: valid", outcome.path));
                    } else {
                        failure(format!("{}: invalid", outcome.path));
                        for error in &outcome.errors {
                            println!("    {error}");
                        }
                    }
                }
            }

            if !all_valid {
                anyhow::bail!("one or more mapping packs failed validation");
            }
        }
    }
    Ok(())
}
