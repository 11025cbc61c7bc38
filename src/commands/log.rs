//! `corsair log`: append to and verify the append-only hash-chained evidence log.
//!
//! A subcommand-enum CLI over `HashChain` from `hashchain.rs`, persisted whole as JSONL under
//! `.corsair/hashchain.jsonl` between invocations, since a CLI process holds no long-lived state.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use crate::commands::{self, hashchain_path, read_json_file, success};
use crate::hashchain::{verify_chain, HashChain};

#[derive(Args)]
pub struct LogArgs {
    #[command(subcommand)]
    pub command: LogCommand,
}

#[derive(Subcommand)]
pub enum LogCommand {
    /// Append one record to the chain
    Append {
        /// Free-form operation name (e.g. "evidence.normalized", "cpoe.signed")
        operation: String,
        /// JSON file with the record's data payload; defaults to `{}`
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Verify the chain's hash linkage end to end
    Verify,
    /// Print the last N records (default: all)
    Show {
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn load_chain() -> Result<HashChain> {
    let path = hashchain_path();
    if !path.exists() {
        return Ok(HashChain::new());
    }
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(HashChain::from_jsonl(&contents)?)
}

fn save_chain(chain: &HashChain) -> Result<()> {
    let jsonl = chain.to_jsonl()?;
    commands::write_text_file(&hashchain_path(), &jsonl)
}

#[derive(Debug, Serialize)]
struct VerifyOutput {
    valid: bool,
    #[serde(rename = "brokenAt")]
    broken_at: Option<u64>,
    #[serde(rename = "recordCount")]
    record_count: u64,
}

pub fn run(args: LogArgs, json: bool) -> Result<()> {
    match args.command {
        LogCommand::Append { operation, data } => {
            let data: Value = match data {
                Some(path) => read_json_file(&path)?,
                None => Value::Object(Default::default()),
            };
            let mut chain = load_chain()?;
            let record = chain.append(operation, data)?.clone();
            save_chain(&chain)?;
            tracing::info!(sequence = record.sequence, operation = %record.operation, hash = %record.hash, "appended hash-chain record");

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                success(format!("appended record #{}", record.sequence));
                commands::label("hash", &record.hash);
            }
        }
        LogCommand::Verify => {
            let chain = load_chain()?;
            let result = verify_chain(chain.records());
            let output = VerifyOutput {
                valid: result.valid,
                broken_at: result.broken_at,
                record_count: result.record_count,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else if output.valid {
                success(format!("chain intact ({} records)", output.record_count));
            } else {
                commands::failure(format!(
                    "chain broken at record {}",
                    output.broken_at.unwrap_or(0)
                ));
            }
            if !output.valid {
                tracing::warn!(broken_at = ?output.broken_at, "hash chain verification failed");
                anyhow::bail!("hash chain verification failed");
            }
        }
        LogCommand::Show { limit } => {
            let chain = load_chain()?;
            let records = chain.records();
            let start = match limit {
                Some(n) if n < records.len() => records.len() - n,
                _ => 0,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&records[start..])?);
            } else {
                for record in &records[start..] {
                    println!("  #{} {} {}", record.sequence, record.operation, record.hash);
                }
            }
        }
    }
    Ok(())
}
