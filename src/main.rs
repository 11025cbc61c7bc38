//! CLI entry point: `corsair sign|verify|keygen|diff|log|mappings|cert|tprm`.
//!
//! A `Parser` with a `Subcommand` enum, one arm per `commands::*::run`, a global `--json` flag
//! threaded into every `run`, and exit-code recovery via `commands::exit_code_for`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use corsair_core::commands::{
    self, cert::CertArgs, diff::DiffArgs, keygen::KeygenArgs, log::LogArgs, mappings::MappingsArgs,
    sign::SignArgs, tprm::TprmArgs, verify::VerifyArgs,
};

#[derive(Parser)]
#[command(
    name = "corsair",
    version,
    about = "Sign, verify, and continuously certify Certificates of Proof of Operational Effectiveness"
)]
struct Cli {
    /// Emit machine-readable JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize evidence and sign it into a CPOE
    Sign(SignArgs),
    /// Verify a CPOE's signature, issuer, and expiry
    Verify(VerifyArgs),
    /// Generate or rotate the active signing key
    Keygen(KeygenArgs),
    /// Compare two evidence documents control-by-control
    Diff(DiffArgs),
    /// Append to and verify the hash-chained evidence log
    Log(LogArgs),
    /// List and validate mapping-pack files
    Mappings(MappingsArgs),
    /// Manage continuous certifications
    Cert(CertArgs),
    /// Track third-party vendors against their certifications
    Tprm(TprmArgs),
}

fn dispatch(command: Command, json: bool) -> Result<()> {
    match command {
        Command::Sign(args) => commands::sign::run(args, json),
        Command::Verify(args) => commands::verify::run(args, json),
        Command::Keygen(args) => commands::keygen::run(args, json),
        Command::Diff(args) => commands::diff::run(args, json),
        Command::Log(args) => commands::log::run(args, json),
        Command::Mappings(args) => commands::mappings::run(args, json),
        Command::Cert(args) => commands::cert::run(args, json),
        Command::Tprm(args) => commands::tprm::run(args, json),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = dispatch(cli.command, cli.json) {
        commands::failure(format!("{err:#}"));
        std::process::exit(commands::exit_code_for(&err));
    }
}
