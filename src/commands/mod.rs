//! Shared CLI plumbing: on-disk state layout, error-to-exit-code mapping, and small I/O helpers
//! reused by every subcommand.
//!
//! Each per-command module follows the same shape: one file per command, an `Args` derive, a
//! free `run(args, ...)` function returning `anyhow::Result<()>`. State lives under `.corsair/`
//! through `FileKeyStore`/`FileLogStore`, since a CLI process exits between every invocation and
//! the core engine modules take their collaborators as constructor parameters rather than
//! touching global state themselves.

pub mod cert;
pub mod diff;
pub mod keygen;
pub mod log;
pub mod mappings;
pub mod sign;
pub mod tprm;
pub mod verify;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;

use crate::error::CorsairError;
use crate::store::{FileKeyStore, FileLogStore};

/// Root of all on-disk CLI state.
pub const STATE_DIR: &str = ".corsair";

pub fn state_dir() -> PathBuf {
    PathBuf::from(STATE_DIR)
}

pub fn keys_path() -> PathBuf {
    state_dir().join("keys.json")
}

pub fn scitt_path() -> PathBuf {
    state_dir().join("scitt.json")
}

pub fn hashchain_path() -> PathBuf {
    state_dir().join("hashchain.jsonl")
}

pub fn certifications_path() -> PathBuf {
    state_dir().join("certifications.json")
}

pub fn vendors_path() -> PathBuf {
    state_dir().join("vendors.json")
}

pub fn open_key_store() -> Result<FileKeyStore> {
    Ok(FileKeyStore::open(keys_path())?)
}

pub fn open_log_store() -> Result<FileLogStore> {
    Ok(FileLogStore::open(scitt_path())?)
}

/// Recover the process exit code implied by a failed command: a `CorsairError` carries its own
/// code (0 is never reached here — this only runs on `Err`), any other error (I/O, clap parsing,
/// JSON decode) is an unclassified operational failure.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CorsairError>()
        .map(CorsairError::exit_code)
        .unwrap_or(1)
}

/// Read and parse a JSON file, with file-path context on both the read and the parse.
pub fn read_json_file<T: for<'de> serde::de::Deserialize<'de>>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Write `contents` to `path`, creating parent directories as needed.
pub fn write_text_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

pub fn success(msg: impl AsRef<str>) {
    println!("{}", style(msg.as_ref()).green().bold());
}

pub fn failure(msg: impl AsRef<str>) {
    eprintln!("{}", style(msg.as_ref()).red().bold());
}

pub fn label(name: &str, value: impl std::fmt::Display) {
    println!("  {} {}", style(format!("{name}:")).dim(), value);
}
