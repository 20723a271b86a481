//! JSONL run ledger — append-only record of every extractor outcome.
//!
//! One line per extractor per run, written at `{data_dir}/runs.jsonl`.
//! Rotates when the file exceeds `MAX_LEDGER_SIZE`; rotated files are named
//! `.1`, `.2`, etc., oldest deleted past `MAX_ROTATIONS`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Maximum ledger size before rotation (10 MB).
const MAX_LEDGER_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated ledger files to keep.
const MAX_ROTATIONS: u32 = 3;

/// One extractor outcome within one run.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEvent {
    pub timestamp: String,
    pub environment: String,
    pub extractor: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

/// Append-only JSONL ledger with size-based rotation.
pub struct RunLedger {
    file: File,
    path: PathBuf,
    /// Approximate current size; re-checked on rotation.
    current_size: u64,
}

impl RunLedger {
    /// Open or create the ledger file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open run ledger: {}", path.display()))?;

        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
        })
    }

    /// Append one event.
    pub fn log(&mut self, event: &LedgerEvent) -> Result<()> {
        if self.current_size >= MAX_LEDGER_SIZE {
            self.rotate()?;
        }

        let json = serde_json::to_string(event)?;
        writeln!(self.file, "{json}")?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Rotate: `runs.jsonl` → `runs.jsonl.1`, `.1` → `.2`, oldest dropped.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            let to = rotation_path(&self.path, i + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }

        let first = rotation_path(&self.path, 1);
        let _ = std::fs::rename(&self.path, &first);

        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("failed to reopen run ledger after rotation")?;
        self.current_size = 0;

        Ok(())
    }
}

fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("runs.jsonl")
    );
    base.with_file_name(name)
}
