//! Write-once JSON artifact persistence.
//!
//! Each successful extraction produces exactly one artifact at
//! `{data_dir}/{dataset}/{dataset}_{timestamp}.json`. All artifacts of one run
//! share the run timestamp. Files are created with `create_new`, so an
//! existing artifact is never overwritten or appended to.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Timestamp format embedded in artifact names, e.g. `2026-08-24_17-03-59`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Persists normalized payloads as timestamped JSON artifacts.
#[derive(Clone)]
pub struct OutputWriter {
    data_dir: PathBuf,
}

impl OutputWriter {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
        }
    }

    /// The artifact path for a dataset and run timestamp.
    pub fn artifact_path(&self, dataset: &str, timestamp: &str) -> PathBuf {
        self.data_dir
            .join(dataset)
            .join(format!("{dataset}_{timestamp}.json"))
    }

    /// Serialize `payload` and persist it, returning the artifact path.
    ///
    /// The payload is serialized fully before the file is created, so a
    /// serialization failure leaves nothing on disk.
    pub fn write(&self, dataset: &str, timestamp: &str, payload: &Value) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(payload).context("payload serialization failed")?;

        let path = self.artifact_path(dataset, timestamp);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("failed to create artifact {}", path.display()))?;
        file.write_all(&bytes)
            .with_context(|| format!("failed to write artifact {}", path.display()))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_creates_named_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path());
        let path = writer
            .write("goodreads", "2026-08-24_10-00-00", &json!([{"title": "Dune"}]))
            .unwrap();

        assert_eq!(
            path,
            dir.path().join("goodreads/goodreads_2026-08-24_10-00-00.json")
        );
        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed[0]["title"], "Dune");
    }

    #[test]
    fn test_write_is_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path());
        writer
            .write("github_daily", "2026-08-24_10-00-00", &json!([]))
            .unwrap();
        let err = writer
            .write("github_daily", "2026-08-24_10-00-00", &json!([{"sha": "x"}]))
            .unwrap_err();
        assert!(err.to_string().contains("failed to create artifact"));
    }

    #[test]
    fn test_distinct_timestamps_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path());
        writer.write("upso", "2026-08-24_10-00-00", &json!([])).unwrap();
        writer.write("upso", "2026-08-24_10-00-01", &json!([])).unwrap();
        let entries = std::fs::read_dir(dir.path().join("upso")).unwrap().count();
        assert_eq!(entries, 2);
    }
}
