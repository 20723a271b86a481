//! Layered runtime configuration.
//!
//! Values come from three layers, later layers winning:
//! 1. process environment variables,
//! 2. `{config_dir}/.env.{env}` — per-environment settings,
//! 3. `{config_dir}/.env` — secrets.
//!
//! Keys are written in dotted form (`goodreads.username`) and mapped to
//! `UPPER_SNAKE` names (`GOODREADS_USERNAME`) for lookup, so the same key
//! works from a file or from the shell.

use clap::ValueEnum;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Deployment environment. Selects default config and data directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    Dev,
    Prod,
}

impl Env {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }

    /// Default directory holding `.env` and `.env.{env}` files.
    pub fn default_config_dir(&self) -> PathBuf {
        match self {
            Self::Dev => PathBuf::from("config"),
            Self::Prod => PathBuf::from("/etc/personal-track"),
        }
    }

    /// Default root directory for output artifacts and the run ledger.
    pub fn default_data_dir(&self) -> PathBuf {
        match self {
            Self::Dev => PathBuf::from("data"),
            Self::Prod => PathBuf::from("/var/lib/personal-track"),
        }
    }
}

impl std::fmt::Display for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merged view over all configuration layers.
pub struct Config {
    values: HashMap<String, String>,
}

impl Config {
    /// Load configuration for `env` from `config_dir`.
    ///
    /// Missing files are not an error; the layer is simply empty.
    pub fn load(config_dir: &Path, env: Env) -> Self {
        let mut values: HashMap<String, String> = std::env::vars().collect();
        values.extend(read_env_file(
            &config_dir.join(format!(".env.{}", env.as_str())),
        ));
        values.extend(read_env_file(&config_dir.join(".env")));
        Self { values }
    }

    /// Build a config from explicit key/value pairs (dotted or env-style keys).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (env_key(k.as_ref()), v.into()))
            .collect();
        Self { values }
    }

    /// An empty configuration.
    pub fn empty() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&env_key(key)).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Truthy values: `true`, `1`, `yes`, `on` (case-insensitive).
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
            None => default,
        }
    }

    /// Comma-separated list; empty items are dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// `goodreads.username` → `GOODREADS_USERNAME`. Already-upper keys pass through.
fn env_key(key: &str) -> String {
    key.to_uppercase().replace(['.', '-'], "_")
}

/// Parse a dotenv-format file, skipping malformed lines.
fn read_env_file(path: &Path) -> Vec<(String, String)> {
    let Ok(iter) = dotenvy::from_path_iter(path) else {
        return Vec::new();
    };
    iter.filter_map(Result::ok).collect()
}
