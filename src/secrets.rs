//! Per-extractor credential resolution.
//!
//! `SecretStore` is a pure lookup over the layered [`Config`]: it gathers the
//! keys an extractor declares and hands them over as an immutable [`Secrets`]
//! map. A missing required key short-circuits the extractor before its `run()`
//! is ever invoked.

use crate::config::Config;
use crate::error::ScrapeError;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable key/value view passed into an extractor's `run()`.
///
/// Holds both the required secrets and whatever declared optional settings
/// were present; extractors must not look anything up beyond this.
pub struct Secrets {
    values: HashMap<String, String>,
}

impl Secrets {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
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

    /// Required-key accessor for use inside extractors. The runtime resolves
    /// required keys up front, so this only fails on a programming error.
    pub fn require(&self, key: &str) -> anyhow::Result<&str> {
        self.get(key)
            .ok_or_else(|| anyhow::anyhow!("secret '{key}' was not resolved"))
    }

    /// Build a secrets map directly from pairs (used by tests).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Resolves extractor credentials from the layered configuration.
#[derive(Clone)]
pub struct SecretStore {
    config: Arc<Config>,
}

impl SecretStore {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Resolve `required` keys (all must be present and non-empty) plus any
    /// `optional` keys that happen to exist.
    pub fn resolve(
        &self,
        extractor: &str,
        required: &[&str],
        optional: &[&str],
    ) -> Result<Secrets, ScrapeError> {
        let mut values = HashMap::new();
        for key in required {
            match self.config.get(key) {
                Some(v) if !v.trim().is_empty() => {
                    values.insert((*key).to_string(), v.to_string());
                }
                _ => {
                    return Err(ScrapeError::MissingConfiguration {
                        extractor: extractor.to_string(),
                        key: (*key).to_string(),
                    })
                }
            }
        }
        for key in optional {
            if let Some(v) = self.config.get(key) {
                values.insert((*key).to_string(), v.to_string());
            }
        }
        Ok(Secrets { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_collects_required_and_optional() {
        let config = Arc::new(Config::from_pairs([
            ("github.token", "ghp_abc"),
            ("github.per_page", "50"),
        ]));
        let store = SecretStore::new(config);
        let secrets = store
            .resolve("github_daily", &["github.token"], &["github.per_page", "github.visibility"])
            .unwrap();
        assert_eq!(secrets.require("github.token").unwrap(), "ghp_abc");
        assert_eq!(secrets.get_int("github.per_page", 100), 50);
        assert_eq!(secrets.get("github.visibility"), None);
    }

    #[test]
    fn test_missing_required_key_names_the_key() {
        let store = SecretStore::new(Arc::new(Config::empty()));
        let err = store
            .resolve("github_daily", &["github.token"], &[])
            .map(|_| ())
            .unwrap_err();
        match err {
            ScrapeError::MissingConfiguration { extractor, key } => {
                assert_eq!(extractor, "github_daily");
                assert_eq!(key, "github.token");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_required_value_is_missing() {
        let store = SecretStore::new(Arc::new(Config::from_pairs([("upso.clave", "  ")])));
        assert!(store.resolve("upso", &["upso.clave"], &[]).is_err());
    }
}
