//! Extractor capability trait and the name → capability registry.
//!
//! Any type implementing [`Extractor`] qualifies as an extractor; there is no
//! inheritance hierarchy, only a registry of bindings built once at process
//! start. Extractors are read-only against the remote platform and must not
//! write output, look up secrets beyond the passed map, or touch process-wide
//! logging — those are the runtime's responsibility.

use crate::error::ScrapeError;
use crate::record::RawRecord;
use crate::secrets::Secrets;
use crate::session::{Session, SessionKind};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A platform-specific extraction capability.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Unique registry name (also the CLI selection token).
    fn name(&self) -> &'static str;

    /// One-line description shown by `psync list`.
    fn description(&self) -> &'static str;

    /// Logical dataset name embedded in artifact identities.
    fn dataset(&self) -> &'static str {
        self.name()
    }

    /// Secret keys that must be present before `run()` is invoked.
    fn required_secrets(&self) -> &'static [&'static str] {
        &[]
    }

    /// Optional settings passed through when present.
    fn optional_settings(&self) -> &'static [&'static str] {
        &[]
    }

    /// The kind of session handle this extractor needs.
    fn session_kind(&self) -> SessionKind {
        SessionKind::Http
    }

    /// Whether a run yields exactly one record, persisted as a bare object.
    fn singleton(&self) -> bool {
        false
    }

    /// Extract raw records from the platform.
    async fn run(&self, session: &mut Session, secrets: &Secrets) -> anyhow::Result<Vec<RawRecord>>;
}

/// Shared handle to a registered capability.
pub type Capability = Arc<dyn Extractor>;

/// Which extractors a run request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Names(Vec<String>),
}

impl Selection {
    /// Parse a CLI selection string: `all` or a comma-separated name list.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim().to_lowercase();
        if trimmed == "all" {
            return Self::All;
        }
        Self::Names(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }
}

/// Immutable name → capability bindings, ordered by name.
pub struct Registry {
    entries: BTreeMap<&'static str, Capability>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register a capability. Names must be pairwise distinct.
    pub fn register(&mut self, capability: Capability) {
        let name = capability.name();
        let previous = self.entries.insert(name, capability);
        assert!(previous.is_none(), "duplicate extractor name: {name}");
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a selection against the registry.
    ///
    /// Every explicitly requested name must exist; any unknown name fails the
    /// whole run before anything executes.
    pub fn resolve(&self, selection: &Selection) -> Result<Vec<Capability>, ScrapeError> {
        match selection {
            Selection::All => Ok(self.entries.values().cloned().collect()),
            Selection::Names(names) => {
                let unknown: Vec<&str> = names
                    .iter()
                    .filter(|n| !self.entries.contains_key(n.as_str()))
                    .map(String::as_str)
                    .collect();
                if !unknown.is_empty() {
                    return Err(ScrapeError::UnknownExtractor {
                        names: unknown.join(", "),
                    });
                }
                // Keep the requested order; duplicates collapse to one execution.
                let mut seen = std::collections::HashSet::new();
                Ok(names
                    .iter()
                    .filter(|n| seen.insert(n.as_str()))
                    .filter_map(|n| self.entries.get(n.as_str()).cloned())
                    .collect())
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
