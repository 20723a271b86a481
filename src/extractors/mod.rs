//! Built-in platform extractors.
//!
//! One module per platform. Each extractor only implements the capability
//! trait: it consumes a session handle plus resolved secrets and returns raw
//! records. Output writing and error containment live in the runtime.

pub mod coursera;
pub mod github_daily;
pub mod goodreads;
pub mod linkedin;
pub mod upso;

use crate::registry::Registry;
use std::sync::Arc;

/// Build the registry of all built-in extractors.
pub fn builtin() -> Registry {
    let mut registry = Registry::new();
    registry.register(Arc::new(coursera::CourseraProgress));
    registry.register(Arc::new(github_daily::GitHubDaily));
    registry.register(Arc::new(goodreads::GoodreadsReading));
    registry.register(Arc::new(linkedin::LinkedInProfile));
    registry.register(Arc::new(upso::UpsoStudyPlan));
    registry
}
