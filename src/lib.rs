//! Personal data synchronizer: pull your own activity out of the platforms
//! that hold it and persist it as timestamped JSON snapshots.
//!
//! The crate is organized around a small set of seams:
//!
//! - [`registry::Extractor`] — one implementation per platform,
//! - [`session::SessionFactory`] — how extractors get HTTP or browser handles,
//! - [`runtime::ScraperRuntime`] — the fixed per-extractor lifecycle,
//! - [`orchestrator::Orchestrator`] — fan-out, artifact writing, run summary.

pub mod cli;
pub mod config;
pub mod error;
pub mod extractors;
pub mod ledger;
pub mod orchestrator;
pub mod output;
pub mod record;
pub mod registry;
pub mod runtime;
pub mod secrets;
pub mod session;
