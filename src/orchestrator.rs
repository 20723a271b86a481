//! Run orchestration: selection → independent executions → run summary.
//!
//! The orchestrator validates the requested selection against the registry
//! (an unknown name rejects the whole run before anything executes), runs
//! each selected extractor through a [`ScraperRuntime`] with bounded
//! concurrency, writes one artifact per success, and aggregates a
//! [`RunSummary`]. A failing extractor never aborts its siblings.

use crate::config::{Config, Env};
use crate::error::{ErrorKind, ScrapeError};
use crate::ledger::{LedgerEvent, RunLedger};
use crate::output::{OutputWriter, TIMESTAMP_FORMAT};
use crate::registry::{Registry, Selection};
use crate::runtime::{ExtractionResult, ScraperRuntime};
use crate::secrets::SecretStore;
use crate::session::SessionFactory;
use chrono::{Local, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info};

/// Default per-extractor time budget in seconds.
const DEFAULT_BUDGET_SECS: i64 = 25;

/// Create the shutdown signal pair. Send `true` to cancel a run in flight;
/// in-flight sessions are still released before `run` returns.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Final status of one extractor within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

/// One extractor's outcome as reported in the run summary.
#[derive(Debug, Serialize)]
pub struct ExtractorOutcome {
    pub extractor: String,
    pub status: RunStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated result of one run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub environment: Env,
    pub run_timestamp: String,
    pub succeeded: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
    pub outcomes: Vec<ExtractorOutcome>,
}

impl RunSummary {
    /// A run is classified successful only when no requested extractor failed.
    pub fn ok(&self) -> bool {
        self.failed == 0
    }
}

/// Turns a run request into independent ScraperRuntime executions.
pub struct Orchestrator {
    registry: Registry,
    env: Env,
    config: Arc<Config>,
    factory: Arc<dyn SessionFactory>,
    writer: OutputWriter,
    ledger: Option<Mutex<RunLedger>>,
    shutdown: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        registry: Registry,
        env: Env,
        config: Arc<Config>,
        factory: Arc<dyn SessionFactory>,
        writer: OutputWriter,
    ) -> Self {
        // Sender dropped immediately: without an attached signal the run is
        // simply never cancelled.
        let (_, shutdown) = shutdown_channel();
        Self {
            registry,
            env,
            config,
            factory,
            writer,
            ledger: None,
            shutdown,
        }
    }

    pub fn with_ledger(mut self, ledger: RunLedger) -> Self {
        self.ledger = Some(Mutex::new(ledger));
        self
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Registered extractor names and descriptions. No side effects: no
    /// secrets are loaded and no sessions are opened.
    pub fn list(&self) -> Vec<(&'static str, &'static str)> {
        self.registry
            .iter()
            .map(|c| (c.name(), c.description()))
            .collect()
    }

    /// Execute the selected extractors and aggregate a run summary.
    ///
    /// Returns `Err` only for request-validation failures
    /// (`UnknownExtractor`); every per-extractor failure is contained in the
    /// summary.
    pub async fn run(
        &self,
        selection: &Selection,
        parallel: usize,
    ) -> Result<RunSummary, ScrapeError> {
        let selected = self.registry.resolve(selection)?;

        let run_started = Instant::now();
        let run_timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        info!(
            environment = %self.env,
            count = selected.len(),
            parallel = parallel.max(1),
            "starting run {run_timestamp}"
        );

        let runtime = ScraperRuntime::new(
            SecretStore::new(Arc::clone(&self.config)),
            Arc::clone(&self.factory),
            self.shutdown.clone(),
        );

        // Extractors share no writable state, so bounded parallel dispatch is
        // safe; completion order is not significant.
        let runtime_ref = &runtime;
        let results: Vec<ExtractionResult> = stream::iter(selected)
            .map(|capability| {
                let budget = self.budget_for(capability.name());
                async move { runtime_ref.execute(&capability, budget).await }
            })
            .buffer_unordered(parallel.max(1))
            .collect()
            .await;

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            outcomes.push(self.settle(result, &run_timestamp));
        }
        // Dispatch order is not deterministic under parallelism; report by name.
        outcomes.sort_by(|a, b| a.extractor.cmp(&b.extractor));

        let succeeded = outcomes
            .iter()
            .filter(|o| o.status == RunStatus::Success)
            .count();
        let failed = outcomes.len() - succeeded;

        let summary = RunSummary {
            environment: self.env,
            run_timestamp,
            succeeded,
            failed,
            total_duration_ms: run_started.elapsed().as_millis() as u64,
            outcomes,
        };
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "run finished in {}ms",
            summary.total_duration_ms
        );
        Ok(summary)
    }

    /// Write the artifact for a success, log the failure otherwise, and emit
    /// the ledger entry. A write failure reclassifies the extractor as failed.
    fn settle(&self, result: ExtractionResult, run_timestamp: &str) -> ExtractorOutcome {
        let duration_ms = result.duration.as_millis() as u64;

        let settled: Result<PathBuf, ScrapeError> = match result.payload() {
            Some(payload) => self
                .writer
                .write(&result.dataset, run_timestamp, &payload)
                .map_err(|e| ScrapeError::WriteError {
                    extractor: result.extractor.clone(),
                    message: format!("{e:#}"),
                }),
            None => Err(match result.records {
                Err(err) => err,
                // payload() is None only for failures
                Ok(_) => ScrapeError::ExtractionFailure {
                    extractor: result.extractor.clone(),
                    message: "payload missing for successful result".to_string(),
                },
            }),
        };

        let outcome = match settled {
            Ok(path) => {
                info!(
                    extractor = %result.extractor,
                    artifact = %path.display(),
                    "extraction succeeded in {duration_ms}ms"
                );
                ExtractorOutcome {
                    extractor: result.extractor,
                    status: RunStatus::Success,
                    duration_ms,
                    artifact: Some(path),
                    error_kind: None,
                    error: None,
                }
            }
            Err(err) => {
                error!(
                    extractor = %result.extractor,
                    kind = %err.kind(),
                    "extraction failed: {err}"
                );
                ExtractorOutcome {
                    extractor: result.extractor,
                    status: RunStatus::Failure,
                    duration_ms,
                    artifact: None,
                    error_kind: Some(err.kind()),
                    error: Some(err.to_string()),
                }
            }
        };

        if let Some(ledger) = &self.ledger {
            // A panic while logging must not cost later outcomes their entry.
            let mut ledger = match ledger.lock() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    error!("run ledger mutex poisoned, recovering");
                    poisoned.into_inner()
                }
            };
            let event = LedgerEvent {
                timestamp: Utc::now().to_rfc3339(),
                environment: self.env.to_string(),
                extractor: outcome.extractor.clone(),
                status: match outcome.status {
                    RunStatus::Success => "success".to_string(),
                    RunStatus::Failure => "failure".to_string(),
                },
                error_kind: outcome.error_kind.map(|k| k.to_string()),
                error: outcome.error.clone(),
                duration_ms,
                artifact: outcome
                    .artifact
                    .as_ref()
                    .map(|p| p.display().to_string()),
            };
            if let Err(e) = ledger.log(&event) {
                error!("run ledger write failed: {e:#}");
            }
        }

        outcome
    }

    fn budget_for(&self, name: &str) -> Duration {
        let secs = self
            .config
            .get_int(&format!("{name}.timeout"), DEFAULT_BUDGET_SECS)
            .max(1);
        Duration::from_secs(secs as u64)
    }
}
