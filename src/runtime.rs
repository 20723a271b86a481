//! Scraper execution lifecycle.
//!
//! `ScraperRuntime` wraps exactly one extractor execution: secrets are
//! resolved first (absence short-circuits before any remote side effect),
//! then session acquisition and the capability run share one time budget,
//! raw records are normalized, and the handle is released on every exit
//! path — success, failure, timeout or shutdown. Failures are values:
//! `execute` never propagates a per-extractor error to the caller.
//!
//! State machine per execution:
//! Idle → SecretsResolved → HandleAcquired → Running → {Succeeded | Failed}
//! → HandleReleased → Terminal, with HandleReleased reachable from every
//! non-Idle state.

use crate::error::ScrapeError;
use crate::record::{self, RawRecord};
use crate::registry::Capability;
use crate::secrets::SecretStore;
use crate::session::{Session, SessionFactory};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Outcome of one extractor execution. Owned by the orchestrator; never
/// persisted itself — only the normalized records are.
pub struct ExtractionResult {
    pub extractor: String,
    pub dataset: String,
    pub singleton: bool,
    pub duration: Duration,
    pub records: Result<Vec<RawRecord>, ScrapeError>,
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        self.records.is_ok()
    }

    /// The artifact payload for a successful result.
    pub fn payload(&self) -> Option<Value> {
        self.records
            .as_ref()
            .ok()
            .map(|records| record::payload(records, self.singleton))
    }
}

/// Executes a single extractor under the fixed lifecycle.
pub struct ScraperRuntime {
    secrets: SecretStore,
    factory: Arc<dyn SessionFactory>,
    shutdown: watch::Receiver<bool>,
}

impl ScraperRuntime {
    pub fn new(
        secrets: SecretStore,
        factory: Arc<dyn SessionFactory>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            secrets,
            factory,
            shutdown,
        }
    }

    /// Run one capability to completion within `budget`.
    pub async fn execute(&self, capability: &Capability, budget: Duration) -> ExtractionResult {
        let started = Instant::now();
        let name = capability.name();

        let finish = |records, started: Instant| ExtractionResult {
            extractor: name.to_string(),
            dataset: capability.dataset().to_string(),
            singleton: capability.singleton(),
            duration: started.elapsed(),
            records,
        };
        let cancelled = || ScrapeError::ExtractionFailure {
            extractor: name.to_string(),
            message: "run cancelled by shutdown signal".to_string(),
        };

        // A shutdown observed before dispatch opens no resources at all.
        if *self.shutdown.borrow() {
            return finish(Err(cancelled()), started);
        }

        // Secrets first: a missing key means run() is never invoked and no
        // session is opened.
        let secrets = match self.secrets.resolve(
            name,
            capability.required_secrets(),
            capability.optional_settings(),
        ) {
            Ok(secrets) => secrets,
            Err(err) => return finish(Err(err), started),
        };
        debug!(extractor = name, "secrets resolved");

        // The session lands in `slot` so it can be released even when the
        // work future is dropped by the timeout or the shutdown branch.
        let mut slot: Option<Session> = None;
        let work = async {
            let session = match self.factory.acquire(capability.session_kind()).await {
                Ok(session) => slot.insert(session),
                Err(e) => {
                    return Err(ScrapeError::AcquisitionFailure {
                        extractor: name.to_string(),
                        message: format!("{e:#}"),
                    })
                }
            };
            debug!(extractor = name, kind = %capability.session_kind(), "session acquired");
            capability
                .run(session, &secrets)
                .await
                .map_err(|e| ScrapeError::ExtractionFailure {
                    extractor: name.to_string(),
                    message: format!("{e:#}"),
                })
        };

        // Acquisition and run share the budget: a hung driver launch is a
        // timeout like any other and stays interruptible by shutdown.
        let mut shutdown = self.shutdown.clone();
        let records = tokio::select! {
            run = tokio::time::timeout(budget, work) => {
                match run {
                    Err(_) => Err(ScrapeError::Timeout {
                        extractor: name.to_string(),
                        budget_secs: budget.as_secs(),
                    }),
                    Ok(Err(e)) => Err(e),
                    Ok(Ok(raw)) => record::normalize(raw).map_err(|message| {
                        ScrapeError::NormalizationError {
                            extractor: name.to_string(),
                            message,
                        }
                    }),
                }
            }
            _ = shutdown_fired(&mut shutdown) => Err(cancelled()),
        };

        // Release whatever was acquired, on every exit path. A release
        // failure is logged but never masks the extraction outcome.
        if let Some(session) = slot.take() {
            if let Err(e) = self.factory.release(session).await {
                warn!(extractor = name, "session release failed: {e:#}");
            }
            debug!(extractor = name, "session released");
        }

        finish(records, started)
    }
}

/// Resolves once the shutdown signal fires; pends forever if the sender is
/// gone without firing.
async fn shutdown_fired(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::registry::Extractor;
    use crate::secrets::Secrets;
    use crate::session::{Session, SessionKind};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Factory that counts acquisitions and releases.
    struct CountingFactory {
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    impl CountingFactory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SessionFactory for CountingFactory {
        async fn acquire(&self, _kind: SessionKind) -> anyhow::Result<Session> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Session::None)
        }
        async fn release(&self, _session: Session) -> anyhow::Result<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Stub {
        name: &'static str,
        required: &'static [&'static str],
        behavior: Behavior,
        invocations: AtomicUsize,
    }

    enum Behavior {
        Records(Vec<RawRecord>),
        Fails(&'static str),
        Hangs,
        BadRecord,
    }

    impl Stub {
        fn new(name: &'static str, behavior: Behavior) -> Self {
            Self {
                name,
                required: &[],
                behavior,
                invocations: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Extractor for Stub {
        fn name(&self) -> &'static str {
            self.name
        }
        fn description(&self) -> &'static str {
            "stub"
        }
        fn required_secrets(&self) -> &'static [&'static str] {
            self.required
        }
        fn session_kind(&self) -> SessionKind {
            SessionKind::None
        }
        async fn run(
            &self,
            _session: &mut Session,
            _secrets: &Secrets,
        ) -> anyhow::Result<Vec<RawRecord>> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Records(records) => Ok(records.clone()),
                Behavior::Fails(msg) => anyhow::bail!("{msg}"),
                Behavior::Hangs => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
                Behavior::BadRecord => Ok(vec![json!(["not", "an", "object"])]),
            }
        }
    }

    fn runtime_with(factory: Arc<CountingFactory>, config: Config) -> ScraperRuntime {
        // Sender dropped immediately; the runtime treats that as "never fires".
        let (_, rx) = watch::channel(false);
        ScraperRuntime::new(SecretStore::new(Arc::new(config)), factory, rx)
    }

    #[tokio::test]
    async fn test_success_normalizes_and_releases_once() {
        let factory = CountingFactory::new();
        let runtime = runtime_with(factory.clone(), Config::empty());
        let cap: Capability = Arc::new(Stub::new(
            "stub",
            Behavior::Records(vec![json!({"title": "Dune", "percent": 26})]),
        ));

        let result = runtime.execute(&cap, Duration::from_secs(5)).await;
        assert!(result.is_success());
        assert_eq!(result.payload().unwrap()[0]["title"], "Dune");
        assert_eq!(factory.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(factory.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_secret_short_circuits_run() {
        let factory = CountingFactory::new();
        let runtime = runtime_with(factory.clone(), Config::empty());
        let mut stub = Stub::new("stub", Behavior::Records(Vec::new()));
        stub.required = &["stub.token"];
        let cap: Capability = Arc::new(stub);

        let result = runtime.execute(&cap, Duration::from_secs(5)).await;
        let err = result.records.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingConfiguration);
        // run() was never invoked and no session was opened
        assert_eq!(factory.acquired.load(Ordering::SeqCst), 0);
        assert_eq!(factory.released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_extractor_error_becomes_result_value() {
        let factory = CountingFactory::new();
        let runtime = runtime_with(factory.clone(), Config::empty());
        let cap: Capability = Arc::new(Stub::new("stub", Behavior::Fails("boom")));

        let result = runtime.execute(&cap, Duration::from_secs(5)).await;
        let err = result.records.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExtractionFailure);
        assert!(err.to_string().contains("boom"));
        assert_eq!(factory.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_converts_and_force_releases() {
        let factory = CountingFactory::new();
        let runtime = runtime_with(factory.clone(), Config::empty());
        let cap: Capability = Arc::new(Stub::new("stub", Behavior::Hangs));

        let result = runtime.execute(&cap, Duration::from_millis(50)).await;
        let err = result.records.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(factory.released.load(Ordering::SeqCst), 1);
    }

    /// Factory whose acquire never completes.
    struct HangingFactory {
        released: AtomicUsize,
    }

    #[async_trait]
    impl SessionFactory for HangingFactory {
        async fn acquire(&self, _kind: SessionKind) -> anyhow::Result<Session> {
            std::future::pending::<()>().await;
            unreachable!()
        }
        async fn release(&self, _session: Session) -> anyhow::Result<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_acquisition_times_out() {
        let factory = Arc::new(HangingFactory {
            released: AtomicUsize::new(0),
        });
        let (_, rx) = watch::channel(false);
        let runtime = ScraperRuntime::new(
            SecretStore::new(Arc::new(Config::empty())),
            factory.clone(),
            rx,
        );
        let cap: Capability = Arc::new(Stub::new("stub", Behavior::Records(Vec::new())));

        let result = runtime.execute(&cap, Duration::from_millis(100)).await;
        assert_eq!(result.records.unwrap_err().kind(), ErrorKind::Timeout);
        // Nothing was acquired, so there is nothing to release
        assert_eq!(factory.released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_before_dispatch_opens_no_resources() {
        let factory = CountingFactory::new();
        let (tx, rx) = watch::channel(false);
        let runtime = ScraperRuntime::new(
            SecretStore::new(Arc::new(Config::empty())),
            factory.clone(),
            rx,
        );
        let cap: Capability = Arc::new(Stub::new("stub", Behavior::Records(Vec::new())));

        tx.send(true).unwrap();
        let result = runtime.execute(&cap, Duration::from_secs(5)).await;

        let err = result.records.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert_eq!(factory.acquired.load(Ordering::SeqCst), 0);
        assert_eq!(factory.released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_record_is_normalization_error() {
        let factory = CountingFactory::new();
        let runtime = runtime_with(factory.clone(), Config::empty());
        let cap: Capability = Arc::new(Stub::new("stub", Behavior::BadRecord));

        let result = runtime.execute(&cap, Duration::from_secs(5)).await;
        assert_eq!(result.records.unwrap_err().kind(), ErrorKind::NormalizationError);
        assert_eq!(factory.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_and_releases() {
        let factory = CountingFactory::new();
        let (tx, rx) = watch::channel(false);
        let runtime = ScraperRuntime::new(
            SecretStore::new(Arc::new(Config::empty())),
            factory.clone(),
            rx,
        );
        let cap: Capability = Arc::new(Stub::new("stub", Behavior::Hangs));

        let exec = runtime.execute(&cap, Duration::from_secs(3600));
        tokio::pin!(exec);
        // Let the execution reach the run phase, then signal shutdown.
        tokio::select! {
            biased;
            _ = &mut exec => panic!("should not finish yet"),
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }
        tx.send(true).unwrap();
        let result = exec.await;

        let err = result.records.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert_eq!(factory.released.load(Ordering::SeqCst), 1);
    }
}
