//! End-to-end runs through the orchestrator with stub extractors: artifact
//! layout, failure isolation, selection validation and per-extractor budgets.

use assert_json_diff::assert_json_eq;
use async_trait::async_trait;
use personal_sync::config::{Config, Env};
use personal_sync::error::ErrorKind;
use personal_sync::ledger::RunLedger;
use personal_sync::orchestrator::{Orchestrator, RunStatus};
use personal_sync::output::OutputWriter;
use personal_sync::record::RawRecord;
use personal_sync::registry::{Extractor, Registry, Selection};
use personal_sync::secrets::Secrets;
use personal_sync::session::{Session, SessionFactory, SessionKind};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

struct NullFactory;

#[async_trait]
impl SessionFactory for NullFactory {
    async fn acquire(&self, _kind: SessionKind) -> anyhow::Result<Session> {
        Ok(Session::None)
    }
}

enum Behavior {
    Records(Vec<RawRecord>),
    Fails(&'static str),
    Hangs,
}

struct Stub {
    name: &'static str,
    behavior: Behavior,
}

#[async_trait]
impl Extractor for Stub {
    fn name(&self) -> &'static str {
        self.name
    }
    fn description(&self) -> &'static str {
        "stub"
    }
    fn session_kind(&self) -> SessionKind {
        SessionKind::None
    }
    async fn run(
        &self,
        _session: &mut Session,
        _secrets: &Secrets,
    ) -> anyhow::Result<Vec<RawRecord>> {
        match &self.behavior {
            Behavior::Records(records) => Ok(records.clone()),
            Behavior::Fails(msg) => anyhow::bail!("{msg}"),
            Behavior::Hangs => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

fn registry_of(stubs: Vec<Stub>) -> Registry {
    let mut registry = Registry::new();
    for stub in stubs {
        registry.register(Arc::new(stub));
    }
    registry
}

fn orchestrator(registry: Registry, config: Config, data_dir: &Path) -> Orchestrator {
    Orchestrator::new(
        registry,
        Env::Dev,
        Arc::new(config),
        Arc::new(NullFactory),
        OutputWriter::new(data_dir),
    )
}

fn artifact_count(data_dir: &Path) -> usize {
    let mut count = 0;
    if let Ok(entries) = std::fs::read_dir(data_dir) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                count += std::fs::read_dir(entry.path())
                    .map(|d| d.count())
                    .unwrap_or(0);
            }
        }
    }
    count
}

#[tokio::test]
async fn test_failure_does_not_abort_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_of(vec![
        Stub {
            name: "books",
            behavior: Behavior::Records(vec![json!({"title": "Dune"})]),
        },
        Stub {
            name: "commits",
            behavior: Behavior::Fails("api exploded"),
        },
    ]);
    let orch = orchestrator(registry, Config::empty(), dir.path());

    let summary = orch.run(&Selection::All, 2).await.unwrap();
    assert!(!summary.ok());
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);

    // Outcomes come back sorted by name
    assert_eq!(summary.outcomes[0].extractor, "books");
    assert_eq!(summary.outcomes[0].status, RunStatus::Success);
    assert!(summary.outcomes[0].artifact.as_ref().unwrap().exists());

    assert_eq!(summary.outcomes[1].extractor, "commits");
    assert_eq!(summary.outcomes[1].status, RunStatus::Failure);
    assert_eq!(
        summary.outcomes[1].error_kind,
        Some(ErrorKind::ExtractionFailure)
    );
    assert!(summary.outcomes[1]
        .error
        .as_ref()
        .unwrap()
        .contains("api exploded"));

    // The failing extractor wrote nothing
    assert_eq!(artifact_count(dir.path()), 1);
}

#[tokio::test]
async fn test_unknown_name_rejects_whole_run() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_of(vec![Stub {
        name: "books",
        behavior: Behavior::Records(vec![json!({"title": "Dune"})]),
    }]);
    let orch = orchestrator(registry, Config::empty(), dir.path());

    let selection = Selection::parse("books,orkut");
    let err = orch.run(&selection, 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownExtractor);
    assert!(err.to_string().contains("orkut"));

    // Fail-fast: nothing executed, nothing written
    assert_eq!(artifact_count(dir.path()), 0);
}

#[tokio::test]
async fn test_all_success_shares_run_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_of(vec![
        Stub {
            name: "books",
            behavior: Behavior::Records(vec![json!({"title": "Dune"})]),
        },
        Stub {
            name: "plan",
            behavior: Behavior::Records(vec![json!({"nombre": "Redes"})]),
        },
    ]);
    let orch = orchestrator(registry, Config::empty(), dir.path());

    let summary = orch.run(&Selection::All, 2).await.unwrap();
    assert!(summary.ok());
    assert_eq!(artifact_count(dir.path()), 2);

    for outcome in &summary.outcomes {
        let path = outcome.artifact.as_ref().unwrap();
        let file_name = path.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(
            file_name,
            format!("{}_{}.json", outcome.extractor, summary.run_timestamp)
        );
    }

    let books_path = summary.outcomes[0].artifact.as_ref().unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(books_path).unwrap()).unwrap();
    assert_json_eq!(written, json!([{"title": "Dune"}]));
}

#[tokio::test]
async fn test_budget_override_times_out_slow_extractor() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_of(vec![
        Stub {
            name: "books",
            behavior: Behavior::Records(vec![json!({"title": "Dune"})]),
        },
        Stub {
            name: "slow",
            behavior: Behavior::Hangs,
        },
    ]);
    let config = Config::from_pairs([("slow.timeout", "1")]);
    let orch = orchestrator(registry, config, dir.path());

    let summary = orch.run(&Selection::All, 2).await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);

    let slow = summary
        .outcomes
        .iter()
        .find(|o| o.extractor == "slow")
        .unwrap();
    assert_eq!(slow.error_kind, Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn test_repeated_runs_write_distinct_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let make_registry = || {
        registry_of(vec![Stub {
            name: "books",
            behavior: Behavior::Records(vec![json!({"title": "Dune"})]),
        }])
    };

    let orch = orchestrator(make_registry(), Config::empty(), dir.path());
    let first = orch.run(&Selection::All, 1).await.unwrap();

    // Second-resolution timestamps need a new second to differ
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let orch = orchestrator(make_registry(), Config::empty(), dir.path());
    let second = orch.run(&Selection::All, 1).await.unwrap();

    assert_ne!(first.run_timestamp, second.run_timestamp);
    assert_eq!(artifact_count(dir.path()), 2);
}

#[tokio::test]
async fn test_run_with_ledger_records_every_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_of(vec![
        Stub {
            name: "books",
            behavior: Behavior::Records(vec![json!({"title": "Dune"})]),
        },
        Stub {
            name: "commits",
            behavior: Behavior::Fails("nope"),
        },
    ]);
    let ledger = RunLedger::open(&dir.path().join("runs.jsonl")).unwrap();
    let orch = orchestrator(registry, Config::empty(), dir.path()).with_ledger(ledger);

    orch.run(&Selection::All, 1).await.unwrap();

    let contents = std::fs::read_to_string(dir.path().join("runs.jsonl")).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    let statuses: Vec<&str> = lines
        .iter()
        .map(|l| l["status"].as_str().unwrap())
        .collect();
    assert!(statuses.contains(&"success"));
    assert!(statuses.contains(&"failure"));
}
