//! Execute a run: wire the configuration, registry, session factory, output
//! writer and ledger together, then hand off to the orchestrator.

use crate::config::{Config, Env};
use crate::error::{ErrorKind, ScrapeError};
use crate::extractors;
use crate::ledger::RunLedger;
use crate::orchestrator::{shutdown_channel, Orchestrator, RunStatus, RunSummary};
use crate::output::OutputWriter;
use crate::registry::Selection;
use crate::session::DefaultSessionFactory;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub struct RunArgs {
    pub env: Env,
    pub sources: String,
    pub parallel: usize,
    pub config_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
}

/// Run the selected extractors. Returns the process exit code:
/// 0 when every requested extractor succeeded, 1 when any failed,
/// 2 when the selection named an unknown extractor.
pub async fn run(args: RunArgs) -> Result<i32> {
    init_tracing(args.verbose);

    let config_dir = args
        .config_dir
        .clone()
        .unwrap_or_else(|| args.env.default_config_dir());
    let config = Arc::new(Config::load(&config_dir, args.env));

    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| config.get("data.dir").map(PathBuf::from))
        .unwrap_or_else(|| args.env.default_data_dir());
    info!(
        environment = %args.env,
        config_dir = %config_dir.display(),
        data_dir = %data_dir.display(),
        "starting psync v{}",
        env!("CARGO_PKG_VERSION")
    );

    let http_timeout_ms = (config.get_int("http.timeout", 20).max(1) as u64) * 1_000;
    let headless = config.get_bool("browser.headless", true);
    let factory = Arc::new(DefaultSessionFactory::new(http_timeout_ms, headless));

    let writer = OutputWriter::new(&data_dir);
    let ledger = RunLedger::open(&data_dir.join("runs.jsonl"))?;

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            let _ = shutdown_tx.send(true);
        }
    });

    let orchestrator = Orchestrator::new(
        extractors::builtin(),
        args.env,
        config,
        factory,
        writer,
    )
    .with_ledger(ledger)
    .with_shutdown(shutdown_rx);

    let selection = Selection::parse(&args.sources);
    match orchestrator.run(&selection, args.parallel).await {
        Ok(summary) => {
            print_summary(&summary, args.json);
            Ok(if summary.ok() { 0 } else { 1 })
        }
        Err(err) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "error": err.to_string(),
                        "error_kind": err.kind(),
                    })
                );
            } else {
                eprintln!("Error: {err}");
            }
            Ok(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &ScrapeError) -> i32 {
    match err.kind() {
        ErrorKind::UnknownExtractor => 2,
        _ => 1,
    }
}

fn print_summary(summary: &RunSummary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Error: summary serialization failed: {e}"),
        }
        return;
    }

    println!(
        "Run {} ({}): {} succeeded, {} failed in {}ms",
        summary.run_timestamp,
        summary.environment,
        summary.succeeded,
        summary.failed,
        summary.total_duration_ms
    );
    for outcome in &summary.outcomes {
        match outcome.status {
            RunStatus::Success => {
                let artifact = outcome
                    .artifact
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!(
                    "  [ok] {:<14} {}ms  {artifact}",
                    outcome.extractor, outcome.duration_ms
                );
            }
            RunStatus::Failure => {
                println!(
                    "  [!!] {:<14} {}ms  {}",
                    outcome.extractor,
                    outcome.duration_ms,
                    outcome.error.as_deref().unwrap_or("unknown failure")
                );
            }
        }
    }
}

/// Initialize tracing once. `RUST_LOG` still wins over the verbosity flag.
fn init_tracing(verbose: bool) {
    let directive = if verbose {
        "personal_sync=debug"
    } else {
        "personal_sync=info"
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(directive.parse().unwrap_or_default());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
