use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use personal_sync::cli;
use personal_sync::config::Env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "psync",
    about = "psync — personal data scraper runner",
    version,
    after_help = "Run 'psync <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run extractors and write their artifacts
    Run {
        /// Deployment environment (selects config and data directories)
        #[arg(long, value_enum, default_value = "dev")]
        env: Env,
        /// Comma-separated extractor names, or "all"
        #[arg(long, default_value = "coursera,goodreads,github_daily")]
        sources: String,
        /// Maximum number of extractors running concurrently
        #[arg(long, default_value = "1")]
        parallel: usize,
        /// Override the configuration directory
        #[arg(long)]
        config_dir: Option<PathBuf>,
        /// Override the output data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// List available extractors
    List,
    /// Check environment and configuration readiness
    Doctor {
        /// Deployment environment to check
        #[arg(long, value_enum, default_value = "dev")]
        env: Env,
        /// Override the configuration directory
        #[arg(long)]
        config_dir: Option<PathBuf>,
        /// Override the output data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let code = match args.command {
        Commands::Run {
            env,
            sources,
            parallel,
            config_dir,
            data_dir,
        } => {
            cli::run_cmd::run(cli::run_cmd::RunArgs {
                env,
                sources,
                parallel,
                config_dir,
                data_dir,
                json: args.json,
                verbose: args.verbose,
            })
            .await?
        }
        Commands::List => cli::list_cmd::run(args.json)?,
        Commands::Doctor {
            env,
            config_dir,
            data_dir,
        } => cli::doctor::run(env, config_dir, data_dir)?,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "psync", &mut std::io::stdout());
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
