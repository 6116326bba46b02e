//! `protocol-engine` command line.
//!
//! ```bash
//! protocol-engine run demos/transfer.json --config demos/protocol-engine.toml
//! protocol-engine run demos/transfer.rhai --json-output
//! protocol-engine validate demos/transfer.rhai
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use protocol_engine::config::EngineConfig;
use protocol_engine::runner::{create_simulating_runner, ProtocolSource, RunResult, RunStatus};
use protocol_engine::scripting::{RhaiEngine, ScriptEngine};
use protocol_engine::logging;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run liquid-handling protocols against a simulated robot",
    long_about = None
)]
struct Cli {
    /// Configuration file (TOML). Environment variables still apply.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a .json or .rhai protocol and print the run result
    Run {
        protocol: PathBuf,

        /// Print the full result as JSON instead of a summary
        #[arg(long)]
        json_output: bool,
    },
    /// Check that a protocol parses (JSON) or compiles (Rhai)
    Validate { protocol: PathBuf },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    }
    .context("loading configuration")?;
    logging::init_from_config(&config)?;

    match cli.command {
        Commands::Run {
            protocol,
            json_output,
        } => run(&config, &protocol, json_output).await,
        Commands::Validate { protocol } => validate(&config, &protocol).await,
    }
}

async fn run(config: &EngineConfig, path: &Path, json_output: bool) -> Result<ExitCode> {
    let source = ProtocolSource::from_path(path)
        .with_context(|| format!("reading protocol {}", path.display()))?;
    info!(protocol = source.name(), "Starting run");

    let (runner, _hardware) = create_simulating_runner(config);
    let result = runner.run(source).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    Ok(match result.status {
        RunStatus::Succeeded => ExitCode::SUCCESS,
        RunStatus::Failed | RunStatus::Stopped => ExitCode::FAILURE,
    })
}

async fn validate(config: &EngineConfig, path: &Path) -> Result<ExitCode> {
    let source = ProtocolSource::from_path(path)
        .with_context(|| format!("reading protocol {}", path.display()))?;

    match source {
        ProtocolSource::Json(protocol) => {
            let commands = protocol.to_commands()?;
            println!("{}: OK ({} commands)", path.display(), commands.len());
        }
        ProtocolSource::Script { source, .. } => {
            RhaiEngine::with_limit(config.scripting.max_operations)
                .validate_script(&source)
                .await?;
            println!("{}: OK", path.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(result: &RunResult) {
    println!("status: {:?}", result.status);
    for command in &result.commands {
        println!(
            "  {:<22} {:<10} {}",
            command.command_type().to_string(),
            command.status.to_string(),
            command.id
        );
    }
    if !result.unexecuted.is_empty() {
        println!("unexecuted: {}", result.unexecuted.len());
    }
    for error in &result.errors {
        println!("error: {}: {}", error.error_type, error.detail);
    }
}
