//! Runtime Agent
//!
//! Main entry point for the runtime-agent binary.

mod cli;

use std::future::Future;
use std::io::Read;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tracing::info;

use runtime_agent::config::{self, AgentConfig};
use runtime_agent::error::{Error, ErrorCode, Result};
use runtime_agent::executor::{TaskEnvelope, TaskExecutor};
use runtime_agent::logging::{self, LogGuards};
use runtime_agent::runtime::{self as runtimes, KubeConnector};
use runtime_agent::service::ClusterService;

use crate::cli::{Cli, Commands, ConfigSubcommand, RuntimesSubcommand};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Config { subcommand } => handle_config_command(subcommand),
        Commands::Runtimes { subcommand } => match subcommand {
            RuntimesSubcommand::List { config } => {
                let config = AgentConfig::load(config.as_deref())?;
                let _log_guards = init_logging(&config, cli.verbose, cli.quiet)?;
                block_on(list_runtimes(config))?
            }
            RuntimesSubcommand::Check { name, config } => {
                let config = AgentConfig::load(config.as_deref())?;
                let _log_guards = init_logging(&config, cli.verbose, cli.quiet)?;
                block_on(check_runtime(config, name))?
            }
        },
        Commands::Status { config } => {
            let config = AgentConfig::load(config.as_deref())?;
            let _log_guards = init_logging(&config, cli.verbose, cli.quiet)?;
            block_on(status(config))?
        }
        Commands::Exec { config, file } => {
            let config = AgentConfig::load(config.as_deref())?;
            let log_guards = init_logging(&config, cli.verbose, cli.quiet)?;
            let input = read_input(file.as_deref())?;
            let all_succeeded = block_on(exec(config, input))??;

            // Flush file logs before exiting with a failure status
            drop(log_guards);
            if !all_succeeded {
                std::process::exit(ErrorCode::TaskFailed.exit_code());
            }
            Ok(())
        }
    }
}

fn init_logging(config: &AgentConfig, verbose: u8, quiet: bool) -> Result<LogGuards> {
    logging::init_logging(&config.logging, verbose, quiet)
}

/// Run a future on a current-thread runtime
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create runtime: {}", e)))?;
    Ok(rt.block_on(future))
}

async fn build_service(config: &AgentConfig) -> Result<Arc<ClusterService>> {
    let connector = Arc::new(KubeConnector::from_settings(&config.kubernetes));
    let service = ClusterService::from_settings(&config.kubernetes, connector).await?;
    Ok(Arc::new(service))
}

async fn list_runtimes(config: AgentConfig) -> Result<()> {
    let path = config.runtimes_path().ok_or(Error::MissingRuntimesConfig)?;
    let blob = runtimes::read_bundle_file(&path).await?;
    let table = runtimes::parse(&blob, config.kubernetes.effective_encoding())?;

    if table.is_empty() {
        println!("No runtimes configured ({})", path.display());
        return Ok(());
    }

    println!("{:<24} HOST", "NAME");
    for (name, runtime) in &table {
        let marker = if *name == config.kubernetes.default_runtime {
            " (default)"
        } else {
            ""
        };
        println!("{:<24} {}{}", name, runtime.host, marker);
    }
    Ok(())
}

async fn check_runtime(config: AgentConfig, name: String) -> Result<()> {
    let service = build_service(&config).await?;
    let client = service.registry().get_client(&name).await?;
    println!("Runtime {} is ready ({})", name, client.endpoint());
    Ok(())
}

async fn status(config: AgentConfig) -> Result<()> {
    let service = build_service(&config).await?;
    service.init().await?;
    println!("Home cluster: reachable");

    let registry = service.registry();
    println!("Runtimes: {}", registry.len());
    for name in registry.runtime_names() {
        if let Some(state) = registry.state(&name) {
            println!("  {:<24} {}", name, state);
        }
    }
    Ok(())
}

/// Read the envelope text from a file or stdin
fn read_input(file: Option<&str>) -> Result<String> {
    match file {
        None | Some("-") => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            Ok(input)
        }
        Some(path) => std::fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.into(),
            source: e,
        }),
    }
}

/// Run one envelope or a batch; returns whether every task succeeded
async fn exec(config: AgentConfig, input: String) -> Result<bool> {
    let document: Value = serde_json::from_str(&input)?;

    match document {
        Value::Array(items) => {
            // Every envelope is checked before any runtime is loaded
            let envelopes = items
                .into_iter()
                .map(TaskEnvelope::from_value)
                .collect::<Result<Vec<_>>>()?;

            let executor = TaskExecutor::new(build_service(&config).await?)
                .with_task_history(config.agent.task_history);
            let reports = executor.submit_all(envelopes).await;
            println!("{}", serde_json::to_string_pretty(&reports)?);

            let failed = reports.iter().filter(|r| !r.success).count();
            info!(total = reports.len(), failed, "Batch finished");
            Ok(failed == 0)
        }
        single => {
            let envelope = TaskEnvelope::from_value(single)?;
            let executor = TaskExecutor::new(build_service(&config).await?)
                .with_task_history(config.agent.task_history);
            let outcome = executor.execute(envelope).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(true)
        }
    }
}

/// Handle config subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = AgentConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg.redacted())?);
        }
        ConfigSubcommand::Init { path, force } => {
            config::init_config(path.as_deref(), force)?;
        }
        ConfigSubcommand::Validate { config } => {
            AgentConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
