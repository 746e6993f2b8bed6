//! Dex auth operator.
//!
//! # Architecture Overview
//!
//! ```text
//!   options file ──┐                  ┌────────────────────────────────────────┐
//!                  │ watcher / hook   │               reconciler               │
//!   relation dir ──┼─────────────────▶│ settings ▶ render ▶ apply ▶ publish    │
//!                  │     Event        └──────┬────────────────┬─────────┬──────┘
//!   dispatch CLI ──┘                         │                │         │
//!                                            ▼                ▼         ▼
//!                                     relation store      workload    status
//!                                     (bags on disk)    (Dex process) (admin API)
//! ```
//!
//! `run` keeps an agent alive that turns file changes into hooks;
//! `dispatch` runs exactly one hook and prints the report as JSON.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use dex_auth_operator::config::loader::load_config;
use dex_auth_operator::lifecycle::startup;
use dex_auth_operator::observability::logging::init_logging;
use dex_auth_operator::OperatorConfig;

#[derive(Parser)]
#[command(name = "dex-auth-operator", version, about = "Operator for the Dex OIDC provider")]
struct Cli {
    /// Agent configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the long-lived agent.
    Run,
    /// Run one lifecycle hook, e.g. `config-changed` or `ingress-relation-changed`.
    Dispatch {
        hook: String,
    },
}

fn load(path: Option<&PathBuf>) -> Result<OperatorConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(OperatorConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(cli.config.as_ref())?;
    init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dex-auth-operator starting");

    match cli.command {
        Command::Run => startup::run(config).await?,
        Command::Dispatch { hook } => {
            let report = tokio::task::spawn_blocking(move || startup::dispatch(config, &hook)).await?;
            match report {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => tracing::info!("Hook not observed, nothing to do"),
            }
        }
    }
    Ok(())
}
