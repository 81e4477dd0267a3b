// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AgentEvolution CLI
//!
//! The `agentevolution` binary runs a local tool registry node.
//!
//! ## Commands
//!
//! - `agentevolution serve` - Run the registry service
//! - `agentevolution config validate|generate` - Configuration management
//!
//! ## Exit codes
//!
//! - `0` - normal shutdown
//! - `2` - configuration error
//! - `3` - could not bind the listen address
//! - `4` - registry store unavailable or corrupt

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;

use commands::config::ConfigCommand;
use commands::serve::ServeError;

const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_BIND_ERROR: i32 = 3;
const EXIT_STORE_ERROR: i32 = 4;

/// AgentEvolution - local tool registry for autonomous agents
#[derive(Parser)]
#[command(name = "agentevolution")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration manifest (defaults apply when omitted)
    #[arg(
        short,
        long,
        global = true,
        env = "EVOLUTION_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// HTTP API host (overrides the manifest)
    #[arg(long, global = true, env = "EVOLUTION_HOST")]
    host: Option<String>,

    /// HTTP API port (overrides the manifest)
    #[arg(long, global = true, env = "EVOLUTION_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "EVOLUTION_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the registry service
    Serve,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("{}", format!("Failed to initialize logging: {e:#}").red());
        std::process::exit(EXIT_CONFIG_ERROR);
    }

    let outcome = match cli.command {
        Some(Commands::Serve) | None => {
            commands::serve::run(cli.config, cli.host, cli.port).await.map_err(|e| {
                let code = match &e {
                    ServeError::Config(_) => EXIT_CONFIG_ERROR,
                    ServeError::Bind { .. } => EXIT_BIND_ERROR,
                    ServeError::Store(_) => EXIT_STORE_ERROR,
                    ServeError::Runtime(_) => 1,
                };
                (code, anyhow::Error::new(e))
            })
        }
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config)
            .map_err(|e| (EXIT_CONFIG_ERROR, e)),
    };

    if let Err((code, error)) = outcome {
        eprintln!("{}", format!("{error:#}").red());
        std::process::exit(code);
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
