//! # portico-cli
//!
//! Command-line front end for Portico shared services.
//!
//! This is the main entry point for the `portico` tool. It handles command
//! parsing, sets up logging and error handling, and dispatches to the
//! appropriate command handlers.

use std::process::ExitCode;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use portico_core::error::PorticoError;
use tracing::{error, info};

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Probe and exercise Portico shared HTTP services
#[derive(Parser)]
#[command(name = "portico", version, about = "Shared HTTP services toolkit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file to use instead of searching for portico.toml
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Settings that take precedence over every configuration file
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Base URL for the default HTTP client
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Per-attempt timeout in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Retries after the first failed attempt
    #[arg(long, global = true)]
    pub retry: Option<u32>,

    /// Bearer token for the default HTTP client
    #[arg(long, global = true, env = "PORTICO_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Longest wait for shared services, in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub max_wait: Option<u64>,

    /// Interval between readiness probes, in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub poll_interval: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report the health of every shared service
    Health {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send a request through a shared client
    Request {
        /// URL, absolute or relative to the client's base URL
        url: String,
        /// Named client preset from portico.toml
        #[arg(long)]
        client: Option<String>,
        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
        /// Extra header as NAME:VALUE
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Query parameter as KEY=VALUE
        #[arg(short, long = "query")]
        query: Vec<String>,
        /// Serve repeated reads from the response cache
        #[arg(long)]
        cached: bool,
        /// Send the request this many times
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// List configured client presets
    Clients,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    setup_panic_handler();

    info!("Starting Portico CLI v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        },
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

    rt.block_on(async {
        let ctx = CommandContext::load(cli.config.as_deref(), &cli.overrides)
            .await
            .context("Failed to load configuration")?;
        commands::dispatch_command(cli.command, &ctx).await
    })
}

/// Print an error, using the detailed formatter for Portico errors
fn report_error(e: &anyhow::Error) {
    let formatter = ErrorFormatter::new();
    match e.downcast_ref::<PorticoError>() {
        Some(portico) => {
            for cause in e.chain().take_while(|cause| !cause.is::<PorticoError>()) {
                eprintln!("{}", formatter.format_simple(&cause.to_string()));
            }
            eprintln!("{}", formatter.format_error(portico));
        },
        None => eprintln!("{}", formatter.format_chain(e)),
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "portico_cli={level},portico_core={level},portico_http={level},portico_runtime={level},portico_config={level}"
        ))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("Portico encountered an unexpected error: {}", panic_info);
        eprintln!("Portico crashed! This is a bug.");
        eprintln!("Please report this at: https://github.com/portico-rs/portico/issues");
        eprintln!("Error: {}", panic_info);
    }));
}
