//! SSL Agent - Main entry point
//!
//! One-shot ACME agent: `info`, `create` or `renew`, configured from the
//! environment.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;

use ssl_agent::summary::usage;
use ssl_agent::{Acme2Client, Action, AgentError, CertificateAgent};
use ssl_agent_config::AgentConfig;

/// SSL Agent - Let's Encrypt certificates for an existing web server
#[derive(Parser, Debug)]
#[command(name = "ssl-agent")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Show the CA endpoint and which certificate files exist
    Info,
    /// Generate keys if needed, register and issue a first certificate
    Create,
    /// Issue a new certificate with the existing keys
    Renew,
}

impl From<Commands> for Action {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Info => Action::Info,
            Commands::Create => Action::Create,
            Commands::Renew => Action::Renew,
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version go to stdout and are not failures
            let _ = err.print();
            if !err.use_stderr() {
                return ExitCode::SUCCESS;
            }
            println!("ERROR: command invalid. Should be one of 'info,create,renew'");
            println!("{}", usage());
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match run(cli.command.into()) {
        Ok(()) => {
            println!("\n\nAll done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "ssl-agent failed");
            ExitCode::FAILURE
        }
    }
}

/// Load configuration and drive one action on a current-thread runtime
fn run(action: Action) -> Result<()> {
    let config = AgentConfig::from_env().context("Failed to load configuration from environment")?;
    let transport =
        Acme2Client::new(config.directory_url()).context("Failed to initialise ACME client")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    let mut agent = CertificateAgent::new(config, transport);
    match runtime.block_on(agent.run(action)) {
        Ok(_) => Ok(()),
        Err(err) => {
            report_failure(&err);
            println!("{}", agent.summary(false));
            Err(err).with_context(|| format!("{action} failed"))
        }
    }
}

/// Operator-facing explanation of a failed run
fn report_failure(err: &AgentError) {
    println!("\nERROR: {err}");
    if let Some(guidance) = err.guidance() {
        println!("{guidance}");
    }
    println!("{}", usage());
}
