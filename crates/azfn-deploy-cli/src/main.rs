//! azfn-deploy CLI - Deploys the chatbot function app to Azure
//!
//! Without a subcommand the full pipeline runs: preconditions, parameters,
//! provisioning, packaging, upload, smoke test and release recording.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

mod commands;

use azfn_deploy_core::{AppConfig, DeployError, PipelineFailure};
use commands::{deploy, env, logs, package, version};

#[derive(Parser)]
#[command(name = "azfn-deploy")]
#[command(author = "Copilot Agent Team")]
#[command(version)]
#[command(about = "Provision, package, deploy and verify the chatbot function app", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    deploy: deploy::DeployCommand,

    /// Log pipeline progress (info level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the deployment archive without deploying it
    Package(package::PackageCommand),

    /// Stream live logs of a deployed function app
    Logs(logs::LogsCommand),

    /// Show effective configuration and CI context
    Env(env::EnvCommand),

    /// Show version information
    Version(version::VersionCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} Failed to load configuration: {:#}", "✗".red(), e);
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Some(Commands::Package(cmd)) => cmd.execute(&config, cli.json),
        Some(Commands::Logs(cmd)) => cmd.execute().await,
        Some(Commands::Env(cmd)) => cmd.execute(&config, cli.json),
        Some(Commands::Version(cmd)) => cmd.execute(),
        None => cli.deploy.execute(&config, cli.json).await,
    };

    if let Err(e) = result {
        std::process::exit(report_failure(e));
    }

    Ok(())
}

/// Print the failure with hints and return the exit code for it
fn report_failure(error: anyhow::Error) -> i32 {
    let error = match error.downcast::<PipelineFailure>() {
        Ok(failure) => {
            eprintln!("{} Stopped at stage: {}", "✗".red().bold(), failure.stage.to_string().bold());
            azfn_deploy_core::handle_error(&failure.error);
            return failure.exit_code();
        }
        Err(e) => e,
    };

    let error = match error.downcast::<DeployError>() {
        Ok(e) => e,
        Err(e) => DeployError::General(e),
    };
    azfn_deploy_core::handle_error(&error);
    error.exit_code()
}
