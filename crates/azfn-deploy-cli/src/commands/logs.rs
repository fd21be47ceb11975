//! Logs command - stream a function app's live log

use anyhow::Result;
use clap::Args;
use colored::*;

use azfn_deploy_core::{AzCli, CloudAdapter, DeployError, SystemToolchain, Toolchain};

#[derive(Args)]
pub struct LogsCommand {
    /// Resource group of the function app
    #[arg(short = 'g', long)]
    resource_group: String,

    /// Function app name
    #[arg(short = 'a', long)]
    app: String,
}

impl LogsCommand {
    pub async fn execute(&self) -> Result<()> {
        if !SystemToolchain.find_tool("az") {
            return Err(DeployError::MissingDependency { tool: "az".to_string() }.into());
        }

        eprintln!(
            "{} Streaming logs of {} (Ctrl+C to stop)",
            "⏳".cyan(),
            self.app.bold()
        );
        AzCli::new()?.tail_logs(&self.resource_group, &self.app).await?;

        Ok(())
    }
}
