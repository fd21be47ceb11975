//! Environment command - show effective configuration and CI context

use anyhow::Result;
use clap::Args;
use colored::*;
use azfn_deploy_core::ci::TriggerEvent;
use azfn_deploy_core::{AppConfig, CiContext};

#[derive(Args)]
pub struct EnvCommand;

fn describe_event(event: &TriggerEvent) -> String {
    match event {
        TriggerEvent::Push { branch } => format!("push to {}", branch),
        TriggerEvent::PullRequest => "pull request".to_string(),
        TriggerEvent::WorkflowDispatch => "manual dispatch".to_string(),
        TriggerEvent::Local => "local run".to_string(),
        TriggerEvent::Other { name } => format!("other ({})", name),
    }
}

impl EnvCommand {
    pub fn execute(&self, config: &AppConfig, json: bool) -> Result<()> {
        let ci = CiContext::from_env(config.get_environment())?;
        let config_file = config
            .source_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults)".to_string());

        if json {
            let output = serde_json::json!({
                "configFile": config_file,
                "environment": ci.environment,
                "location": config.location(),
                "openAILocation": config.openai_location(),
                "template": config.template_path().display().to_string(),
                "source": config.source_dir().display().to_string(),
                "settleDelaySecs": config.settle_delay().as_secs(),
                "smokeTimeoutSecs": config.smoke_timeout().as_secs(),
                "ci": ci,
                "deploys": ci.should_deploy(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        println!("{}", "Effective configuration".bold());
        println!();
        println!("  {} {}", "Config file:".cyan(), config_file);
        println!("  {} {}", "Environment:".cyan(), ci.environment.as_str().green().bold());
        println!("  {} {}", "Location:".cyan(), config.location());
        println!("  {} {}", "OpenAI location:".cyan(), config.openai_location());
        println!("  {} {}", "Template:".cyan(), config.template_path().display());
        println!("  {} {}", "Source:".cyan(), config.source_dir().display());
        println!("  {} {}s", "Settle delay:".cyan(), config.settle_delay().as_secs());
        println!("  {} {}s", "Smoke timeout:".cyan(), config.smoke_timeout().as_secs());
        println!();
        println!("{}", "CI context".bold());
        println!();
        println!("  {} {}", "Trigger:".cyan(), describe_event(&ci.event));
        println!(
            "  {} {}",
            "Run number:".cyan(),
            ci.run_number.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
        );
        println!("  {} {}", "Commit:".cyan(), ci.commit.as_deref().unwrap_or("-"));
        println!("  {} {}", "Repository:".cyan(), ci.repository.as_deref().unwrap_or("-"));
        let action = if ci.should_deploy() {
            "deploy".green()
        } else {
            "package only".yellow()
        };
        println!("  {} {}", "Action:".cyan(), action);

        Ok(())
    }
}
