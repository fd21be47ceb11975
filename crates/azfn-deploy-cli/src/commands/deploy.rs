//! Deploy command - the full pipeline (default when no subcommand is given)

use anyhow::Result;
use clap::Args;
use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use std::path::{Path, PathBuf};
use std::time::Duration;

use azfn_deploy_core::preflight::Subject;
use azfn_deploy_core::{
    mask_secret, package_to, AppConfig, AzCli, CheckOutcome, CiContext, DeployAuth, DeployError,
    DeployFlags, Defaults, DeploymentSummary, Environment, GhReleaseRecorder, HttpSmokeProbe,
    Pipeline, PipelineDeps, PipelineSettings, PreconditionReport, Stage, SystemToolchain,
    TerminalPrompter, LOCK_FILE_NAME,
};

/// Archive written when a run only packages
const PACKAGE_ONLY_OUTPUT: &str = "app.zip";

pub fn parse_environment(s: &str) -> std::result::Result<Environment, String> {
    Environment::from_str(s)
        .ok_or_else(|| format!("unknown environment `{}` (development, staging, production)", s))
}

/// A flag given as an empty string (e.g. an unset CI variable) counts as absent
fn given(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.trim().is_empty())
}

#[derive(Args, Debug, Default)]
pub struct DeployCommand {
    /// Resource group to create or reuse
    #[arg(short = 'g', long)]
    pub resource_group: Option<String>,

    /// Project name, 3-11 letters or digits (generated when omitted)
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Azure region for the function app [default: eastus]
    #[arg(short = 'l', long)]
    pub location: Option<String>,

    /// Azure region for the OpenAI account [default: eastus]
    #[arg(short = 'o', long)]
    pub openai_location: Option<String>,

    /// Subscription to deploy into
    #[arg(short = 's', long)]
    pub subscription: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Function app source directory
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Infrastructure template file
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Target environment (development, staging, production)
    #[arg(long, value_parser = parse_environment)]
    pub environment: Option<Environment>,

    /// Seconds to wait after upload before the smoke test
    #[arg(long)]
    pub settle_secs: Option<u64>,

    /// Never prompt; missing parameters are errors
    #[arg(long)]
    pub non_interactive: bool,

    /// Record a GitHub release after a successful deployment
    #[arg(long)]
    pub release: bool,

    /// Publish profile user for the archive upload
    #[arg(long, env = "AZFN_PUBLISH_USER")]
    pub publish_user: Option<String>,

    /// Publish profile password for the archive upload
    #[arg(long, env = "AZFN_PUBLISH_PASSWORD", hide_env_values = true)]
    pub publish_password: Option<String>,
}

impl DeployCommand {
    fn auth(&self) -> std::result::Result<DeployAuth, DeployError> {
        match (given(&self.publish_user), given(&self.publish_password)) {
            (Some(username), Some(password)) => Ok(DeployAuth::PublishCredential { username, password }),
            (None, None) => Ok(DeployAuth::Identity),
            _ => Err(DeployError::MissingParameter(
                "--publish-user and --publish-password must be given together".to_string(),
            )),
        }
    }

    fn settings(&self, config: &AppConfig, ci: CiContext) -> std::result::Result<PipelineSettings, DeployError> {
        Ok(PipelineSettings {
            flags: DeployFlags {
                project_name: given(&self.name),
                resource_group: given(&self.resource_group),
                location: given(&self.location),
                openai_location: given(&self.openai_location),
                subscription: given(&self.subscription),
                yes: self.yes,
            },
            defaults: Defaults {
                location: config.location().to_string(),
                openai_location: config.openai_location().to_string(),
            },
            source_dir: self.source.clone().unwrap_or_else(|| config.source_dir()),
            template: self.template.clone().unwrap_or_else(|| config.template_path()),
            settle_delay: self
                .settle_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.settle_delay()),
            auth: self.auth()?,
            environment: self.environment.unwrap_or(ci.environment),
            record_release: self.release || ci.is_ci(),
            lock_path: Some(PathBuf::from(LOCK_FILE_NAME)),
            ci,
        })
    }

    pub async fn execute(&self, config: &AppConfig, json: bool) -> Result<()> {
        let ci = CiContext::from_env(self.environment.unwrap_or(config.get_environment()))?;

        if !ci.should_deploy() {
            return self.package_only(config, &ci, json);
        }

        let settings = self.settings(config, ci)?;
        let toolchain = SystemToolchain;
        let prompter = TerminalPrompter::new(self.non_interactive);
        let cloud = AzCli::new()?;
        let probe = HttpSmokeProbe::new(config.smoke_timeout())?;
        let recorder = GhReleaseRecorder;

        if !json {
            println!(
                "{} Deploying to {} ({})\n",
                "⏳".cyan(),
                settings.environment.as_str().green().bold(),
                settings.auth.describe()
            );
        }

        let mut pipeline = Pipeline::new(
            PipelineDeps {
                toolchain: &toolchain,
                prompter: &prompter,
                cloud: &cloud,
                probe: &probe,
                recorder: &recorder,
            },
            settings,
        );

        let outcome = pipeline.run().await;
        match outcome {
            Ok(summary) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                } else {
                    print_summary(&summary);
                }
                Ok(())
            }
            Err(failure) => {
                if failure.stage == Stage::CheckingPreconditions && !json {
                    if let Some(report) = pipeline.preconditions() {
                        print_preconditions(report);
                    }
                }
                Err(failure.into())
            }
        }
    }

    fn package_only(&self, config: &AppConfig, ci: &CiContext, json: bool) -> Result<()> {
        let source = self.source.clone().unwrap_or_else(|| config.source_dir());
        let stats = package_to(&source, Path::new(PACKAGE_ONLY_OUTPUT))?;

        if json {
            let output = serde_json::json!({
                "deployed": false,
                "event": ci.event,
                "archive": PACKAGE_ONLY_OUTPUT,
                "files": stats.files,
                "bytes": stats.bytes,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{} This run only builds the package (not a push to main or a dispatch)", "ℹ".cyan());
            println!(
                "{} Wrote {} ({} files, {} bytes)",
                "✓".green(),
                PACKAGE_ONLY_OUTPUT.bold(),
                stats.files,
                stats.bytes
            );
        }
        Ok(())
    }
}

fn print_preconditions(report: &PreconditionReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Requirement", "Status"]);

    for check in &report.checks {
        let subject = match &check.subject {
            Subject::Tool(tool) => format!("tool: {}", tool),
            Subject::Session(provider) => format!("session: {}", provider),
        };
        let (text, color) = match &check.outcome {
            CheckOutcome::Passed => ("✓ ok".to_string(), Color::Green),
            CheckOutcome::ToolNotFound => ("✗ not found".to_string(), Color::Red),
            CheckOutcome::NotAuthenticated => ("✗ not signed in".to_string(), Color::Red),
            CheckOutcome::Skipped => ("- skipped".to_string(), Color::Yellow),
            CheckOutcome::Unknown(reason) => (format!("? {}", reason), Color::Yellow),
        };
        table.add_row(vec![Cell::new(subject), Cell::new(text).fg(color)]);
    }

    eprintln!("{table}");
    eprintln!();
}

fn print_summary(summary: &DeploymentSummary) {
    let config = &summary.config;
    let provisioning = &summary.provisioning;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Item", "Value"]);
    table.add_row(vec!["Project", config.project_name.as_str()]);
    table.add_row(vec!["Resource group", config.resource_group.as_str()]);
    table.add_row(vec!["Location", config.location.as_str()]);
    table.add_row(vec!["OpenAI location", config.secondary_location.as_str()]);
    table.add_row(vec!["Environment", summary.environment.as_str()]);
    table.add_row(vec!["Function app", provisioning.function_app_name.as_str()]);
    table.add_row(vec!["Function URL", provisioning.function_url.as_str()]);
    table.add_row(vec!["Storage account", provisioning.storage_account_name.as_str()]);
    table.add_row(vec!["File share", provisioning.file_share_name.as_str()]);
    table.add_row(vec![
        Cell::new("Function key"),
        Cell::new(mask_secret(&provisioning.function_app_key)),
    ]);
    table.add_row(vec![
        Cell::new("Archive"),
        Cell::new(format!("{} files, {} bytes", summary.archive_files, summary.archive_bytes)),
    ]);
    table.add_row(vec![
        Cell::new("Smoke test"),
        Cell::new(format!("HTTP {}", summary.smoke.status_code)).fg(Color::Green),
    ]);
    table.add_row(vec![
        Cell::new("Release"),
        Cell::new(summary.release_tag.as_deref().unwrap_or("-")),
    ]);

    println!("{table}");
    println!();
    println!(
        "{} Deployment finished in {:.1}s",
        "✓".green().bold(),
        summary.elapsed_secs
    );
}
