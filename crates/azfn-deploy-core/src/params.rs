//! Parameter resolution and validation
//!
//! Values come from, in order of precedence: explicit flags, interactive
//! answers, configured defaults, and (for the project name only) a generated
//! time-derived name. Everything is validated before the first cloud call.

use chrono::{DateTime, Utc};
use is_terminal::IsTerminal;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{DeployError, Result};
use crate::lockfile::RunLock;
use crate::utils::generated_project_name;

/// Values passed explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct DeployFlags {
    pub project_name: Option<String>,
    pub resource_group: Option<String>,
    pub location: Option<String>,
    pub openai_location: Option<String>,
    pub subscription: Option<String>,
    pub yes: bool,
}

/// Fallbacks used when a flag is absent
#[derive(Debug, Clone)]
pub struct Defaults {
    pub location: String,
    pub openai_location: String,
}

/// Fully resolved and validated deployment parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub project_name: String,
    pub resource_group: String,
    pub location: String,
    /// Region of the OpenAI account
    pub secondary_location: String,
    pub subscription_id: Option<String>,
    pub skip_confirmation: bool,
}

/// One validation problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} `{}` {}", self.field, self.value, self.reason)
    }
}

/// Source of interactive answers
pub trait Prompter {
    fn is_interactive(&self) -> bool;

    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String>;

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
}

/// Prompter for scripted runs; never asks anything
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn is_interactive(&self) -> bool {
        false
    }

    fn input(&self, prompt: &str, _default: Option<&str>) -> Result<String> {
        Err(DeployError::MissingParameter(prompt.to_string()))
    }

    fn confirm(&self, _prompt: &str, _default: bool) -> Result<bool> {
        Err(DeployError::MissingParameter("--yes".to_string()))
    }
}

/// Prompter backed by the terminal
pub struct TerminalPrompter {
    interactive: bool,
}

impl TerminalPrompter {
    /// Interactive only when stdin is a terminal, `CI` is unset and the caller
    /// did not force scripted mode
    pub fn new(force_non_interactive: bool) -> Self {
        let interactive = !force_non_interactive
            && std::env::var_os("CI").is_none()
            && std::io::stdin().is_terminal();
        Self { interactive }
    }
}

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        if !self.interactive {
            return NonInteractive.input(prompt, default);
        }
        let mut input = dialoguer::Input::<String>::new().with_prompt(prompt);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input
            .interact_text()
            .map_err(|e| DeployError::General(anyhow::anyhow!("prompt failed: {}", e)))
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if !self.interactive {
            return NonInteractive.confirm(prompt, default);
        }
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(|e| DeployError::General(anyhow::anyhow!("prompt failed: {}", e)))
    }
}

fn project_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9]{3,11}$").expect("valid regex"))
}

fn resource_group_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-\w.()]{1,90}$").expect("valid regex"))
}

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+$").expect("valid regex"))
}

/// Check a project name against `^[a-zA-Z0-9]{3,11}$`
pub fn validate_project_name(name: &str) -> Option<ConfigIssue> {
    if project_name_re().is_match(name) {
        None
    } else {
        Some(ConfigIssue {
            field: "project name",
            value: name.to_string(),
            reason: "must be 3-11 letters or digits".to_string(),
        })
    }
}

/// Collect every issue with a resolved configuration
pub fn validate(config: &DeploymentConfig) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();

    if let Some(issue) = validate_project_name(&config.project_name) {
        issues.push(issue);
    }

    let rg = &config.resource_group;
    if !resource_group_re().is_match(rg) || rg.ends_with('.') {
        issues.push(ConfigIssue {
            field: "resource group",
            value: rg.clone(),
            reason: "must be 1-90 letters, digits, '-', '_', '.', '(' or ')' and not end with '.'"
                .to_string(),
        });
    }

    for (field, value) in [
        ("location", &config.location),
        ("OpenAI location", &config.secondary_location),
    ] {
        if !location_re().is_match(value) {
            issues.push(ConfigIssue {
                field,
                value: value.clone(),
                reason: "is not an Azure region name (e.g. eastus)".to_string(),
            });
        }
    }

    if let Some(sub) = &config.subscription_id {
        if sub.trim().is_empty() {
            issues.push(ConfigIssue {
                field: "subscription",
                value: sub.clone(),
                reason: "must not be empty".to_string(),
            });
        }
    }

    issues
}

/// "East US" -> "eastus"
fn normalize_location(location: &str) -> String {
    location
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Merge flags, previous-run answers, prompts and defaults into a validated config
pub fn resolve(
    flags: &DeployFlags,
    defaults: &Defaults,
    prompter: &dyn Prompter,
    previous: Option<&RunLock>,
    now: DateTime<Utc>,
) -> Result<DeploymentConfig> {
    let interactive = prompter.is_interactive();

    let reuse = match previous {
        Some(lock)
            if interactive && (flags.project_name.is_none() || flags.resource_group.is_none()) =>
        {
            let prompt = format!(
                "Reuse previous deployment `{}` in `{}` ({})?",
                lock.project_name,
                lock.resource_group,
                lock.timestamp.format("%Y-%m-%d %H:%M UTC")
            );
            if prompter.confirm(&prompt, true)? {
                Some(lock)
            } else {
                None
            }
        }
        _ => None,
    };

    let project_name = match (&flags.project_name, reuse) {
        (Some(name), _) => name.clone(),
        (None, Some(lock)) => lock.project_name.clone(),
        (None, None) => {
            let generated = generated_project_name(now);
            if interactive {
                prompter.input("Project name (3-11 letters or digits)", Some(&generated))?
            } else {
                debug!("No project name given, using generated name {}", generated);
                generated
            }
        }
    };

    let resource_group = match (&flags.resource_group, reuse) {
        (Some(rg), _) => rg.clone(),
        (None, Some(lock)) => lock.resource_group.clone(),
        (None, None) if interactive => {
            let suggestion = format!("rg-{}", project_name);
            prompter.input("Resource group", Some(&suggestion))?
        }
        (None, None) => return Err(DeployError::MissingParameter("--resource-group".to_string())),
    };

    let location = flags
        .location
        .as_deref()
        .unwrap_or(&defaults.location);
    let openai_location = flags
        .openai_location
        .as_deref()
        .unwrap_or(&defaults.openai_location);

    let config = DeploymentConfig {
        project_name: project_name.trim().to_string(),
        resource_group: resource_group.trim().to_string(),
        location: normalize_location(location),
        secondary_location: normalize_location(openai_location),
        subscription_id: flags.subscription.clone(),
        skip_confirmation: flags.yes,
    };

    let issues = validate(&config);
    if !issues.is_empty() {
        return Err(DeployError::InvalidConfiguration(issues));
    }

    Ok(config)
}

/// Ask the operator to approve the resolved configuration unless `--yes` was given
pub fn confirm(config: &DeploymentConfig, prompter: &dyn Prompter) -> Result<()> {
    if config.skip_confirmation {
        return Ok(());
    }
    if !prompter.is_interactive() {
        return Err(DeployError::MissingParameter(
            "--yes (confirmation cannot be prompted in a non-interactive run)".to_string(),
        ));
    }

    let prompt = format!(
        "Deploy project `{}` to resource group `{}` in {} (OpenAI in {})?",
        config.project_name, config.resource_group, config.location, config.secondary_location
    );
    if prompter.confirm(&prompt, true)? {
        Ok(())
    } else {
        Err(DeployError::Cancelled)
    }
}
