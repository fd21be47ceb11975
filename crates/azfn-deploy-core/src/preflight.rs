//! Precondition checks run before any mutating action
//!
//! Verifies that the external tools are installed and that the operator is
//! signed in to every identity provider the run needs.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::command::{self, CommandError};
use crate::error::{DeployError, Result};

/// Identity providers a run may need a session with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Azure,
    GitHub,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Azure => "Azure",
            Provider::GitHub => "GitHub",
        }
    }

    /// CLI tool that carries the session for this provider
    pub fn tool(&self) -> &'static str {
        match self {
            Provider::Azure => "az",
            Provider::GitHub => "gh",
        }
    }

    pub fn login_command(&self) -> &'static str {
        match self {
            Provider::Azure => "az login",
            Provider::GitHub => "gh auth login",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Access to the local toolchain and identity sessions
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Whether an executable with this name is on PATH
    fn find_tool(&self, name: &str) -> bool;

    async fn is_authenticated(&self, provider: Provider) -> std::result::Result<bool, CommandError>;

    /// Run the provider's interactive login flow
    async fn login(&self, provider: Provider) -> std::result::Result<(), CommandError>;
}

/// Toolchain backed by the real PATH and CLIs
pub struct SystemToolchain;

#[async_trait]
impl Toolchain for SystemToolchain {
    fn find_tool(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }

    async fn is_authenticated(&self, provider: Provider) -> std::result::Result<bool, CommandError> {
        let output = match provider {
            Provider::Azure => command::capture("az", &["account", "show", "--output", "none"]).await?,
            Provider::GitHub => command::capture("gh", &["auth", "status"]).await?,
        };
        Ok(output.success())
    }

    async fn login(&self, provider: Provider) -> std::result::Result<(), CommandError> {
        match provider {
            Provider::Azure => command::run_attached("az", &["login"]).await,
            Provider::GitHub => command::run_attached("gh", &["auth", "login"]).await,
        }
    }
}

/// What a single check looked at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Tool(String),
    Session(Provider),
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Tool(name) => write!(f, "tool `{}`", name),
            Subject::Session(provider) => write!(f, "{} session", provider),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    ToolNotFound,
    NotAuthenticated,
    Skipped,
    Unknown(String),
}

impl CheckOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, CheckOutcome::Passed | CheckOutcome::Skipped)
    }
}

#[derive(Debug, Clone)]
pub struct PreconditionCheck {
    pub subject: Subject,
    pub outcome: CheckOutcome,
}

/// What a run needs from the local machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirements {
    pub tools: Vec<String>,
    pub providers: Vec<Provider>,
}

impl Requirements {
    /// `az` is always needed; `gh` only when the run records a release
    pub fn for_run(record_release: bool) -> Self {
        let mut tools = vec!["az".to_string()];
        let mut providers = vec![Provider::Azure];
        if record_release {
            tools.push("gh".to_string());
            providers.push(Provider::GitHub);
        }
        Self { tools, providers }
    }
}

/// Pass/fail per required item
#[derive(Debug, Clone, Default)]
pub struct PreconditionReport {
    pub checks: Vec<PreconditionCheck>,
}

impl PreconditionReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| !c.outcome.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = &PreconditionCheck> {
        self.checks.iter().filter(|c| c.outcome.is_failure())
    }

    /// Turn the first failing check into its error
    pub fn into_result(self) -> Result<PreconditionReport> {
        let failure = self.failures().next().cloned();
        match failure {
            None => Ok(self),
            Some(check) => Err(match (check.subject, check.outcome) {
                (Subject::Tool(tool), _) => DeployError::MissingDependency { tool },
                (Subject::Session(provider), CheckOutcome::NotAuthenticated) => {
                    DeployError::NotAuthenticated { provider }
                }
                (Subject::Session(provider), CheckOutcome::Unknown(reason)) => {
                    DeployError::PreconditionUnknown {
                        subject: format!("{} session", provider),
                        reason,
                    }
                }
                (Subject::Session(provider), _) => DeployError::NotAuthenticated { provider },
            }),
        }
    }
}

/// Check every required tool and session.
///
/// A session whose tool is missing is reported as skipped; the missing tool is
/// already a failure. When `interactive` is set, an unauthenticated Azure
/// session gets one `az login` attempt before being re-probed.
pub async fn check_preconditions(
    toolchain: &dyn Toolchain,
    requirements: &Requirements,
    interactive: bool,
) -> PreconditionReport {
    let mut report = PreconditionReport::default();

    for tool in &requirements.tools {
        let outcome = if toolchain.find_tool(tool) {
            CheckOutcome::Passed
        } else {
            CheckOutcome::ToolNotFound
        };
        report.checks.push(PreconditionCheck {
            subject: Subject::Tool(tool.clone()),
            outcome,
        });
    }

    for provider in &requirements.providers {
        let outcome = if !toolchain.find_tool(provider.tool()) {
            CheckOutcome::Skipped
        } else {
            probe_session(toolchain, *provider, interactive).await
        };
        report.checks.push(PreconditionCheck {
            subject: Subject::Session(*provider),
            outcome,
        });
    }

    report
}

async fn probe_session(toolchain: &dyn Toolchain, provider: Provider, interactive: bool) -> CheckOutcome {
    match toolchain.is_authenticated(provider).await {
        Ok(true) => CheckOutcome::Passed,
        Ok(false) if interactive && provider == Provider::Azure => {
            info!("Not signed in to {}; starting `{}`", provider, provider.login_command());
            if let Err(e) = toolchain.login(provider).await {
                warn!("{} login failed: {}", provider, e);
                return CheckOutcome::NotAuthenticated;
            }
            match toolchain.is_authenticated(provider).await {
                Ok(true) => CheckOutcome::Passed,
                Ok(false) => CheckOutcome::NotAuthenticated,
                Err(e) => CheckOutcome::Unknown(e.to_string()),
            }
        }
        Ok(false) => CheckOutcome::NotAuthenticated,
        Err(e) => CheckOutcome::Unknown(e.to_string()),
    }
}
