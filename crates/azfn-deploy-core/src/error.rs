//! Error types and error handling for azfn-deploy

use std::path::PathBuf;
use thiserror::Error;

use crate::params::ConfigIssue;
use crate::preflight::Provider;

/// Result type alias using DeployError
pub type Result<T> = std::result::Result<T, DeployError>;

/// Failure classes a pipeline run can end with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingDependency,
    NotAuthenticated,
    InvalidConfiguration,
    ProvisioningFailure,
    PackagingFailure,
    DeploymentFailure,
    VerificationFailure,
    ReleaseFailure,
    Other,
}

impl ErrorKind {
    /// Process exit code reported for this class of failure
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::InvalidConfiguration => 2,
            ErrorKind::MissingDependency => 3,
            ErrorKind::NotAuthenticated => 4,
            ErrorKind::ProvisioningFailure => 5,
            ErrorKind::PackagingFailure => 6,
            ErrorKind::DeploymentFailure => 7,
            ErrorKind::VerificationFailure => 8,
            ErrorKind::ReleaseFailure => 9,
            ErrorKind::Other => 1,
        }
    }
}

/// Custom error types for deployment operations
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("required tool `{tool}` was not found on PATH")]
    MissingDependency { tool: String },

    #[error("not signed in to {provider}")]
    NotAuthenticated { provider: Provider },

    #[error("could not verify {subject}: {reason}")]
    PreconditionUnknown { subject: String, reason: String },

    #[error("invalid configuration: {}", join_issues(.0))]
    InvalidConfiguration(Vec<ConfigIssue>),

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("deployment cancelled by operator")]
    Cancelled,

    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("template deployment succeeded but did not return output `{0}`")]
    MissingOutput(String),

    #[error("source directory {} does not exist (are you running from the project root?)", .0.display())]
    SourceMissing(PathBuf),

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("deployment upload rejected: {0}")]
    Deployment(String),

    #[error("smoke test returned status {0}")]
    SmokeStatus(u16),

    #[error("could not reach endpoint {url}: {reason}")]
    SmokeUnreachable { url: String, reason: String },

    #[error("release recording failed: {0}")]
    Release(String),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),

    #[error("General error: {0}")]
    General(#[from] anyhow::Error),
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::MissingDependency { .. } => ErrorKind::MissingDependency,
            DeployError::NotAuthenticated { .. } | DeployError::PreconditionUnknown { .. } => {
                ErrorKind::NotAuthenticated
            }
            DeployError::InvalidConfiguration(_)
            | DeployError::MissingParameter(_)
            | DeployError::Cancelled => ErrorKind::InvalidConfiguration,
            DeployError::Provisioning(_) | DeployError::MissingOutput(_) => {
                ErrorKind::ProvisioningFailure
            }
            DeployError::SourceMissing(_) | DeployError::Packaging(_) => {
                ErrorKind::PackagingFailure
            }
            DeployError::Deployment(_) => ErrorKind::DeploymentFailure,
            DeployError::SmokeStatus(_) | DeployError::SmokeUnreachable { .. } => {
                ErrorKind::VerificationFailure
            }
            DeployError::Release(_) => ErrorKind::ReleaseFailure,
            DeployError::IO(_) | DeployError::General(_) => ErrorKind::Other,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

/// Actionable tips printed under an error
pub fn hints(error: &DeployError) -> Vec<String> {
    match error {
        DeployError::MissingDependency { tool } => vec![match tool.as_str() {
            "az" => "Install the Azure CLI: https://learn.microsoft.com/cli/azure/install-azure-cli".to_string(),
            "gh" => "Install the GitHub CLI: https://cli.github.com".to_string(),
            _ => format!("Install `{}` and make sure it is on PATH", tool),
        }],
        DeployError::NotAuthenticated { provider } => {
            vec![format!("Run `{}` and try again", provider.login_command())]
        }
        DeployError::PreconditionUnknown { .. } => vec![
            "The session state could not be determined; this exits with the same code (4) as a missing sign-in".to_string(),
            "Run `az account show` / `gh auth status` to see the underlying error".to_string(),
        ],
        DeployError::InvalidConfiguration(_) | DeployError::MissingParameter(_) => vec![
            "Project names are 3-11 letters or digits (e.g. -n copilot01)".to_string(),
            "Run with --help to see every flag".to_string(),
            "Check the config file: ~/.config/azfn-deploy/config.json".to_string(),
        ],
        DeployError::SourceMissing(_) => {
            vec!["Run from the function app directory or pass --source <dir>".to_string()]
        }
        DeployError::SmokeStatus(_) | DeployError::SmokeUnreachable { .. } => vec![
            "The new code is live; inspect it with `azfn-deploy logs -g <group> -a <app>`".to_string(),
            "Cold starts can exceed the settle delay; try --settle-secs 90".to_string(),
        ],
        _ => Vec::new(),
    }
}

/// Handle and display errors with helpful messages
pub fn handle_error(error: &DeployError) {
    eprintln!("✗ Error: {}", error);

    // If DEBUG environment variable is set, show detailed info
    if std::env::var("DEBUG").is_ok() {
        if let Some(source) = std::error::Error::source(error) {
            eprintln!("\nDetails:");
            eprintln!("{:?}", source);
        }
    }

    let tips = hints(error);
    if !tips.is_empty() {
        eprintln!("\nHint:");
        for tip in tips {
            eprintln!("  • {}", tip);
        }
    }
}
