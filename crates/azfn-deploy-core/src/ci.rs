//! GitHub Actions run context
//!
//! Deployments are triggered by a push to main, a pull request against main, or
//! a manual dispatch that picks the target environment.

use serde::Serialize;

use crate::config::Environment;
use crate::error::{DeployError, Result};
use crate::params::ConfigIssue;

pub const MAIN_BRANCH: &str = "main";

/// What started the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    Push { branch: String },
    PullRequest,
    WorkflowDispatch,
    /// Not running under GitHub Actions
    Local,
    Other { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CiContext {
    pub event: TriggerEvent,
    pub environment: Environment,
    pub run_number: Option<u64>,
    pub commit: Option<String>,
    pub repository: Option<String>,
}

impl CiContext {
    /// Read the context from the process environment
    pub fn from_env(local_default: Environment) -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok(), local_default)
    }

    /// Read the context through `get`. `local_default` is the environment used
    /// outside GitHub Actions. An unrecognised `DEPLOY_ENVIRONMENT` is an error.
    pub fn from_vars<F>(get: F, local_default: Environment) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let in_actions = get("GITHUB_ACTIONS").as_deref() == Some("true");
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let event = if !in_actions {
            TriggerEvent::Local
        } else {
            match non_empty("GITHUB_EVENT_NAME").as_deref() {
                Some("push") => TriggerEvent::Push {
                    branch: non_empty("GITHUB_REF_NAME").unwrap_or_default(),
                },
                Some("pull_request") => TriggerEvent::PullRequest,
                Some("workflow_dispatch") => TriggerEvent::WorkflowDispatch,
                Some(other) => TriggerEvent::Other {
                    name: other.to_string(),
                },
                None => TriggerEvent::Other {
                    name: String::new(),
                },
            }
        };

        // Dispatch input; only an empty or absent value means production
        let environment = match event {
            TriggerEvent::Local => local_default,
            _ => match non_empty("DEPLOY_ENVIRONMENT") {
                None => Environment::Production,
                Some(value) => Environment::from_str(&value).ok_or_else(|| {
                    DeployError::InvalidConfiguration(vec![ConfigIssue {
                        field: "DEPLOY_ENVIRONMENT",
                        value,
                        reason: "must be development, staging or production".to_string(),
                    }])
                })?,
            },
        };

        Ok(Self {
            event,
            environment,
            run_number: non_empty("GITHUB_RUN_NUMBER").and_then(|v| v.trim().parse().ok()),
            commit: non_empty("GITHUB_SHA"),
            repository: non_empty("GITHUB_REPOSITORY"),
        })
    }

    pub fn is_ci(&self) -> bool {
        self.event != TriggerEvent::Local
    }

    /// Pull requests only build the package; pushes to main, dispatches and
    /// local runs deploy
    pub fn should_deploy(&self) -> bool {
        match &self.event {
            TriggerEvent::Push { branch } => branch == MAIN_BRANCH,
            TriggerEvent::WorkflowDispatch | TriggerEvent::Local => true,
            TriggerEvent::PullRequest | TriggerEvent::Other { .. } => false,
        }
    }
}
