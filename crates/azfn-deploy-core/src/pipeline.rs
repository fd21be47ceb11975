//! Deployment pipeline driver
//!
//! Runs the stages strictly in order and stops at the first failure:
//!
//! `Idle → CheckingPreconditions → ResolvingParams → Provisioning → Packaging →
//! Deploying → Verifying → Recording → Succeeded`
//!
//! Any stage can end the run in `Failed(stage, reason)`. Nothing is rolled back.

use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use crate::ci::CiContext;
use crate::cloud::{CloudAdapter, DeployAuth};
use crate::config::Environment;
use crate::deploy::deploy;
use crate::error::{DeployError, Result};
use crate::lockfile::RunLock;
use crate::package::{package, ArchiveStats};
use crate::params::{self, Defaults, DeployFlags, DeploymentConfig, Prompter};
use crate::preflight::{check_preconditions, PreconditionReport, Requirements, Toolchain};
use crate::provision::{provision, ProvisioningResult};
use crate::release::{ReleaseRecord, ReleaseRecorder};
use crate::smoke::{verify, SmokeProbe, SmokeResult};

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    CheckingPreconditions,
    ResolvingParams,
    Provisioning,
    Packaging,
    Deploying,
    Verifying,
    Recording,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CheckingPreconditions => "precondition check",
            Stage::ResolvingParams => "parameter resolution",
            Stage::Provisioning => "provisioning",
            Stage::Packaging => "packaging",
            Stage::Deploying => "deployment",
            Stage::Verifying => "smoke test",
            Stage::Recording => "release recording",
        }
    }

    pub fn all() -> &'static [Stage] {
        &[
            Stage::CheckingPreconditions,
            Stage::ResolvingParams,
            Stage::Provisioning,
            Stage::Packaging,
            Stage::Deploying,
            Stage::Verifying,
            Stage::Recording,
        ]
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running(Stage),
    Succeeded,
    Failed { stage: Stage, reason: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed { .. })
    }
}

/// A run that stopped in `stage`
#[derive(Error, Debug)]
#[error("{stage} failed: {error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub error: DeployError,
}

impl PipelineFailure {
    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

/// Everything a run needs besides its collaborators
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub flags: DeployFlags,
    pub defaults: Defaults,
    pub source_dir: PathBuf,
    pub template: PathBuf,
    pub settle_delay: Duration,
    pub auth: DeployAuth,
    pub environment: Environment,
    pub ci: CiContext,
    pub record_release: bool,
    /// Where the previous run's parameters are kept; `None` disables reuse
    pub lock_path: Option<PathBuf>,
}

/// External collaborators of a run
pub struct PipelineDeps<'a> {
    pub toolchain: &'a dyn Toolchain,
    pub prompter: &'a dyn Prompter,
    pub cloud: &'a dyn CloudAdapter,
    pub probe: &'a dyn SmokeProbe,
    pub recorder: &'a dyn ReleaseRecorder,
}

/// Report of a successful run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSummary {
    pub config: DeploymentConfig,
    pub provisioning: ProvisioningResult,
    pub archive_files: usize,
    pub archive_bytes: u64,
    pub smoke: SmokeResult,
    pub environment: Environment,
    pub release_tag: Option<String>,
    pub elapsed_secs: f64,
}

pub struct Pipeline<'a> {
    deps: PipelineDeps<'a>,
    settings: PipelineSettings,
    state: PipelineState,
    history: Vec<PipelineState>,
    preconditions: Option<PreconditionReport>,
}

impl<'a> Pipeline<'a> {
    pub fn new(deps: PipelineDeps<'a>, settings: PipelineSettings) -> Self {
        Self {
            deps,
            settings,
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
            preconditions: None,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Every state the last run went through, starting with `Idle`
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Whether the last run reached `stage`
    pub fn entered(&self, stage: Stage) -> bool {
        self.history.contains(&PipelineState::Running(stage))
    }

    pub fn preconditions(&self) -> Option<&PreconditionReport> {
        self.preconditions.as_ref()
    }

    fn transition(&mut self, state: PipelineState) {
        self.state = state.clone();
        self.history.push(state);
    }

    fn enter(&mut self, stage: Stage) {
        info!("▶ {}", stage);
        self.transition(PipelineState::Running(stage));
    }

    fn guard<T>(&mut self, stage: Stage, result: Result<T>) -> std::result::Result<T, PipelineFailure> {
        result.map_err(|error| {
            warn!("{} failed: {}", stage, error);
            self.transition(PipelineState::Failed {
                stage,
                reason: error.to_string(),
            });
            PipelineFailure { stage, error }
        })
    }

    fn save_lock(&self, config: &DeploymentConfig) {
        if let Some(path) = &self.settings.lock_path {
            let lock = RunLock {
                project_name: config.project_name.clone(),
                resource_group: config.resource_group.clone(),
                location: config.location.clone(),
                timestamp: Utc::now(),
            };
            if let Err(e) = lock.save(path) {
                warn!("{:#}", e);
            }
        }
    }

    /// Run every stage from `Idle`. Each call is a fresh run.
    pub async fn run(&mut self) -> std::result::Result<DeploymentSummary, PipelineFailure> {
        let started = Instant::now();
        self.state = PipelineState::Idle;
        self.history = vec![PipelineState::Idle];
        self.preconditions = None;

        let deps = &self.deps;
        let (toolchain, prompter, cloud, probe, recorder) =
            (deps.toolchain, deps.prompter, deps.cloud, deps.probe, deps.recorder);

        // Preconditions
        self.enter(Stage::CheckingPreconditions);
        let requirements = Requirements::for_run(self.settings.record_release);
        let report = check_preconditions(toolchain, &requirements, prompter.is_interactive()).await;
        self.preconditions = Some(report.clone());
        self.guard(Stage::CheckingPreconditions, report.into_result())?;

        // Parameters
        self.enter(Stage::ResolvingParams);
        let previous = self.settings.lock_path.as_deref().and_then(RunLock::load);
        let resolved = params::resolve(
            &self.settings.flags,
            &self.settings.defaults,
            prompter,
            previous.as_ref(),
            Utc::now(),
        )
        .and_then(|config| params::confirm(&config, prompter).map(|_| config));
        let config = self.guard(Stage::ResolvingParams, resolved)?;

        // Infrastructure
        self.enter(Stage::Provisioning);
        let provisioned = provision(cloud, &config, &self.settings.template).await;
        let provisioning = self.guard(Stage::Provisioning, provisioned)?;
        self.save_lock(&config);

        // Artifact
        self.enter(Stage::Packaging);
        let packaged = package(&self.settings.source_dir);
        let artifact = self.guard(Stage::Packaging, packaged)?;
        let ArchiveStats { files, bytes } = artifact.stats();

        self.enter(Stage::Deploying);
        let deployed = deploy(
            cloud,
            &config.resource_group,
            &provisioning.function_app_name,
            artifact,
            &self.settings.auth,
            self.settings.settle_delay,
        )
        .await;
        self.guard(Stage::Deploying, deployed)?;

        // Verification
        self.enter(Stage::Verifying);
        let verified = verify(probe, &provisioning.function_url, &provisioning.function_app_key).await;
        let smoke = self.guard(Stage::Verifying, verified)?;

        // Release
        self.enter(Stage::Recording);
        let release_tag = match (self.settings.record_release, self.settings.ci.run_number) {
            (true, Some(run_number)) => {
                let record = ReleaseRecord::new(
                    run_number,
                    self.settings.ci.commit.as_deref(),
                    &provisioning.function_app_name,
                    self.settings.environment,
                    &config.location,
                );
                let recorded = recorder
                    .record(&record)
                    .await
                    .map_err(|e| DeployError::Release(e.to_string()));
                self.guard(Stage::Recording, recorded)?;
                Some(record.tag)
            }
            (true, None) => {
                info!("No workflow run number available; skipping release recording");
                None
            }
            (false, _) => None,
        };

        self.transition(PipelineState::Succeeded);
        info!("Deployment of {} succeeded", provisioning.function_app_name);

        Ok(DeploymentSummary {
            environment: self.settings.environment,
            config,
            provisioning,
            archive_files: files,
            archive_bytes: bytes,
            smoke,
            release_tag,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let names: Vec<&str> = Stage::all().iter().map(Stage::as_str).collect();
        assert_eq!(
            names,
            vec![
                "precondition check",
                "parameter resolution",
                "provisioning",
                "packaging",
                "deployment",
                "smoke test",
                "release recording",
            ]
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PipelineState::Idle.is_terminal());
        assert!(!PipelineState::Running(Stage::Deploying).is_terminal());
        assert!(PipelineState::Succeeded.is_terminal());
        assert!(PipelineState::Failed {
            stage: Stage::Verifying,
            reason: "smoke test returned status 503".into(),
        }
        .is_terminal());
    }

    #[test]
    fn test_failure_message_names_stage() {
        let failure = PipelineFailure {
            stage: Stage::Verifying,
            error: DeployError::SmokeStatus(503),
        };
        assert_eq!(failure.to_string(), "smoke test failed: smoke test returned status 503");
        assert_eq!(failure.exit_code(), 8);
    }
}
