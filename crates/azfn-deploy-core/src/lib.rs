//! azfn-deploy-core - Deployment pipeline for the Azure Functions chatbot
//!
//! This crate provides:
//! - Precondition checks for the `az`/`gh` toolchain and sessions
//! - Parameter resolution and validation
//! - Infrastructure provisioning through an ARM template
//! - Packaging, upload and smoke verification of the function app
//! - Release recording on GitHub

pub mod azure;
pub mod ci;
pub mod cloud;
pub mod command;
pub mod config;
pub mod deploy;
pub mod error;
pub mod lockfile;
pub mod package;
pub mod params;
pub mod pipeline;
pub mod preflight;
pub mod provision;
pub mod release;
pub mod smoke;
pub mod utils;

// Re-exports for convenience
pub use azure::AzCli;
pub use ci::{CiContext, TriggerEvent};
pub use cloud::{CloudAdapter, DeployAuth, GroupStatus, TemplateOutputs, TemplateParameters};
pub use command::{CommandError, CommandOutput};
pub use config::{AppConfig, Environment};
pub use error::{handle_error, hints, DeployError, ErrorKind, Result};
pub use lockfile::{RunLock, LOCK_FILE_NAME};
pub use package::{package, package_to, ArchiveStats, DeploymentArtifact};
pub use params::{DeployFlags, Defaults, DeploymentConfig, NonInteractive, Prompter, TerminalPrompter};
pub use pipeline::{DeploymentSummary, Pipeline, PipelineDeps, PipelineFailure, PipelineSettings, PipelineState, Stage};
pub use preflight::{CheckOutcome, PreconditionReport, Provider, SystemToolchain, Toolchain};
pub use provision::ProvisioningResult;
pub use release::{GhReleaseRecorder, ReleaseRecord, ReleaseRecorder};
pub use smoke::{HttpSmokeProbe, SmokeProbe, SmokeResult};
pub use utils::{expand_tilde, mask_secret};

/// Version of the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
