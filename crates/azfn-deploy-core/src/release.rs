//! Release recording on GitHub
//!
//! A successful deployment is recorded as a GitHub release tagged from the
//! workflow run number. Recording is not idempotent: the same run number twice
//! means a duplicate tag, which GitHub rejects.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::command::{self, CommandError};
use crate::config::Environment;

/// Release about to be created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRecord {
    pub tag: String,
    pub title: String,
    pub commit: Option<String>,
    pub function_app: String,
    pub environment: Environment,
    pub region: String,
}

impl ReleaseRecord {
    pub fn new(
        run_number: u64,
        commit: Option<&str>,
        function_app: &str,
        environment: Environment,
        region: &str,
    ) -> Self {
        Self {
            tag: format!("deploy-{}", run_number),
            title: format!("Deployment #{} ({})", run_number, environment),
            commit: commit.map(str::to_string),
            function_app: function_app.to_string(),
            environment,
            region: region.to_string(),
        }
    }

    /// Markdown body of the release
    pub fn notes(&self) -> String {
        format!(
            "## Deployment\n\n\
             - **Commit:** {}\n\
             - **Function App:** {}\n\
             - **Environment:** {}\n\
             - **Region:** {}\n",
            self.commit.as_deref().unwrap_or("unknown"),
            self.function_app,
            self.environment,
            self.region
        )
    }
}

/// Creates the immutable record of a deployment
#[async_trait]
pub trait ReleaseRecorder: Send + Sync {
    async fn record(&self, release: &ReleaseRecord) -> Result<(), CommandError>;
}

/// Recorder using `gh release create`
pub struct GhReleaseRecorder;

#[async_trait]
impl ReleaseRecorder for GhReleaseRecorder {
    async fn record(&self, release: &ReleaseRecord) -> Result<(), CommandError> {
        let notes = release.notes();
        let mut args = vec![
            "release",
            "create",
            release.tag.as_str(),
            "--title",
            release.title.as_str(),
            "--notes",
            notes.as_str(),
        ];
        if let Some(commit) = &release.commit {
            args.extend(["--target", commit.as_str()]);
        }

        command::run("gh", &args).await?;
        info!("Created release {}", release.tag);
        Ok(())
    }
}
